use crate::error::{require_key, ConfigError, Result};
use crate::timestamp::session_format;
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterValueType {
    Int,
    Float,
    Bool,
    String,
    Pair,
}

impl ParameterValueType {
    pub fn code(self) -> i32 {
        match self {
            ParameterValueType::Int => 0,
            ParameterValueType::Float => 1,
            ParameterValueType::Bool => 2,
            ParameterValueType::String => 3,
            ParameterValueType::Pair => 4,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(ParameterValueType::Int),
            1 => Ok(ParameterValueType::Float),
            2 => Ok(ParameterValueType::Bool),
            3 => Ok(ParameterValueType::String),
            4 => Ok(ParameterValueType::Pair),
            other => Err(ConfigError::validation(format!(
                "Unknown parameter value type {}",
                other
            ))),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ParameterValueType::Int => "int",
            ParameterValueType::Float => "float",
            ParameterValueType::Bool => "bool",
            ParameterValueType::String => "string",
            ParameterValueType::Pair => "pair",
        }
    }
}

impl Serialize for ParameterValueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for ParameterValueType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        ParameterValueType::from_code(code).map_err(de::Error::custom)
    }
}

/// A concrete parameter value. Pairs travel as `[float, int]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypedValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Pair(f64, i64),
}

impl TypedValue {
    /// Integers are accepted where floats are expected.
    pub fn fits(&self, value_type: ParameterValueType) -> bool {
        matches!(
            (self, value_type),
            (TypedValue::Int(_), ParameterValueType::Int)
                | (TypedValue::Int(_), ParameterValueType::Float)
                | (TypedValue::Float(_), ParameterValueType::Float)
                | (TypedValue::Bool(_), ParameterValueType::Bool)
                | (TypedValue::Text(_), ParameterValueType::String)
                | (TypedValue::Pair(_, _), ParameterValueType::Pair)
        )
    }
}

/// Parameter definition, unique per `(trade_system_name, key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub key: String,
    pub name: String,
    pub trade_system_name: String,
    pub value_type: ParameterValueType,
    pub default: TypedValue,
    #[serde(default, deserialize_with = "deserialize_bound")]
    pub min_value: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_bound")]
    pub max_value: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_options")]
    pub options: Vec<String>,
    #[serde(default)]
    pub restrict_auto_tuning: bool,
    #[serde(default)]
    pub display_order: i32,
}

impl Parameter {
    /// Trims identity keys and checks the default against `value_type`.
    /// Bounds and options are deliberately not checked against the default.
    pub fn normalized(mut self) -> Result<Self> {
        self.key = require_key(&self.key, "key")?.to_string();
        self.trade_system_name = require_key(&self.trade_system_name, "tradeSystemName")?.to_string();
        if !self.default.fits(self.value_type) {
            return Err(ConfigError::validation(format!(
                "Default for parameter {} does not match value type {}",
                self.key,
                self.value_type.label()
            )));
        }
        self.min_value = self.min_value.filter(|value| value.is_finite());
        self.max_value = self.max_value.filter(|value| value.is_finite());
        Ok(self)
    }
}

/// Field updates applied by a parameter rename/update. Absent fields are left
/// untouched; `minValue`/`maxValue` given as null or blank clear the bound.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value_type: Option<ParameterValueType>,
    #[serde(default)]
    pub default: Option<TypedValue>,
    #[serde(default, deserialize_with = "deserialize_patch_bound")]
    pub min_value: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_patch_bound")]
    pub max_value: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_patch_options")]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub restrict_auto_tuning: Option<bool>,
    #[serde(default)]
    pub display_order: Option<i32>,
}

impl ParameterPatch {
    pub fn apply_to(&self, parameter: &mut Parameter) {
        if let Some(name) = &self.name {
            parameter.name = name.clone();
        }
        if let Some(value_type) = self.value_type {
            parameter.value_type = value_type;
        }
        if let Some(default) = &self.default {
            parameter.default = default.clone();
        }
        if let Some(min_value) = self.min_value {
            parameter.min_value = min_value;
        }
        if let Some(max_value) = self.max_value {
            parameter.max_value = max_value;
        }
        if let Some(options) = &self.options {
            parameter.options = options.clone();
        }
        if let Some(restrict) = self.restrict_auto_tuning {
            parameter.restrict_auto_tuning = restrict;
        }
        if let Some(display_order) = self.display_order {
            parameter.display_order = display_order;
        }
    }
}

/// Update request as sent by the configuration UI: `updatedKey` names the
/// definition being edited, `key` the key it should end up under.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterUpdateRequest {
    #[serde(default)]
    pub updated_key: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub trade_system_name: Option<String>,
    #[serde(flatten)]
    pub fields: ParameterPatch,
}

/// A definition merged with a concrete value. Only produced by materialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterValue {
    #[serde(flatten)]
    pub definition: Parameter,
    pub value: TypedValue,
}

/// The only thing a group persists per parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredValue {
    pub value: TypedValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterGroup {
    pub id: String,
    pub trade_system_name: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, StoredValue>,
}

/// Incoming group write. Parameter entries may carry full metadata; only
/// their `value` is kept.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterGroupInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub updated_id: Option<String>,
    #[serde(default)]
    pub trade_system_name: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

/// Strips every entry down to `{value}`.
pub fn reduce_to_values(
    parameters: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, StoredValue>> {
    let mut reduced = BTreeMap::new();
    for (key, entry) in parameters {
        require_key(key, "parameter key")?;
        let raw_value = entry.get("value").ok_or_else(|| {
            ConfigError::validation(format!("Parameter {} has no value", key))
        })?;
        let value: TypedValue = serde_json::from_value(raw_value.clone()).map_err(|_| {
            ConfigError::validation(format!(
                "Parameter {} has an unsupported value {}",
                key, raw_value
            ))
        })?;
        reduced.insert(key.clone(), StoredValue { value });
    }
    Ok(reduced)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupParameters {
    WithMetadata(BTreeMap<String, ParameterValue>),
    Values(BTreeMap<String, StoredValue>),
}

impl GroupParameters {
    pub fn keys(&self) -> Vec<&str> {
        match self {
            GroupParameters::WithMetadata(entries) => entries.keys().map(String::as_str).collect(),
            GroupParameters::Values(entries) => entries.keys().map(String::as_str).collect(),
        }
    }

    pub fn value_of(&self, key: &str) -> Option<&TypedValue> {
        match self {
            GroupParameters::WithMetadata(entries) => entries.get(key).map(|entry| &entry.value),
            GroupParameters::Values(entries) => entries.get(key).map(|entry| &entry.value),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            GroupParameters::WithMetadata(entries) => entries.len(),
            GroupParameters::Values(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A group as returned to callers. When produced by the materializer,
/// `last_updated` is the merge time, not the stored save time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    pub id: String,
    pub trade_system_name: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub parameters: GroupParameters,
}

impl From<ParameterGroup> for GroupView {
    fn from(group: ParameterGroup) -> Self {
        Self {
            id: group.id,
            trade_system_name: group.trade_system_name,
            last_updated: group.last_updated,
            note: group.note,
            parameters: GroupParameters::Values(group.parameters),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateIntervalType {
    NewBar,
    Always,
}

impl UpdateIntervalType {
    pub fn wire_value(self) -> i32 {
        match self {
            UpdateIntervalType::NewBar => 0,
            UpdateIntervalType::Always => 1,
        }
    }

    /// Accepts the enumerated integer or its textual name. Any text other
    /// than `New_Bar` means `Always`.
    pub fn from_wire(raw: &Value) -> std::result::Result<Self, String> {
        match raw {
            Value::String(text) if text == "New_Bar" => Ok(UpdateIntervalType::NewBar),
            Value::String(_) => Ok(UpdateIntervalType::Always),
            Value::Number(number) => match number.as_i64() {
                Some(0) => Ok(UpdateIntervalType::NewBar),
                Some(1) => Ok(UpdateIntervalType::Always),
                _ => Err(format!("Unknown updateIntervalType {}", number)),
            },
            other => Err(format!("Unsupported updateIntervalType {}", other)),
        }
    }
}

impl Serialize for UpdateIntervalType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.wire_value())
    }
}

impl<'de> Deserialize<'de> for UpdateIntervalType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        UpdateIntervalType::from_wire(&raw).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TradingWindow {
    #[serde(default)]
    pub monday: Option<TimeWindow>,
    #[serde(default)]
    pub tuesday: Option<TimeWindow>,
    #[serde(default)]
    pub wednesday: Option<TimeWindow>,
    #[serde(default)]
    pub thursday: Option<TimeWindow>,
    #[serde(default)]
    pub friday: Option<TimeWindow>,
    #[serde(default)]
    pub saturday: Option<TimeWindow>,
    #[serde(default)]
    pub sunday: Option<TimeWindow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    #[serde(default)]
    pub bar_type: String,
    #[serde(default = "default_bar_period", deserialize_with = "deserialize_bar_period")]
    pub bar_period: String,
    pub update_interval_type: UpdateIntervalType,
    #[serde(default)]
    pub trading_window: TradingWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    pub enable_logging: bool,
    pub live_results_snapshot_interval_minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingSystem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub session_settings: Option<SessionSettings>,
    #[serde(default)]
    pub system_settings: Option<SystemSettings>,
}

/// Add/update request; a differing `updatedName` renames the system.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingSystemSaveRequest {
    #[serde(flatten)]
    pub system: TradingSystem,
    #[serde(default)]
    pub updated_name: Option<String>,
}

/// Run statistics reported by the trading runtime; stored verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeStatistics {
    pub id: String,
    pub profit: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub total_trades: i64,
    pub winning_trades: i64,
    pub losing_trades: i64,
    pub average_win: f64,
    pub average_loss: f64,
    pub profit_factor: f64,
    pub max_consecutive_wins: i64,
    pub max_consecutive_losses: i64,
    pub average_trade_duration: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub closed_profit: f64,
    pub closed_loss: f64,
    pub total_commission: f64,
    pub maximum_runup: f64,
    pub maximum_trade_runup: f64,
    pub maximum_trade_drawdown: f64,
    pub maximum_open_position_profit: f64,
    pub maximum_open_position_loss: f64,
    pub total_long_trades: i64,
    pub total_short_trades: i64,
    pub total_winning_quantity: f64,
    pub total_losing_quantity: f64,
    pub total_filled_quantity: f64,
    pub largest_trade_quantity: f64,
    pub time_in_winning_trades: i64,
    pub time_in_losing_trades: i64,
    pub max_consecutive_winners: i64,
    pub max_consecutive_losers: i64,
    pub last_trade_profit_loss: f64,
    pub last_trade_quantity: f64,
    #[serde(with = "session_format")]
    pub last_fill_date_time: DateTime<Utc>,
    #[serde(with = "session_format")]
    pub last_entry_date_time: DateTime<Utc>,
    #[serde(with = "session_format")]
    pub last_exit_date_time: DateTime<Utc>,
    #[serde(with = "session_format")]
    pub session_end_date_time: DateTime<Utc>,
    pub total_buy_quantity: f64,
    pub total_sell_quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub context_type: i32,
    pub trade_system_name: String,
    #[serde(default)]
    pub parameter_group_id: String,
    #[serde(with = "session_format")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "session_format")]
    pub end_date: DateTime<Utc>,
    pub trade_statistics: TradeStatistics,
}

/// Splits a comma-joined option list; entries are trimmed, empties dropped.
pub fn split_options(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn normalize_options(raw: Option<&Value>) -> std::result::Result<Vec<String>, String> {
    match raw {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(joined)) => Ok(split_options(joined)),
        Some(Value::Array(entries)) => entries
            .iter()
            .map(|entry| match entry {
                Value::String(text) => Ok(text.clone()),
                Value::Number(number) => Ok(number.to_string()),
                other => Err(format!("Unsupported option entry {}", other)),
            })
            .collect(),
        Some(other) => Err(format!("Unsupported options value {}", other)),
    }
}

/// Blank strings and null mean "no bound"; numeric strings are parsed.
pub fn normalize_bound(raw: Option<&Value>) -> std::result::Result<Option<f64>, String> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => Ok(number.as_f64()),
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            match trimmed.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(Some(value)),
                _ => Err(format!("Bound must be numeric (value: {})", text)),
            }
        }
        Some(other) => Err(format!("Bound must be numeric (value: {})", other)),
    }
}

fn deserialize_bound<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    normalize_bound(raw.as_ref()).map_err(de::Error::custom)
}

fn deserialize_patch_bound<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    normalize_bound(raw.as_ref())
        .map(Some)
        .map_err(de::Error::custom)
}

fn deserialize_options<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    normalize_options(raw.as_ref()).map_err(de::Error::custom)
}

fn deserialize_patch_options<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    normalize_options(raw.as_ref())
        .map(Some)
        .map_err(de::Error::custom)
}

fn default_bar_period() -> String {
    "1".to_string()
}

fn deserialize_bar_period<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(period) => Ok(period),
        _ => Ok(default_bar_period()),
    }
}
