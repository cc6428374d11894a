use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Map as JsonMap, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use tradeconf::context::AppContext;
use tradeconf::error::ConfigError;
use tradeconf::groups::GroupSelector;
use tradeconf::models::{
    GroupParameters, Parameter, ParameterGroup, ParameterGroupInput, ParameterUpdateRequest,
    Session, StoredValue, TradingSystem, TradingSystemSaveRequest, TypedValue,
};
use tradeconf::notifier::{ChangeNotification, ChangeNotifier};
use tradeconf::retry::RetryPolicy;
use tradeconf::store::{ConfigStore, MemoryStore};

fn ensure_test_env() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<ChangeNotification>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<ChangeNotification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChangeNotifier for RecordingNotifier {
    async fn notify(&self, notification: ChangeNotification) {
        self.sent.lock().unwrap().push(notification);
    }
}

/// Wraps the in-memory store, counting definition deletes and optionally
/// failing session retags or single group deletes to simulate a crash in
/// the middle of a rename.
#[derive(Default)]
struct InstrumentedStore {
    inner: MemoryStore,
    parameter_deletes: AtomicUsize,
    fail_session_retag: AtomicBool,
    fail_group_delete: AtomicBool,
}

#[async_trait]
impl ConfigStore for InstrumentedStore {
    async fn upsert_parameter(&self, parameter: &Parameter) -> Result<()> {
        self.inner.upsert_parameter(parameter).await
    }
    async fn get_parameter(&self, trade_system_name: &str, key: &str) -> Result<Option<Parameter>> {
        self.inner.get_parameter(trade_system_name, key).await
    }
    async fn list_parameters(&self, trade_system_name: &str) -> Result<Vec<Parameter>> {
        self.inner.list_parameters(trade_system_name).await
    }
    async fn delete_parameter(&self, trade_system_name: &str, key: &str) -> Result<bool> {
        self.parameter_deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_parameter(trade_system_name, key).await
    }
    async fn delete_parameters(&self, trade_system_name: &str) -> Result<u64> {
        self.inner.delete_parameters(trade_system_name).await
    }
    async fn retag_parameters(&self, from: &str, to: &str) -> Result<u64> {
        self.inner.retag_parameters(from, to).await
    }
    async fn upsert_group(&self, group: &ParameterGroup) -> Result<()> {
        self.inner.upsert_group(group).await
    }
    async fn get_group(&self, trade_system_name: &str, id: &str) -> Result<Option<ParameterGroup>> {
        self.inner.get_group(trade_system_name, id).await
    }
    async fn latest_group(&self, trade_system_name: &str) -> Result<Option<ParameterGroup>> {
        self.inner.latest_group(trade_system_name).await
    }
    async fn list_groups(&self, trade_system_name: &str) -> Result<Vec<ParameterGroup>> {
        self.inner.list_groups(trade_system_name).await
    }
    async fn delete_group(&self, trade_system_name: &str, id: &str) -> Result<bool> {
        if self.fail_group_delete.load(Ordering::SeqCst) {
            return Err(anyhow!("parameter groups collection unavailable"));
        }
        self.inner.delete_group(trade_system_name, id).await
    }
    async fn delete_groups(&self, trade_system_name: &str) -> Result<u64> {
        self.inner.delete_groups(trade_system_name).await
    }
    async fn retag_groups(&self, from: &str, to: &str) -> Result<u64> {
        self.inner.retag_groups(from, to).await
    }
    async fn rename_group_key(
        &self,
        trade_system_name: &str,
        from_key: &str,
        to_key: &str,
    ) -> Result<u64> {
        self.inner
            .rename_group_key(trade_system_name, from_key, to_key)
            .await
    }
    async fn upsert_session(&self, session: &Session) -> Result<()> {
        self.inner.upsert_session(session).await
    }
    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        self.inner.get_session(id).await
    }
    async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.inner.list_sessions().await
    }
    async fn sessions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        self.inner.sessions_between(start, end).await
    }
    async fn sessions_for_group(&self, parameter_group_id: &str) -> Result<Vec<Session>> {
        self.inner.sessions_for_group(parameter_group_id).await
    }
    async fn delete_sessions(&self, trade_system_name: &str) -> Result<u64> {
        self.inner.delete_sessions(trade_system_name).await
    }
    async fn retag_sessions(&self, from: &str, to: &str) -> Result<u64> {
        if self.fail_session_retag.load(Ordering::SeqCst) {
            return Err(anyhow!("sessions collection unavailable"));
        }
        self.inner.retag_sessions(from, to).await
    }
    async fn upsert_trading_system(&self, system: &TradingSystem) -> Result<()> {
        self.inner.upsert_trading_system(system).await
    }
    async fn get_trading_system(&self, name: &str) -> Result<Option<TradingSystem>> {
        self.inner.get_trading_system(name).await
    }
    async fn list_trading_systems(&self) -> Result<Vec<TradingSystem>> {
        self.inner.list_trading_systems().await
    }
    async fn delete_trading_system(&self, name: &str) -> Result<bool> {
        self.inner.delete_trading_system(name).await
    }
}

struct Harness {
    app: AppContext,
    store: Arc<InstrumentedStore>,
    notifier: Arc<RecordingNotifier>,
}

fn harness() -> Harness {
    ensure_test_env();
    let store = Arc::new(InstrumentedStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let app = AppContext::from_parts(store.clone(), notifier.clone(), RetryPolicy::immediate(2));
    Harness {
        app,
        store,
        notifier,
    }
}

fn parameter(trade_system_name: &str, key: &str, default: i64, options: Value) -> Parameter {
    serde_json::from_value(json!({
        "key": key,
        "name": format!("{} period", key),
        "tradeSystemName": trade_system_name,
        "valueType": 0,
        "default": default,
        "minValue": "",
        "maxValue": 100,
        "options": options,
        "displayOrder": 1,
    }))
    .unwrap()
}

fn group_input(trade_system_name: &str, id: Option<&str>, values: &[(&str, Value)]) -> ParameterGroupInput {
    let parameters = values
        .iter()
        .map(|(key, value)| (key.to_string(), json!({ "value": value })))
        .collect::<BTreeMap<_, _>>();
    ParameterGroupInput {
        id: id.map(str::to_string),
        trade_system_name: trade_system_name.to_string(),
        parameters,
        ..Default::default()
    }
}

fn trading_system(name: &str) -> TradingSystem {
    serde_json::from_value(json!({
        "name": name,
        "description": "Moving average crossover",
        "sessionSettings": {
            "barType": "Minute",
            "barPeriod": "5",
            "updateIntervalType": "New_Bar",
        },
        "systemSettings": {
            "enableLogging": true,
            "liveResultsSnapshotIntervalMinutes": 15,
        },
    }))
    .unwrap()
}

fn session_json(id: &str, trade_system_name: &str, group_id: &str, start: &str, end: &str) -> Value {
    let mut statistics = JsonMap::new();
    for field in [
        "profit",
        "maxDrawdown",
        "winRate",
        "totalTrades",
        "winningTrades",
        "losingTrades",
        "averageWin",
        "averageLoss",
        "profitFactor",
        "maxConsecutiveWins",
        "maxConsecutiveLosses",
        "averageTradeDuration",
        "largestWin",
        "largestLoss",
        "sharpeRatio",
        "sortinoRatio",
        "calmarRatio",
        "closedProfit",
        "closedLoss",
        "totalCommission",
        "maximumRunup",
        "maximumTradeRunup",
        "maximumTradeDrawdown",
        "maximumOpenPositionProfit",
        "maximumOpenPositionLoss",
        "totalLongTrades",
        "totalShortTrades",
        "totalWinningQuantity",
        "totalLosingQuantity",
        "totalFilledQuantity",
        "largestTradeQuantity",
        "timeInWinningTrades",
        "timeInLosingTrades",
        "maxConsecutiveWinners",
        "maxConsecutiveLosers",
        "lastTradeProfitLoss",
        "lastTradeQuantity",
        "totalBuyQuantity",
        "totalSellQuantity",
    ] {
        statistics.insert(field.to_string(), json!(0));
    }
    statistics.insert("id".to_string(), json!(format!("{}-stats", id)));
    statistics.insert("profit".to_string(), json!(1250.5));
    for field in [
        "lastFillDateTime",
        "lastEntryDateTime",
        "lastExitDateTime",
        "sessionEndDateTime",
    ] {
        statistics.insert(field.to_string(), json!(end));
    }

    json!({
        "id": id,
        "contextType": 1,
        "tradeSystemName": trade_system_name,
        "parameterGroupId": group_id,
        "startDate": start,
        "endDate": end,
        "tradeStatistics": statistics,
    })
}

#[tokio::test]
async fn materialized_group_covers_every_definition() -> Result<()> {
    let Harness { app, .. } = harness();
    app.parameters()
        .upsert(vec![
            parameter("sysA", "fast", 5, json!([])),
            parameter("sysA", "slow", 20, json!([])),
            parameter("sysA", "signal", 9, json!([])),
        ])
        .await?;
    let id = app
        .groups()
        .upsert(group_input("sysA", Some("g1"), &[("fast", json!(7)), ("gone", json!(3))]))
        .await?;

    let view = app
        .groups()
        .get("sysA", &GroupSelector::Id(id), true)
        .await?
        .expect("view by id");
    let mut keys = view.parameters.keys();
    keys.sort();
    assert_eq!(keys, vec!["fast", "signal", "slow"]);
    assert_eq!(view.parameters.value_of("fast"), Some(&TypedValue::Int(7)));
    assert_eq!(view.parameters.value_of("slow"), Some(&TypedValue::Int(20)));
    assert_eq!(view.parameters.value_of("signal"), Some(&TypedValue::Int(9)));
    assert_eq!(view.parameters.value_of("gone"), None);

    match &view.parameters {
        GroupParameters::WithMetadata(entries) => {
            assert_eq!(entries["slow"].definition.name, "slow period");
            assert_eq!(entries["slow"].definition.max_value, Some(100.0));
        }
        other => panic!("expected metadata view, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn listing_with_metadata_materializes_every_group() -> Result<()> {
    let Harness { app, store, .. } = harness();
    app.parameters()
        .upsert(vec![
            parameter("sysA", "fast", 5, json!([])),
            parameter("sysA", "slow", 20, json!([])),
            parameter("sysA", "signal", 9, json!([])),
        ])
        .await?;
    let saved_at = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).single().unwrap();
    for (id, values) in [
        ("g1", vec![("fast", TypedValue::Int(7))]),
        ("g2", vec![("slow", TypedValue::Int(30)), ("signal", TypedValue::Int(4))]),
    ] {
        store
            .upsert_group(&ParameterGroup {
                id: id.to_string(),
                trade_system_name: "sysA".to_string(),
                last_updated: saved_at,
                note: None,
                parameters: values
                    .into_iter()
                    .map(|(key, value)| (key.to_string(), StoredValue { value }))
                    .collect(),
            })
            .await?;
    }

    let before = Utc::now();
    let views = app.groups().list_all("sysA", true).await?;
    assert_eq!(views.len(), 2);
    let by_id: BTreeMap<_, _> = views.iter().map(|view| (view.id.as_str(), view)).collect();

    let expected = [
        ("g1", [("fast", 7), ("slow", 20), ("signal", 9)]),
        ("g2", [("fast", 5), ("slow", 30), ("signal", 4)]),
    ];
    for (id, values) in expected {
        let view = by_id[id];
        assert!(matches!(view.parameters, GroupParameters::WithMetadata(_)));
        let mut keys = view.parameters.keys();
        keys.sort();
        assert_eq!(keys, vec!["fast", "signal", "slow"]);
        for (key, value) in values {
            assert_eq!(view.parameters.value_of(key), Some(&TypedValue::Int(value)));
        }
        assert!(view.last_updated >= before);
        assert_ne!(view.last_updated, saved_at);
    }
    Ok(())
}

#[tokio::test]
async fn value_only_fetch_returns_stored_keys() -> Result<()> {
    let Harness { app, .. } = harness();
    app.parameters()
        .upsert(vec![parameter("sysA", "slow", 20, json!([]))])
        .await?;
    app.groups()
        .upsert(group_input("sysA", Some("g1"), &[("fast", json!(7)), ("gone", json!(3))]))
        .await?;

    let view = app
        .groups()
        .get("sysA", &GroupSelector::Id("g1".to_string()), false)
        .await?
        .expect("view by id");
    assert_eq!(view.parameters.keys(), vec!["fast", "gone"]);
    assert_eq!(
        serde_json::to_value(&view.parameters)?,
        json!({"fast": {"value": 7}, "gone": {"value": 3}})
    );
    Ok(())
}

#[tokio::test]
async fn same_key_update_patches_in_place() -> Result<()> {
    let Harness { app, store, .. } = harness();
    app.parameters()
        .upsert(vec![parameter("sysA", "a", 5, json!([]))])
        .await?;
    app.groups()
        .upsert(group_input("sysA", Some("g1"), &[("a", json!(8))]))
        .await?;

    let request: ParameterUpdateRequest = serde_json::from_value(json!({
        "updatedKey": "a",
        "key": "a",
        "tradeSystemName": "sysA",
        "name": "Renamed label",
        "maxValue": null,
    }))?;
    let updated = app.parameters().update(request).await?;

    assert_eq!(updated.name, "Renamed label");
    assert_eq!(updated.max_value, None);
    assert_eq!(store.parameter_deletes.load(Ordering::SeqCst), 0);
    let group = store.get_group("sysA", "g1").await?.expect("group");
    assert_eq!(group.parameters["a"].value, TypedValue::Int(8));
    Ok(())
}

#[tokio::test]
async fn cascading_renames_follow_system_and_key() -> Result<()> {
    let Harness { app, .. } = harness();
    app.trading_systems().upsert(trading_system("sysA")).await?;
    app.parameters()
        .upsert(vec![parameter("sysA", "p1", 5, json!([]))])
        .await?;
    app.groups()
        .upsert(group_input("sysA", Some("g1"), &[("p1", json!(11))]))
        .await?;

    app.trading_systems()
        .save(TradingSystemSaveRequest {
            system: trading_system("sysA"),
            updated_name: Some("sysB".to_string()),
        })
        .await?;
    let request: ParameterUpdateRequest = serde_json::from_value(json!({
        "updatedKey": "p1",
        "key": "p1_new",
        "tradeSystemName": "sysB",
    }))?;
    app.parameters().update(request).await?;

    let view = app
        .groups()
        .get("sysB", &GroupSelector::Id("g1".to_string()), false)
        .await?
        .expect("view");
    assert_eq!(view.parameters.keys(), vec!["p1_new"]);
    assert_eq!(view.parameters.value_of("p1_new"), Some(&TypedValue::Int(11)));

    assert!(app.groups().list_all("sysA", false).await?.is_empty());
    assert!(app
        .groups()
        .get("sysA", &GroupSelector::Latest, false)
        .await?
        .is_none());
    assert!(app.trading_systems().list(Some("sysA")).await?.is_empty());
    assert_eq!(app.trading_systems().list(Some("sysB")).await?.len(), 1);

    let definitions = app.parameters().list("sysB").await?;
    assert_eq!(definitions.len(), 1);
    assert_eq!(definitions[0].key, "p1_new");
    assert_eq!(definitions[0].name, "p1 period");
    Ok(())
}

#[tokio::test]
async fn latest_group_has_maximum_timestamp() -> Result<()> {
    let Harness { app, store, .. } = harness();
    let base = Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).single().unwrap();
    for (id, minutes) in [("middle", 5), ("newest", 10), ("oldest", 0)] {
        store
            .upsert_group(&ParameterGroup {
                id: id.to_string(),
                trade_system_name: "sysA".to_string(),
                last_updated: base + Duration::minutes(minutes),
                note: None,
                parameters: BTreeMap::from([(
                    "fast".to_string(),
                    StoredValue {
                        value: TypedValue::Int(minutes),
                    },
                )]),
            })
            .await?;
    }

    let latest = app
        .groups()
        .get("sysA", &GroupSelector::parse("latest"), false)
        .await?
        .expect("latest");
    assert_eq!(latest.id, "newest");
    assert_eq!(latest.last_updated, base + Duration::minutes(10));
    assert_eq!(app.groups().latest("sysA").await?.expect("latest").id, "newest");
    assert!(app.groups().latest("sysZ").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn deleting_system_removes_all_dependents() -> Result<()> {
    let Harness { app, .. } = harness();
    app.trading_systems().upsert(trading_system("sysA")).await?;
    app.trading_systems().upsert(trading_system("sysKeep")).await?;
    app.parameters()
        .upsert(vec![
            parameter("sysA", "fast", 5, json!([])),
            parameter("sysKeep", "fast", 5, json!([])),
        ])
        .await?;
    app.groups()
        .upsert(group_input("sysA", Some("g1"), &[("fast", json!(6))]))
        .await?;
    app.sessions()
        .insert_json(session_json(
            "s1",
            "sysA",
            "g1",
            "Mon Jan 01 09:00:00 2024",
            "Mon Jan 01 17:00:00 2024",
        ))
        .await?;
    app.sessions()
        .insert_json(session_json(
            "s2",
            "sysKeep",
            "g9",
            "Mon Jan 01 09:00:00 2024",
            "Mon Jan 01 17:00:00 2024",
        ))
        .await?;

    app.trading_systems().delete("sysA").await?;

    assert!(app.trading_systems().list(Some("sysA")).await?.is_empty());
    assert!(app.parameters().list("sysA").await?.is_empty());
    assert!(app.groups().list_all("sysA", true).await?.is_empty());
    assert!(app.sessions().statistics("s1").await?.is_none());
    assert!(app.sessions().list_for_group("g1").await?.is_empty());

    assert_eq!(app.parameters().list("sysKeep").await?.len(), 1);
    assert!(app.sessions().statistics("s2").await?.is_some());
    Ok(())
}

#[tokio::test]
async fn options_are_normalized_on_upsert() -> Result<()> {
    let Harness { app, .. } = harness();
    let joined: Parameter = parameter("sysA", "ma", 1, json!("a,b,c"));
    let blank: Parameter = parameter("sysA", "blank", 1, json!(""));
    let mut missing_raw = serde_json::to_value(parameter("sysA", "missing", 1, json!([])))?;
    missing_raw.as_object_mut().unwrap().remove("options");
    let missing: Parameter = serde_json::from_value(missing_raw)?;

    app.parameters().upsert(vec![joined, blank, missing]).await?;

    let stored = app.parameters().list("sysA").await?;
    let by_key: BTreeMap<_, _> = stored
        .iter()
        .map(|parameter| (parameter.key.as_str(), parameter.options.clone()))
        .collect();
    assert_eq!(by_key["ma"], vec!["a", "b", "c"]);
    assert!(by_key["blank"].is_empty());
    assert!(by_key["missing"].is_empty());
    Ok(())
}

#[tokio::test]
async fn group_writes_notify_compute_server() -> Result<()> {
    let Harness { app, notifier, .. } = harness();
    let id = app
        .groups()
        .upsert(group_input("sysA", None, &[("fast", json!(1))]))
        .await?;
    assert!(!id.is_empty());
    assert!(id.chars().all(|c| c.is_ascii_digit()), "{id}");

    app.trading_systems()
        .save(TradingSystemSaveRequest {
            system: trading_system("sysA"),
            updated_name: Some("sysRenamed".to_string()),
        })
        .await?;

    assert_eq!(
        notifier.sent(),
        vec![
            ChangeNotification::ParameterGroup {
                trade_system_name: "sysA".to_string(),
                group_id: id,
            },
            ChangeNotification::TradingSystem {
                trade_system_name: "sysRenamed".to_string(),
            },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn updated_id_moves_group() -> Result<()> {
    let Harness { app, .. } = harness();
    app.groups()
        .upsert(group_input("sysA", Some("draft"), &[("fast", json!(1))]))
        .await?;
    let mut input = group_input("sysA", Some("draft"), &[("fast", json!(2))]);
    input.updated_id = Some("final".to_string());

    let id = app.groups().upsert(input).await?;

    assert_eq!(id, "final");
    let ids: Vec<String> = app
        .groups()
        .list_all("sysA", false)
        .await?
        .into_iter()
        .map(|group| group.id)
        .collect();
    assert_eq!(ids, vec!["final"]);
    Ok(())
}

#[tokio::test]
async fn interrupted_group_move_names_leftover_step() -> Result<()> {
    let Harness {
        app,
        store,
        notifier,
    } = harness();
    app.groups()
        .upsert(group_input("sysA", Some("g1"), &[("fast", json!(1))]))
        .await?;
    let sent_before = notifier.sent().len();

    let request = || {
        let mut input = group_input("sysA", Some("g1"), &[("fast", json!(2))]);
        input.updated_id = Some("g2".to_string());
        input
    };
    store.fail_group_delete.store(true, Ordering::SeqCst);
    let error = app.groups().upsert(request()).await.unwrap_err();
    match &error {
        ConfigError::Propagation {
            completed, pending, ..
        } => {
            assert_eq!(completed, &vec!["upsert parameter group sysA/g2".to_string()]);
            assert_eq!(pending, &vec!["delete parameter group sysA/g1".to_string()]);
        }
        other => panic!("expected propagation error, got {:?}", other),
    }
    assert!(!error.is_client_error());
    assert!(store.get_group("sysA", "g1").await?.is_some());
    assert_eq!(notifier.sent().len(), sent_before);

    store.fail_group_delete.store(false, Ordering::SeqCst);
    assert_eq!(app.groups().upsert(request()).await?, "g2");
    assert!(store.get_group("sysA", "g1").await?.is_none());
    let moved = store.get_group("sysA", "g2").await?.expect("moved group");
    assert_eq!(moved.parameters["fast"].value, TypedValue::Int(2));
    Ok(())
}

#[tokio::test]
async fn interrupted_rename_reports_progress_and_converges_on_rerun() -> Result<()> {
    let Harness { app, store, .. } = harness();
    app.trading_systems().upsert(trading_system("sysA")).await?;
    app.groups()
        .upsert(group_input("sysA", Some("g1"), &[("fast", json!(1))]))
        .await?;
    app.sessions()
        .insert_json(session_json(
            "s1",
            "sysA",
            "g1",
            "Tue Jan 02 09:00:00 2024",
            "Tue Jan 02 17:00:00 2024",
        ))
        .await?;

    store.fail_session_retag.store(true, Ordering::SeqCst);
    let request = || TradingSystemSaveRequest {
        system: trading_system("sysA"),
        updated_name: Some("sysB".to_string()),
    };
    let error = app.trading_systems().save(request()).await.unwrap_err();
    match &error {
        ConfigError::Propagation {
            completed, pending, ..
        } => {
            assert_eq!(
                completed,
                &vec![
                    "retag parameter groups sysA -> sysB".to_string(),
                    "retag parameters sysA -> sysB".to_string(),
                ]
            );
            assert_eq!(pending.len(), 3);
            assert_eq!(pending[0], "retag sessions sysA -> sysB");
        }
        other => panic!("expected propagation error, got {:?}", other),
    }
    assert!(store.get_group("sysB", "g1").await?.is_some());
    assert!(store.get_trading_system("sysA").await?.is_some());

    store.fail_session_retag.store(false, Ordering::SeqCst);
    app.trading_systems().save(request()).await?;

    assert!(store.get_trading_system("sysA").await?.is_none());
    assert!(store.get_trading_system("sysB").await?.is_some());
    let sessions = app.sessions().list_for_group("g1").await?;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].trade_system_name, "sysB");
    Ok(())
}

#[tokio::test]
async fn sessions_round_trip_runtime_timestamps() -> Result<()> {
    let Harness { app, .. } = harness();
    app.sessions()
        .insert_json(session_json(
            "s1",
            "sysA",
            "g1",
            "Tue Jan 02 09:00:00 2024",
            "Tue Jan 02 17:00:00 2024",
        ))
        .await?;
    app.sessions()
        .insert_json(session_json(
            "s2",
            "sysA",
            "g1",
            "Wed Jan 10 09:00:00 2024",
            "Wed Jan 10 17:00:00 2024",
        ))
        .await?;

    let window = app
        .sessions()
        .list_between("Mon Jan 01 00:00:00 2024", "Fri Jan 05 00:00:00 2024")
        .await?;
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].id, "s1");

    let rendered = serde_json::to_value(&window[0])?;
    assert_eq!(rendered["startDate"], json!("Tue Jan 02 09:00:00 2024"));
    assert_eq!(
        rendered["tradeStatistics"]["sessionEndDateTime"],
        json!("Tue Jan 02 17:00:00 2024")
    );

    let statistics = app.sessions().statistics("s2").await?.expect("statistics");
    assert_eq!(statistics.profit, 1250.5);
    assert_eq!(app.sessions().list().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn client_errors_are_reported_without_writes() -> Result<()> {
    let Harness { app, store, .. } = harness();

    let missing_group = app
        .sessions()
        .insert_json(session_json(
            "s1",
            "sysA",
            "",
            "Tue Jan 02 09:00:00 2024",
            "Tue Jan 02 17:00:00 2024",
        ))
        .await
        .unwrap_err();
    assert!(matches!(missing_group, ConfigError::Validation(_)));

    let bad_date = app
        .sessions()
        .insert_json(session_json("s2", "sysA", "g1", "2024-01-02", "2024-01-03"))
        .await
        .unwrap_err();
    assert!(bad_date.is_client_error());
    assert!(store.list_sessions().await?.is_empty());

    let bad_window = app
        .sessions()
        .list_between("yesterday", "Tue Jan 02 17:00:00 2024")
        .await
        .unwrap_err();
    assert!(matches!(bad_window, ConfigError::Timestamp { .. }));

    let blank_delete = app.groups().delete("g1", " ").await.unwrap_err();
    assert!(matches!(blank_delete, ConfigError::Validation(_)));

    let missing_key = app
        .parameters()
        .rename_key("nope", "other", "sysA", &Default::default())
        .await
        .unwrap_err();
    assert!(matches!(missing_key, ConfigError::NotFound { .. }));

    let mut mismatched = parameter("sysA", "fast", 1, json!([]));
    mismatched.default = TypedValue::Text("one".to_string());
    let batch = vec![parameter("sysA", "slow", 2, json!([])), mismatched];
    assert!(matches!(
        app.parameters().upsert(batch).await,
        Err(ConfigError::Validation(_))
    ));
    assert!(app.parameters().list("sysA").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn deleting_definition_keeps_group_values() -> Result<()> {
    let Harness { app, store, .. } = harness();
    app.parameters()
        .upsert(vec![parameter("sysA", "fast", 5, json!([]))])
        .await?;
    app.groups()
        .upsert(group_input("sysA", Some("g1"), &[("fast", json!(6))]))
        .await?;

    assert!(app.parameters().delete("fast", "sysA").await?);

    let stored = store.get_group("sysA", "g1").await?.expect("group");
    assert!(stored.parameters.contains_key("fast"));
    let view = app
        .groups()
        .get("sysA", &GroupSelector::Id("g1".to_string()), true)
        .await?
        .expect("view");
    assert!(view.parameters.is_empty());
    Ok(())
}
