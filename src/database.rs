use crate::models::*;
use crate::store::ConfigStore;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::error;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row};

const SCHEMA_SQL: &str = include_str!("../sql/schema.sql");

const PARAMETER_COLUMNS: &str = "trade_system_name, key, name, value_type, default_value, min_value, max_value, options, restrict_auto_tuning, display_order";
const GROUP_COLUMNS: &str = "trade_system_name, id, last_updated, note, parameters";
const SESSION_COLUMNS: &str =
    "id, context_type, trade_system_name, parameter_group_id, start_date, end_date, trade_statistics";
const TRADING_SYSTEM_COLUMNS: &str = "name, description, bar_type, bar_period, update_interval_type, trading_window, enable_logging, snapshot_interval_minutes";

/// PostgreSQL-backed store. Each trait call is one statement or one
/// transaction, never more.
pub struct Database {
    client: Mutex<Client>,
}

impl Database {
    pub async fn new<S: AsRef<str>>(database_url: S) -> Result<Self> {
        let database_url = database_url.as_ref().to_string();
        let (client, connection) = tokio_postgres::connect(&database_url, NoTls)
            .await
            .with_context(|| format!("failed to connect to PostgreSQL at {}", database_url))?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!("PostgreSQL connection error: {}", err);
            }
        });

        Ok(Self {
            client: Mutex::new(client),
        })
    }

    pub async fn apply_schema(&self) -> Result<()> {
        self.client
            .lock()
            .await
            .batch_execute(SCHEMA_SQL)
            .await
            .context("failed to apply schema")
    }

    async fn query(
        &self,
        statement: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Vec<Row>> {
        Ok(self.client.lock().await.query(statement, params).await?)
    }

    async fn query_opt(
        &self,
        statement: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Option<Row>> {
        Ok(self.client.lock().await.query_opt(statement, params).await?)
    }

    async fn execute(
        &self,
        statement: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<u64> {
        Ok(self.client.lock().await.execute(statement, params).await?)
    }

    /// Deletes target rows that would collide, then moves the source rows,
    /// in one transaction.
    async fn retag_scoped_table(&self, table: &str, id_column: &str, from: &str, to: &str) -> Result<u64> {
        if from == to {
            return Ok(0);
        }
        let mut client = self.client.lock().await;
        let tx = client.transaction().await?;
        tx.execute(
            &format!(
                "DELETE FROM {table}
                 WHERE trade_system_name = $2
                   AND {id_column} IN (SELECT {id_column} FROM {table} WHERE trade_system_name = $1)"
            ),
            &[&from, &to],
        )
        .await?;
        let moved = tx
            .execute(
                &format!("UPDATE {table} SET trade_system_name = $2 WHERE trade_system_name = $1"),
                &[&from, &to],
            )
            .await?;
        tx.commit().await?;
        Ok(moved)
    }
}

#[async_trait]
impl ConfigStore for Database {
    async fn upsert_parameter(&self, parameter: &Parameter) -> Result<()> {
        let value_type = parameter.value_type.code() as i16;
        let default_value = serde_json::to_value(&parameter.default)?;
        self.execute(
            "INSERT INTO parameters (trade_system_name, key, name, value_type, default_value, min_value, max_value, options, restrict_auto_tuning, display_order, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, CURRENT_TIMESTAMP)
             ON CONFLICT (trade_system_name, key) DO UPDATE SET
                name = EXCLUDED.name,
                value_type = EXCLUDED.value_type,
                default_value = EXCLUDED.default_value,
                min_value = EXCLUDED.min_value,
                max_value = EXCLUDED.max_value,
                options = EXCLUDED.options,
                restrict_auto_tuning = EXCLUDED.restrict_auto_tuning,
                display_order = EXCLUDED.display_order,
                updated_at = CURRENT_TIMESTAMP",
            &[
                &parameter.trade_system_name,
                &parameter.key,
                &parameter.name,
                &value_type,
                &default_value,
                &parameter.min_value,
                &parameter.max_value,
                &parameter.options,
                &parameter.restrict_auto_tuning,
                &parameter.display_order,
            ],
        )
        .await
        .with_context(|| {
            format!(
                "failed to upsert parameter {} for {}",
                parameter.key, parameter.trade_system_name
            )
        })?;
        Ok(())
    }

    async fn get_parameter(&self, trade_system_name: &str, key: &str) -> Result<Option<Parameter>> {
        let row = self
            .query_opt(
                &format!(
                    "SELECT {PARAMETER_COLUMNS} FROM parameters WHERE trade_system_name = $1 AND key = $2"
                ),
                &[&trade_system_name, &key],
            )
            .await?;
        row.as_ref().map(map_parameter_row).transpose()
    }

    async fn list_parameters(&self, trade_system_name: &str) -> Result<Vec<Parameter>> {
        let rows = self
            .query(
                &format!(
                    "SELECT {PARAMETER_COLUMNS} FROM parameters
                     WHERE trade_system_name = $1
                     ORDER BY display_order, key"
                ),
                &[&trade_system_name],
            )
            .await?;
        rows.iter().map(map_parameter_row).collect()
    }

    async fn delete_parameter(&self, trade_system_name: &str, key: &str) -> Result<bool> {
        let removed = self
            .execute(
                "DELETE FROM parameters WHERE trade_system_name = $1 AND key = $2",
                &[&trade_system_name, &key],
            )
            .await?;
        Ok(removed > 0)
    }

    async fn delete_parameters(&self, trade_system_name: &str) -> Result<u64> {
        self.execute(
            "DELETE FROM parameters WHERE trade_system_name = $1",
            &[&trade_system_name],
        )
        .await
    }

    async fn retag_parameters(&self, from: &str, to: &str) -> Result<u64> {
        self.retag_scoped_table("parameters", "key", from, to).await
    }

    async fn upsert_group(&self, group: &ParameterGroup) -> Result<()> {
        let parameters = serde_json::to_value(&group.parameters)?;
        self.execute(
            "INSERT INTO parameter_groups (trade_system_name, id, last_updated, note, parameters)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (trade_system_name, id) DO UPDATE SET
                last_updated = EXCLUDED.last_updated,
                note = EXCLUDED.note,
                parameters = EXCLUDED.parameters",
            &[
                &group.trade_system_name,
                &group.id,
                &group.last_updated,
                &group.note,
                &parameters,
            ],
        )
        .await
        .with_context(|| {
            format!(
                "failed to upsert parameter group {} for {}",
                group.id, group.trade_system_name
            )
        })?;
        Ok(())
    }

    async fn get_group(&self, trade_system_name: &str, id: &str) -> Result<Option<ParameterGroup>> {
        let row = self
            .query_opt(
                &format!(
                    "SELECT {GROUP_COLUMNS} FROM parameter_groups WHERE trade_system_name = $1 AND id = $2"
                ),
                &[&trade_system_name, &id],
            )
            .await?;
        row.as_ref().map(map_group_row).transpose()
    }

    async fn latest_group(&self, trade_system_name: &str) -> Result<Option<ParameterGroup>> {
        let row = self
            .query_opt(
                &format!(
                    "SELECT {GROUP_COLUMNS} FROM parameter_groups
                     WHERE trade_system_name = $1
                     ORDER BY last_updated DESC
                     LIMIT 1"
                ),
                &[&trade_system_name],
            )
            .await?;
        row.as_ref().map(map_group_row).transpose()
    }

    async fn list_groups(&self, trade_system_name: &str) -> Result<Vec<ParameterGroup>> {
        let rows = self
            .query(
                &format!(
                    "SELECT {GROUP_COLUMNS} FROM parameter_groups
                     WHERE trade_system_name = $1
                     ORDER BY id"
                ),
                &[&trade_system_name],
            )
            .await?;
        rows.iter().map(map_group_row).collect()
    }

    async fn delete_group(&self, trade_system_name: &str, id: &str) -> Result<bool> {
        let removed = self
            .execute(
                "DELETE FROM parameter_groups WHERE trade_system_name = $1 AND id = $2",
                &[&trade_system_name, &id],
            )
            .await?;
        Ok(removed > 0)
    }

    async fn delete_groups(&self, trade_system_name: &str) -> Result<u64> {
        self.execute(
            "DELETE FROM parameter_groups WHERE trade_system_name = $1",
            &[&trade_system_name],
        )
        .await
    }

    async fn retag_groups(&self, from: &str, to: &str) -> Result<u64> {
        self.retag_scoped_table("parameter_groups", "id", from, to)
            .await
    }

    async fn rename_group_key(
        &self,
        trade_system_name: &str,
        from_key: &str,
        to_key: &str,
    ) -> Result<u64> {
        self.execute(
            "UPDATE parameter_groups
             SET parameters = (parameters - $2::text) || jsonb_build_object($3::text, parameters -> $2::text)
             WHERE trade_system_name = $1 AND jsonb_exists(parameters, $2::text)",
            &[&trade_system_name, &from_key, &to_key],
        )
        .await
        .with_context(|| {
            format!(
                "failed to rename parameter key {} -> {} in groups of {}",
                from_key, to_key, trade_system_name
            )
        })
    }

    async fn upsert_session(&self, session: &Session) -> Result<()> {
        let statistics = serde_json::to_value(&session.trade_statistics)?;
        self.execute(
            "INSERT INTO sessions (id, context_type, trade_system_name, parameter_group_id, start_date, end_date, trade_statistics)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO UPDATE SET
                context_type = EXCLUDED.context_type,
                trade_system_name = EXCLUDED.trade_system_name,
                parameter_group_id = EXCLUDED.parameter_group_id,
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date,
                trade_statistics = EXCLUDED.trade_statistics",
            &[
                &session.id,
                &session.context_type,
                &session.trade_system_name,
                &session.parameter_group_id,
                &session.start_date,
                &session.end_date,
                &statistics,
            ],
        )
        .await
        .with_context(|| format!("failed to upsert session {}", session.id))?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let row = self
            .query_opt(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"),
                &[&id],
            )
            .await?;
        row.as_ref().map(map_session_row).transpose()
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let rows = self
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY start_date, id"),
                &[],
            )
            .await?;
        rows.iter().map(map_session_row).collect()
    }

    async fn sessions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        let rows = self
            .query(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE start_date >= $1 AND end_date <= $2
                     ORDER BY start_date, id"
                ),
                &[&start, &end],
            )
            .await?;
        rows.iter().map(map_session_row).collect()
    }

    async fn sessions_for_group(&self, parameter_group_id: &str) -> Result<Vec<Session>> {
        let rows = self
            .query(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE parameter_group_id = $1
                     ORDER BY start_date, id"
                ),
                &[&parameter_group_id],
            )
            .await?;
        rows.iter().map(map_session_row).collect()
    }

    async fn delete_sessions(&self, trade_system_name: &str) -> Result<u64> {
        self.execute(
            "DELETE FROM sessions WHERE trade_system_name = $1",
            &[&trade_system_name],
        )
        .await
    }

    async fn retag_sessions(&self, from: &str, to: &str) -> Result<u64> {
        if from == to {
            return Ok(0);
        }
        self.execute(
            "UPDATE sessions SET trade_system_name = $2 WHERE trade_system_name = $1",
            &[&from, &to],
        )
        .await
    }

    async fn upsert_trading_system(&self, system: &TradingSystem) -> Result<()> {
        let session = system.session_settings.as_ref();
        let bar_type = session.map(|settings| settings.bar_type.clone());
        let bar_period = session.map(|settings| settings.bar_period.clone());
        let interval = session.map(|settings| interval_to_storage(settings.update_interval_type));
        let trading_window = session
            .map(|settings| serde_json::to_value(&settings.trading_window))
            .transpose()?;
        let enable_logging = system
            .system_settings
            .as_ref()
            .map(|settings| settings.enable_logging);
        let snapshot_interval = system
            .system_settings
            .as_ref()
            .map(|settings| settings.live_results_snapshot_interval_minutes);

        self.execute(
            "INSERT INTO trading_systems (name, description, bar_type, bar_period, update_interval_type, trading_window, enable_logging, snapshot_interval_minutes, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, CURRENT_TIMESTAMP)
             ON CONFLICT (name) DO UPDATE SET
                description = EXCLUDED.description,
                bar_type = EXCLUDED.bar_type,
                bar_period = EXCLUDED.bar_period,
                update_interval_type = EXCLUDED.update_interval_type,
                trading_window = EXCLUDED.trading_window,
                enable_logging = EXCLUDED.enable_logging,
                snapshot_interval_minutes = EXCLUDED.snapshot_interval_minutes,
                updated_at = CURRENT_TIMESTAMP",
            &[
                &system.name,
                &system.description,
                &bar_type,
                &bar_period,
                &interval,
                &trading_window,
                &enable_logging,
                &snapshot_interval,
            ],
        )
        .await
        .with_context(|| format!("failed to upsert trading system {}", system.name))?;
        Ok(())
    }

    async fn get_trading_system(&self, name: &str) -> Result<Option<TradingSystem>> {
        let row = self
            .query_opt(
                &format!("SELECT {TRADING_SYSTEM_COLUMNS} FROM trading_systems WHERE name = $1"),
                &[&name],
            )
            .await?;
        row.as_ref().map(map_trading_system_row).transpose()
    }

    async fn list_trading_systems(&self) -> Result<Vec<TradingSystem>> {
        let rows = self
            .query(
                &format!("SELECT {TRADING_SYSTEM_COLUMNS} FROM trading_systems ORDER BY name"),
                &[],
            )
            .await?;
        rows.iter().map(map_trading_system_row).collect()
    }

    async fn delete_trading_system(&self, name: &str) -> Result<bool> {
        let removed = self
            .execute("DELETE FROM trading_systems WHERE name = $1", &[&name])
            .await?;
        Ok(removed > 0)
    }
}

/// Storage encoding of the update interval. Kept apart from the wire value
/// so either side can change without the other.
fn interval_to_storage(value: UpdateIntervalType) -> i16 {
    match value {
        UpdateIntervalType::NewBar => 0,
        UpdateIntervalType::Always => 1,
    }
}

fn interval_from_storage(code: i16) -> Result<UpdateIntervalType> {
    match code {
        0 => Ok(UpdateIntervalType::NewBar),
        1 => Ok(UpdateIntervalType::Always),
        other => Err(anyhow!("Unknown stored update_interval_type {}", other)),
    }
}

fn map_parameter_row(row: &Row) -> Result<Parameter> {
    let key: String = row.get(1);
    let value_type: i16 = row.get(3);
    let default_value: Value = row.get(4);
    let default = serde_json::from_value(default_value)
        .with_context(|| format!("Failed to parse default value for parameter {}", key))?;

    Ok(Parameter {
        trade_system_name: row.get(0),
        name: row.get(2),
        value_type: ParameterValueType::from_code(value_type as i64)?,
        default,
        min_value: row.get(5),
        max_value: row.get(6),
        options: row.get(7),
        restrict_auto_tuning: row.get(8),
        display_order: row.get(9),
        key,
    })
}

fn map_group_row(row: &Row) -> Result<ParameterGroup> {
    let id: String = row.get(1);
    let parameters_json: Value = row.get(4);
    let parameters: BTreeMap<String, StoredValue> = serde_json::from_value(parameters_json)
        .with_context(|| format!("Failed to parse stored values for parameter group {}", id))?;

    Ok(ParameterGroup {
        trade_system_name: row.get(0),
        id,
        last_updated: row.get(2),
        note: row.get(3),
        parameters,
    })
}

fn map_session_row(row: &Row) -> Result<Session> {
    let id: String = row.get(0);
    let statistics_json: Value = row.get(6);
    let trade_statistics = serde_json::from_value(statistics_json)
        .with_context(|| format!("Failed to parse trade statistics for session {}", id))?;

    Ok(Session {
        id,
        context_type: row.get(1),
        trade_system_name: row.get(2),
        parameter_group_id: row.get(3),
        start_date: row.get(4),
        end_date: row.get(5),
        trade_statistics,
    })
}

fn map_trading_system_row(row: &Row) -> Result<TradingSystem> {
    let name: String = row.get(0);
    let interval: Option<i16> = row.get(4);
    let session_settings = match interval {
        Some(code) => {
            let trading_window: Option<Value> = row.get(5);
            let trading_window = match trading_window {
                Some(raw) => serde_json::from_value(raw).with_context(|| {
                    format!("Failed to parse trading window for trading system {}", name)
                })?,
                None => TradingWindow::default(),
            };
            Some(SessionSettings {
                bar_type: row.get::<_, Option<String>>(2).unwrap_or_default(),
                bar_period: row
                    .get::<_, Option<String>>(3)
                    .unwrap_or_else(|| "1".to_string()),
                update_interval_type: interval_from_storage(code)?,
                trading_window,
            })
        }
        None => None,
    };

    let enable_logging: Option<bool> = row.get(6);
    let snapshot_interval: Option<i32> = row.get(7);
    let system_settings = match (enable_logging, snapshot_interval) {
        (Some(enable_logging), Some(minutes)) => Some(SystemSettings {
            enable_logging,
            live_results_snapshot_interval_minutes: minutes,
        }),
        _ => None,
    };

    Ok(TradingSystem {
        name,
        description: row.get(1),
        session_settings,
        system_settings,
    })
}
