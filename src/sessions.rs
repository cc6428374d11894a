use crate::error::{require_key, ConfigError, Result};
use crate::models::{Session, TradeStatistics};
use crate::store::ConfigStore;
use crate::timestamp::parse_session_timestamp;
use log::info;
use serde_json::Value;
use std::sync::Arc;

/// Records of completed runs. Sessions are only ever replaced whole, by id.
#[derive(Clone)]
pub struct SessionLog {
    store: Arc<dyn ConfigStore>,
}

impl SessionLog {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    pub async fn insert(&self, mut session: Session) -> Result<()> {
        session.id = require_key(&session.id, "id")?.to_string();
        session.trade_system_name =
            require_key(&session.trade_system_name, "tradeSystemName")?.to_string();
        session.parameter_group_id =
            require_key(&session.parameter_group_id, "parameterGroupId")?.to_string();

        self.store.upsert_session(&session).await?;
        info!(
            "Recorded session {} for {} (group {})",
            session.id, session.trade_system_name, session.parameter_group_id
        );
        Ok(())
    }

    /// Parses a session as posted by the trading runtime, then inserts it.
    pub async fn insert_json(&self, raw: Value) -> Result<()> {
        let session: Session =
            serde_json::from_value(raw).map_err(|err| ConfigError::invalid_payload("session", err))?;
        self.insert(session).await
    }

    pub async fn list(&self) -> Result<Vec<Session>> {
        Ok(self.store.list_sessions().await?)
    }

    /// Sessions that started at or after `start` and ended at or before `end`,
    /// both in the runtime's textual timestamp form.
    pub async fn list_between(&self, start: &str, end: &str) -> Result<Vec<Session>> {
        let start = parse_session_timestamp(start)?;
        let end = parse_session_timestamp(end)?;
        Ok(self.store.sessions_between(start, end).await?)
    }

    pub async fn statistics(&self, session_id: &str) -> Result<Option<TradeStatistics>> {
        Ok(self
            .store
            .get_session(session_id.trim())
            .await?
            .map(|session| session.trade_statistics))
    }

    pub async fn list_for_group(&self, parameter_group_id: &str) -> Result<Vec<Session>> {
        Ok(self
            .store
            .sessions_for_group(parameter_group_id.trim())
            .await?)
    }
}
