use crate::models::{Parameter, ParameterGroup, Session, TradingSystem};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Document store behind every component. Each call is atomic on its own;
/// nothing spans calls, so multi-record changes go through `rename` plans.
///
/// Uniqueness: parameters by `(trade_system_name, key)`, groups by
/// `(trade_system_name, id)`, sessions by `id`, trading systems by `name`.
/// Upserts replace the whole record under its key.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn upsert_parameter(&self, parameter: &Parameter) -> Result<()>;
    async fn get_parameter(&self, trade_system_name: &str, key: &str) -> Result<Option<Parameter>>;
    async fn list_parameters(&self, trade_system_name: &str) -> Result<Vec<Parameter>>;
    async fn delete_parameter(&self, trade_system_name: &str, key: &str) -> Result<bool>;
    async fn delete_parameters(&self, trade_system_name: &str) -> Result<u64>;
    /// Moves every definition of `from` under `to`, replacing same-key
    /// definitions already there.
    async fn retag_parameters(&self, from: &str, to: &str) -> Result<u64>;

    async fn upsert_group(&self, group: &ParameterGroup) -> Result<()>;
    async fn get_group(&self, trade_system_name: &str, id: &str) -> Result<Option<ParameterGroup>>;
    async fn latest_group(&self, trade_system_name: &str) -> Result<Option<ParameterGroup>>;
    async fn list_groups(&self, trade_system_name: &str) -> Result<Vec<ParameterGroup>>;
    async fn delete_group(&self, trade_system_name: &str, id: &str) -> Result<bool>;
    async fn delete_groups(&self, trade_system_name: &str) -> Result<u64>;
    async fn retag_groups(&self, from: &str, to: &str) -> Result<u64>;
    /// Renames `from_key` to `to_key` inside the stored values of every group
    /// of the trading system that holds `from_key`. Returns groups touched.
    async fn rename_group_key(
        &self,
        trade_system_name: &str,
        from_key: &str,
        to_key: &str,
    ) -> Result<u64>;

    async fn upsert_session(&self, session: &Session) -> Result<()>;
    async fn get_session(&self, id: &str) -> Result<Option<Session>>;
    async fn list_sessions(&self) -> Result<Vec<Session>>;
    /// Sessions with `start_date >= start` and `end_date <= end`.
    async fn sessions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>>;
    async fn sessions_for_group(&self, parameter_group_id: &str) -> Result<Vec<Session>>;
    async fn delete_sessions(&self, trade_system_name: &str) -> Result<u64>;
    async fn retag_sessions(&self, from: &str, to: &str) -> Result<u64>;

    async fn upsert_trading_system(&self, system: &TradingSystem) -> Result<()>;
    async fn get_trading_system(&self, name: &str) -> Result<Option<TradingSystem>>;
    async fn list_trading_systems(&self) -> Result<Vec<TradingSystem>>;
    async fn delete_trading_system(&self, name: &str) -> Result<bool>;
}

#[path = "stores/memory.rs"]
pub mod memory;

pub use memory::MemoryStore;
