use crate::models::{Parameter, ParameterGroup, Session, TradingSystem};
use crate::store::ConfigStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

type ScopedKey = (String, String);

/// In-process store. Every map entry is updated atomically, matching the
/// per-document guarantees of the PostgreSQL store.
#[derive(Default)]
pub struct MemoryStore {
    parameters: DashMap<ScopedKey, Parameter>,
    groups: DashMap<ScopedKey, ParameterGroup>,
    sessions: DashMap<String, Session>,
    trading_systems: DashMap<String, TradingSystem>,
}

fn scoped(trade_system_name: &str, key: &str) -> ScopedKey {
    (trade_system_name.to_string(), key.to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn scoped_keys<V>(map: &DashMap<ScopedKey, V>, trade_system_name: &str) -> Vec<ScopedKey> {
        map.iter()
            .filter(|entry| entry.key().0 == trade_system_name)
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn upsert_parameter(&self, parameter: &Parameter) -> Result<()> {
        self.parameters.insert(
            scoped(&parameter.trade_system_name, &parameter.key),
            parameter.clone(),
        );
        Ok(())
    }

    async fn get_parameter(&self, trade_system_name: &str, key: &str) -> Result<Option<Parameter>> {
        Ok(self
            .parameters
            .get(&scoped(trade_system_name, key))
            .map(|entry| entry.value().clone()))
    }

    async fn list_parameters(&self, trade_system_name: &str) -> Result<Vec<Parameter>> {
        let mut parameters: Vec<Parameter> = self
            .parameters
            .iter()
            .filter(|entry| entry.key().0 == trade_system_name)
            .map(|entry| entry.value().clone())
            .collect();
        parameters.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(parameters)
    }

    async fn delete_parameter(&self, trade_system_name: &str, key: &str) -> Result<bool> {
        Ok(self
            .parameters
            .remove(&scoped(trade_system_name, key))
            .is_some())
    }

    async fn delete_parameters(&self, trade_system_name: &str) -> Result<u64> {
        let mut removed = 0;
        for key in Self::scoped_keys(&self.parameters, trade_system_name) {
            if self.parameters.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn retag_parameters(&self, from: &str, to: &str) -> Result<u64> {
        if from == to {
            return Ok(0);
        }
        let mut moved = 0;
        for key in Self::scoped_keys(&self.parameters, from) {
            if let Some((_, mut parameter)) = self.parameters.remove(&key) {
                parameter.trade_system_name = to.to_string();
                self.parameters.insert(scoped(to, &key.1), parameter);
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn upsert_group(&self, group: &ParameterGroup) -> Result<()> {
        self.groups
            .insert(scoped(&group.trade_system_name, &group.id), group.clone());
        Ok(())
    }

    async fn get_group(&self, trade_system_name: &str, id: &str) -> Result<Option<ParameterGroup>> {
        Ok(self
            .groups
            .get(&scoped(trade_system_name, id))
            .map(|entry| entry.value().clone()))
    }

    async fn latest_group(&self, trade_system_name: &str) -> Result<Option<ParameterGroup>> {
        Ok(self
            .groups
            .iter()
            .filter(|entry| entry.key().0 == trade_system_name)
            .max_by_key(|entry| entry.value().last_updated)
            .map(|entry| entry.value().clone()))
    }

    async fn list_groups(&self, trade_system_name: &str) -> Result<Vec<ParameterGroup>> {
        let mut groups: Vec<ParameterGroup> = self
            .groups
            .iter()
            .filter(|entry| entry.key().0 == trade_system_name)
            .map(|entry| entry.value().clone())
            .collect();
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(groups)
    }

    async fn delete_group(&self, trade_system_name: &str, id: &str) -> Result<bool> {
        Ok(self.groups.remove(&scoped(trade_system_name, id)).is_some())
    }

    async fn delete_groups(&self, trade_system_name: &str) -> Result<u64> {
        let mut removed = 0;
        for key in Self::scoped_keys(&self.groups, trade_system_name) {
            if self.groups.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn retag_groups(&self, from: &str, to: &str) -> Result<u64> {
        if from == to {
            return Ok(0);
        }
        let mut moved = 0;
        for key in Self::scoped_keys(&self.groups, from) {
            if let Some((_, mut group)) = self.groups.remove(&key) {
                group.trade_system_name = to.to_string();
                self.groups.insert(scoped(to, &key.1), group);
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn rename_group_key(
        &self,
        trade_system_name: &str,
        from_key: &str,
        to_key: &str,
    ) -> Result<u64> {
        let mut touched = 0;
        for mut entry in self.groups.iter_mut() {
            if entry.key().0 != trade_system_name {
                continue;
            }
            let group = entry.value_mut();
            if let Some(value) = group.parameters.remove(from_key) {
                group.parameters.insert(to_key.to_string(), value);
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn upsert_session(&self, session: &Session) -> Result<()> {
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get(id).map(|entry| entry.value().clone()))
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by(|a, b| a.start_date.cmp(&b.start_date).then_with(|| a.id.cmp(&b.id)));
        Ok(sessions)
    }

    async fn sessions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        let mut sessions = self.list_sessions().await?;
        sessions.retain(|session| session.start_date >= start && session.end_date <= end);
        Ok(sessions)
    }

    async fn sessions_for_group(&self, parameter_group_id: &str) -> Result<Vec<Session>> {
        let mut sessions = self.list_sessions().await?;
        sessions.retain(|session| session.parameter_group_id == parameter_group_id);
        Ok(sessions)
    }

    async fn delete_sessions(&self, trade_system_name: &str) -> Result<u64> {
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            let keep = session.trade_system_name != trade_system_name;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn retag_sessions(&self, from: &str, to: &str) -> Result<u64> {
        if from == to {
            return Ok(0);
        }
        let mut moved = 0;
        for mut entry in self.sessions.iter_mut() {
            if entry.value().trade_system_name == from {
                entry.value_mut().trade_system_name = to.to_string();
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn upsert_trading_system(&self, system: &TradingSystem) -> Result<()> {
        self.trading_systems
            .insert(system.name.clone(), system.clone());
        Ok(())
    }

    async fn get_trading_system(&self, name: &str) -> Result<Option<TradingSystem>> {
        Ok(self
            .trading_systems
            .get(name)
            .map(|entry| entry.value().clone()))
    }

    async fn list_trading_systems(&self) -> Result<Vec<TradingSystem>> {
        let mut systems: Vec<TradingSystem> = self
            .trading_systems
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        systems.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(systems)
    }

    async fn delete_trading_system(&self, name: &str) -> Result<bool> {
        Ok(self.trading_systems.remove(name).is_some())
    }
}
