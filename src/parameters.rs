use crate::error::{require_key, ConfigError, Result};
use crate::models::{Parameter, ParameterPatch, ParameterUpdateRequest};
use crate::rename::RenameCoordinator;
use crate::store::ConfigStore;
use log::info;
use std::sync::Arc;

/// Parameter definitions, unique per `(trade_system_name, key)`.
#[derive(Clone)]
pub struct ParameterRegistry {
    store: Arc<dyn ConfigStore>,
    coordinator: RenameCoordinator,
}

impl ParameterRegistry {
    pub fn new(store: Arc<dyn ConfigStore>, coordinator: RenameCoordinator) -> Self {
        Self { store, coordinator }
    }

    /// Replaces or inserts each definition. The whole batch is validated
    /// before anything is written.
    pub async fn upsert(&self, definitions: Vec<Parameter>) -> Result<usize> {
        let normalized = definitions
            .into_iter()
            .map(Parameter::normalized)
            .collect::<Result<Vec<_>>>()?;

        for parameter in &normalized {
            self.store.upsert_parameter(parameter).await?;
            info!(
                "Upserted parameter {}/{}",
                parameter.trade_system_name, parameter.key
            );
        }
        Ok(normalized.len())
    }

    pub async fn list(&self, trade_system_name: &str) -> Result<Vec<Parameter>> {
        Ok(self.store.list_parameters(trade_system_name.trim()).await?)
    }

    pub async fn get(&self, trade_system_name: &str, key: &str) -> Result<Option<Parameter>> {
        Ok(self
            .store
            .get_parameter(trade_system_name.trim(), key.trim())
            .await?)
    }

    /// Removes the definition only. Values already saved in groups stay.
    pub async fn delete(&self, key: &str, trade_system_name: &str) -> Result<bool> {
        let key = require_key(key, "key")?;
        let trade_system_name = require_key(trade_system_name, "tradeSystemName")?;
        let removed = self.store.delete_parameter(trade_system_name, key).await?;
        info!(
            "Deleted parameter {}/{} (existed: {})",
            trade_system_name, key, removed
        );
        Ok(removed)
    }

    /// Applies `patch` to the definition under `old_key` and stores it under
    /// `new_key`. With an unchanged key the definition is patched in place;
    /// otherwise group values follow the key through a rename plan.
    pub async fn rename_key(
        &self,
        old_key: &str,
        new_key: &str,
        trade_system_name: &str,
        patch: &ParameterPatch,
    ) -> Result<Parameter> {
        let old_key = require_key(old_key, "updatedKey")?;
        let new_key = require_key(new_key, "key")?;
        let trade_system_name = require_key(trade_system_name, "tradeSystemName")?;

        let mut definition = self
            .store
            .get_parameter(trade_system_name, old_key)
            .await?
            .ok_or_else(|| {
                ConfigError::not_found("parameter", format!("{}/{}", trade_system_name, old_key))
            })?;
        patch.apply_to(&mut definition);
        definition.key = new_key.to_string();
        let definition = definition.normalized()?;

        if old_key == new_key {
            self.store.upsert_parameter(&definition).await?;
            info!("Updated parameter {}/{} in place", trade_system_name, new_key);
        } else {
            self.coordinator
                .rename_parameter_key(old_key, definition.clone())
                .await?;
            info!(
                "Renamed parameter {}/{} -> {}",
                trade_system_name, old_key, new_key
            );
        }
        Ok(definition)
    }

    /// Handles `{updatedKey, key, tradeSystemName, ...fields}`. A missing
    /// `key` keeps the current one.
    pub async fn update(&self, request: ParameterUpdateRequest) -> Result<Parameter> {
        let old_key = request
            .updated_key
            .as_deref()
            .ok_or_else(|| ConfigError::validation("updatedKey is required"))?;
        let trade_system_name = request
            .trade_system_name
            .as_deref()
            .ok_or_else(|| ConfigError::validation("tradeSystemName is required"))?;
        let new_key = request.key.as_deref().unwrap_or(old_key);
        self.rename_key(old_key, new_key, trade_system_name, &request.fields)
            .await
    }
}
