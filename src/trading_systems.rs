use crate::error::{require_key, Result};
use crate::models::{TradingSystem, TradingSystemSaveRequest};
use crate::notifier::{ChangeNotification, ChangeNotifier};
use crate::rename::RenameCoordinator;
use crate::store::ConfigStore;
use log::{info, warn};
use std::sync::Arc;

/// Trading systems keyed by `name`. Renames and deletes run as plans so
/// parameters, groups and sessions follow the system.
#[derive(Clone)]
pub struct TradingSystemRegistry {
    store: Arc<dyn ConfigStore>,
    coordinator: RenameCoordinator,
    notifier: Arc<dyn ChangeNotifier>,
}

impl TradingSystemRegistry {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        coordinator: RenameCoordinator,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        Self {
            store,
            coordinator,
            notifier,
        }
    }

    pub async fn upsert(&self, mut system: TradingSystem) -> Result<TradingSystem> {
        system.name = require_key(&system.name, "name")?.to_string();
        self.store.upsert_trading_system(&system).await?;
        info!("Saved trading system {}", system.name);
        self.notify(&system.name).await;
        Ok(system)
    }

    /// Stores `system` under `new_name` and moves everything tagged with
    /// `old_name` along with it. Renaming onto an existing system replaces
    /// its record and same-key dependents.
    pub async fn rename(
        &self,
        old_name: &str,
        new_name: &str,
        mut system: TradingSystem,
    ) -> Result<TradingSystem> {
        let old_name = require_key(old_name, "name")?.to_string();
        let new_name = require_key(new_name, "updatedName")?.to_string();
        system.name = new_name.clone();

        if old_name == new_name {
            return self.upsert(system).await;
        }

        if self.store.get_trading_system(&new_name).await?.is_some() {
            warn!(
                "Renaming trading system {} onto existing {}; its record and colliding dependents will be replaced",
                old_name, new_name
            );
        }

        self.coordinator
            .rename_trading_system(&old_name, system.clone())
            .await?;
        info!("Renamed trading system {} -> {}", old_name, new_name);
        self.notify(&new_name).await;
        Ok(system)
    }

    /// `{..system, updatedName?}`: a differing `updatedName` renames.
    pub async fn save(&self, request: TradingSystemSaveRequest) -> Result<TradingSystem> {
        let TradingSystemSaveRequest {
            system,
            updated_name,
        } = request;
        match updated_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            Some(new_name) if new_name != system.name.trim() => {
                let old_name = system.name.clone();
                self.rename(&old_name, new_name, system).await
            }
            _ => self.upsert(system).await,
        }
    }

    /// Removes the system together with its groups, parameters and sessions.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let name = require_key(name, "name")?;
        self.coordinator.teardown_trading_system(name).await?;
        info!("Deleted trading system {} and its dependents", name);
        Ok(())
    }

    pub async fn list(&self, name: Option<&str>) -> Result<Vec<TradingSystem>> {
        match name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => Ok(self
                .store
                .get_trading_system(name)
                .await?
                .into_iter()
                .collect()),
            None => Ok(self.store.list_trading_systems().await?),
        }
    }

    async fn notify(&self, trade_system_name: &str) {
        self.notifier
            .notify(ChangeNotification::TradingSystem {
                trade_system_name: trade_system_name.to_string(),
            })
            .await;
    }
}
