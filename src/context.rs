use crate::config::ServiceConfig;
use crate::database::Database;
use crate::groups::ParameterGroupStore;
use crate::materializer::GroupMaterializer;
use crate::notifier::{ChangeNotifier, HttpNotifier, NoopNotifier};
use crate::parameters::ParameterRegistry;
use crate::rename::RenameCoordinator;
use crate::retry::RetryPolicy;
use crate::sessions::SessionLog;
use crate::store::ConfigStore;
use crate::trading_systems::TradingSystemRegistry;
use anyhow::{anyhow, Result};
use log::info;
use std::sync::Arc;

/// Every component wired against one shared store and notifier.
#[derive(Clone)]
pub struct AppContext {
    database: Option<Arc<Database>>,
    parameters: ParameterRegistry,
    groups: ParameterGroupStore,
    trading_systems: TradingSystemRegistry,
    sessions: SessionLog,
}

impl AppContext {
    pub async fn initialize(config: &ServiceConfig) -> Result<Self> {
        let Some(database_url) = config.database_url.as_deref() else {
            return Err(anyhow!(
                "DATABASE_URL must be set to use database-backed commands."
            ));
        };
        let database = Arc::new(Database::new(database_url).await?);

        let notifier: Arc<dyn ChangeNotifier> = match &config.compute_server {
            Some(server) => {
                info!("Change notifications go to {}", server.base_url());
                Arc::new(HttpNotifier::new(server)?)
            }
            None => Arc::new(NoopNotifier),
        };

        let store: Arc<dyn ConfigStore> = database.clone();
        let mut context = Self::from_parts(store, notifier, config.rename_retry);
        context.database = Some(database);
        Ok(context)
    }

    pub fn from_parts(
        store: Arc<dyn ConfigStore>,
        notifier: Arc<dyn ChangeNotifier>,
        retry: RetryPolicy,
    ) -> Self {
        let coordinator = RenameCoordinator::new(store.clone(), retry);
        let materializer = GroupMaterializer::new(store.clone());
        Self {
            database: None,
            parameters: ParameterRegistry::new(store.clone(), coordinator.clone()),
            groups: ParameterGroupStore::new(
                store.clone(),
                materializer,
                coordinator.clone(),
                notifier.clone(),
            ),
            trading_systems: TradingSystemRegistry::new(store.clone(), coordinator, notifier),
            sessions: SessionLog::new(store),
        }
    }

    pub fn database(&self) -> Result<&Database> {
        self.database
            .as_deref()
            .ok_or_else(|| anyhow!("This command needs the PostgreSQL store."))
    }

    pub fn parameters(&self) -> &ParameterRegistry {
        &self.parameters
    }

    pub fn groups(&self) -> &ParameterGroupStore {
        &self.groups
    }

    pub fn trading_systems(&self) -> &TradingSystemRegistry {
        &self.trading_systems
    }

    pub fn sessions(&self) -> &SessionLog {
        &self.sessions
    }
}
