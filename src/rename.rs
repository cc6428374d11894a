use crate::error::{ConfigError, Result};
use crate::models::{Parameter, ParameterGroup, TradingSystem};
use crate::retry::{retry_store_operation, RetryPolicy};
use crate::store::ConfigStore;
use log::{error, info};
use std::sync::Arc;

/// One re-keying operation against the store. Every step is a replace-by-key
/// or an update/delete-by-filter, so applying it twice has the same effect
/// as applying it once.
#[derive(Debug, Clone, PartialEq)]
pub enum RenameStep {
    UpsertParameter(Parameter),
    RenameGroupKey {
        trade_system_name: String,
        from_key: String,
        to_key: String,
    },
    DeleteParameter {
        trade_system_name: String,
        key: String,
    },
    UpsertParameterGroup(ParameterGroup),
    DeleteParameterGroup {
        trade_system_name: String,
        id: String,
    },
    RetagParameterGroups {
        from: String,
        to: String,
    },
    RetagParameters {
        from: String,
        to: String,
    },
    RetagSessions {
        from: String,
        to: String,
    },
    UpsertTradingSystem(TradingSystem),
    DeleteTradingSystem {
        name: String,
    },
    DeleteParameterGroups {
        trade_system_name: String,
    },
    DeleteParameters {
        trade_system_name: String,
    },
    DeleteSessions {
        trade_system_name: String,
    },
}

impl RenameStep {
    pub fn describe(&self) -> String {
        match self {
            RenameStep::UpsertParameter(parameter) => format!(
                "upsert parameter {}/{}",
                parameter.trade_system_name, parameter.key
            ),
            RenameStep::RenameGroupKey {
                trade_system_name,
                from_key,
                to_key,
            } => format!(
                "rename key {} -> {} in groups of {}",
                from_key, to_key, trade_system_name
            ),
            RenameStep::DeleteParameter {
                trade_system_name,
                key,
            } => format!("delete parameter {}/{}", trade_system_name, key),
            RenameStep::UpsertParameterGroup(group) => {
                format!("upsert parameter group {}/{}", group.trade_system_name, group.id)
            }
            RenameStep::DeleteParameterGroup {
                trade_system_name,
                id,
            } => format!("delete parameter group {}/{}", trade_system_name, id),
            RenameStep::RetagParameterGroups { from, to } => {
                format!("retag parameter groups {} -> {}", from, to)
            }
            RenameStep::RetagParameters { from, to } => {
                format!("retag parameters {} -> {}", from, to)
            }
            RenameStep::RetagSessions { from, to } => format!("retag sessions {} -> {}", from, to),
            RenameStep::UpsertTradingSystem(system) => {
                format!("upsert trading system {}", system.name)
            }
            RenameStep::DeleteTradingSystem { name } => format!("delete trading system {}", name),
            RenameStep::DeleteParameterGroups { trade_system_name } => {
                format!("delete parameter groups of {}", trade_system_name)
            }
            RenameStep::DeleteParameters { trade_system_name } => {
                format!("delete parameters of {}", trade_system_name)
            }
            RenameStep::DeleteSessions { trade_system_name } => {
                format!("delete sessions of {}", trade_system_name)
            }
        }
    }

    /// Applies the step, returning how many records it touched.
    pub async fn apply(&self, store: &dyn ConfigStore) -> anyhow::Result<u64> {
        match self {
            RenameStep::UpsertParameter(parameter) => {
                store.upsert_parameter(parameter).await?;
                Ok(1)
            }
            RenameStep::RenameGroupKey {
                trade_system_name,
                from_key,
                to_key,
            } => {
                store
                    .rename_group_key(trade_system_name, from_key, to_key)
                    .await
            }
            RenameStep::DeleteParameter {
                trade_system_name,
                key,
            } => Ok(store.delete_parameter(trade_system_name, key).await? as u64),
            RenameStep::UpsertParameterGroup(group) => {
                store.upsert_group(group).await?;
                Ok(1)
            }
            RenameStep::DeleteParameterGroup {
                trade_system_name,
                id,
            } => Ok(store.delete_group(trade_system_name, id).await? as u64),
            RenameStep::RetagParameterGroups { from, to } => store.retag_groups(from, to).await,
            RenameStep::RetagParameters { from, to } => store.retag_parameters(from, to).await,
            RenameStep::RetagSessions { from, to } => store.retag_sessions(from, to).await,
            RenameStep::UpsertTradingSystem(system) => {
                store.upsert_trading_system(system).await?;
                Ok(1)
            }
            RenameStep::DeleteTradingSystem { name } => {
                Ok(store.delete_trading_system(name).await? as u64)
            }
            RenameStep::DeleteParameterGroups { trade_system_name } => {
                store.delete_groups(trade_system_name).await
            }
            RenameStep::DeleteParameters { trade_system_name } => {
                store.delete_parameters(trade_system_name).await
            }
            RenameStep::DeleteSessions { trade_system_name } => {
                store.delete_sessions(trade_system_name).await
            }
        }
    }
}

/// Ordered steps for one rename or teardown. Old identities are always
/// removed last, so an interrupted plan leaves enough behind to rebuild it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenamePlan {
    description: String,
    steps: Vec<RenameStep>,
}

impl RenamePlan {
    pub fn parameter_key_rename(old_key: &str, definition: Parameter) -> Self {
        let trade_system_name = definition.trade_system_name.clone();
        let new_key = definition.key.clone();
        let description = format!(
            "rename parameter {}/{} -> {}",
            trade_system_name, old_key, new_key
        );

        let mut steps = vec![RenameStep::UpsertParameter(definition)];
        if old_key != new_key {
            steps.push(RenameStep::RenameGroupKey {
                trade_system_name: trade_system_name.clone(),
                from_key: old_key.to_string(),
                to_key: new_key,
            });
            steps.push(RenameStep::DeleteParameter {
                trade_system_name,
                key: old_key.to_string(),
            });
        }
        Self { description, steps }
    }

    /// Saves `group` under its new id, then drops the copy under `old_id`.
    pub fn parameter_group_move(old_id: &str, group: ParameterGroup) -> Self {
        let description = format!(
            "move parameter group {}/{} -> {}",
            group.trade_system_name, old_id, group.id
        );
        let mut steps = Vec::with_capacity(2);
        let trade_system_name = group.trade_system_name.clone();
        let moved = old_id != group.id;
        steps.push(RenameStep::UpsertParameterGroup(group));
        if moved {
            steps.push(RenameStep::DeleteParameterGroup {
                trade_system_name,
                id: old_id.to_string(),
            });
        }
        Self { description, steps }
    }

    pub fn trading_system_rename(old_name: &str, system: TradingSystem) -> Self {
        let new_name = system.name.clone();
        let description = format!("rename trading system {} -> {}", old_name, new_name);
        if old_name == new_name {
            return Self {
                description,
                steps: vec![RenameStep::UpsertTradingSystem(system)],
            };
        }

        let from = old_name.to_string();
        Self {
            description,
            steps: vec![
                RenameStep::RetagParameterGroups {
                    from: from.clone(),
                    to: new_name.clone(),
                },
                RenameStep::RetagParameters {
                    from: from.clone(),
                    to: new_name.clone(),
                },
                RenameStep::RetagSessions {
                    from: from.clone(),
                    to: new_name,
                },
                RenameStep::UpsertTradingSystem(system),
                RenameStep::DeleteTradingSystem { name: from },
            ],
        }
    }

    pub fn trading_system_teardown(name: &str) -> Self {
        let trade_system_name = name.to_string();
        Self {
            description: format!("delete trading system {}", name),
            steps: vec![
                RenameStep::DeleteParameterGroups {
                    trade_system_name: trade_system_name.clone(),
                },
                RenameStep::DeleteParameters {
                    trade_system_name: trade_system_name.clone(),
                },
                RenameStep::DeleteSessions {
                    trade_system_name: trade_system_name.clone(),
                },
                RenameStep::DeleteTradingSystem {
                    name: trade_system_name,
                },
            ],
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn steps(&self) -> &[RenameStep] {
        &self.steps
    }

    fn labels(steps: &[RenameStep]) -> Vec<String> {
        steps.iter().map(RenameStep::describe).collect()
    }
}

/// Runs plans step by step against the shared store.
#[derive(Clone)]
pub struct RenameCoordinator {
    store: Arc<dyn ConfigStore>,
    retry: RetryPolicy,
}

impl RenameCoordinator {
    pub fn new(store: Arc<dyn ConfigStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Applies every step in order, retrying each under the retry policy.
    /// A step that keeps failing stops the plan; the error lists what was
    /// and was not applied. Re-running the same operation converges.
    pub async fn execute(&self, plan: &RenamePlan) -> Result<()> {
        info!(
            "Executing {} ({} steps)",
            plan.description(),
            plan.steps().len()
        );

        for (index, step) in plan.steps().iter().enumerate() {
            let label = step.describe();
            let outcome = retry_store_operation!(
                self.retry,
                label.clone(),
                step.apply(self.store.as_ref())
            );

            match outcome {
                Ok(touched) => info!("{}: {} ({} records)", plan.description(), label, touched),
                Err(source) => {
                    let completed = RenamePlan::labels(&plan.steps()[..index]);
                    let pending = RenamePlan::labels(&plan.steps()[index..]);
                    error!(
                        "{} failed at step '{}': {:#}. Completed: [{}]. Pending: [{}].",
                        plan.description(),
                        label,
                        source,
                        completed.join(", "),
                        pending.join(", ")
                    );
                    return Err(ConfigError::Propagation {
                        plan: plan.description().to_string(),
                        completed,
                        pending,
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Re-points groups, parameters and sessions of `old_name` at
    /// `system.name`, stores the new record, then removes the old one.
    pub async fn rename_trading_system(&self, old_name: &str, system: TradingSystem) -> Result<()> {
        self.execute(&RenamePlan::trading_system_rename(old_name, system))
            .await
    }

    /// Stores `definition` and moves group values from `old_key` to its key.
    pub async fn rename_parameter_key(&self, old_key: &str, definition: Parameter) -> Result<()> {
        self.execute(&RenamePlan::parameter_key_rename(old_key, definition))
            .await
    }

    pub async fn move_parameter_group(&self, old_id: &str, group: ParameterGroup) -> Result<()> {
        self.execute(&RenamePlan::parameter_group_move(old_id, group))
            .await
    }

    pub async fn teardown_trading_system(&self, name: &str) -> Result<()> {
        self.execute(&RenamePlan::trading_system_teardown(name))
            .await
    }
}
