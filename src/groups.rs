use crate::error::{require_key, Result};
use crate::materializer::{merge_with_definitions, GroupMaterializer};
use crate::models::{reduce_to_values, GroupView, ParameterGroup, ParameterGroupInput};
use crate::notifier::{ChangeNotification, ChangeNotifier};
use crate::rename::RenameCoordinator;
use crate::store::ConfigStore;
use crate::timestamp::synthesize_group_id;
use chrono::Utc;
use log::info;
use std::sync::Arc;

/// Which group of a trading system a read refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSelector {
    Latest,
    Id(String),
}

impl GroupSelector {
    /// Exactly `latest` selects the most recently saved group; any other
    /// spelling is an id.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed == "latest" {
            GroupSelector::Latest
        } else {
            GroupSelector::Id(trimmed.to_string())
        }
    }
}

#[derive(Clone)]
pub struct ParameterGroupStore {
    store: Arc<dyn ConfigStore>,
    materializer: GroupMaterializer,
    coordinator: RenameCoordinator,
    notifier: Arc<dyn ChangeNotifier>,
}

impl ParameterGroupStore {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        materializer: GroupMaterializer,
        coordinator: RenameCoordinator,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        Self {
            store,
            materializer,
            coordinator,
            notifier,
        }
    }

    /// Saves the group and returns its final id. `updated_id` moves the
    /// group: the new id is written first, then the old one removed, each
    /// step retried. A move that stops part way fails with a propagation
    /// error naming the leftover step; saving again completes it.
    pub async fn upsert(&self, input: ParameterGroupInput) -> Result<String> {
        let trade_system_name = require_key(&input.trade_system_name, "tradeSystemName")?.to_string();
        let parameters = reduce_to_values(&input.parameters)?;
        let now = Utc::now();

        let original_id = non_blank(input.id.as_deref());
        let updated_id = non_blank(input.updated_id.as_deref());
        let id = updated_id
            .or(original_id)
            .map(str::to_string)
            .unwrap_or_else(|| synthesize_group_id(now));

        let group = ParameterGroup {
            id: id.clone(),
            trade_system_name: trade_system_name.clone(),
            last_updated: now,
            note: input.note,
            parameters,
        };
        let values = group.parameters.len();

        match (original_id, updated_id) {
            (Some(old_id), Some(_)) if old_id != id => {
                self.coordinator.move_parameter_group(old_id, group).await?;
                info!(
                    "Moved parameter group {}/{} -> {} ({} values)",
                    trade_system_name, old_id, id, values
                );
            }
            _ => {
                self.store.upsert_group(&group).await?;
                info!(
                    "Saved parameter group {}/{} ({} values)",
                    trade_system_name, id, values
                );
            }
        }

        self.notifier
            .notify(ChangeNotification::ParameterGroup {
                trade_system_name,
                group_id: id.clone(),
            })
            .await;
        Ok(id)
    }

    pub async fn delete(&self, id: &str, trade_system_name: &str) -> Result<bool> {
        let id = require_key(id, "id")?;
        let trade_system_name = require_key(trade_system_name, "tradeSystemName")?;
        let removed = self.store.delete_group(trade_system_name, id).await?;
        info!(
            "Deleted parameter group {}/{} (existed: {})",
            trade_system_name, id, removed
        );
        Ok(removed)
    }

    pub async fn latest(&self, trade_system_name: &str) -> Result<Option<ParameterGroup>> {
        Ok(self.store.latest_group(trade_system_name.trim()).await?)
    }

    /// Every group of the trading system; with metadata each is merged
    /// against one read of the current definitions.
    pub async fn list_all(
        &self,
        trade_system_name: &str,
        include_metadata: bool,
    ) -> Result<Vec<GroupView>> {
        let trade_system_name = trade_system_name.trim();
        let groups = self.store.list_groups(trade_system_name).await?;
        if !include_metadata {
            return Ok(groups.into_iter().map(GroupView::from).collect());
        }

        let definitions = self.store.list_parameters(trade_system_name).await?;
        let now = Utc::now();
        Ok(groups
            .iter()
            .map(|group| {
                merge_with_definitions(trade_system_name, &group.id, Some(group), &definitions, now)
            })
            .collect())
    }

    /// `Latest` returns `None` when the trading system has no groups; an id
    /// always yields a view, empty if nothing is stored under it.
    pub async fn get(
        &self,
        trade_system_name: &str,
        selector: &GroupSelector,
        include_metadata: bool,
    ) -> Result<Option<GroupView>> {
        let trade_system_name = trade_system_name.trim();
        match selector {
            GroupSelector::Latest => match self.latest(trade_system_name).await? {
                Some(group) if include_metadata => {
                    Ok(Some(self.materializer.materialize_group(&group).await?))
                }
                Some(group) => Ok(Some(GroupView::from(group))),
                None => Ok(None),
            },
            GroupSelector::Id(id) => Ok(Some(
                self.materializer
                    .materialize(trade_system_name, id, include_metadata)
                    .await?,
            )),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
