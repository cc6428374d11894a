use crate::error::Result;
use crate::models::{GroupParameters, GroupView, Parameter, ParameterGroup, ParameterValue};
use crate::store::ConfigStore;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds read views of parameter groups against the current definitions.
#[derive(Clone)]
pub struct GroupMaterializer {
    store: Arc<dyn ConfigStore>,
}

impl GroupMaterializer {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// A missing group is not an error; it materializes as an empty value set
    /// (or all defaults, with metadata). `last_updated` of the view is the
    /// time of this call, never the stored save time.
    pub async fn materialize(
        &self,
        trade_system_name: &str,
        group_id: &str,
        include_metadata: bool,
    ) -> Result<GroupView> {
        let stored = self.store.get_group(trade_system_name, group_id).await?;
        if stored.is_none() {
            debug!(
                "Parameter group {}/{} not stored; materializing from definitions only",
                trade_system_name, group_id
            );
        }

        if !include_metadata {
            let (note, values) = match stored {
                Some(group) => (group.note, group.parameters),
                None => (None, BTreeMap::new()),
            };
            return Ok(GroupView {
                id: group_id.to_string(),
                trade_system_name: trade_system_name.to_string(),
                last_updated: Utc::now(),
                note,
                parameters: GroupParameters::Values(values),
            });
        }

        let definitions = self.store.list_parameters(trade_system_name).await?;
        Ok(merge_with_definitions(
            trade_system_name,
            group_id,
            stored.as_ref(),
            &definitions,
            Utc::now(),
        ))
    }

    /// Materializes an already loaded group with metadata.
    pub async fn materialize_group(&self, group: &ParameterGroup) -> Result<GroupView> {
        let definitions = self
            .store
            .list_parameters(&group.trade_system_name)
            .await?;
        Ok(merge_with_definitions(
            &group.trade_system_name,
            &group.id,
            Some(group),
            &definitions,
            Utc::now(),
        ))
    }
}

/// One entry per definition: the stored value when the group has one, the
/// definition's default otherwise. Stored keys without a definition are dropped.
pub fn merge_with_definitions(
    trade_system_name: &str,
    group_id: &str,
    stored: Option<&ParameterGroup>,
    definitions: &[Parameter],
    merged_at: DateTime<Utc>,
) -> GroupView {
    let mut merged = BTreeMap::new();
    for definition in definitions {
        let value = stored
            .and_then(|group| group.parameters.get(&definition.key))
            .map(|stored_value| stored_value.value.clone())
            .unwrap_or_else(|| definition.default.clone());
        merged.insert(
            definition.key.clone(),
            ParameterValue {
                definition: definition.clone(),
                value,
            },
        );
    }

    GroupView {
        id: group_id.to_string(),
        trade_system_name: trade_system_name.to_string(),
        last_updated: merged_at,
        note: stored.and_then(|group| group.note.clone()),
        parameters: GroupParameters::WithMetadata(merged),
    }
}
