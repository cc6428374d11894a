use crate::commands::{parse_payload, print_json, read_json_input};
use crate::context::AppContext;
use crate::error::ConfigError;
use crate::groups::GroupSelector;
use crate::models::ParameterGroupInput;
use anyhow::Result;
use log::info;
use serde_json::json;
use std::path::Path;

pub async fn get(
    app: &AppContext,
    trade_system_name: &str,
    group_id: &str,
    include_metadata: bool,
) -> Result<()> {
    let selector = GroupSelector::parse(group_id);
    match app
        .groups()
        .get(trade_system_name, &selector, include_metadata)
        .await?
    {
        Some(view) => print_json(&view),
        None => Err(ConfigError::not_found(
            "parameter group",
            format!("{}/latest", trade_system_name),
        )
        .into()),
    }
}

pub async fn list(app: &AppContext, trade_system_name: &str, include_metadata: bool) -> Result<()> {
    let groups = app
        .groups()
        .list_all(trade_system_name, include_metadata)
        .await?;
    info!(
        "Found {} parameter group(s) for {}",
        groups.len(),
        trade_system_name
    );
    print_json(&groups)
}

pub async fn upsert(app: &AppContext, input: &Path) -> Result<()> {
    let group: ParameterGroupInput = parse_payload(read_json_input(input)?, "parameter group")?;
    let id = app.groups().upsert(group).await?;
    print_json(&json!({ "id": id }))
}

pub async fn delete(app: &AppContext, id: &str, trade_system_name: &str) -> Result<()> {
    if !app.groups().delete(id, trade_system_name).await? {
        info!("No parameter group {}/{} to delete", trade_system_name, id);
    }
    Ok(())
}
