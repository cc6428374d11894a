use crate::commands::{parse_payload, print_json, read_json_input, OneOrMany};
use crate::context::AppContext;
use crate::models::{Parameter, ParameterUpdateRequest};
use anyhow::Result;
use log::info;
use std::path::Path;

pub async fn list(app: &AppContext, trade_system_name: &str) -> Result<()> {
    let parameters = app.parameters().list(trade_system_name).await?;
    info!(
        "Found {} parameter(s) for {}",
        parameters.len(),
        trade_system_name
    );
    print_json(&parameters)
}

pub async fn upsert(app: &AppContext, input: &Path) -> Result<()> {
    let payload: OneOrMany<Parameter> = parse_payload(read_json_input(input)?, "parameter")?;
    let saved = app.parameters().upsert(payload.into_vec()).await?;
    info!("Upserted {} parameter(s)", saved);
    Ok(())
}

pub async fn update(app: &AppContext, input: &Path) -> Result<()> {
    let request: ParameterUpdateRequest =
        parse_payload(read_json_input(input)?, "parameter update")?;
    let updated = app.parameters().update(request).await?;
    print_json(&updated)
}

pub async fn delete(app: &AppContext, key: &str, trade_system_name: &str) -> Result<()> {
    if !app.parameters().delete(key, trade_system_name).await? {
        info!("No parameter {}/{} to delete", trade_system_name, key);
    }
    Ok(())
}
