use crate::commands::{parse_payload, print_json, read_json_input};
use crate::context::AppContext;
use crate::models::TradingSystemSaveRequest;
use anyhow::Result;
use std::path::Path;

pub async fn list(app: &AppContext, name: Option<&str>) -> Result<()> {
    let systems = app.trading_systems().list(name).await?;
    print_json(&systems)
}

pub async fn save(app: &AppContext, input: &Path) -> Result<()> {
    let request: TradingSystemSaveRequest =
        parse_payload(read_json_input(input)?, "trading system")?;
    let saved = app.trading_systems().save(request).await?;
    print_json(&saved)
}

pub async fn delete(app: &AppContext, name: &str) -> Result<()> {
    app.trading_systems().delete(name).await?;
    Ok(())
}
