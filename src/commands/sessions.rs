use crate::commands::{print_json, read_json_input};
use crate::context::AppContext;
use crate::error::ConfigError;
use anyhow::Result;
use log::info;
use std::path::Path;

pub async fn list(app: &AppContext) -> Result<()> {
    print_json(&app.sessions().list().await?)
}

pub async fn between(app: &AppContext, start: &str, end: &str) -> Result<()> {
    let sessions = app.sessions().list_between(start, end).await?;
    info!("Found {} session(s) between {} and {}", sessions.len(), start, end);
    print_json(&sessions)
}

pub async fn insert(app: &AppContext, input: &Path) -> Result<()> {
    app.sessions().insert_json(read_json_input(input)?).await?;
    Ok(())
}

pub async fn stats(app: &AppContext, session_id: &str) -> Result<()> {
    match app.sessions().statistics(session_id).await? {
        Some(statistics) => print_json(&statistics),
        None => Err(ConfigError::not_found("session", session_id).into()),
    }
}

pub async fn for_group(app: &AppContext, parameter_group_id: &str) -> Result<()> {
    print_json(&app.sessions().list_for_group(parameter_group_id).await?)
}
