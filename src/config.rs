use crate::retry::RetryPolicy;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 5;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Where change notifications for the compute server are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeServerConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub ca_cert_path: Option<String>,
}

impl ComputeServerConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: Option<String>,
    pub compute_server: Option<ComputeServerConfig>,
    pub rename_retry: RetryPolicy,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let settings: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&settings)
    }

    pub fn from_env_map(settings: &HashMap<String, String>) -> Result<Self> {
        let database_url = optional_setting(settings, "DATABASE_URL").map(str::to_string);
        let compute_server = compute_server_from_settings(settings)?;

        let attempts = match optional_setting(settings, "RENAME_RETRY_ATTEMPTS") {
            Some(_) => require_setting_u32(settings, "RENAME_RETRY_ATTEMPTS", 1)?,
            None => DEFAULT_RETRY_ATTEMPTS,
        };
        let delay_ms = match optional_setting(settings, "RENAME_RETRY_DELAY_MS") {
            Some(_) => require_setting_u64(settings, "RENAME_RETRY_DELAY_MS", 0)?,
            None => DEFAULT_RETRY_DELAY_MS,
        };

        Ok(Self {
            database_url,
            compute_server,
            rename_retry: RetryPolicy::new(attempts, Duration::from_millis(delay_ms)),
        })
    }
}

fn compute_server_from_settings(
    settings: &HashMap<String, String>,
) -> Result<Option<ComputeServerConfig>> {
    let raw_host = optional_setting(settings, "COMPUTE_SERVER_HOST");
    let raw_port = optional_setting(settings, "COMPUTE_SERVER_PORT");

    let raw_host = match (raw_host, raw_port) {
        (None, None) => return Ok(None),
        (Some(host), Some(_)) => host,
        _ => {
            return Err(anyhow!(
                "COMPUTE_SERVER_HOST and COMPUTE_SERVER_PORT must both be set to enable notifications"
            ))
        }
    };

    let host = normalize_host(raw_host).ok_or_else(|| {
        anyhow!(
            "Setting COMPUTE_SERVER_HOST must be a bare host name (value: {})",
            raw_host
        )
    })?;
    let port = require_setting_u64(settings, "COMPUTE_SERVER_PORT", 1)?;
    if port > u16::MAX as u64 {
        return Err(anyhow!(
            "Setting COMPUTE_SERVER_PORT must be <= {} (value: {})",
            u16::MAX,
            port
        ));
    }

    let scheme = optional_setting(settings, "COMPUTE_SERVER_SCHEME")
        .unwrap_or("http")
        .to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(anyhow!(
            "Setting COMPUTE_SERVER_SCHEME must be http or https (value: {})",
            scheme
        ));
    }

    let timeout_secs = match optional_setting(settings, "NOTIFY_TIMEOUT_SECS") {
        Some(_) => require_setting_u64(settings, "NOTIFY_TIMEOUT_SECS", 1)?,
        None => DEFAULT_NOTIFY_TIMEOUT_SECS,
    };

    Ok(Some(ComputeServerConfig {
        scheme,
        host,
        port: port as u16,
        timeout: Duration::from_secs(timeout_secs),
        ca_cert_path: optional_setting(settings, "NOTIFY_CA_CERT").map(str::to_string),
    }))
}

/// Accepts a bare host name or address; schemes, ports and paths are rejected.
pub fn normalize_host(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains("://")
        || trimmed.contains('/')
        || trimmed.contains('?')
        || trimmed.contains('#')
        || trimmed.contains(':')
    {
        return None;
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn require_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    optional_setting(settings, key).ok_or_else(|| anyhow!("Missing required setting {}", key))
}

fn require_setting_u64(settings: &HashMap<String, String>, key: &str, min: u64) -> Result<u64> {
    let raw = require_setting(settings, key)?;
    let value = raw
        .parse::<u64>()
        .map_err(|_| anyhow!("Setting {} must be a non-negative integer (value: {})", key, raw))?;
    if value < min {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    Ok(value)
}

fn require_setting_u32(settings: &HashMap<String, String>, key: &str, min: u32) -> Result<u32> {
    let value = require_setting_u64(settings, key, u64::from(min))?;
    u32::try_from(value).map_err(|_| {
        anyhow!(
            "Setting {} must be <= {} (value: {})",
            key,
            u32::MAX,
            value
        )
    })
}
