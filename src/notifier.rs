use crate::config::ComputeServerConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Certificate;
use serde_json::{json, Value};
use std::fs;
use std::time::Duration;

/// A change the compute server should pick up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeNotification {
    ParameterGroup {
        trade_system_name: String,
        group_id: String,
    },
    TradingSystem {
        trade_system_name: String,
    },
}

impl ChangeNotification {
    pub fn path(&self) -> &'static str {
        match self {
            ChangeNotification::ParameterGroup { .. } => "/update-parameter-group",
            ChangeNotification::TradingSystem { .. } => "/update-trading-system",
        }
    }

    pub fn body(&self) -> Value {
        match self {
            ChangeNotification::ParameterGroup {
                trade_system_name,
                group_id,
            } => json!({ "tradeSystemName": trade_system_name, "groupId": group_id }),
            ChangeNotification::TradingSystem { trade_system_name } => {
                json!({ "tradeSystemName": trade_system_name })
            }
        }
    }
}

/// Best-effort delivery. Implementations must never surface delivery
/// failures to the write path and must finish within a bounded time.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn notify(&self, notification: ChangeNotification);
}

/// Used when no compute server is configured.
pub struct NoopNotifier;

#[async_trait]
impl ChangeNotifier for NoopNotifier {
    async fn notify(&self, notification: ChangeNotification) {
        debug!("No compute server configured; skipping {:?}", notification);
    }
}

/// Posts each change to the compute server and waits for the reply, at most
/// `timeout`. The caller's process may exit right after a write, so nothing
/// is left running in the background.
pub struct HttpNotifier {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpNotifier {
    pub fn new(config: &ComputeServerConfig) -> Result<Self> {
        let client = build_async_client(config.timeout, config.ca_cert_path.as_deref())?;
        Ok(Self::with_client(client, config.base_url(), config.timeout))
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChangeNotifier for HttpNotifier {
    async fn notify(&self, notification: ChangeNotification) {
        let url = format!("{}{}", self.base_url, notification.path());
        let delivery = deliver(&self.client, &url, &notification);
        match tokio::time::timeout(self.timeout, delivery).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!("Failed to notify compute server at {}: {:#}", url, error),
            Err(_) => warn!(
                "Timed out after {:?} notifying compute server at {}",
                self.timeout, url
            ),
        }
    }
}

async fn deliver(client: &reqwest::Client, url: &str, notification: &ChangeNotification) -> Result<()> {
    let response = client
        .post(url)
        .json(&notification.body())
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("compute server responded with {}", status);
    }
    debug!("Delivered {:?} to {}", notification, url);
    Ok(())
}

pub fn build_async_client(timeout: Duration, ca_cert_path: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(certificate) = load_ca_certificate(ca_cert_path)? {
        builder = builder.add_root_certificate(certificate);
    }
    builder.build().context("failed to build HTTP client")
}

fn load_ca_certificate(path: Option<&str>) -> Result<Option<Certificate>> {
    let Some(path) = path.map(str::trim).filter(|path| !path.is_empty()) else {
        return Ok(None);
    };
    let pem = fs::read(path)
        .with_context(|| format!("failed to read CA certificate from {}", path))?;
    let certificate = Certificate::from_pem(&pem)
        .with_context(|| format!("failed to parse CA certificate from {}", path))?;
    Ok(Some(certificate))
}
