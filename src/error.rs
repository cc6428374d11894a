use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A write was missing a required key or carried a malformed field.
    /// Nothing was persisted.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Invalid timestamp '{input}' (expected e.g. 'Tue Jan 02 14:30:00 2024')")]
    Timestamp { input: String },

    /// A multi-step plan stopped part way. Steps in `completed` were applied,
    /// steps in `pending` were not. Re-running the operation converges.
    #[error("{plan} stopped after {} of {} steps: {source:#}", .completed.len(), .completed.len() + .pending.len())]
    Propagation {
        plan: String,
        completed: Vec<String>,
        pending: Vec<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("Store error: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Malformed client JSON, including unparseable timestamps inside it.
    pub fn invalid_payload(entity: &str, error: serde_json::Error) -> Self {
        Self::Validation(format!("invalid {} payload: {}", entity, error))
    }

    /// Client-side errors (bad input) as opposed to backend failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotFound { .. } | Self::Timestamp { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Rejects blank identifiers on writes.
pub fn require_key<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::validation(format!("{} is required", field)));
    }
    Ok(trimmed)
}
