use thiserror::Error;

use crate::store::{RemoteAppId, StoreError};

/// Errors returned by the app manager and its components
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("Cannot delete remote app {app_name} (id {id}): it is declared in the configuration file")]
    PolicyViolation { id: RemoteAppId, app_name: String },

    #[error("Persistence failure: {0}")]
    Persistence(StoreError),

    #[error("Failed to listen on {address}: {reason}")]
    ListenerBind { address: String, reason: String },

    #[error("Failed to close listener on {address}: {reason}")]
    ListenerShutdown { address: String, reason: String },

    #[error("Remote app {id} has no backing record")]
    StaleRecord { id: RemoteAppId },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Data converter error: {0}")]
    Converter(String),
}

impl AppError {
    pub(crate) fn remote_app_not_found(id: RemoteAppId) -> Self {
        AppError::NotFound {
            kind: "remote app",
            key: id.to_string(),
        }
    }

    pub(crate) fn local_app_not_found(app_name: &str) -> Self {
        AppError::NotFound {
            kind: "local exposed app",
            key: app_name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound { .. })
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AppError::remote_app_not_found(id),
            other => AppError::Persistence(other),
        }
    }
}
