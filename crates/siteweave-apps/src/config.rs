//! App configuration value objects
//!
//! `AppConfig` describes a remote app: which local socket it is reached
//! through and which app at which site the connections are forwarded to.
//! `LocalExposedAppConfig` describes a local service offered to remote sites.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::AppError;

pub use siteweave_db::entities::remote_app::SocketMode;

/// Remote app definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppConfig {
    /// App name as exposed by the remote site
    pub app_name: String,

    /// Remote site hosting the app
    pub site_name: String,

    /// Local socket to listen on (`host:port` or a unix socket path)
    pub local_socket: String,

    /// Socket of the app at the remote site
    pub app_socket: String,

    #[serde(default)]
    pub mode: SocketMode,
}

impl AppConfig {
    pub fn new(
        site_name: impl Into<String>,
        app_name: impl Into<String>,
        local_socket: impl Into<String>,
        app_socket: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            site_name: site_name.into(),
            local_socket: local_socket.into(),
            app_socket: app_socket.into(),
            mode: SocketMode::Single,
        }
    }

    /// Reconciliation identity: `(site, app, local socket, app socket)`.
    /// The mode is not part of it.
    pub fn identity(&self) -> (&str, &str, &str, &str) {
        (
            &self.site_name,
            &self.app_name,
            &self.local_socket,
            &self.app_socket,
        )
    }

    pub fn same_identity(&self, other: &AppConfig) -> bool {
        self.identity() == other.identity()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for (field, value) in [
            ("app_name", &self.app_name),
            ("site_name", &self.site_name),
            ("local_socket", &self.local_socket),
            ("app_socket", &self.app_socket),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::InvalidConfig(format!(
                    "remote app field '{}' cannot be empty",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// Local service exposed to remote sites
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalExposedAppConfig {
    /// Name remote sites use to address this app
    pub app_name: String,

    #[serde(default)]
    pub mode: SocketMode,

    /// Upstream socket for single mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_socket: Option<String>,

    /// Allowed ports for range mode, e.g. `["8000-8010", "9000"]`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_range: Vec<String>,

    /// Allowed hosts for range mode; empty allows any host
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub address_range: Vec<String>,
}

impl LocalExposedAppConfig {
    pub fn single(app_name: impl Into<String>, app_socket: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            mode: SocketMode::Single,
            app_socket: Some(app_socket.into()),
            port_range: Vec::new(),
            address_range: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.app_name.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "local exposed app name cannot be empty".to_string(),
            ));
        }

        match self.mode {
            SocketMode::Single => {
                if self.app_socket.as_deref().map_or(true, |s| s.trim().is_empty()) {
                    return Err(AppError::InvalidConfig(format!(
                        "local exposed app '{}' uses single mode but has no app_socket",
                        self.app_name
                    )));
                }
            }
            SocketMode::Range => {
                if self.port_range.is_empty() {
                    return Err(AppError::InvalidConfig(format!(
                        "local exposed app '{}' uses range mode but has no port_range",
                        self.app_name
                    )));
                }
                for range in &self.port_range {
                    crate::converter::PortRange::parse(range)?;
                }
            }
        }
        Ok(())
    }
}

/// Validate a configured remote app list
///
/// Two remote apps cannot share a local socket.
pub fn validate_remote_apps(apps: &[AppConfig]) -> Result<(), AppError> {
    let mut sockets = HashSet::new();
    for app in apps {
        app.validate()?;
        if !sockets.insert(app.local_socket.as_str()) {
            return Err(AppError::InvalidConfig(format!(
                "duplicate local_socket '{}' in remote apps",
                app.local_socket
            )));
        }
    }
    Ok(())
}

/// Validate a configured local exposed app list
pub fn validate_local_apps(apps: &[LocalExposedAppConfig]) -> Result<(), AppError> {
    let mut names = HashSet::new();
    for app in apps {
        app.validate()?;
        if !names.insert(app.app_name.as_str()) {
            return Err(AppError::InvalidConfig(format!(
                "duplicate local exposed app name '{}'",
                app.app_name
            )));
        }
    }
    Ok(())
}
