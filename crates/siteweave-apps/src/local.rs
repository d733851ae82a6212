//! Local exposed apps
//!
//! The registry is assembled once from configuration and never changes
//! afterwards, so lookups need no locking.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::{validate_local_apps, LocalExposedAppConfig};
use crate::converter::{DataConverter, SocketConverter};
use crate::error::AppError;
use crate::stream::BoxedStream;

/// A local service reachable from remote sites
#[derive(Clone)]
pub struct LocalExposedApp {
    config: LocalExposedAppConfig,
    converter: Arc<dyn DataConverter>,
}

impl LocalExposedApp {
    pub fn config(&self) -> &LocalExposedAppConfig {
        &self.config
    }
}

#[derive(Clone, Default)]
pub struct LocalAppRegistry {
    apps: HashMap<String, LocalExposedApp>,
}

impl LocalAppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from configuration using `SocketConverter` for
    /// every app
    pub fn from_configs(configs: &[LocalExposedAppConfig]) -> Result<Self, AppError> {
        validate_local_apps(configs)?;

        let mut registry = Self::new();
        for config in configs {
            let converter = Arc::new(SocketConverter::new(config)?);
            registry = registry.with_app(config.clone(), converter)?;
        }
        Ok(registry)
    }

    /// Add an app with a caller-supplied converter
    pub fn with_app(
        mut self,
        config: LocalExposedAppConfig,
        converter: Arc<dyn DataConverter>,
    ) -> Result<Self, AppError> {
        config.validate()?;
        if self.apps.contains_key(&config.app_name) {
            return Err(AppError::InvalidConfig(format!(
                "duplicate local exposed app name '{}'",
                config.app_name
            )));
        }
        self.apps.insert(
            config.app_name.clone(),
            LocalExposedApp { config, converter },
        );
        Ok(self)
    }

    pub fn get(&self, app_name: &str) -> Option<&LocalExposedApp> {
        self.apps.get(app_name)
    }

    /// App names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.apps.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Route an inbound tunnel stream to a local app's data converter
    ///
    /// An unknown app name fails before `stream` is touched.
    pub async fn dispatch(
        &self,
        app_name: &str,
        socket: &str,
        stream: BoxedStream,
        remaining: Vec<u8>,
    ) -> Result<(), AppError> {
        let Some(app) = self.apps.get(app_name) else {
            error!("Local app {} not found", app_name);
            return Err(AppError::local_app_not_found(app_name));
        };

        debug!(
            "Dispatching stream to local app {} (socket '{}', {} buffered bytes)",
            app_name,
            socket,
            remaining.len()
        );

        app.converter
            .start(stream, socket, remaining)
            .await
            .map_err(|e| {
                error!("Failed to start data converter for {}: {}", app_name, e);
                e
            })
    }
}
