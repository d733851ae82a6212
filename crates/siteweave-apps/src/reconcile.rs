//! Startup reconciliation of configured remote apps against the store
//!
//! Configuration-declared records (`from_config = true`) are made to mirror
//! the configured remote app list exactly:
//!
//! 1. every persisted config record whose identity is no longer configured is
//!    deleted; the rest are loaded from their persisted form;
//! 2. every configured app without a remaining config record on its local
//!    socket is inserted.
//!
//! Running it again with the same configuration changes nothing in the store.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::registry::RemoteAppRegistry;
use crate::remote::RemoteAppInstance;
use crate::store::{RemoteAppFilter, RemoteAppId, RemoteAppStore};

/// What reconciliation did to the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Config records that were kept and loaded
    pub kept: Vec<RemoteAppId>,
    /// Config records created for newly configured apps
    pub inserted: Vec<RemoteAppId>,
    /// Config records deleted because they are no longer configured
    pub pruned: Vec<RemoteAppId>,
}

impl ReconcileReport {
    /// Number of store writes performed
    pub fn mutations(&self) -> usize {
        self.inserted.len() + self.pruned.len()
    }
}

/// Build the remote app registry for `configured`, fixing up the store.
///
/// Any store error aborts; the partially built registry is dropped.
pub async fn reconcile(
    store: &dyn RemoteAppStore,
    configured: &[AppConfig],
) -> Result<(RemoteAppRegistry, ReconcileReport), AppError> {
    let registry = RemoteAppRegistry::new();
    let mut report = ReconcileReport::default();

    let persisted = store
        .query(&RemoteAppFilter::all().from_config(true))
        .await
        .map_err(AppError::Persistence)?;

    for record in persisted {
        if configured.iter().any(|app| app.same_identity(&record.config)) {
            debug!(
                "Loading configured remote app {} ({}) from the store",
                record.config.app_name, record.id
            );
            report.kept.push(record.id);
            registry.insert(Arc::new(RemoteAppInstance::new(record.id, record.config)));
        } else {
            info!(
                "Removing remote app {} at {} ({}) which is no longer configured",
                record.config.app_name, record.config.site_name, record.config.local_socket
            );
            store.delete(record.id).await.map_err(AppError::Persistence)?;
            report.pruned.push(record.id);
        }
    }

    for app in configured {
        if registry.find_by_local_socket(&app.local_socket).is_some() {
            continue;
        }

        let record = store.insert(app, true).await.map_err(AppError::Persistence)?;
        info!(
            "Added configured remote app {} at {} ({}) as id {}",
            app.app_name, app.site_name, app.local_socket, record.id
        );
        report.inserted.push(record.id);
        registry.insert(Arc::new(RemoteAppInstance::new(record.id, record.config)));
    }

    Ok((registry, report))
}
