//! App manager
//!
//! Owns the local app registry and the remote app registry, reconciles the
//! configured remote apps against the store on construction, reacts to site
//! connectivity events and serves the query/command API.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{validate_remote_apps, AppConfig};
use crate::error::AppError;
use crate::local::LocalAppRegistry;
use crate::reconcile::{reconcile, ReconcileReport};
use crate::registry::RemoteAppRegistry;
use crate::remote::{ClientConnectedHandler, RemoteAppInstance};
use crate::store::{RemoteAppFilter, RemoteAppId, RemoteAppRecord, RemoteAppStore, StoreError};
use crate::stream::BoxedStream;
use crate::views::{
    ActivationReport, LocalExposedAppSummary, LocalExposedAppView, RemoteAppView,
};

/// Connectivity notifications from the tunnel layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteEvent {
    /// A site connected and announced the apps it exposes
    SiteConnected {
        site: String,
        exposed_apps: Vec<String>,
    },
    SiteGone { site: String },
}

pub struct AppManager {
    local_apps: LocalAppRegistry,
    remote_apps: RemoteAppRegistry,
    store: Arc<dyn RemoteAppStore>,
    handler: Arc<dyn ClientConnectedHandler>,
    startup: ReconcileReport,
}

impl AppManager {
    /// Reconcile `remote_apps` against the store and build the manager.
    ///
    /// Fails without publishing anything when the configuration is invalid
    /// or the store cannot be reconciled.
    pub async fn new(
        store: Arc<dyn RemoteAppStore>,
        local_apps: LocalAppRegistry,
        remote_apps: &[AppConfig],
        handler: Arc<dyn ClientConnectedHandler>,
    ) -> Result<Self, AppError> {
        validate_remote_apps(remote_apps)?;

        let (registry, startup) = reconcile(store.as_ref(), remote_apps).await?;

        info!(
            local_apps = local_apps.len(),
            remote_apps = registry.len(),
            inserted = startup.inserted.len(),
            pruned = startup.pruned.len(),
            "App manager ready"
        );

        Ok(Self {
            local_apps,
            remote_apps: registry,
            store,
            handler,
            startup,
        })
    }

    pub fn local_apps(&self) -> &LocalAppRegistry {
        &self.local_apps
    }

    pub fn remote_apps(&self) -> &RemoteAppRegistry {
        &self.remote_apps
    }

    /// What startup reconciliation changed
    pub fn startup_report(&self) -> &ReconcileReport {
        &self.startup
    }

    /// Local app names announced to remote sites
    pub fn exposed_apps(&self) -> Vec<String> {
        self.local_apps.names()
    }

    /// Hand an inbound tunnel stream to a local exposed app
    pub async fn dispatch_to_local_app(
        &self,
        app_name: &str,
        socket: &str,
        stream: BoxedStream,
        remaining: Vec<u8>,
    ) -> Result<(), AppError> {
        self.local_apps
            .dispatch(app_name, socket, stream, remaining)
            .await
    }

    /// Start listeners for the remote apps that `site` now exposes
    pub async fn on_site_connected(&self, site: &str, exposed_apps: &[String]) -> ActivationReport {
        let mut report = ActivationReport::default();

        for instance in self.remote_apps.for_site(site) {
            let config = instance.config();
            if !exposed_apps.iter().any(|name| name == &config.app_name) {
                continue;
            }

            if instance.is_active() {
                info!(
                    site = %site,
                    app = %config.app_name,
                    local_socket = %config.local_socket,
                    "Remote app is already active, skip"
                );
                report.already_active.push(instance.id());
                continue;
            }

            match instance.listen(self.handler.clone()).await {
                Ok(true) => report.started.push(instance.id()),
                Ok(false) => report.already_active.push(instance.id()),
                Err(e) => {
                    error!(
                        site = %site,
                        app = %config.app_name,
                        local_socket = %config.local_socket,
                        "Failed to start local socket listener for remote app: {}",
                        e
                    );
                    report.failed.push(instance.id());
                }
            }
        }

        report
    }

    /// Stop every listener bound to `site`; returns how many were active
    pub async fn on_site_gone(&self, site: &str) -> usize {
        let mut stopped = 0;

        for instance in self.remote_apps.for_site(site) {
            let was_active = instance.is_active();
            if was_active {
                info!(
                    site = %site,
                    app = %instance.config().app_name,
                    local_socket = %instance.config().local_socket,
                    "Stop local socket listener for remote app"
                );
                stopped += 1;
            }
            if let Err(e) = instance.stop().await {
                warn!(site = %site, "Error while stopping remote app {}: {}", instance.id(), e);
            }
        }

        stopped
    }

    /// Apply one connectivity event
    pub async fn handle_site_event(&self, event: SiteEvent) {
        match event {
            SiteEvent::SiteConnected { site, exposed_apps } => {
                let report = self.on_site_connected(&site, &exposed_apps).await;
                debug!(
                    site = %site,
                    started = report.started.len(),
                    failed = report.failed.len(),
                    "Processed site connected event"
                );
            }
            SiteEvent::SiteGone { site } => {
                let stopped = self.on_site_gone(&site).await;
                debug!(site = %site, stopped, "Processed site gone event");
            }
        }
    }

    /// Consume connectivity events until the sender side is dropped
    pub async fn run_site_events(&self, mut events: mpsc::Receiver<SiteEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_site_event(event).await;
        }
        debug!("Site event channel closed");
    }

    /// Stop every remote app listener
    pub async fn shutdown(&self) {
        for instance in self.remote_apps.snapshot() {
            if let Err(e) = instance.stop().await {
                warn!("Error while stopping remote app {}: {}", instance.id(), e);
            }
        }
        info!("All remote app listeners stopped");
    }

    pub fn list_local_exposed_apps(&self) -> Vec<LocalExposedAppSummary> {
        self.local_apps
            .names()
            .into_iter()
            .map(|app_name| LocalExposedAppSummary { app_name })
            .collect()
    }

    pub fn show_local_exposed_app(&self, app_name: &str) -> Result<LocalExposedAppView, AppError> {
        self.local_apps
            .get(app_name)
            .map(|app| LocalExposedAppView {
                config: app.config().clone(),
            })
            .ok_or_else(|| AppError::local_app_not_found(app_name))
    }

    /// Persist a new remote app and register it, optionally listening at once.
    ///
    /// A listen failure is returned to the caller; the app stays registered
    /// and inactive.
    pub async fn add_remote_app(
        &self,
        config: AppConfig,
        activate: bool,
    ) -> Result<RemoteAppView, AppError> {
        config.validate()?;

        let inserted = self.store.insert(&config, false).await?;
        let record = self
            .store
            .query(&RemoteAppFilter::all().local_socket(&config.local_socket))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::remote_app_not_found(inserted.id))?;

        let instance = Arc::new(RemoteAppInstance::new(record.id, record.config.clone()));
        self.remote_apps.insert(instance.clone());
        info!(
            remote_app_id = record.id,
            site = %record.config.site_name,
            app = %record.config.app_name,
            "Added remote app"
        );

        if activate {
            instance.listen(self.handler.clone()).await?;
        }

        Ok(RemoteAppView {
            record,
            active: instance.is_active(),
        })
    }

    /// Delete an API-created remote app.
    ///
    /// The listener is retired and the registry entry removed before the
    /// store row is deleted. Configuration-declared apps are refused.
    pub async fn delete_remote_app(&self, id: RemoteAppId) -> Result<(), AppError> {
        let record = self.store.get(id).await?;
        if record.from_config {
            return Err(AppError::PolicyViolation {
                id,
                app_name: record.config.app_name,
            });
        }

        if let Some(instance) = self
            .remote_apps
            .find_by_local_socket(&record.config.local_socket)
        {
            if let Err(e) = instance.retire().await {
                warn!("Error while stopping remote app {}: {}", instance.id(), e);
            }
            self.remote_apps.remove(instance.id());
        }

        // A concurrent delete of the same id may have won the race
        if !self.store.delete(id).await? {
            return Err(AppError::remote_app_not_found(id));
        }

        info!(remote_app_id = id, app = %record.config.app_name, "Deleted remote app");
        Ok(())
    }

    /// Every registered remote app with its listener state.
    ///
    /// Instances whose record has disappeared from the store are retired and
    /// purged instead of failing the listing.
    pub async fn list_remote_apps(&self) -> Result<Vec<RemoteAppView>, AppError> {
        let mut views = Vec::new();

        for instance in self.remote_apps.snapshot() {
            match self.backing_record(&instance).await {
                Ok(record) => views.push(RemoteAppView {
                    record,
                    active: instance.is_active(),
                }),
                Err(AppError::StaleRecord { id }) => {
                    warn!("Remote app {} vanished from the store, purging it", id);
                    if let Err(e) = instance.retire().await {
                        warn!("Error while stopping remote app {}: {}", id, e);
                    }
                    self.remote_apps.remove(id);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(views)
    }

    pub async fn show_remote_app(&self, id: RemoteAppId) -> Result<RemoteAppView, AppError> {
        let record = self.store.get(id).await?;
        let active = self
            .remote_apps
            .get(id)
            .map_or(false, |instance| instance.is_active());
        Ok(RemoteAppView { record, active })
    }

    async fn backing_record(
        &self,
        instance: &RemoteAppInstance,
    ) -> Result<RemoteAppRecord, AppError> {
        match self.store.get(instance.id()).await {
            Ok(record) => Ok(record),
            Err(StoreError::NotFound(id)) => Err(AppError::StaleRecord { id }),
            Err(e) => Err(AppError::Persistence(e)),
        }
    }
}
