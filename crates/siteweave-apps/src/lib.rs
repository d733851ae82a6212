//! App registry and listener lifecycle for siteweave nodes
//!
//! A node exposes local services ("local exposed apps") to remote sites and
//! offers local sockets for services running at remote sites ("remote
//! apps"). [`AppManager`] reconciles the configured remote apps with the
//! persistent store, opens and closes remote app listeners as sites come and
//! go, and routes inbound tunnel streams to local apps.

pub mod config;
pub mod converter;
pub mod error;
pub mod listener;
pub mod local;
pub mod manager;
pub mod reconcile;
pub mod registry;
pub mod remote;
pub mod store;
pub mod stream;
pub mod views;

pub use config::{AppConfig, LocalExposedAppConfig, SocketMode};
pub use converter::{DataConverter, PortRange, SocketConverter};
pub use error::AppError;
pub use listener::SocketAddress;
pub use local::{LocalAppRegistry, LocalExposedApp};
pub use manager::{AppManager, SiteEvent};
pub use reconcile::{reconcile, ReconcileReport};
pub use registry::RemoteAppRegistry;
pub use remote::{ClientConnectedHandler, RemoteAppInstance, RemoteTarget};
pub use store::{DbAppStore, RemoteAppFilter, RemoteAppId, RemoteAppRecord, RemoteAppStore, StoreError};
pub use stream::{BoxedStream, ByteStream};
pub use views::{ActivationReport, LocalExposedAppSummary, LocalExposedAppView, RemoteAppView};
