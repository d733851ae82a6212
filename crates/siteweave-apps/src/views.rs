//! Serializable views returned by the query/command surface

use serde::Serialize;

use crate::config::LocalExposedAppConfig;
use crate::store::{RemoteAppId, RemoteAppRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalExposedAppSummary {
    pub app_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalExposedAppView {
    #[serde(flatten)]
    pub config: LocalExposedAppConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteAppView {
    #[serde(flatten)]
    pub record: RemoteAppRecord,
    pub active: bool,
}

/// Outcome of a site-connected event
#[derive(Debug, Default)]
pub struct ActivationReport {
    /// Instances that started listening
    pub started: Vec<RemoteAppId>,
    /// Matching instances that were already listening
    pub already_active: Vec<RemoteAppId>,
    /// Matching instances whose listener could not be started
    pub failed: Vec<RemoteAppId>,
}
