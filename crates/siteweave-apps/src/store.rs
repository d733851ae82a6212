//! Remote app persistence
//!
//! `RemoteAppStore` is the contract the manager needs from durable storage.
//! `DbAppStore` implements it on top of the sea-orm entities in
//! `siteweave-db`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use siteweave_db::entities::remote_app;
use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;

/// Store-assigned remote app identifier
pub type RemoteAppId = i32;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Remote app {0} not found")]
    NotFound(RemoteAppId),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Persisted remote app: configuration plus store metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAppRecord {
    pub id: RemoteAppId,
    pub created_at: DateTime<Utc>,
    pub from_config: bool,
    #[serde(flatten)]
    pub config: AppConfig,
}

impl From<remote_app::Model> for RemoteAppRecord {
    fn from(model: remote_app::Model) -> Self {
        Self {
            id: model.id,
            created_at: model.created_at,
            from_config: model.from_config,
            config: AppConfig {
                app_name: model.app_name,
                site_name: model.site_name,
                local_socket: model.local_socket,
                app_socket: model.app_socket,
                mode: model.mode,
            },
        }
    }
}

/// Field-equality filter for [`RemoteAppStore::query`]; unset fields match
/// everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAppFilter {
    pub from_config: Option<bool>,
    pub local_socket: Option<String>,
    pub site_name: Option<String>,
    pub app_name: Option<String>,
}

impl RemoteAppFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn from_config(mut self, from_config: bool) -> Self {
        self.from_config = Some(from_config);
        self
    }

    pub fn local_socket(mut self, local_socket: impl Into<String>) -> Self {
        self.local_socket = Some(local_socket.into());
        self
    }

    pub fn site_name(mut self, site_name: impl Into<String>) -> Self {
        self.site_name = Some(site_name.into());
        self
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn matches(&self, record: &RemoteAppRecord) -> bool {
        self.from_config.map_or(true, |v| record.from_config == v)
            && self
                .local_socket
                .as_ref()
                .map_or(true, |v| &record.config.local_socket == v)
            && self
                .site_name
                .as_ref()
                .map_or(true, |v| &record.config.site_name == v)
            && self
                .app_name
                .as_ref()
                .map_or(true, |v| &record.config.app_name == v)
    }
}

/// Durable table of remote app definitions
#[async_trait]
pub trait RemoteAppStore: Send + Sync {
    /// Records matching `filter`, ordered by id
    async fn query(&self, filter: &RemoteAppFilter) -> Result<Vec<RemoteAppRecord>, StoreError>;

    /// Fetch one record; `StoreError::NotFound` if absent
    async fn get(&self, id: RemoteAppId) -> Result<RemoteAppRecord, StoreError>;

    /// Insert a record, assigning its id and creation time
    async fn insert(
        &self,
        config: &AppConfig,
        from_config: bool,
    ) -> Result<RemoteAppRecord, StoreError>;

    /// Delete a record. Deleting a missing id succeeds and returns `false`.
    async fn delete(&self, id: RemoteAppId) -> Result<bool, StoreError>;
}

/// sea-orm backed store
#[derive(Clone)]
pub struct DbAppStore {
    db: DatabaseConnection,
}

impl DbAppStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl RemoteAppStore for DbAppStore {
    async fn query(&self, filter: &RemoteAppFilter) -> Result<Vec<RemoteAppRecord>, StoreError> {
        let mut select = remote_app::Entity::find();
        if let Some(from_config) = filter.from_config {
            select = select.filter(remote_app::Column::FromConfig.eq(from_config));
        }
        if let Some(ref local_socket) = filter.local_socket {
            select = select.filter(remote_app::Column::LocalSocket.eq(local_socket.as_str()));
        }
        if let Some(ref site_name) = filter.site_name {
            select = select.filter(remote_app::Column::SiteName.eq(site_name.as_str()));
        }
        if let Some(ref app_name) = filter.app_name {
            select = select.filter(remote_app::Column::AppName.eq(app_name.as_str()));
        }

        let models = select
            .order_by_asc(remote_app::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(RemoteAppRecord::from).collect())
    }

    async fn get(&self, id: RemoteAppId) -> Result<RemoteAppRecord, StoreError> {
        remote_app::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(RemoteAppRecord::from)
            .ok_or(StoreError::NotFound(id))
    }

    async fn insert(
        &self,
        config: &AppConfig,
        from_config: bool,
    ) -> Result<RemoteAppRecord, StoreError> {
        let model = remote_app::ActiveModel {
            created_at: Set(Utc::now()),
            from_config: Set(from_config),
            app_name: Set(config.app_name.clone()),
            site_name: Set(config.site_name.clone()),
            local_socket: Set(config.local_socket.clone()),
            app_socket: Set(config.app_socket.clone()),
            mode: Set(config.mode),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        debug!(
            "Inserted remote app {} ({} at {}) as id {}",
            model.app_name, model.local_socket, model.site_name, model.id
        );
        Ok(model.into())
    }

    async fn delete(&self, id: RemoteAppId) -> Result<bool, StoreError> {
        let result = remote_app::Entity::delete_by_id(id).exec(&self.db).await?;
        debug!("Deleted remote app {} ({} rows)", id, result.rows_affected);
        Ok(result.rows_affected > 0)
    }
}
