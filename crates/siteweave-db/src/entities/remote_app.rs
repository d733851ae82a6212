//! RemoteApp entity: one remote-site service exposed through a local socket

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How the sockets of an app are addressed
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum SocketMode {
    /// The app listens on exactly one socket
    #[default]
    #[sea_orm(string_value = "single")]
    Single,

    /// The app listens on a range of sockets; callers pick one per connection
    #[sea_orm(string_value = "range")]
    Range,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "remote_apps")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// When the row was inserted
    pub created_at: ChronoDateTimeUtc,

    /// Whether the row was declared by the node configuration file
    #[sea_orm(default_value = false)]
    pub from_config: bool,

    /// Name of the app as exposed by the remote site
    pub app_name: String,

    /// Remote site hosting the app
    pub site_name: String,

    /// Local listening socket (`host:port` or a filesystem path)
    #[sea_orm(unique)]
    pub local_socket: String,

    /// Socket of the app at the remote site
    pub app_socket: String,

    pub mode: SocketMode,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
