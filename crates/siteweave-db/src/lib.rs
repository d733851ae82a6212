//! Persistence layer for siteweave
//!
//! Stores remote app definitions in SQLite (or any sea-orm backend) so that
//! apps added at runtime survive restarts and configuration-declared apps can
//! be reconciled against the node configuration on startup.

pub mod entities;
pub mod migrator;

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use tracing::{debug, info};

use crate::migrator::Migrator;

/// Open the remote app database. SQLite URLs need `?mode=rwc` for the file
/// to be created on first use.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;
    debug!(backend = ?db.get_database_backend(), "Opened remote app database");
    Ok(db)
}

/// Apply pending schema migrations; a no-op when the schema is current
pub async fn migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    let pending = Migrator::get_pending_migrations(db).await?.len();
    if pending == 0 {
        debug!("Remote app schema is up to date");
        return Ok(());
    }

    info!(pending, "Applying remote app schema migrations");
    Migrator::up(db, None).await
}

/// Build a SQLite URL for a database file inside `data_dir`, creating the
/// file on first use
pub fn get_database_url(data_dir: &std::path::Path) -> String {
    let db_path = data_dir.join("siteweave.db");
    format!("sqlite://{}?mode=rwc", db_path.display())
}
