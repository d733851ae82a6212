//! Create the remote_apps table

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RemoteApps::Table)
                    .if_not_exists()
                    .col(pk_auto(RemoteApps::Id))
                    .col(
                        timestamp_with_time_zone(RemoteApps::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(boolean(RemoteApps::FromConfig).not_null().default(false))
                    .col(string(RemoteApps::AppName).not_null())
                    .col(string(RemoteApps::SiteName).not_null())
                    .col(string(RemoteApps::LocalSocket).not_null())
                    .col(string(RemoteApps::AppSocket).not_null())
                    .col(string_len(RemoteApps::Mode, 16).not_null().default("single"))
                    .to_owned(),
            )
            .await?;

        // A local socket can only be bound by one remote app
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_remote_apps_local_socket")
                    .table(RemoteApps::Table)
                    .col(RemoteApps::LocalSocket)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_remote_apps_from_config")
                    .table(RemoteApps::Table)
                    .col(RemoteApps::FromConfig)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RemoteApps::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum RemoteApps {
    Table,
    Id,
    CreatedAt,
    FromConfig,
    AppName,
    SiteName,
    LocalSocket,
    AppSocket,
    Mode,
}
