//! Migration: Create keys table.
//!
//! One row per issued key. Rows are never deleted; the grant bookkeeping
//! columns let the scheduler rebuild pending revocations after a restart.
//!
//! Built with the schema builder so the same migration runs on PostgreSQL
//! and on the in-memory SQLite database used by tests.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Keys::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Keys::Token).string_len(64).not_null().primary_key())
                    .col(
                        ColumnDef::new(Keys::Status)
                            .string_len(16)
                            .not_null()
                            .default("unused"),
                    )
                    .col(ColumnDef::new(Keys::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Keys::ExpiresAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Keys::RedeemedBy).string_len(64).null())
                    .col(ColumnDef::new(Keys::RedeemedAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Keys::GrantClosedAt).timestamp_with_time_zone().null())
                    .col(
                        ColumnDef::new(Keys::RevokeAttempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        // Admin listing: most recent first
        manager
            .create_index(
                Index::create()
                    .name("idx_keys_created_at")
                    .table(Keys::Table)
                    .col(Keys::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Recovery scan: used keys with an open grant
        manager
            .create_index(
                Index::create()
                    .name("idx_keys_status_grant_closed_at")
                    .table(Keys::Table)
                    .col(Keys::Status)
                    .col(Keys::GrantClosedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Keys::Table).if_exists().to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Keys {
    Table,
    Token,
    Status,
    CreatedAt,
    ExpiresAt,
    RedeemedBy,
    RedeemedAt,
    GrantClosedAt,
    RevokeAttempts,
}
