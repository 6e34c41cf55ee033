//! Create poll table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Poll::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Poll::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Poll::SessionCode).string_len(6).not_null())
                    .col(ColumnDef::new(Poll::Title).string_len(256))
                    .col(ColumnDef::new(Poll::CreatedBy).string_len(256).not_null())
                    .col(ColumnDef::new(Poll::IsActive).boolean().not_null().default(true))
                    .col(ColumnDef::new(Poll::ExpiresAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Poll::ClosedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Poll::DeletedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Poll::Revision).big_integer().not_null().default(1))
                    .col(ColumnDef::new(Poll::Document).json_binary().not_null())
                    .col(
                        ColumnDef::new(Poll::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Poll::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Codes of deleted polls are free for reuse
        manager
            .get_connection()
            .execute_unprepared(
                r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_poll_session_code_live
                ON poll (session_code)
                WHERE deleted_at IS NULL;
                ",
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_poll_created_by_created_at")
                    .table(Poll::Table)
                    .col(Poll::CreatedBy)
                    .col(Poll::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP INDEX IF EXISTS idx_poll_session_code_live;")
            .await?;

        manager
            .drop_table(Table::drop().table(Poll::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Poll {
    Table,
    Id,
    SessionCode,
    Title,
    CreatedBy,
    IsActive,
    ExpiresAt,
    ClosedAt,
    DeletedAt,
    Revision,
    Document,
    CreatedAt,
    UpdatedAt,
}
