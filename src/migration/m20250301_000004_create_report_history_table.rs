use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum ReportHistory {
    Table,
    Id,
    ReportId,
    ModifiedBy,
    Data,
    Version,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Reports {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReportHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReportHistory::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ReportHistory::ReportId).uuid().not_null())
                    .col(ColumnDef::new(ReportHistory::ModifiedBy).uuid().not_null())
                    .col(ColumnDef::new(ReportHistory::Data).json_binary().not_null())
                    .col(ColumnDef::new(ReportHistory::Version).integer().not_null())
                    .col(
                        ColumnDef::new(ReportHistory::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_report_history_report_id")
                            .from(ReportHistory::Table, ReportHistory::ReportId)
                            .to(Reports::Table, Reports::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_report_history_modified_by")
                            .from(ReportHistory::Table, ReportHistory::ModifiedBy)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_report_history_report_id")
                    .table(ReportHistory::Table)
                    .col(ReportHistory::ReportId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // One history row per report version, no gaps and no repeats.
        manager
            .create_index(
                Index::create()
                    .name("idx_report_history_report_version")
                    .table(ReportHistory::Table)
                    .col(ReportHistory::ReportId)
                    .col(ReportHistory::Version)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReportHistory::Table).to_owned())
            .await
    }
}
