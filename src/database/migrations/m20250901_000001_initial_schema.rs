use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_file_records_table(manager).await?;
        self.create_site_settings_table(manager).await?;
        self.create_indexes(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SiteSettings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FileRecords::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    // Helper functions for database-specific types
    fn create_id_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.uuid().not_null(),
            _ => col.string().not_null(),
        };
        col
    }

    fn create_timestamp_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.timestamp_with_time_zone().not_null(),
            _ => col.string().not_null(),
        };
        col
    }

    async fn create_file_records_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FileRecords::Table)
                    .if_not_exists()
                    .col(
                        self.create_id_column(manager, FileRecords::Id)
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FileRecords::Filename).string().not_null())
                    .col(ColumnDef::new(FileRecords::ContentType).string())
                    .col(
                        ColumnDef::new(FileRecords::SizeBytes)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FileRecords::Sha256).string())
                    .col(self.create_timestamp_column(manager, FileRecords::UploadedAt))
                    .col(self.create_timestamp_column(manager, FileRecords::ExpiresAt))
                    .col(
                        ColumnDef::new(FileRecords::DownloadCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_site_settings_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SiteSettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SiteSettings::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SiteSettings::Value).string().not_null())
                    .col(self.create_timestamp_column(manager, SiteSettings::UpdatedAt))
                    .to_owned(),
            )
            .await
    }

    async fn create_indexes(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        // The cleanup sweep selects on expires_at every cadence
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_file_records_expires_at")
                    .table(FileRecords::Table)
                    .col(FileRecords::ExpiresAt)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum FileRecords {
    Table,
    Id,
    Filename,
    ContentType,
    SizeBytes,
    Sha256,
    UploadedAt,
    ExpiresAt,
    DownloadCount,
}

#[derive(DeriveIden)]
enum SiteSettings {
    Table,
    Key,
    Value,
    UpdatedAt,
}
