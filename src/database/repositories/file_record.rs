//! File record repository

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{file_records, prelude::*};
use crate::models::{FileRecord, NewFileRecord};

#[derive(Clone)]
pub struct FileRecordRepository {
    connection: Arc<DatabaseConnection>,
}

impl FileRecordRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    /// Insert a new record under a caller-chosen id (the id also names the
    /// bytes on disk, so the service allocates it before committing either).
    pub async fn create(&self, id: Uuid, record: NewFileRecord) -> Result<FileRecord, DbErr> {
        let active_model = file_records::ActiveModel {
            id: Set(id),
            filename: Set(record.filename),
            content_type: Set(record.content_type),
            size_bytes: Set(record.size_bytes),
            sha256: Set(record.sha256),
            uploaded_at: Set(record.uploaded_at),
            expires_at: Set(record.expires_at),
            download_count: Set(0),
        };

        let model = active_model.insert(&*self.connection).await?;
        Ok(model.into())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<FileRecord>, DbErr> {
        let model = FileRecords::find_by_id(id).one(&*self.connection).await?;
        Ok(model.map(Into::into))
    }

    /// All records, newest upload first
    pub async fn list_all(&self) -> Result<Vec<FileRecord>, DbErr> {
        let models = FileRecords::find()
            .order_by_desc(file_records::Column::UploadedAt)
            .all(&*self.connection)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    /// Records eligible for the cleanup sweep: expiry at or before `now`.
    pub async fn find_expired(
        &self,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<FileRecord>, DbErr> {
        let models = FileRecords::find()
            .filter(file_records::Column::ExpiresAt.lte(now))
            .order_by_asc(file_records::Column::ExpiresAt)
            .all(&*self.connection)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    /// Returns true when a row was actually removed.
    pub async fn delete(&self, id: Uuid) -> Result<bool, DbErr> {
        let result = FileRecords::delete_by_id(id).exec(&*self.connection).await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn increment_download_count(&self, id: Uuid) -> Result<(), DbErr> {
        if let Some(model) = FileRecords::find_by_id(id).one(&*self.connection).await? {
            let count = model.download_count + 1;
            let mut active_model: file_records::ActiveModel = model.into();
            active_model.download_count = Set(count);
            active_model.update(&*self.connection).await?;
        }
        Ok(())
    }
}
