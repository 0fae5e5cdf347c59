use sea_orm::entity::prelude::*;

/// A stored file: metadata row keyed by the same id as the bytes on disk.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "file_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub sha256: Option<String>,
    pub uploaded_at: DateTimeUtc,
    /// Records with `expires_at <= now` are eligible for the cleanup sweep
    pub expires_at: DateTimeUtc,
    pub download_count: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
