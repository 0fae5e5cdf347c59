//! File storage and upload lifecycle
//!
//! Uploads are staged chunk-by-chunk into an `incoming/` directory while a
//! sha256 digest and byte count accumulate, then committed by rename under
//! the record id. Expiry timestamps are resolved against the site settings:
//! the default offset applies when the client requests none, and no offset
//! may exceed the configured maximum.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::Database;
use crate::database::repositories::FileRecordRepository;
use crate::errors::{AppError, StorageError};
use crate::models::{FileRecord, NewFileRecord, SweepOutcome};
use crate::site_settings::SettingsRegistry;
use crate::utils::human_size::format_byte_size;

/// Filesystem layout for stored file bytes, keyed by record id
#[derive(Clone)]
pub struct FileStorage {
    media_root: PathBuf,
}

impl FileStorage {
    pub fn new(media_root: PathBuf) -> Self {
        Self { media_root }
    }

    /// Create the media and staging directories.
    pub async fn ensure_layout(&self) -> Result<(), StorageError> {
        let incoming = self.incoming_dir();
        tokio::fs::create_dir_all(&incoming)
            .await
            .map_err(|e| StorageError::io(incoming.display().to_string(), e))
    }

    fn incoming_dir(&self) -> PathBuf {
        self.media_root.join("incoming")
    }

    pub fn path_for(&self, id: Uuid) -> PathBuf {
        self.media_root.join(id.to_string())
    }

    /// Open a staging file for a new upload.
    pub async fn stage(&self) -> Result<StagedUpload, StorageError> {
        let path = self.incoming_dir().join(format!("{}.part", Uuid::new_v4()));
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| StorageError::io(path.display().to_string(), e))?;
        Ok(StagedUpload {
            path,
            file,
            hasher: Sha256::new(),
            size: 0,
        })
    }

    /// Remove the stored bytes for `id`. Already-absent bytes count as
    /// removed, so retries converge.
    pub async fn remove(&self, id: Uuid) -> Result<(), StorageError> {
        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(path.display().to_string(), e)),
        }
    }

    pub async fn open(&self, id: Uuid) -> Result<tokio::fs::File, StorageError> {
        let path = self.path_for(id);
        tokio::fs::File::open(&path)
            .await
            .map_err(|e| StorageError::io(path.display().to_string(), e))
    }
}

/// An upload being written into the staging directory
pub struct StagedUpload {
    path: PathBuf,
    file: tokio::fs::File,
    hasher: Sha256,
    size: u64,
}

impl StagedUpload {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| StorageError::io(self.path.display().to_string(), e))?;
        self.hasher.update(chunk);
        self.size += chunk.len() as u64;
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Flush and move the staged file to its final location. Returns the
    /// byte count and hex sha256 digest.
    async fn commit(mut self, dest: &Path) -> Result<(u64, String), StorageError> {
        self.file
            .flush()
            .await
            .map_err(|e| StorageError::io(self.path.display().to_string(), e))?;
        drop(self.file);
        tokio::fs::rename(&self.path, dest)
            .await
            .map_err(|e| StorageError::io(dest.display().to_string(), e))?;
        Ok((self.size, hex::encode(self.hasher.finalize())))
    }

    /// Delete the staging file after an aborted upload.
    pub async fn discard(self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            warn!("Failed to remove staged upload {}: {}", self.path.display(), e);
        }
    }
}

/// File lifecycle service: uploads, downloads, deletion, and the expiry sweep
#[derive(Clone)]
pub struct FileService {
    repo: FileRecordRepository,
    storage: FileStorage,
    settings: SettingsRegistry,
}

impl FileService {
    pub fn new(database: &Database, storage: FileStorage, settings: SettingsRegistry) -> Self {
        Self {
            repo: FileRecordRepository::new(database.connection()),
            storage,
            settings,
        }
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub async fn max_upload_bytes(&self) -> Result<u64, AppError> {
        Ok(self.settings.max_file_size_bytes().await?)
    }

    /// Resolve the expiry timestamp for an upload.
    ///
    /// The offset is `requested - now`, or the default offset setting when no
    /// expiry was requested. Offsets in the past are rejected; offsets beyond
    /// the maximum setting are capped to it.
    pub async fn resolve_expiry(
        &self,
        now: DateTime<Utc>,
        requested: Option<DateTime<Utc>>,
    ) -> Result<DateTime<Utc>, AppError> {
        let max_offset = self.settings.max_expiry_offset().await?;
        let offset = match requested {
            Some(at) => at - now,
            None => self.settings.default_expiry_offset().await?,
        };
        if offset < Duration::zero() {
            return Err(AppError::validation("expiry must not be in the past"));
        }
        Ok(now + offset.min(max_offset))
    }

    /// Commit a staged upload: move the bytes under a fresh record id and
    /// insert the metadata row. A failed insert removes the bytes again so
    /// storage never holds files without a record.
    pub async fn finalize_upload(
        &self,
        staged: StagedUpload,
        filename: String,
        content_type: Option<String>,
        requested_expiry: Option<DateTime<Utc>>,
    ) -> Result<FileRecord, AppError> {
        let now = Utc::now();
        let expires_at = self.resolve_expiry(now, requested_expiry).await?;

        let id = Uuid::new_v4();
        let (size_bytes, sha256) = staged.commit(&self.storage.path_for(id)).await?;

        let record = NewFileRecord {
            filename,
            content_type,
            size_bytes: size_bytes as i64,
            sha256: Some(sha256),
            uploaded_at: now,
            expires_at,
        };

        match self.repo.create(id, record).await {
            Ok(record) => {
                info!(
                    "Stored file '{}' ({}, {}), expires {}",
                    record.filename,
                    record.id,
                    format_byte_size(size_bytes),
                    record.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
                Ok(record)
            }
            Err(e) => {
                if let Err(cleanup_err) = self.storage.remove(id).await {
                    warn!("Failed to remove bytes for aborted upload {id}: {cleanup_err}");
                }
                Err(e.into())
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        Ok(self.repo.find_by_id(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<FileRecord>, AppError> {
        Ok(self.repo.list_all().await?)
    }

    /// Remove a file on explicit request: bytes first, then metadata, so a
    /// storage failure keeps the record visible instead of orphaning bytes.
    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        self.storage.remove(id).await?;
        Ok(self.repo.delete(id).await?)
    }

    pub async fn record_download(&self, id: Uuid) {
        if let Err(e) = self.repo.increment_download_count(id).await {
            warn!("Failed to record download for {id}: {e}");
        }
    }

    /// One expiry sweep: remove every record whose expiry is at or before
    /// `now`. A record whose bytes cannot be deleted is logged and kept so
    /// the next sweep retries it; the sweep itself always continues.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepOutcome, AppError> {
        let expired = self.repo.find_expired(now).await?;
        let mut outcome = SweepOutcome::default();

        for record in expired {
            match self.storage.remove(record.id).await {
                Ok(()) => match self.repo.delete(record.id).await {
                    Ok(_) => {
                        debug!("Deleted expired file '{}' ({})", record.filename, record.id);
                        outcome.deleted += 1;
                    }
                    Err(e) => {
                        warn!(
                            "Deleted bytes but failed to delete record for '{}' ({}): {}",
                            record.filename, record.id, e
                        );
                        outcome.failed += 1;
                    }
                },
                Err(e) => {
                    warn!(
                        "Failed to delete stored bytes for '{}' ({}), keeping record for retry: {}",
                        record.filename, record.id, e
                    );
                    outcome.failed += 1;
                }
            }
        }

        if outcome.deleted > 0 || outcome.failed > 0 {
            info!(
                "Expiry sweep removed {} file(s), {} failed",
                outcome.deleted, outcome.failed
            );
        }
        Ok(outcome)
    }
}
