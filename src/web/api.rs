//! HTTP handlers

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::io::ReaderStream;
use tracing::{error, warn};
use uuid::Uuid;

use super::AppState;
use crate::cleanup::SweepRun;
use crate::errors::{AppError, SettingsError, StorageError};
use crate::models::FileRecord;
use crate::services::StagedUpload;
use crate::site_settings;
use crate::utils::datetime::{format_in_timezone, parse_expiry_input};

type ApiError = (StatusCode, Json<Value>);

fn map_error(e: AppError) -> ApiError {
    let status = match &e {
        AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::Settings(SettingsError::InvalidValue { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::Settings(SettingsError::UnknownKey { .. }) => StatusCode::NOT_FOUND,
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::Storage(StorageError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {e}");
        return (status, Json(json!({ "error": "internal error" })));
    }
    (status, Json(json!({ "error": e.to_string() })))
}

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found() -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}

/// Settings mutation and manual cleanup are admin operations: outside debug
/// mode they require the secret key as a bearer token.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if state.config.debug {
        return Ok(());
    }
    let expected = state.config.secret_key.as_deref().unwrap_or_default();
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if !expected.is_empty() && provided == Some(expected) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "missing or invalid admin token" })),
        ))
    }
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, serde::Serialize)]
pub struct FileRecordResponse {
    pub id: Uuid,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub sha256: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub expires_at_local: String,
    pub download_count: i64,
    pub download_url: String,
}

fn file_response(record: FileRecord, domain: &str, tz: Tz) -> FileRecordResponse {
    let base = if domain.contains("://") {
        domain.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", domain.trim_end_matches('/'))
    };
    FileRecordResponse {
        download_url: format!("{base}/d/{}", record.id),
        expires_at_local: format_in_timezone(record.expires_at, tz),
        id: record.id,
        filename: record.filename,
        content_type: record.content_type,
        size_bytes: record.size_bytes,
        sha256: record.sha256,
        uploaded_at: record.uploaded_at,
        expires_at: record.expires_at,
        download_count: record.download_count,
    }
}

async fn domain(state: &AppState) -> Result<String, ApiError> {
    state
        .settings
        .get(site_settings::DOMAIN)
        .await
        .map_err(|e| map_error(e.into()))
}

// Files API

pub async fn list_files(
    State(state): State<AppState>,
) -> Result<Json<Vec<FileRecordResponse>>, ApiError> {
    let records = state.file_service.list().await.map_err(map_error)?;
    let domain = domain(&state).await?;
    let responses = records
        .into_iter()
        .map(|r| file_response(r, &domain, state.display_tz))
        .collect();
    Ok(Json(responses))
}

pub async fn get_file(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<FileRecordResponse>, ApiError> {
    let record = state
        .file_service
        .get(id)
        .await
        .map_err(map_error)?
        .ok_or_else(not_found)?;
    let domain = domain(&state).await?;
    Ok(Json(file_response(record, &domain, state.display_tz)))
}

#[derive(Debug, Default)]
struct UploadMeta {
    filename: Option<String>,
    content_type: Option<String>,
    expires_raw: Option<String>,
}

/// Drain the multipart body, staging the `file` field to disk. The staged
/// upload is left in `staged_slot` so the caller can discard it on any
/// downstream error.
async fn receive_multipart(
    state: &AppState,
    multipart: &mut Multipart,
    staged_slot: &mut Option<StagedUpload>,
    max_bytes: u64,
) -> Result<UploadMeta, ApiError> {
    let mut meta = UploadMeta::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("expires_at") => {
                meta.expires_raw = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("malformed expires_at field: {e}")))?,
                );
            }
            Some("file") => {
                meta.filename = field.file_name().map(str::to_string);
                meta.content_type = field.content_type().map(str::to_string);

                let mut upload = state
                    .file_service
                    .storage()
                    .stage()
                    .await
                    .map_err(|e| map_error(e.into()))?;

                loop {
                    let chunk = match field.chunk().await {
                        Ok(Some(chunk)) => chunk,
                        Ok(None) => break,
                        Err(e) => {
                            upload.discard().await;
                            return Err(bad_request(format!("malformed multipart body: {e}")));
                        }
                    };
                    if let Err(e) = upload.write_chunk(&chunk).await {
                        upload.discard().await;
                        return Err(map_error(e.into()));
                    }
                    if upload.size() > max_bytes {
                        let size = upload.size();
                        upload.discard().await;
                        return Err(map_error(
                            StorageError::TooLarge {
                                size,
                                max_size: max_bytes,
                            }
                            .into(),
                        ));
                    }
                }

                if let Some(previous) = staged_slot.replace(upload) {
                    previous.discard().await;
                }
            }
            _ => {}
        }
    }

    Ok(meta)
}

pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileRecordResponse>), ApiError> {
    let max_bytes = state
        .file_service
        .max_upload_bytes()
        .await
        .map_err(map_error)?;

    let mut staged: Option<StagedUpload> = None;
    let meta = match receive_multipart(&state, &mut multipart, &mut staged, max_bytes).await {
        Ok(meta) => meta,
        Err(err) => {
            if let Some(staged) = staged.take() {
                staged.discard().await;
            }
            return Err(err);
        }
    };

    let Some(staged) = staged else {
        return Err(bad_request("multipart field 'file' is required".to_string()));
    };

    let requested_expiry = match meta.expires_raw {
        Some(raw) => match parse_expiry_input(&raw, state.display_tz) {
            Ok(dt) => Some(dt),
            Err(message) => {
                staged.discard().await;
                return Err(map_error(AppError::validation(message)));
            }
        },
        None => None,
    };

    let filename = meta
        .filename
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unnamed".to_string());

    let record = state
        .file_service
        .finalize_upload(staged, filename, meta.content_type, requested_expiry)
        .await
        .map_err(map_error)?;

    let domain = domain(&state).await?;
    Ok((
        StatusCode::CREATED,
        Json(file_response(record, &domain, state.display_tz)),
    ))
}

pub async fn delete_file(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    if state.file_service.delete(id).await.map_err(map_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found())
    }
}

pub async fn download_file(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let record = state
        .file_service
        .get(id)
        .await
        .map_err(map_error)?
        .ok_or_else(not_found)?;

    // An expired record awaiting the next sweep is already gone to clients
    if record.is_expired(Utc::now()) {
        return Err(not_found());
    }

    let file = match state.file_service.storage().open(id).await {
        Ok(file) => file,
        Err(e) => {
            warn!("Stored bytes missing for record {id}: {e}");
            return Err(not_found());
        }
    };

    state.file_service.record_download(id).await;

    let content_type = record
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let filename = record.filename.replace(['"', '\r', '\n'], "_");

    let headers = [
        (header::CONTENT_TYPE, content_type),
        (header::CONTENT_LENGTH, record.size_bytes.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
    ];
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((headers, body).into_response())
}

// Settings API

pub async fn list_settings(
    State(state): State<AppState>,
) -> Result<Json<Vec<site_settings::SettingView>>, ApiError> {
    let views = state
        .settings
        .list()
        .await
        .map_err(|e| map_error(e.into()))?;
    Ok(Json(views))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingRequest {
    pub value: String,
}

pub async fn update_setting(
    Path(key): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdateSettingRequest>,
) -> Result<StatusCode, ApiError> {
    require_admin(&state, &headers)?;
    state
        .settings
        .set(&key, &payload.value)
        .await
        .map_err(|e| map_error(e.into()))?;
    Ok(StatusCode::NO_CONTENT)
}

// Cleanup API

pub async fn run_cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, &headers)?;
    match state.sweep_runner.run_sweep().await.map_err(map_error)? {
        SweepRun::Completed(outcome) => Ok(Json(json!({
            "deleted": outcome.deleted,
            "failed": outcome.failed,
        }))),
        SweepRun::AlreadyRunning => Err((
            StatusCode::CONFLICT,
            Json(json!({ "error": "a sweep is already running" })),
        )),
        SweepRun::TimedOut => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "sweep timed out" })),
        )),
    }
}
