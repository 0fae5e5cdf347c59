use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use shifter::cleanup::SweepRunner;
use shifter::config::Config;
use shifter::database::Database;
use shifter::database::repositories::FileRecordRepository;
use shifter::models::NewFileRecord;
use shifter::services::{FileService, FileStorage};
use shifter::site_settings::SettingsRegistry;
use shifter::web::{AppState, build_router};

const ADMIN_TOKEN: &str = "test-admin-token";

struct TestApp {
    server: TestServer,
    database: Database,
    storage: FileStorage,
    _tmp: tempfile::TempDir,
}

async fn test_app(debug: bool) -> TestApp {
    let database = Database::connect_with_url("sqlite::memory:", 1)
        .await
        .unwrap();
    database.migrate().await.unwrap();

    let mut config = Config::default();
    config.debug = debug;
    config.secret_key = Some(ADMIN_TOKEN.to_string());

    let settings = SettingsRegistry::new(&config, &database);

    let tmp = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(tmp.path().join("media"));
    storage.ensure_layout().await.unwrap();

    let file_service = FileService::new(&database, storage.clone(), settings.clone());
    let sweep_runner = SweepRunner::new(file_service.clone(), std::time::Duration::from_secs(60));

    let state = AppState::new(Arc::new(config), settings, file_service, sweep_runner);
    let server = TestServer::new(build_router(state)).unwrap();

    TestApp {
        server,
        database,
        storage,
        _tmp: tmp,
    }
}

fn upload_form(contents: &'static [u8], filename: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(contents)
            .file_name(filename.to_string())
            .mime_type("text/plain"),
    )
}

/// Insert a record directly, bypassing expiry resolution, so tests can stage
/// records that are already expired.
async fn seed_record(app: &TestApp, expires_at: chrono::DateTime<Utc>) -> Uuid {
    let id = Uuid::new_v4();
    tokio::fs::write(app.storage.path_for(id), b"stale bytes")
        .await
        .unwrap();
    FileRecordRepository::new(app.database.connection())
        .create(
            id,
            NewFileRecord {
                filename: "stale.txt".to_string(),
                content_type: Some("text/plain".to_string()),
                size_bytes: 11,
                sha256: None,
                uploaded_at: Utc::now(),
                expires_at,
            },
        )
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn health_endpoint_reports_version() {
    let app = test_app(true).await;
    let res = app.server.get("/health").await;
    res.assert_status_ok();

    let body: Value = res.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn upload_download_roundtrip() {
    let app = test_app(true).await;

    let res = app
        .server
        .post("/api/v1/files")
        .multipart(upload_form(b"hello world", "hello.txt"))
        .await;
    res.assert_status(axum::http::StatusCode::CREATED);

    let record: Value = res.json();
    assert_eq!(record["filename"], "hello.txt");
    assert_eq!(record["size_bytes"], 11);
    let id = record["id"].as_str().unwrap().to_string();
    assert_eq!(
        record["download_url"],
        format!("http://localhost:1337/d/{id}")
    );

    // default expiry offset: 336 hours after upload
    let uploaded_at: chrono::DateTime<Utc> =
        record["uploaded_at"].as_str().unwrap().parse().unwrap();
    let expires_at: chrono::DateTime<Utc> =
        record["expires_at"].as_str().unwrap().parse().unwrap();
    assert_eq!(expires_at - uploaded_at, Duration::hours(336));

    let res = app.server.get("/api/v1/files").await;
    res.assert_status_ok();
    let listing: Value = res.json();
    assert_eq!(listing.as_array().unwrap().len(), 1);

    let res = app.server.get(&format!("/d/{id}")).await;
    res.assert_status_ok();
    assert_eq!(res.text(), "hello world");
    let disposition = res.headers()["content-disposition"].to_str().unwrap();
    assert!(disposition.contains("hello.txt"));

    // the download was counted
    let res = app.server.get(&format!("/api/v1/files/{id}")).await;
    let record: Value = res.json();
    assert_eq!(record["download_count"], 1);
}

#[tokio::test]
async fn upload_accepts_explicit_expiry_and_rejects_past_ones() {
    let app = test_app(true).await;

    let future = (Utc::now() + Duration::hours(48)).to_rfc3339();
    let res = app
        .server
        .post("/api/v1/files")
        .multipart(upload_form(b"soon gone", "soon.txt").add_text("expires_at", future.clone()))
        .await;
    res.assert_status(axum::http::StatusCode::CREATED);
    let record: Value = res.json();
    let expires_at: chrono::DateTime<Utc> =
        record["expires_at"].as_str().unwrap().parse().unwrap();
    let requested: chrono::DateTime<Utc> = future.parse().unwrap();
    assert_eq!(expires_at.timestamp(), requested.timestamp());

    let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
    let res = app
        .server
        .post("/api/v1/files")
        .multipart(upload_form(b"too late", "late.txt").add_text("expires_at", past))
        .await;
    res.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);

    let res = app
        .server
        .post("/api/v1/files")
        .multipart(upload_form(b"when?", "when.txt").add_text("expires_at", "next tuesday"))
        .await;
    res.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let app = test_app(true).await;

    let res = app
        .server
        .put("/api/v1/settings/max_file_size")
        .json(&serde_json::json!({ "value": "1KB" }))
        .await;
    res.assert_status(axum::http::StatusCode::NO_CONTENT);

    static BIG: [u8; 2048] = [b'x'; 2048];
    let res = app
        .server
        .post("/api/v1/files")
        .multipart(upload_form(&BIG, "big.bin"))
        .await;
    res.assert_status(axum::http::StatusCode::PAYLOAD_TOO_LARGE);

    let res = app.server.get("/api/v1/files").await;
    let listing: Value = res.json();
    assert_eq!(listing.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn settings_listing_and_updates() {
    let app = test_app(true).await;

    let res = app.server.get("/api/v1/settings").await;
    res.assert_status_ok();
    let settings: Value = res.json();
    let keys: Vec<&str> = settings
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["key"].as_str().unwrap())
        .collect();
    assert_eq!(
        keys,
        vec![
            "domain",
            "max_file_size",
            "default_expiry_offset",
            "max_expiry_offset"
        ]
    );
    assert_eq!(settings[0]["value"], "localhost:1337");
    assert_eq!(settings[0]["label"], "Full Domain");
    assert_eq!(settings[2]["value"], "336");
    assert_eq!(settings[3]["value"], "43800");

    // a valid override takes effect and shows up in download URLs
    let res = app
        .server
        .put("/api/v1/settings/domain")
        .json(&serde_json::json!({ "value": "https://files.example.com" }))
        .await;
    res.assert_status(axum::http::StatusCode::NO_CONTENT);

    let res = app
        .server
        .post("/api/v1/files")
        .multipart(upload_form(b"hi", "hi.txt"))
        .await;
    let record: Value = res.json();
    assert!(
        record["download_url"]
            .as_str()
            .unwrap()
            .starts_with("https://files.example.com/d/")
    );

    // an invalid override is rejected and the prior value retained
    let res = app
        .server
        .put("/api/v1/settings/default_expiry_offset")
        .json(&serde_json::json!({ "value": "two weeks" }))
        .await;
    res.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);

    let res = app.server.get("/api/v1/settings").await;
    let settings: Value = res.json();
    assert_eq!(settings[2]["value"], "336");

    // unknown keys are not part of the schema
    let res = app
        .server
        .put("/api/v1/settings/retention_policy")
        .json(&serde_json::json!({ "value": "forever" }))
        .await;
    res.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn settings_mutation_requires_admin_token_outside_debug() {
    let app = test_app(false).await;

    let res = app
        .server
        .put("/api/v1/settings/max_file_size")
        .json(&serde_json::json!({ "value": "100MB" }))
        .await;
    res.assert_status(axum::http::StatusCode::UNAUTHORIZED);

    let res = app
        .server
        .put("/api/v1/settings/max_file_size")
        .authorization_bearer("wrong-token")
        .json(&serde_json::json!({ "value": "100MB" }))
        .await;
    res.assert_status(axum::http::StatusCode::UNAUTHORIZED);

    let res = app
        .server
        .put("/api/v1/settings/max_file_size")
        .authorization_bearer(ADMIN_TOKEN)
        .json(&serde_json::json!({ "value": "100MB" }))
        .await;
    res.assert_status(axum::http::StatusCode::NO_CONTENT);

    // reads stay open
    let res = app.server.get("/api/v1/settings").await;
    res.assert_status_ok();
}

#[tokio::test]
async fn delete_removes_file_and_bytes() {
    let app = test_app(true).await;

    let res = app
        .server
        .post("/api/v1/files")
        .multipart(upload_form(b"bye", "bye.txt"))
        .await;
    let record: Value = res.json();
    let id = record["id"].as_str().unwrap().to_string();

    let res = app.server.delete(&format!("/api/v1/files/{id}")).await;
    res.assert_status(axum::http::StatusCode::NO_CONTENT);

    let res = app.server.delete(&format!("/api/v1/files/{id}")).await;
    res.assert_status(axum::http::StatusCode::NOT_FOUND);

    let res = app.server.get(&format!("/d/{id}")).await;
    res.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn expired_files_are_hidden_and_swept() {
    let app = test_app(true).await;

    let expired_id = seed_record(&app, Utc::now() - Duration::hours(1)).await;
    let live_id = seed_record(&app, Utc::now() + Duration::hours(1)).await;

    // expired but not yet swept: gone for download purposes
    let res = app.server.get(&format!("/d/{expired_id}")).await;
    res.assert_status(axum::http::StatusCode::NOT_FOUND);
    let res = app.server.get(&format!("/d/{live_id}")).await;
    res.assert_status_ok();

    let res = app.server.post("/api/v1/cleanup/run").await;
    res.assert_status_ok();
    let outcome: Value = res.json();
    assert_eq!(outcome["deleted"], 1);
    assert_eq!(outcome["failed"], 0);
    assert!(!app.storage.path_for(expired_id).exists());

    let res = app.server.get(&format!("/api/v1/files/{expired_id}")).await;
    res.assert_status(axum::http::StatusCode::NOT_FOUND);
    let res = app.server.get(&format!("/api/v1/files/{live_id}")).await;
    res.assert_status_ok();

    // nothing new expired, so a second sweep deletes nothing
    let res = app.server.post("/api/v1/cleanup/run").await;
    let outcome: Value = res.json();
    assert_eq!(outcome["deleted"], 0);
}

#[tokio::test]
async fn upload_without_file_field_is_a_bad_request() {
    let app = test_app(true).await;
    let res = app
        .server
        .post("/api/v1/files")
        .multipart(MultipartForm::new().add_text("expires_at", "2030-01-01 12:00"))
        .await;
    res.assert_status(axum::http::StatusCode::BAD_REQUEST);
}
