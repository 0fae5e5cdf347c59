//! Web layer
//!
//! HTTP interface over the service layer: file upload/download, settings
//! administration, and a manual cleanup trigger. Handlers stay thin and map
//! service errors onto status codes; host and origin restrictions apply
//! outside debug mode.

use anyhow::Result;
use axum::Router;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use chrono_tz::Tz;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::cleanup::SweepRunner;
use crate::config::Config;
use crate::services::FileService;
use crate::site_settings::SettingsRegistry;

pub mod api;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub settings: SettingsRegistry,
    pub file_service: FileService,
    pub sweep_runner: SweepRunner,
    /// Timezone for human-facing timestamp rendering, parsed once at startup
    pub display_tz: Tz,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        settings: SettingsRegistry,
        file_service: FileService,
        sweep_runner: SweepRunner,
    ) -> Self {
        let display_tz = config.timezone.parse().unwrap_or(chrono_tz::UTC);
        Self {
            config,
            settings,
            file_service,
            sweep_runner,
            display_tz,
        }
    }
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(state: AppState) -> Result<Self> {
        let addr: SocketAddr =
            format!("{}:{}", state.config.web.host, state.config.web.port).parse()?;
        let app = build_router(state);
        Ok(Self { app, addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        Ok(())
    }
}

/// Create the router with all routes and middleware. Public so integration
/// tests can drive the full application without binding a socket.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(api::health_check))
        .nest("/api/v1", api_v1_routes())
        // Public download endpoint; the domain setting is prepended to these
        // paths when building download URLs
        .route("/d/{id}", get(api::download_file))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            enforce_allowed_hosts,
        ))
        .layer(cors)
        .with_state(state)
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/files",
            get(api::list_files)
                .post(api::upload_file)
                // the upload handler enforces the max_file_size setting itself
                .layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/files/{id}",
            get(api::get_file).delete(api::delete_file),
        )
        .route("/settings", get(api::list_settings))
        .route("/settings/{key}", put(api::update_setting))
        .route("/cleanup/run", post(api::run_cleanup))
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.debug {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .trusted_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Reject requests whose Host header is not on the allow-list. Skipped in
/// debug mode or when no allow-list is configured.
async fn enforce_allowed_hosts(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.debug && !state.config.allowed_hosts.is_empty() {
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let host_only = host.split(':').next().unwrap_or("");
        let allowed = state
            .config
            .allowed_hosts
            .iter()
            .any(|h| h == "*" || h == host || h == host_only);
        if !allowed {
            return StatusCode::BAD_REQUEST.into_response();
        }
    }
    next.run(request).await
}
