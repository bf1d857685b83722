//! Read-only query API over the cached snapshot.
//!
//! ```text
//! GET /showtimes  - every cached showing
//! GET /theaters   - theater names, urls and addresses
//! GET /formats    - showings grouped by presentation format
//! GET /refresh    - queue a scrape (or pull the mirror) and return at once
//! GET /health     - liveness
//! GET /status     - liveness with server time
//! ```

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Local;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::error::CacheError;
use crate::mirror::MirrorClient;
use crate::refresh::{RefreshHandle, TriggerOutcome};
use crate::{Showtime, Snapshot, Theater};

/// How `/refresh` gets new data.
#[derive(Clone)]
pub enum Refresher {
    /// Scrape in the background worker.
    Queue(RefreshHandle),
    /// Copy a snapshot published elsewhere; used where no browser is available.
    Mirror(Arc<MirrorClient>),
}

#[derive(Clone)]
pub struct ApiState {
    pub cache: Arc<CacheStore>,
    pub refresher: Refresher,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FormatGroup {
    pub format: String,
    pub theaters: BTreeSet<String>,
    pub showtime_ids: Vec<String>,
}

/// Group showings by format, in order of each format's first appearance.
pub fn group_by_format(showings: &[Showtime]) -> Vec<FormatGroup> {
    let mut groups: Vec<FormatGroup> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for show in showings {
        let slot = *index.entry(show.format.as_str()).or_insert_with(|| {
            groups.push(FormatGroup {
                format: show.format.clone(),
                theaters: BTreeSet::new(),
                showtime_ids: Vec::new(),
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];
        group.theaters.insert(show.theater.clone());
        group.showtime_ids.push(show.id.clone());
    }
    groups
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/showtimes", get(showtimes))
        .route("/theaters", get(theaters))
        .route("/formats", get(formats))
        .route("/refresh", get(refresh))
        .route("/health", get(health))
        .route("/status", get(status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, app: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("query API listening on {}", addr);
    axum::serve(listener, app).await
}

/// Cache read failure, reported as a 500 with an `error` field.
pub struct ApiError(CacheError);

impl From<CacheError> for ApiError {
    fn from(e: CacheError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(error = %self.0, "cache read failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

async fn load(state: &ApiState) -> Result<Option<Snapshot>, ApiError> {
    Ok(state.cache.load().await?)
}

async fn showtimes(State(state): State<ApiState>) -> Result<Json<Vec<Showtime>>, ApiError> {
    let showings = load(&state).await?.map(|s| s.showings).unwrap_or_default();
    Ok(Json(showings))
}

async fn theaters(State(state): State<ApiState>) -> Result<Json<Vec<Theater>>, ApiError> {
    let theaters = load(&state).await?.map(|s| s.theaters).unwrap_or_default();
    Ok(Json(theaters))
}

async fn formats(State(state): State<ApiState>) -> Result<Json<Vec<FormatGroup>>, ApiError> {
    let groups = load(&state)
        .await?
        .map(|s| group_by_format(&s.showings))
        .unwrap_or_default();
    Ok(Json(groups))
}

async fn refresh(State(state): State<ApiState>) -> Response {
    info!("refresh requested");
    match &state.refresher {
        Refresher::Queue(handle) => match handle.trigger() {
            TriggerOutcome::Queued => (
                StatusCode::OK,
                Json(json!({ "status": "Refresh started. Data will update shortly." })),
            )
                .into_response(),
            TriggerOutcome::AlreadyPending => (
                StatusCode::OK,
                Json(json!({ "status": "Refresh already pending. Data will update shortly." })),
            )
                .into_response(),
            TriggerOutcome::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "error": "refresh worker is not running" })),
            )
                .into_response(),
        },
        Refresher::Mirror(mirror) => match mirror.sync(&state.cache).await {
            Ok(snapshot) => (
                StatusCode::OK,
                Json(json!({
                    "status": "Cache updated from mirror.",
                    "scraped_date": snapshot.scraped_date,
                    "showings": snapshot.showings.len(),
                })),
            )
                .into_response(),
            Err(e) => {
                warn!(url = mirror.url(), error = %e, "mirror refresh failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "status": "error", "error": e.to_string() })),
                )
                    .into_response()
            }
        },
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK", "message": "NYC Movie Showtimes API is running." }))
}

async fn status() -> Json<serde_json::Value> {
    Json(json!({
        "status": "Active",
        "timestamp": Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    }))
}
