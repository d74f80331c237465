//! Web view — public URLs for views and a read-only JSON surface.
//!
//! The core only needs `url_for` to decorate replies; rendering is someone
//! else's job. The router exposes the derived read queries so a UI can be
//! built against them.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::ledger::{LedgerRepository, UserKarma};

/// Produces public URLs for web views.
pub trait ViewUrlProvider: Send + Sync {
    /// Public URL for a view path, or an empty string when the web view is
    /// disabled.
    fn url_for(&self, path: &str) -> String;
}

/// Disabled web view. Every URL is empty, so replies omit links.
pub struct BlankView;

impl ViewUrlProvider for BlankView {
    fn url_for(&self, _path: &str) -> String {
        String::new()
    }
}

/// Web view reachable at a configured base URL.
pub struct WebView {
    base_url: String,
}

impl WebView {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }
}

impl ViewUrlProvider for WebView {
    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

// ── JSON routes ─────────────────────────────────────────────────────

#[derive(Clone)]
struct WebState {
    ledger: Arc<dyn LedgerRepository>,
    default_limit: usize,
}

#[derive(Debug, Serialize)]
struct TotalPoints {
    total: i64,
}

/// Build the read-only JSON router over the ledger.
pub fn routes(ledger: Arc<dyn LedgerRepository>, default_limit: usize) -> Router {
    Router::new()
        .route("/leaderboard", get(default_leaderboard))
        .route("/leaderboard/{limit}", get(leaderboard))
        .route("/total", get(total))
        .layer(CorsLayer::permissive())
        .with_state(WebState {
            ledger,
            default_limit,
        })
}

async fn default_leaderboard(
    State(state): State<WebState>,
) -> Result<Json<Vec<UserKarma>>, StatusCode> {
    fetch_leaderboard(&state, state.default_limit).await
}

async fn leaderboard(
    State(state): State<WebState>,
    Path(limit): Path<usize>,
) -> Result<Json<Vec<UserKarma>>, StatusCode> {
    fetch_leaderboard(&state, limit).await
}

async fn fetch_leaderboard(
    state: &WebState,
    limit: usize,
) -> Result<Json<Vec<UserKarma>>, StatusCode> {
    state.ledger.get_leaderboard(limit).await.map(Json).map_err(|e| {
        error!(error = %e, "Leaderboard query failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn total(State(state): State<WebState>) -> Result<Json<TotalPoints>, StatusCode> {
    state
        .ledger
        .get_total_points()
        .await
        .map(|total| Json(TotalPoints { total }))
        .map_err(|e| {
            error!(error = %e, "Total points query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
