//! Bot-detection telemetry routes: `/v1/bot-detection/*`
//!
//! Read aggregated admission statistics, export the decision log as CSV,
//! and reset it. All routes sit behind the admin credential middleware.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use leadgate_core::config::AdmissionConfig;
use leadgate_core::telemetry::TelemetryStats;

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/bot-detection` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(stats).delete(reset))
        .route("/export", get(export))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    /// `config=true` includes the active admission configuration.
    pub config: Option<String>,
    /// `export=csv` returns the CSV export instead of JSON.
    pub export: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: TelemetryStats,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<AdmissionConfig>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub message: &'static str,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Current statistics, or the CSV export with `export=csv`.
async fn stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Response, AppError> {
    if query.export.as_deref() == Some("csv") {
        return Ok(csv_response(&state).await);
    }

    let stats = state.telemetry.stats().await;
    let config = (query.config.as_deref() == Some("true"))
        .then(|| state.admission.as_ref().clone());

    Ok(Json(StatsResponse {
        stats,
        timestamp: Utc::now(),
        config,
    })
    .into_response())
}

/// Full decision log as a CSV attachment.
async fn export(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    Ok(csv_response(&state).await)
}

/// Drop every recorded decision.
async fn reset(State(state): State<Arc<AppState>>) -> Result<Json<ResetResponse>, AppError> {
    state.telemetry.reset().await;
    info!("bot detection telemetry cleared");
    Ok(Json(ResetResponse {
        message: "bot detection logs cleared",
    }))
}

async fn csv_response(state: &AppState) -> Response {
    let csv = state.telemetry.export_csv().await;
    let disposition = format!(
        "attachment; filename=\"bot-detection-logs-{}.csv\"",
        Utc::now().timestamp_millis()
    );
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response()
}
