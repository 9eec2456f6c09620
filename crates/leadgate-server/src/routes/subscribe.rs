//! Subscription route: `POST /v1/subscribe`.
//!
//! Runs the admission pipeline, registers the contact, and schedules the
//! document follow-up in the background. Malformed bodies are reported as
//! `malformed_request`; every admission-control rejection is reported with
//! the same generic `validation_error`.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tracing::debug;

use leadgate_core::payload::SubmissionPayload;

use crate::error::AppError;
use crate::state::AppState;

/// Build the subscription router (nested under `/v1`).
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/subscribe", post(subscribe))
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub status: &'static str,
}

/// Admit and register a subscriber.
async fn subscribe(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SubmissionPayload>, JsonRejection>,
) -> Result<Json<SubscribeResponse>, AppError> {
    let Json(payload) = body.map_err(|e| {
        debug!(error = %e.body_text(), "unreadable subscription body");
        AppError::Malformed
    })?;

    // The follow-up task is detached; its outcome is only logged.
    let _subscribed = state.subscriptions.subscribe(&payload).await?;

    Ok(Json(SubscribeResponse {
        status: "subscribed",
    }))
}
