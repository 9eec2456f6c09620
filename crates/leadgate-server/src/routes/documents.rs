//! Fallback document download: `GET /v1/documents/download?name=`
//!
//! Lets a subscriber fetch the personalized document when email delivery
//! failed or is not configured. The name goes through the same attribute
//! rules as the subscription form.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use leadgate_core::config::DEFAULT_ATTRIBUTE_MIN_LEN;
use leadgate_core::payload::validate_display_name;

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/v1/documents` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/download", get(download))
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(alias = "clinicName")]
    pub name: Option<String>,
}

/// Render the document for `name` and return it as an attachment.
async fn download(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let name = query.name.as_deref().map(str::trim).unwrap_or_default();
    if name.chars().count() < DEFAULT_ATTRIBUTE_MIN_LEN {
        return Err(AppError::BadRequest("name is missing or too short".to_owned()));
    }
    validate_display_name(name).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let document = state
        .renderer
        .render(name)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        state.renderer.file_name(name)
    );

    Ok((
        [
            (header::CONTENT_TYPE, state.renderer.content_type().to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, "public, max-age=3600".to_owned()),
        ],
        document,
    )
        .into_response())
}
