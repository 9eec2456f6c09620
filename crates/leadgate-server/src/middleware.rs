//! Admin credential middleware.
//!
//! Guards the bot-detection telemetry routes. The caller presents the shared
//! secret in `x-admin-token`; it is compared in constant time against the
//! configured token. Without a configured token, reads are denied unless
//! fail-open was explicitly enabled, and destructive requests are always
//! denied.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the admin shared secret.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Admin credential settings.
#[derive(Clone, Default)]
pub struct AdminAuth {
    token: Option<String>,
    fail_open: bool,
}

impl AdminAuth {
    #[must_use]
    pub fn new(token: Option<String>, fail_open: bool) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
            fail_open,
        }
    }

    /// Decide whether a request presenting `presented` may proceed.
    ///
    /// `destructive` marks requests that mutate telemetry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` when the request is not allowed.
    pub fn authorize(&self, presented: Option<&str>, destructive: bool) -> Result<(), AppError> {
        let Some(expected) = &self.token else {
            if destructive || !self.fail_open {
                return Err(AppError::Unauthorized(
                    "admin token is not configured".to_owned(),
                ));
            }
            warn!("admin read allowed without a configured token (fail-open)");
            return Ok(());
        };

        let Some(presented) = presented else {
            return Err(AppError::Unauthorized(format!(
                "missing {ADMIN_TOKEN_HEADER} header"
            )));
        };

        if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(AppError::Unauthorized("invalid admin token".to_owned()))
        }
    }
}

impl std::fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuth")
            .field("token_configured", &self.token.is_some())
            .field("fail_open", &self.fail_open)
            .finish()
    }
}

/// Axum middleware that checks the admin credential.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` if the credential check fails.
pub async fn admin_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    let destructive = req.method() == Method::DELETE;

    if let Err(e) = state.admin.authorize(presented, destructive) {
        warn!(
            method = %req.method(),
            path = %req.uri().path(),
            "admin request denied"
        );
        return Err(e);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_token_must_match() {
        let auth = AdminAuth::new(Some("s3cret".to_owned()), false);
        assert!(auth.authorize(Some("s3cret"), false).is_ok());
        assert!(auth.authorize(Some("s3cret"), true).is_ok());
        assert!(auth.authorize(Some("s3cre"), false).is_err());
        assert!(auth.authorize(Some("s3cret-and-more"), false).is_err());
        assert!(auth.authorize(None, false).is_err());
    }

    #[test]
    fn unconfigured_fails_closed() {
        let auth = AdminAuth::new(None, false);
        assert!(auth.authorize(None, false).is_err());
        assert!(auth.authorize(Some("anything"), false).is_err());
    }

    #[test]
    fn fail_open_covers_reads_only() {
        let auth = AdminAuth::new(None, true);
        assert!(auth.authorize(None, false).is_ok());
        assert!(auth.authorize(None, true).is_err());
    }

    #[test]
    fn empty_token_counts_as_unconfigured() {
        let auth = AdminAuth::new(Some(String::new()), false);
        assert!(auth.authorize(Some(""), false).is_err());
    }
}
