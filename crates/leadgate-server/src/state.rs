//! Shared application state for `Leadgate` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`. It holds the resolved admission configuration,
//! the telemetry store, the subscription service, the document renderer used
//! by the fallback download, and the admin credential settings.

use std::sync::Arc;

use leadgate_core::config::AdmissionConfig;
use leadgate_core::document::DocumentRenderer;
use leadgate_core::subscription::SubscriptionService;
use leadgate_core::telemetry::TelemetryStore;

use crate::middleware::AdminAuth;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Resolved admission thresholds (reported by `?config=true`).
    pub admission: Arc<AdmissionConfig>,
    /// Admission decision log.
    pub telemetry: Arc<dyn TelemetryStore>,
    /// Admission, registration and document follow-up.
    pub subscriptions: SubscriptionService,
    /// Renderer for the fallback download endpoint.
    pub renderer: Arc<dyn DocumentRenderer>,
    /// Admin credential settings.
    pub admin: AdminAuth,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
