//! `Leadgate` server entry point.
//!
//! Resolves configuration, builds the admission pipeline, telemetry store and
//! collaborators, then starts the Axum HTTP server with graceful shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use leadgate_core::config::AdmissionConfig;
use leadgate_core::document::{DocumentMailer, DocumentRenderer, PdfCardRenderer};
use leadgate_core::fingerprint::EmailFingerprinter;
use leadgate_core::followup::DocumentFollowUp;
use leadgate_core::pipeline::AdmissionPipeline;
use leadgate_core::registry::{ContactRegistry, MemoryContactRegistry};
use leadgate_core::subscription::SubscriptionService;
use leadgate_core::telemetry::{MemoryTelemetryStore, TelemetryStore};

use leadgate_server::config::ServerConfig;
use leadgate_server::middleware::AdminAuth;
use leadgate_server::providers::{BrevoContactRegistry, BrevoDocumentMailer};
use leadgate_server::routes;
use leadgate_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    let admission = Arc::new(AdmissionConfig::from_env());
    info!(
        segments = ?admission.segments.keys().collect::<Vec<_>>(),
        min_elapsed_ms = admission.min_elapsed_ms,
        max_elapsed_ms = admission.max_elapsed_ms,
        telemetry_capacity = admission.telemetry_capacity,
        "Leadgate starting"
    );

    let state = build_app_state(&config, admission)?;
    let app = routes::build_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "Leadgate server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Leadgate server stopped");
    Ok(())
}

/// Build the shared application state.
fn build_app_state(
    config: &ServerConfig,
    admission: Arc<AdmissionConfig>,
) -> anyhow::Result<Arc<AppState>> {
    for (name, policy) in &admission.segments {
        if policy.list_id.is_none() {
            warn!(segment = %name, "segment has no list id, its submissions will be rejected");
        }
    }

    let telemetry: Arc<dyn TelemetryStore> = Arc::new(MemoryTelemetryStore::new(
        admission.telemetry_capacity,
        admission.telemetry_recent,
    ));

    let fingerprinter = Arc::new(match &config.fingerprint_key {
        Some(key) => EmailFingerprinter::new(key.as_bytes().to_vec()),
        None => {
            warn!("LEADGATE_FINGERPRINT_KEY not set, fingerprints change on restart");
            EmailFingerprinter::ephemeral()
        }
    });

    let (registry, mailer): (Arc<dyn ContactRegistry>, Option<Arc<dyn DocumentMailer>>) =
        match &config.brevo {
            Some(brevo) => {
                let registry = BrevoContactRegistry::new(brevo)
                    .context("failed to build Brevo contact registry")?;
                let mailer = BrevoDocumentMailer::new(brevo)
                    .context("failed to build Brevo mailer")?
                    .map(|m| Arc::new(m) as Arc<dyn DocumentMailer>);
                if mailer.is_none() {
                    warn!("LEADGATE_SENDER_EMAIL not set, documents are download-only");
                }
                info!(base_url = %brevo.base_url, "using Brevo contact registry");
                (Arc::new(registry) as Arc<dyn ContactRegistry>, mailer)
            }
            None => {
                warn!("BREVO_API_KEY not set, using in-memory contact registry (data will not persist)");
                (Arc::new(MemoryContactRegistry::new()) as Arc<dyn ContactRegistry>, None)
            }
        };

    let renderer: Arc<dyn DocumentRenderer> = Arc::new(PdfCardRenderer::default());
    let follow_up = Arc::new(DocumentFollowUp::new(
        Arc::clone(&renderer),
        mailer,
        config.public_url.clone(),
    ));

    let pipeline = AdmissionPipeline::new(Arc::clone(&admission), Arc::clone(&telemetry), fingerprinter);
    let subscriptions = SubscriptionService::new(pipeline, registry, Some(follow_up));

    let admin = AdminAuth::new(config.admin_token.clone(), config.admin_fail_open);
    if config.admin_token.is_none() {
        if config.admin_fail_open {
            warn!("LEADGATE_ADMIN_TOKEN not set and fail-open enabled, telemetry reads are public");
        } else {
            warn!("LEADGATE_ADMIN_TOKEN not set, telemetry endpoints are disabled");
        }
    }

    Ok(Arc::new(AppState {
        admission,
        telemetry,
        subscriptions,
        renderer,
        admin,
    }))
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
