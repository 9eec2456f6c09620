//! Post-registration document delivery.
//!
//! Runs after the registration has been committed and never affects it.
//! Render and deliver are retried together with exponential backoff; when
//! every attempt fails, or no mailer is configured, the subscriber can still
//! fetch the document from the fallback download endpoint.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::document::{DocumentMailer, DocumentRenderer};

/// Maximum retries after the first attempt.
pub const FOLLOW_UP_MAX_RETRIES: u32 = 3;
/// Delay before the first retry; doubles on each further retry.
pub const FOLLOW_UP_BASE_DELAY: Duration = Duration::from_secs(1);
/// Path of the fallback download endpoint.
pub const DOWNLOAD_PATH: &str = "/v1/documents/download";

/// How a follow-up ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUpReport {
    /// The document was rendered and handed to the mailer.
    Delivered { attempts: u32 },
    /// No delivery channel; only the fallback link is available.
    FallbackOnly { download_url: String },
    /// Every attempt failed.
    Failed {
        attempts: u32,
        last_error: String,
        download_url: String,
    },
}

/// Renders and delivers a personalized document for a new subscriber.
pub struct DocumentFollowUp {
    renderer: Arc<dyn DocumentRenderer>,
    mailer: Option<Arc<dyn DocumentMailer>>,
    public_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl DocumentFollowUp {
    /// `public_url` is the externally reachable origin used to build the
    /// fallback download link.
    #[must_use]
    pub fn new(
        renderer: Arc<dyn DocumentRenderer>,
        mailer: Option<Arc<dyn DocumentMailer>>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            renderer,
            mailer,
            public_url: public_url.into().trim_end_matches('/').to_owned(),
            max_retries: FOLLOW_UP_MAX_RETRIES,
            base_delay: FOLLOW_UP_BASE_DELAY,
        }
    }

    /// Override the retry schedule.
    #[must_use]
    pub fn with_retry(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    /// The renderer, shared with the fallback download endpoint.
    #[must_use]
    pub fn renderer(&self) -> &Arc<dyn DocumentRenderer> {
        &self.renderer
    }

    /// Fallback download link for `name`.
    #[must_use]
    pub fn download_url(&self, name: &str) -> String {
        format!(
            "{}{DOWNLOAD_PATH}?name={}",
            self.public_url,
            urlencoding::encode(name)
        )
    }

    /// Run the follow-up on its own task.
    pub fn spawn(self: &Arc<Self>, email: String, name: String, fingerprint: String) -> JoinHandle<FollowUpReport> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(&email, &name, &fingerprint).await })
    }

    /// Render and deliver, retrying with backoff.
    ///
    /// `fingerprint` identifies the subscriber in logs; the raw email is only
    /// handed to the mailer.
    pub async fn run(&self, email: &str, name: &str, fingerprint: &str) -> FollowUpReport {
        let download_url = self.download_url(name);

        let Some(mailer) = &self.mailer else {
            info!(
                fingerprint,
                download_url = %download_url,
                "no document mailer configured, fallback download only"
            );
            return FollowUpReport::FallbackOnly { download_url };
        };

        let file_name = self.renderer.file_name(name);
        let watermark = tracking_watermark(name, email);
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            let result = match self.renderer.render_watermarked(name, &watermark).await {
                Ok(document) => mailer
                    .deliver(email, name, &file_name, &document)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match result {
                Ok(()) => {
                    let attempts = attempt.saturating_add(1);
                    info!(fingerprint, attempts, "personalized document delivered");
                    return FollowUpReport::Delivered { attempts };
                }
                Err(e) => {
                    last_error = e;
                    if attempt == self.max_retries {
                        break;
                    }

                    // Exponential backoff: 1s, 2s, 4s
                    let backoff = self.base_delay.saturating_mul(1u32 << attempt.min(16));
                    debug!(
                        fingerprint,
                        attempt = attempt.saturating_add(1),
                        max = self.max_retries.saturating_add(1),
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %last_error,
                        "document follow-up failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        let attempts = self.max_retries.saturating_add(1);
        warn!(
            fingerprint,
            attempts,
            error = %last_error,
            download_url = %download_url,
            "document follow-up gave up, subscriber must use fallback download"
        );
        FollowUpReport::Failed {
            attempts,
            last_error,
            download_url,
        }
    }
}

/// `<name> | <email> | <date>` stamped on the emailed copy.
fn tracking_watermark(name: &str, email: &str) -> String {
    format!("{} | {email} | {}", name.trim(), Utc::now().format("%Y-%m-%d"))
}

impl std::fmt::Debug for DocumentFollowUp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentFollowUp")
            .field("public_url", &self.public_url)
            .field("has_mailer", &self.mailer.is_some())
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
