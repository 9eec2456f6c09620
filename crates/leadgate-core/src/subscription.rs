//! Subscription service: admission, registration, follow-up.
//!
//! The admission decision is final before the registry is contacted. A
//! registry failure or a duplicate contact never rewrites the recorded
//! decision, and the document follow-up runs on its own task after the
//! registration has been committed.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::SubscribeError;
use crate::followup::{DocumentFollowUp, FollowUpReport};
use crate::payload::SubmissionPayload;
use crate::pipeline::AdmissionPipeline;
use crate::registry::{ContactRegistry, Registration};

/// A committed subscription.
#[derive(Debug)]
pub struct Subscribed {
    pub segment: String,
    /// Handle of the document follow-up, when one was scheduled.
    pub follow_up: Option<JoinHandle<FollowUpReport>>,
}

/// Composes the admission pipeline with the registry and the follow-up.
pub struct SubscriptionService {
    pipeline: AdmissionPipeline,
    registry: Arc<dyn ContactRegistry>,
    follow_up: Option<Arc<DocumentFollowUp>>,
}

impl SubscriptionService {
    #[must_use]
    pub fn new(
        pipeline: AdmissionPipeline,
        registry: Arc<dyn ContactRegistry>,
        follow_up: Option<Arc<DocumentFollowUp>>,
    ) -> Self {
        Self {
            pipeline,
            registry,
            follow_up,
        }
    }

    #[must_use]
    pub fn pipeline(&self) -> &AdmissionPipeline {
        &self.pipeline
    }

    #[must_use]
    pub fn follow_up(&self) -> Option<&Arc<DocumentFollowUp>> {
        self.follow_up.as_ref()
    }

    /// Admit and register a submission.
    ///
    /// # Errors
    ///
    /// - [`SubscribeError::Malformed`] for shape or attribute violations
    /// - [`SubscribeError::Rejected`] when an admission check fails
    /// - [`SubscribeError::AlreadySubscribed`] for a duplicate contact
    /// - [`SubscribeError::Registry`] for any other registry failure
    pub async fn subscribe(&self, payload: &SubmissionPayload) -> Result<Subscribed, SubscribeError> {
        let outcome = self.pipeline.admit(payload).await?;
        if !outcome.admitted() {
            return Err(SubscribeError::Rejected);
        }

        let config = self.pipeline.config();
        // Admission guarantees a known segment with a list id.
        let (list_id, policy) = match config.segment(&payload.list_segment) {
            Some(policy) => match policy.list_id {
                Some(list_id) => (list_id, policy),
                None => return Err(SubscribeError::Rejected),
            },
            None => return Err(SubscribeError::Rejected),
        };

        let mut attributes = BTreeMap::new();
        if let Some(value) = payload.attribute() {
            attributes.insert(policy.attribute_key.clone(), value.to_owned());
        }

        let email = payload.normalized_email();
        let fingerprint = outcome.email_fingerprint;

        match self.registry.register(&email, list_id, &attributes).await {
            Ok(Registration::Created) => {
                info!(
                    fingerprint = %fingerprint,
                    segment = %payload.list_segment,
                    registry = self.registry.name(),
                    "subscriber registered"
                );
            }
            Ok(Registration::AlreadyExists) => {
                info!(
                    fingerprint = %fingerprint,
                    segment = %payload.list_segment,
                    "subscriber already registered"
                );
                return Err(SubscribeError::AlreadySubscribed);
            }
            Err(e) => {
                error!(
                    fingerprint = %fingerprint,
                    segment = %payload.list_segment,
                    registry = self.registry.name(),
                    error = %e,
                    "contact registration failed"
                );
                return Err(SubscribeError::Registry(e));
            }
        }

        let follow_up = match (&self.follow_up, payload.attribute()) {
            (Some(follow_up), Some(name)) if policy.delivers_document => {
                Some(follow_up.spawn(email, name.to_owned(), fingerprint))
            }
            _ => None,
        };

        Ok(Subscribed {
            segment: payload.list_segment.clone(),
            follow_up,
        })
    }
}

impl std::fmt::Debug for SubscriptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionService")
            .field("pipeline", &self.pipeline)
            .field("registry", &self.registry.name())
            .field("follow_up", &self.follow_up)
            .finish()
    }
}
