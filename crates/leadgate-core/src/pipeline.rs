//! Submission admission pipeline.
//!
//! Checks run in a fixed order and stop at the first failure, so the order
//! decides which reason is reported when several conditions fail at once:
//!
//! 1. shape (email syntax, known segment, non-negative numbers)
//! 2. segment attribute requirement
//! 3. honeypot decoys
//! 4. submit timestamp present, positive and not before render
//! 5. elapsed time lower bound
//! 6. elapsed time upper bound
//! 7. focus event
//! 8. interaction count
//! 9. pointer movement
//! 10. segment resolves to a registry list
//!
//! Steps 1–2 return a [`PayloadError`] and are never recorded. Steps 3–10
//! produce an [`AdmissionOutcome`] that is recorded to telemetry with the
//! email replaced by its fingerprint.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};

use crate::config::{AdmissionConfig, DetectionLogLevel};
use crate::error::PayloadError;
use crate::fingerprint::EmailFingerprinter;
use crate::outcome::{AdmissionOutcome, Decision, RejectionReason};
use crate::payload::{SubmissionPayload, validate_attribute, validate_shape};
use crate::telemetry::TelemetryStore;

/// Decision plus diagnostics, before timestamping and fingerprinting.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub decision: Decision,
    pub detail: Map<String, Value>,
}

impl Verdict {
    fn reject(reason: RejectionReason, detail: Value) -> Self {
        Self {
            decision: Decision::Rejected(reason),
            detail: into_map(detail),
        }
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Run every check against `payload` under `config`.
///
/// Pure: no clock, no I/O, no telemetry.
///
/// # Errors
///
/// Returns a [`PayloadError`] when the payload fails shape validation or the
/// segment attribute policy (steps 1–2).
pub fn evaluate(
    payload: &SubmissionPayload,
    config: &AdmissionConfig,
) -> Result<Verdict, PayloadError> {
    let policy = validate_shape(payload, config)?;
    validate_attribute(payload, policy)?;

    if config.honeypot_enabled {
        let filled = payload.filled_decoys(&config.decoy_field_names);
        if !filled.is_empty() {
            return Ok(Verdict::reject(
                RejectionReason::HoneypotFilled,
                json!({ "filledFields": filled }),
            ));
        }
    }

    let rendered = payload.form_rendered_at;
    let submitted = match payload.form_submitted_at {
        Some(ts) if ts > 0 => ts,
        other => {
            return Ok(Verdict::reject(
                RejectionReason::InvalidTiming,
                json!({ "formSubmittedAt": other, "formRenderedAt": rendered }),
            ));
        }
    };
    if submitted < rendered {
        return Ok(Verdict::reject(
            RejectionReason::InvalidTiming,
            json!({ "formSubmittedAt": submitted, "formRenderedAt": rendered }),
        ));
    }

    // Both timestamps are positive here, so the difference cannot overflow.
    let elapsed = submitted - rendered;
    let min_elapsed = i64::try_from(config.min_elapsed_ms).unwrap_or(i64::MAX);
    let max_elapsed = i64::try_from(config.max_elapsed_ms).unwrap_or(i64::MAX);

    if elapsed < min_elapsed {
        return Ok(Verdict::reject(
            RejectionReason::TooFast,
            json!({ "elapsedMs": elapsed, "minElapsedMs": config.min_elapsed_ms }),
        ));
    }
    if elapsed > max_elapsed {
        return Ok(Verdict::reject(
            RejectionReason::TooSlow,
            json!({ "elapsedMs": elapsed, "maxElapsedMs": config.max_elapsed_ms }),
        ));
    }

    if config.require_focus_event && !payload.had_focus_event {
        return Ok(Verdict::reject(
            RejectionReason::NoFocusEvent,
            json!({ "hadFocusEvent": false }),
        ));
    }

    // Shape validation guarantees a non-negative count.
    let interactions = u64::try_from(payload.interaction_count).unwrap_or(0);
    if interactions < config.min_interaction_count {
        return Ok(Verdict::reject(
            RejectionReason::InsufficientInteraction,
            json!({
                "interactionCount": interactions,
                "minInteractionCount": config.min_interaction_count,
            }),
        ));
    }

    if config.require_pointer_movement && !payload.had_pointer_movement {
        return Ok(Verdict::reject(
            RejectionReason::NoPointerMovement,
            json!({ "hadPointerMovement": false }),
        ));
    }

    if policy.list_id.is_none() {
        return Ok(Verdict::reject(
            RejectionReason::UnknownSegment,
            json!({ "segment": payload.list_segment }),
        ));
    }

    Ok(Verdict {
        decision: Decision::Admitted,
        detail: into_map(json!({
            "segment": payload.list_segment,
            "elapsedMs": elapsed,
            "interactionCount": interactions,
            "hadFocusEvent": payload.had_focus_event,
            "hadPointerMovement": payload.had_pointer_movement,
        })),
    })
}

/// Evaluates submissions and records every decision.
pub struct AdmissionPipeline {
    config: Arc<AdmissionConfig>,
    telemetry: Arc<dyn TelemetryStore>,
    fingerprinter: Arc<EmailFingerprinter>,
}

impl AdmissionPipeline {
    #[must_use]
    pub fn new(
        config: Arc<AdmissionConfig>,
        telemetry: Arc<dyn TelemetryStore>,
        fingerprinter: Arc<EmailFingerprinter>,
    ) -> Self {
        Self {
            config,
            telemetry,
            fingerprinter,
        }
    }

    /// The configuration this pipeline evaluates against.
    #[must_use]
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Evaluate `payload`, log the decision and record it to telemetry.
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] for malformed payloads; nothing is recorded
    /// in that case.
    pub async fn admit(&self, payload: &SubmissionPayload) -> Result<AdmissionOutcome, PayloadError> {
        let verdict = evaluate(payload, &self.config)?;

        let outcome = AdmissionOutcome {
            decision: verdict.decision,
            detail: verdict.detail,
            recorded_at: Utc::now(),
            email_fingerprint: self.fingerprinter.fingerprint(&payload.email),
        };

        self.log_decision(&outcome);
        self.telemetry.record(outcome.clone()).await;
        Ok(outcome)
    }

    fn log_decision(&self, outcome: &AdmissionOutcome) {
        let logging = self.config.logging;
        if !logging.enabled {
            return;
        }

        let detail = Value::Object(outcome.detail.clone());
        match outcome.rejection_reason() {
            Some(reason) => match logging.level {
                DetectionLogLevel::Error => error!(
                    reason = %reason,
                    fingerprint = %outcome.email_fingerprint,
                    detail = %detail,
                    "bot submission detected"
                ),
                DetectionLogLevel::Warn => warn!(
                    reason = %reason,
                    fingerprint = %outcome.email_fingerprint,
                    detail = %detail,
                    "bot submission detected"
                ),
                DetectionLogLevel::Info => info!(
                    reason = %reason,
                    fingerprint = %outcome.email_fingerprint,
                    detail = %detail,
                    "bot submission detected"
                ),
            },
            None if logging.level == DetectionLogLevel::Info => info!(
                fingerprint = %outcome.email_fingerprint,
                detail = %detail,
                "legitimate submission"
            ),
            None => {}
        }
    }
}

impl std::fmt::Debug for AdmissionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::telemetry::MemoryTelemetryStore;

    const RENDERED: i64 = 1_700_000_000_000;

    fn config() -> AdmissionConfig {
        let vars: HashMap<&str, &str> = [
            ("LEADGATE_SEGMENT_TUTORS_LIST_ID", "3"),
            ("LEADGATE_SEGMENT_VETS_LIST_ID", "4"),
        ]
        .into_iter()
        .collect();
        AdmissionConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_owned()))
    }

    /// A submission that passes every check (scenario C).
    fn human() -> SubmissionPayload {
        SubmissionPayload {
            email: "ana@example.com".to_owned(),
            list_segment: "tutors".to_owned(),
            form_rendered_at: RENDERED,
            form_submitted_at: Some(RENDERED + 5_000),
            interaction_count: 3,
            had_focus_event: true,
            had_pointer_movement: true,
            ..SubmissionPayload::default()
        }
    }

    fn reason(payload: &SubmissionPayload, config: &AdmissionConfig) -> Option<RejectionReason> {
        match evaluate(payload, config).unwrap().decision {
            Decision::Admitted => None,
            Decision::Rejected(r) => Some(r),
        }
    }

    #[test]
    fn human_submission_is_admitted() {
        assert_eq!(reason(&human(), &config()), None);
    }

    #[test]
    fn filled_decoy_rejected_as_honeypot() {
        let mut p = human();
        p.decoy_fields.insert("website".to_owned(), json!("spam"));
        assert_eq!(reason(&p, &config()), Some(RejectionReason::HoneypotFilled));
    }

    #[test]
    fn unlisted_decoy_map_entry_rejected_as_honeypot() {
        let mut p = human();
        p.decoy_fields.insert("fax".to_owned(), json!("spam"));
        let verdict = evaluate(&p, &config()).unwrap();
        assert_eq!(
            verdict.decision,
            Decision::Rejected(RejectionReason::HoneypotFilled)
        );
        assert_eq!(verdict.detail["filledFields"], json!(["fax"]));
    }

    #[test]
    fn honeypot_wins_over_every_later_check() {
        let mut p = human();
        p.extra.insert("company".to_owned(), json!("ACME"));
        p.form_submitted_at = None;
        p.interaction_count = 0;
        p.had_focus_event = false;
        p.had_pointer_movement = false;
        p.list_segment = "vets".to_owned();
        p.segment_attribute = Some("RosaVet".to_owned());
        assert_eq!(reason(&p, &config()), Some(RejectionReason::HoneypotFilled));
    }

    #[test]
    fn disabled_honeypot_ignores_decoys() {
        let mut cfg = config();
        cfg.honeypot_enabled = false;
        let mut p = human();
        p.decoy_fields.insert("website".to_owned(), json!("spam"));
        assert_eq!(reason(&p, &cfg), None);
    }

    #[test]
    fn empty_decoys_do_not_trigger() {
        let mut p = human();
        p.decoy_fields.insert("website".to_owned(), json!(""));
        p.extra.insert("phone".to_owned(), json!(""));
        p.extra.insert("company".to_owned(), Value::Null);
        assert_eq!(reason(&p, &config()), None);
    }

    #[test]
    fn undeclared_fields_are_not_decoys() {
        let mut p = human();
        p.extra.insert("utm_source".to_owned(), json!("newsletter"));
        assert_eq!(reason(&p, &config()), None);
    }

    #[test]
    fn missing_or_zero_submit_time_is_invalid_timing() {
        let mut p = human();
        p.form_submitted_at = None;
        assert_eq!(reason(&p, &config()), Some(RejectionReason::InvalidTiming));
        p.form_submitted_at = Some(0);
        assert_eq!(reason(&p, &config()), Some(RejectionReason::InvalidTiming));
    }

    #[test]
    fn submit_before_render_is_invalid_timing() {
        let mut p = human();
        p.form_submitted_at = Some(RENDERED - 1);
        assert_eq!(reason(&p, &config()), Some(RejectionReason::InvalidTiming));
    }

    #[test]
    fn fast_submission_rejected() {
        let mut p = human();
        p.form_submitted_at = Some(RENDERED + 500);
        let verdict = evaluate(&p, &config()).unwrap();
        assert_eq!(verdict.decision, Decision::Rejected(RejectionReason::TooFast));
        assert_eq!(verdict.detail["elapsedMs"], 500);
        assert_eq!(verdict.detail["minElapsedMs"], 2_000);
    }

    #[test]
    fn too_fast_reported_before_behavioral_failures() {
        let mut p = human();
        p.form_submitted_at = Some(RENDERED + 10);
        p.had_focus_event = false;
        p.interaction_count = 0;
        p.had_pointer_movement = false;
        assert_eq!(reason(&p, &config()), Some(RejectionReason::TooFast));
    }

    #[test]
    fn elapsed_bounds_are_inclusive() {
        let cfg = config();
        let mut p = human();
        p.form_submitted_at = Some(RENDERED + 2_000);
        assert_eq!(reason(&p, &cfg), None);
        p.form_submitted_at = Some(RENDERED + 3_600_000);
        assert_eq!(reason(&p, &cfg), None);
        p.form_submitted_at = Some(RENDERED + 1_999);
        assert_eq!(reason(&p, &cfg), Some(RejectionReason::TooFast));
    }

    #[test]
    fn stale_submission_rejected() {
        let mut p = human();
        p.form_submitted_at = Some(RENDERED + 3_600_001);
        assert_eq!(reason(&p, &config()), Some(RejectionReason::TooSlow));
    }

    #[test]
    fn missing_focus_rejected_before_interactions() {
        let mut p = human();
        p.had_focus_event = false;
        p.interaction_count = 0;
        assert_eq!(reason(&p, &config()), Some(RejectionReason::NoFocusEvent));
    }

    #[test]
    fn focus_requirement_can_be_disabled() {
        let mut cfg = config();
        cfg.require_focus_event = false;
        let mut p = human();
        p.had_focus_event = false;
        assert_eq!(reason(&p, &cfg), None);
    }

    #[test]
    fn too_few_interactions_rejected_before_pointer() {
        let mut p = human();
        p.interaction_count = 1;
        p.had_pointer_movement = false;
        assert_eq!(
            reason(&p, &config()),
            Some(RejectionReason::InsufficientInteraction)
        );
    }

    #[test]
    fn missing_pointer_rejected() {
        let mut p = human();
        p.had_pointer_movement = false;
        assert_eq!(reason(&p, &config()), Some(RejectionReason::NoPointerMovement));
    }

    #[test]
    fn pointer_requirement_can_be_disabled() {
        let mut cfg = config();
        cfg.require_pointer_movement = false;
        let mut p = human();
        p.had_pointer_movement = false;
        assert_eq!(reason(&p, &cfg), None);
    }

    #[test]
    fn unresolved_segment_rejected_last() {
        let cfg = AdmissionConfig::default();
        assert_eq!(reason(&human(), &cfg), Some(RejectionReason::UnknownSegment));
    }

    #[test]
    fn missing_attribute_fails_before_any_admission_check() {
        let mut p = human();
        p.list_segment = "vets".to_owned();
        p.form_submitted_at = Some(RENDERED + 1);
        p.decoy_fields.insert("website".to_owned(), json!("spam"));
        assert!(matches!(
            evaluate(&p, &config()),
            Err(PayloadError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn vets_with_clinic_admitted() {
        let mut p = human();
        p.list_segment = "vets".to_owned();
        p.segment_attribute = Some("Clínica RosaVet".to_owned());
        assert_eq!(reason(&p, &config()), None);
    }

    fn pipeline(store: Arc<MemoryTelemetryStore>) -> AdmissionPipeline {
        AdmissionPipeline::new(
            Arc::new(config()),
            store,
            Arc::new(EmailFingerprinter::new(b"test".to_vec())),
        )
    }

    #[tokio::test]
    async fn admit_records_admissions_and_rejections() {
        let store = Arc::new(MemoryTelemetryStore::default());
        let pipeline = pipeline(Arc::clone(&store));

        let outcome = pipeline.admit(&human()).await.unwrap();
        assert!(outcome.admitted());

        let mut fast = human();
        fast.form_submitted_at = Some(RENDERED + 100);
        let outcome = pipeline.admit(&fast).await.unwrap();
        assert_eq!(outcome.rejection_reason(), Some(RejectionReason::TooFast));

        let stats = store.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.admitted_count, 1);
        assert_eq!(stats.breakdown_by_reason[&RejectionReason::TooFast], 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_not_recorded() {
        let store = Arc::new(MemoryTelemetryStore::default());
        let pipeline = pipeline(Arc::clone(&store));

        let mut p = human();
        p.email = "not-an-email".to_owned();
        assert!(pipeline.admit(&p).await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn recorded_outcome_never_contains_raw_email() {
        let store = Arc::new(MemoryTelemetryStore::default());
        let pipeline = pipeline(Arc::clone(&store));

        let mut p = human();
        p.decoy_fields.insert("website".to_owned(), json!("spam"));
        pipeline.admit(&p).await.unwrap();
        pipeline.admit(&human()).await.unwrap();

        let stats = serde_json::to_string(&store.stats().await).unwrap();
        assert!(!stats.contains("ana@example.com"));
        assert!(!store.export_csv().await.contains("ana@example.com"));
    }
}
