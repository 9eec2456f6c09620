//! Admission decisions as recorded in telemetry.

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Why an admission-control check rejected a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    HoneypotFilled,
    TooFast,
    TooSlow,
    NoFocusEvent,
    InsufficientInteraction,
    NoPointerMovement,
    InvalidTiming,
    UnknownSegment,
}

impl RejectionReason {
    /// Stable identifier used in logs, stats keys and exports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HoneypotFilled => "HONEYPOT_FILLED",
            Self::TooFast => "TOO_FAST",
            Self::TooSlow => "TOO_SLOW",
            Self::NoFocusEvent => "NO_FOCUS_EVENT",
            Self::InsufficientInteraction => "INSUFFICIENT_INTERACTION",
            Self::NoPointerMovement => "NO_POINTER_MOVEMENT",
            Self::InvalidTiming => "INVALID_TIMING",
            Self::UnknownSegment => "UNKNOWN_SEGMENT",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the admission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admitted,
    Rejected(RejectionReason),
}

/// One evaluated submission.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionOutcome {
    pub decision: Decision,
    /// Diagnostic values, e.g. measured elapsed time against the threshold.
    pub detail: Map<String, Value>,
    pub recorded_at: DateTime<Utc>,
    /// HMAC of the submitter's email. Never the address itself.
    pub email_fingerprint: String,
}

impl AdmissionOutcome {
    #[must_use]
    pub fn admitted(&self) -> bool {
        matches!(self.decision, Decision::Admitted)
    }

    #[must_use]
    pub fn rejection_reason(&self) -> Option<RejectionReason> {
        match self.decision {
            Decision::Admitted => None,
            Decision::Rejected(reason) => Some(reason),
        }
    }
}

impl Serialize for AdmissionOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("AdmissionOutcome", 5)?;
        s.serialize_field("admitted", &self.admitted())?;
        s.serialize_field("reason", &self.rejection_reason())?;
        s.serialize_field("detail", &self.detail)?;
        s.serialize_field("recorded_at", &self.recorded_at)?;
        s.serialize_field("email_fingerprint", &self.email_fingerprint)?;
        s.end()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn reason_serializes_as_identifier() {
        for reason in [
            RejectionReason::HoneypotFilled,
            RejectionReason::InsufficientInteraction,
            RejectionReason::NoPointerMovement,
            RejectionReason::UnknownSegment,
        ] {
            let json = serde_json::to_value(reason).unwrap();
            assert_eq!(json, Value::String(reason.as_str().to_owned()));
        }
    }

    #[test]
    fn outcome_serializes_flat() {
        let outcome = AdmissionOutcome {
            decision: Decision::Rejected(RejectionReason::TooFast),
            detail: Map::new(),
            recorded_at: Utc::now(),
            email_fingerprint: "abc".to_owned(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["admitted"], false);
        assert_eq!(json["reason"], "TOO_FAST");
        assert_eq!(json["email_fingerprint"], "abc");

        let admitted = AdmissionOutcome {
            decision: Decision::Admitted,
            ..outcome
        };
        let json = serde_json::to_value(&admitted).unwrap();
        assert_eq!(json["admitted"], true);
        assert!(json["reason"].is_null());
    }
}
