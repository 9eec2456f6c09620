//! Submission payload and its shape validation.
//!
//! The wire format is the signup form's JSON (camelCase). Field aliases keep
//! older form builds working (`listName`, `clinicName`, `formLoadTime`, ...).
//! Decoy values are read from `decoyFields` and from top-level keys named
//! after a decoy, since the form posts them as ordinary inputs.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::Value;

use crate::config::{AdmissionConfig, SegmentPolicy};
use crate::error::PayloadError;

/// Maximum accepted email length (RFC 5321 path limit).
const MAX_EMAIL_LEN: usize = 254;
/// Maximum local-part length.
const MAX_LOCAL_LEN: usize = 64;
/// Maximum segment attribute length after trimming.
pub const MAX_ATTRIBUTE_LEN: usize = 100;

/// The claim presented by a client wishing to subscribe.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub email: String,
    #[serde(alias = "listName")]
    pub list_segment: String,
    #[serde(default, alias = "clinicName")]
    pub segment_attribute: Option<String>,
    #[serde(default)]
    pub decoy_fields: BTreeMap<String, Value>,
    #[serde(alias = "formLoadTime")]
    pub form_rendered_at: i64,
    #[serde(default, alias = "formSubmitTime")]
    pub form_submitted_at: Option<i64>,
    pub interaction_count: i64,
    #[serde(alias = "hasFocusEvents")]
    pub had_focus_event: bool,
    #[serde(alias = "hasMouseMovement")]
    pub had_pointer_movement: bool,
    /// Any other top-level keys; decoys posted as plain inputs land here.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SubmissionPayload {
    /// Whether the named decoy carries any content, either in `decoyFields`
    /// or as a top-level key.
    #[must_use]
    pub fn decoy_filled(&self, name: &str) -> bool {
        self.decoy_fields.get(name).is_some_and(is_filled)
            || self.extra.get(name).is_some_and(is_filled)
    }

    /// Names of every filled decoy.
    ///
    /// Every entry of `decoyFields` is a decoy. Top-level keys only count
    /// when listed in `configured`, since the form also posts unrelated
    /// inputs at the top level.
    #[must_use]
    pub fn filled_decoys<'a>(&'a self, configured: &'a BTreeSet<String>) -> Vec<&'a str> {
        let mut filled: BTreeSet<&str> = self
            .decoy_fields
            .iter()
            .filter(|(_, value)| is_filled(value))
            .map(|(name, _)| name.as_str())
            .collect();
        filled.extend(
            configured
                .iter()
                .filter(|name| self.extra.get(name.as_str()).is_some_and(is_filled))
                .map(String::as_str),
        );
        filled.into_iter().collect()
    }

    /// The trimmed segment attribute, if any non-blank one was supplied.
    #[must_use]
    pub fn attribute(&self) -> Option<&str> {
        self.segment_attribute
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// The email as it is sent downstream.
    #[must_use]
    pub fn normalized_email(&self) -> String {
        self.email.trim().to_ascii_lowercase()
    }
}

/// A string counts when non-empty; any other non-null JSON value counts.
fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Step 1: basic type and format constraints.
///
/// Returns the policy of the target segment on success.
///
/// # Errors
///
/// Returns a [`PayloadError`] describing the first violated constraint.
pub fn validate_shape<'a>(
    payload: &SubmissionPayload,
    config: &'a AdmissionConfig,
) -> Result<&'a SegmentPolicy, PayloadError> {
    validate_email(payload.email.trim())?;

    let policy = config
        .segment(&payload.list_segment)
        .ok_or_else(|| PayloadError::UnknownSegment {
            segment: payload.list_segment.clone(),
        })?;

    if payload.form_rendered_at <= 0 {
        return Err(PayloadError::InvalidNumber {
            field: "formRenderedAt",
            value: payload.form_rendered_at,
        });
    }
    if let Some(submitted) = payload.form_submitted_at.filter(|v| *v < 0) {
        return Err(PayloadError::InvalidNumber {
            field: "formSubmittedAt",
            value: submitted,
        });
    }
    if payload.interaction_count < 0 {
        return Err(PayloadError::InvalidNumber {
            field: "interactionCount",
            value: payload.interaction_count,
        });
    }

    Ok(policy)
}

/// Step 2: the segment's attribute requirement plus the attribute charset.
///
/// # Errors
///
/// Returns [`PayloadError::MissingAttribute`] when a required attribute is
/// absent or too short, [`PayloadError::InvalidAttribute`] when a supplied
/// attribute breaks the length or character rules.
pub fn validate_attribute(
    payload: &SubmissionPayload,
    policy: &SegmentPolicy,
) -> Result<(), PayloadError> {
    match payload.attribute() {
        None if policy.requires_attribute => Err(PayloadError::MissingAttribute {
            segment: payload.list_segment.clone(),
            min_len: policy.attribute_min_len,
        }),
        None => Ok(()),
        Some(value) => {
            if policy.requires_attribute && value.chars().count() < policy.attribute_min_len {
                return Err(PayloadError::MissingAttribute {
                    segment: payload.list_segment.clone(),
                    min_len: policy.attribute_min_len,
                });
            }
            validate_display_name(value)
        }
    }
}

/// Length and charset rules shared by segment attributes and the document
/// download endpoint: letters, digits, whitespace, `-`, `'` and `.`.
///
/// # Errors
///
/// Returns [`PayloadError::InvalidAttribute`] on violation.
pub fn validate_display_name(value: &str) -> Result<(), PayloadError> {
    if value.chars().count() > MAX_ATTRIBUTE_LEN {
        return Err(PayloadError::InvalidAttribute {
            reason: "longer than 100 characters",
        });
    }
    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '\'' | '.'))
    {
        return Err(PayloadError::InvalidAttribute {
            reason: "contains characters outside letters, digits, spaces, - ' .",
        });
    }
    Ok(())
}

/// Syntactic email validation.
///
/// Deliberately narrower than RFC 5322: one `@`, a dot-separated domain with
/// at least two labels, no whitespace or control characters.
fn validate_email(email: &str) -> Result<(), PayloadError> {
    if email.is_empty() {
        return Err(PayloadError::InvalidEmail { reason: "empty" });
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(PayloadError::InvalidEmail { reason: "too long" });
    }
    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(PayloadError::InvalidEmail {
            reason: "contains whitespace",
        });
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(PayloadError::InvalidEmail { reason: "missing @" });
    };
    if domain.contains('@') {
        return Err(PayloadError::InvalidEmail {
            reason: "more than one @",
        });
    }
    if local.is_empty() || local.len() > MAX_LOCAL_LEN {
        return Err(PayloadError::InvalidEmail {
            reason: "invalid local part",
        });
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return Err(PayloadError::InvalidEmail {
            reason: "invalid local part",
        });
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(PayloadError::InvalidEmail {
            reason: "domain has no dot",
        });
    }
    let label_ok = |label: &&str| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_alphanumeric() || c == '-')
    };
    if !labels.iter().all(label_ok) {
        return Err(PayloadError::InvalidEmail {
            reason: "invalid domain",
        });
    }
    if labels.last().is_some_and(|tld| tld.chars().count() < 2) {
        return Err(PayloadError::InvalidEmail {
            reason: "invalid top-level domain",
        });
    }

    Ok(())
}
