//! Admission configuration resolver.
//!
//! [`AdmissionConfig`] is an immutable snapshot of every threshold the
//! admission pipeline consults. It is resolved once at process start from
//! `LEADGATE_*` environment variables and shared by reference afterwards.
//! Resolution never fails: absent or malformed settings fall back to the
//! documented defaults.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Default lower bound on render-to-submit time.
pub const DEFAULT_MIN_ELAPSED_MS: u64 = 2_000;
/// Default upper bound on render-to-submit time (one hour).
pub const DEFAULT_MAX_ELAPSED_MS: u64 = 3_600_000;
/// Default minimum number of client-side interactions.
pub const DEFAULT_MIN_INTERACTIONS: u64 = 2;
/// Default decoy field names.
pub const DEFAULT_DECOY_FIELDS: [&str; 3] = ["website", "phone", "company"];
/// Default telemetry ring capacity.
pub const DEFAULT_TELEMETRY_CAPACITY: usize = 1_000;
/// Default number of records returned as `recent` in stats.
pub const DEFAULT_TELEMETRY_RECENT: usize = 50;
/// Minimum attribute length for segments that require one.
pub const DEFAULT_ATTRIBUTE_MIN_LEN: usize = 2;

/// Thresholds for a single admission evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmissionConfig {
    /// Submissions faster than this are rejected as `TOO_FAST`.
    pub min_elapsed_ms: u64,
    /// Submissions slower than this are rejected as `TOO_SLOW`.
    pub max_elapsed_ms: u64,
    /// Minimum client-side interaction count.
    pub min_interaction_count: u64,
    /// Whether a focus event on the primary input is mandatory.
    pub require_focus_event: bool,
    /// Whether pointer movement is mandatory.
    pub require_pointer_movement: bool,
    /// Whether decoy fields are checked at all.
    pub honeypot_enabled: bool,
    /// Field names that a human never fills.
    pub decoy_field_names: BTreeSet<String>,
    /// Verbosity of the per-decision log line.
    pub logging: DetectionLogging,
    /// Registration policy per audience segment.
    pub segments: BTreeMap<String, SegmentPolicy>,
    /// Telemetry ring capacity.
    pub telemetry_capacity: usize,
    /// Number of records reported as `recent` by stats.
    pub telemetry_recent: usize,
}

/// Logging settings for admission decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectionLogging {
    /// Emit a log line per decision.
    pub enabled: bool,
    /// Level used for rejection lines. Admissions are logged only at `Info`.
    pub level: DetectionLogLevel,
}

/// Log level for rejection lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionLogLevel {
    Info,
    Warn,
    Error,
}

impl DetectionLogLevel {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// How a segment accepts registrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentPolicy {
    /// Registry list id. `None` means the segment is accepted by the form but
    /// has no downstream target.
    pub list_id: Option<u64>,
    /// Whether `segmentAttribute` is mandatory.
    pub requires_attribute: bool,
    /// Minimum trimmed attribute length when required.
    pub attribute_min_len: usize,
    /// Registry attribute key the segment attribute is stored under.
    pub attribute_key: String,
    /// Whether a personalized document follows a successful registration.
    pub delivers_document: bool,
}

impl SegmentPolicy {
    /// Built-in defaults: `vets` registers a clinic and receives the
    /// personalized guide, everything else registers an email only.
    fn builtin(name: &str) -> Self {
        let professional = name == "vets";
        Self {
            list_id: None,
            requires_attribute: professional,
            attribute_min_len: DEFAULT_ATTRIBUTE_MIN_LEN,
            attribute_key: if professional {
                "CLINIC_NAME".to_owned()
            } else {
                "ORGANIZATION".to_owned()
            },
            delivers_document: professional,
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AdmissionConfig {
    /// Resolve the configuration from the process environment.
    ///
    /// Environment variables:
    /// - `LEADGATE_MIN_FORM_TIME_MS` (default: `2000`)
    /// - `LEADGATE_MAX_FORM_TIME_MS` (default: `3600000`)
    /// - `LEADGATE_MIN_INTERACTIONS` (default: `2`)
    /// - `LEADGATE_REQUIRE_FOCUS`, `LEADGATE_REQUIRE_POINTER`,
    ///   `LEADGATE_HONEYPOT_ENABLED` (default: `true`)
    /// - `LEADGATE_DECOY_FIELDS`: comma list (default: `website,phone,company`)
    /// - `LEADGATE_DETECTION_LOGGING` (default: `true`)
    /// - `LEADGATE_DETECTION_LOG_LEVEL`: `info`, `warn`, `error` (default: `warn`)
    /// - `LEADGATE_TELEMETRY_CAPACITY` (default: `1000`)
    /// - `LEADGATE_TELEMETRY_RECENT` (default: `50`)
    /// - `LEADGATE_SEGMENTS`: comma list (default: `tutors,vets`)
    /// - `LEADGATE_SEGMENT_<NAME>_LIST_ID`, `..._REQUIRES_ATTRIBUTE`,
    ///   `..._ATTRIBUTE_KEY`, `..._DELIVERS_DOCUMENT`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        let flag = |key: &str, default: bool| -> bool {
            lookup(key).map_or(default, |v| {
                let v = v.trim().to_ascii_lowercase();
                if default {
                    v != "false" && v != "0"
                } else {
                    v == "true" || v == "1"
                }
            })
        };

        let decoy_field_names = lookup("LEADGATE_DECOY_FIELDS")
            .map(|v| split_list(&v))
            .filter(|names| !names.is_empty())
            .unwrap_or_else(|| DEFAULT_DECOY_FIELDS.iter().map(|s| (*s).to_owned()).collect());

        let segment_names = lookup("LEADGATE_SEGMENTS")
            .map(|v| split_list(&v))
            .filter(|names| !names.is_empty())
            .unwrap_or_else(|| ["tutors", "vets"].iter().map(|s| (*s).to_owned()).collect());

        let segments = segment_names
            .into_iter()
            .map(|name| {
                let prefix = format!("LEADGATE_SEGMENT_{}", env_key(&name));
                let builtin = SegmentPolicy::builtin(&name);
                let policy = SegmentPolicy {
                    list_id: lookup(&format!("{prefix}_LIST_ID"))
                        .and_then(|v| v.trim().parse().ok()),
                    requires_attribute: flag(
                        &format!("{prefix}_REQUIRES_ATTRIBUTE"),
                        builtin.requires_attribute,
                    ),
                    attribute_min_len: builtin.attribute_min_len,
                    attribute_key: lookup(&format!("{prefix}_ATTRIBUTE_KEY"))
                        .map(|v| v.trim().to_owned())
                        .filter(|v| !v.is_empty())
                        .unwrap_or(builtin.attribute_key),
                    delivers_document: flag(
                        &format!("{prefix}_DELIVERS_DOCUMENT"),
                        builtin.delivers_document,
                    ),
                };
                (name, policy)
            })
            .collect();

        let capacity = usize::try_from(number(
            "LEADGATE_TELEMETRY_CAPACITY",
            DEFAULT_TELEMETRY_CAPACITY as u64,
        ))
        .unwrap_or(DEFAULT_TELEMETRY_CAPACITY);
        let recent = usize::try_from(number(
            "LEADGATE_TELEMETRY_RECENT",
            DEFAULT_TELEMETRY_RECENT as u64,
        ))
        .unwrap_or(DEFAULT_TELEMETRY_RECENT);

        Self {
            min_elapsed_ms: number("LEADGATE_MIN_FORM_TIME_MS", DEFAULT_MIN_ELAPSED_MS),
            max_elapsed_ms: number("LEADGATE_MAX_FORM_TIME_MS", DEFAULT_MAX_ELAPSED_MS),
            min_interaction_count: number("LEADGATE_MIN_INTERACTIONS", DEFAULT_MIN_INTERACTIONS),
            require_focus_event: flag("LEADGATE_REQUIRE_FOCUS", true),
            require_pointer_movement: flag("LEADGATE_REQUIRE_POINTER", true),
            honeypot_enabled: flag("LEADGATE_HONEYPOT_ENABLED", true),
            decoy_field_names,
            logging: DetectionLogging {
                enabled: flag("LEADGATE_DETECTION_LOGGING", true),
                level: lookup("LEADGATE_DETECTION_LOG_LEVEL")
                    .and_then(|v| DetectionLogLevel::parse(&v))
                    .unwrap_or(DetectionLogLevel::Warn),
            },
            segments,
            telemetry_capacity: if capacity == 0 { DEFAULT_TELEMETRY_CAPACITY } else { capacity },
            telemetry_recent: recent,
        }
    }

    /// Look up the policy for a segment.
    #[must_use]
    pub fn segment(&self, name: &str) -> Option<&SegmentPolicy> {
        self.segments.get(name)
    }
}

/// Split a comma list into trimmed, non-empty entries.
fn split_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Segment name as it appears inside an environment variable name.
fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
