//! Error types for `leadgate-core`.
//!
//! Each error variant carries enough context to diagnose the problem from
//! server-side logs. None of them carry a raw email address, and provider
//! response bodies stay inside [`RegistryError`] / [`DeliveryError`] where the
//! HTTP layer never forwards them to clients.

/// A submission that fails shape validation or the segment attribute policy.
///
/// These precede the bot/human judgment and are never recorded to telemetry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    /// The email address is syntactically invalid.
    #[error("invalid email address: {reason}")]
    InvalidEmail { reason: &'static str },

    /// The target segment is not one of the configured segments.
    #[error("unknown segment '{segment}'")]
    UnknownSegment { segment: String },

    /// A numeric field holds a negative or otherwise impossible value.
    #[error("invalid value for '{field}': {value}")]
    InvalidNumber { field: &'static str, value: i64 },

    /// The segment requires an attribute and none (or too short) was given.
    #[error("segment '{segment}' requires an attribute of at least {min_len} characters")]
    MissingAttribute { segment: String, min_len: usize },

    /// The supplied attribute breaks the length or character rules.
    #[error("invalid segment attribute: {reason}")]
    InvalidAttribute { reason: &'static str },
}

/// Errors from the contact registry collaborator.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The provider answered with a non-success status.
    #[error("registry returned status {status}: {body}")]
    Provider { status: u16, body: String },

    /// The provider could not be reached or the response was unreadable.
    #[error("registry transport error: {reason}")]
    Transport { reason: String },

    /// The registry client is missing required configuration.
    #[error("registry not configured: {reason}")]
    NotConfigured { reason: String },
}

/// Errors from the document renderer.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The name cannot be placed on the document.
    #[error("cannot render document: {reason}")]
    InvalidName { reason: String },

    /// Rendering failed for any other reason.
    #[error("document rendering failed: {reason}")]
    Failed { reason: String },
}

/// Errors from the document delivery channel.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The delivery provider rejected the message.
    #[error("delivery provider returned status {status}: {body}")]
    Provider { status: u16, body: String },

    /// The delivery provider could not be reached.
    #[error("delivery transport error: {reason}")]
    Transport { reason: String },
}

/// Caller-facing outcome of a failed subscription attempt.
///
/// Admission-control reasons are collapsed into [`SubscribeError::Rejected`];
/// the specific heuristic only lives in telemetry.
#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    /// The payload was malformed (shape or attribute policy).
    #[error("malformed submission: {0}")]
    Malformed(#[from] PayloadError),

    /// An admission-control check rejected the submission.
    #[error("submission rejected")]
    Rejected,

    /// The address is already registered on the target segment.
    #[error("email already subscribed")]
    AlreadySubscribed,

    /// The contact registry failed.
    #[error("registry failure: {0}")]
    Registry(#[from] RegistryError),
}
