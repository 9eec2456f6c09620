//! One-way email fingerprints.
//!
//! Telemetry correlates repeat submitters without holding addresses: every
//! email is HMAC-SHA256'd under a process key before it reaches a record.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Keyed hasher for email addresses.
pub struct EmailFingerprinter {
    key: Vec<u8>,
}

impl EmailFingerprinter {
    /// Create a fingerprinter with a fixed key (stable across restarts).
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    /// Create a fingerprinter with a random per-process key.
    ///
    /// Fingerprints from different processes will not match.
    #[must_use]
    pub fn ephemeral() -> Self {
        // Two UUID v4s = 32 bytes of OS CSPRNG randomness.
        let a = uuid::Uuid::new_v4();
        let b = uuid::Uuid::new_v4();
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(a.as_bytes());
        key.extend_from_slice(b.as_bytes());
        Self { key }
    }

    /// Hex-encoded HMAC of the trimmed, lower-cased address.
    #[must_use]
    pub fn fingerprint(&self, email: &str) -> String {
        // HMAC takes keys of any length; the error arm is unreachable.
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.key) else {
            return String::new();
        };
        mac.update(email.trim().to_ascii_lowercase().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for EmailFingerprinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailFingerprinter")
            .field("key", &"[REDACTED]")
            .finish()
    }
}
