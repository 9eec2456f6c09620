//! Server configuration for `Leadgate`.
//!
//! Loads process-level settings from environment variables with sensible
//! defaults. Admission thresholds live in `leadgate_core::config` and are
//! resolved separately.

use std::net::SocketAddr;

/// Default Brevo API origin.
pub const DEFAULT_BREVO_BASE_URL: &str = "https://api.brevo.com";
/// Default sender display name for document emails.
pub const DEFAULT_SENDER_NAME: &str = "Leadgate";

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Shared secret expected in `x-admin-token`.
    pub admin_token: Option<String>,
    /// Allow admin reads when no token is configured.
    pub admin_fail_open: bool,
    /// Key for email fingerprints. A random per-process key is used if unset.
    pub fingerprint_key: Option<String>,
    /// Externally reachable origin, used for fallback download links.
    pub public_url: String,
    /// Brevo settings (None if `BREVO_API_KEY` is not set).
    pub brevo: Option<BrevoConfig>,
}

/// Brevo contact registry and transactional mail settings.
#[derive(Clone)]
pub struct BrevoConfig {
    pub api_key: String,
    pub base_url: String,
    /// Sender address for document emails. Without it no mailer is built.
    pub sender_email: Option<String>,
    pub sender_name: String,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT`: port to bind on (binds to `0.0.0.0`)
    /// - `LEADGATE_BIND_ADDR`: full bind address (overrides `PORT`, default: `127.0.0.1:3000`)
    /// - `LEADGATE_LOG_LEVEL`: log filter (default: `info`)
    /// - `LEADGATE_ADMIN_TOKEN`: admin shared secret (optional)
    /// - `LEADGATE_ADMIN_FAIL_OPEN`: allow admin reads without a token (default: `false`)
    /// - `LEADGATE_FINGERPRINT_KEY`: HMAC key for email fingerprints (optional)
    /// - `LEADGATE_PUBLIC_URL`: public origin (default: `http://<bind addr>`)
    /// - `BREVO_API_KEY`: enables the Brevo registry and mailer
    /// - `BREVO_BASE_URL`: Brevo API origin (default: `https://api.brevo.com`)
    /// - `LEADGATE_SENDER_EMAIL`, `LEADGATE_SENDER_NAME`: document email sender
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] over an arbitrary lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Priority: LEADGATE_BIND_ADDR > PORT > default 127.0.0.1:3000
        let bind_addr = if let Some(addr) = lookup("LEADGATE_BIND_ADDR") {
            addr.parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 3000)))
        } else if let Some(port_str) = lookup("PORT") {
            let port: u16 = port_str.parse().unwrap_or(3000);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], 3000))
        };

        let log_level = lookup("LEADGATE_LOG_LEVEL").unwrap_or_else(|| "info".to_owned());

        let admin_fail_open = lookup("LEADGATE_ADMIN_FAIL_OPEN")
            .is_some_and(|v| v == "true" || v == "1");

        let public_url = non_empty("LEADGATE_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://{bind_addr}"));

        let brevo = non_empty("BREVO_API_KEY").map(|api_key| BrevoConfig {
            api_key,
            base_url: non_empty("BREVO_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BREVO_BASE_URL.to_owned()),
            sender_email: non_empty("LEADGATE_SENDER_EMAIL"),
            sender_name: non_empty("LEADGATE_SENDER_NAME")
                .unwrap_or_else(|| DEFAULT_SENDER_NAME.to_owned()),
        });

        Self {
            bind_addr,
            log_level,
            admin_token: non_empty("LEADGATE_ADMIN_TOKEN"),
            admin_fail_open,
            fingerprint_key: non_empty("LEADGATE_FINGERPRINT_KEY"),
            public_url,
            brevo,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[redacted]"))
            .field("admin_fail_open", &self.admin_fail_open)
            .field("public_url", &self.public_url)
            .field("brevo", &self.brevo)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for BrevoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrevoConfig")
            .field("api_key", &"[redacted]")
            .field("base_url", &self.base_url)
            .field("sender_email", &self.sender_email)
            .field("sender_name", &self.sender_name)
            .finish()
    }
}
