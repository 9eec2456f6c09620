//! Brevo contact registry and transactional mailer.
//!
//! Both talk to the Brevo v3 REST API with the `api-key` header. Provider
//! response bodies are kept in the returned errors for server-side logs and
//! are never forwarded to HTTP clients.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine;
use serde_json::{Value, json};

use leadgate_core::document::DocumentMailer;
use leadgate_core::error::{DeliveryError, RegistryError};
use leadgate_core::registry::{ContactRegistry, Registration};

use crate::config::BrevoConfig;

/// Per-request timeout for Brevo calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Brevo error code for an already-present contact.
const DUPLICATE_CODE: &str = "duplicate_parameter";
/// Subject line of the document email.
const DOCUMENT_SUBJECT: &str = "Seu material de apoio personalizado";

fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()
}

/// Registers contacts on Brevo lists.
pub struct BrevoContactRegistry {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl BrevoContactRegistry {
    /// Build a registry client.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotConfigured` if the HTTP client cannot be
    /// built.
    pub fn new(config: &BrevoConfig) -> Result<Self, RegistryError> {
        let http = http_client().map_err(|e| RegistryError::NotConfigured {
            reason: format!("http client: {e}"),
        })?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
        })
    }
}

/// JSON body for `POST /v3/contacts`.
fn contact_body(email: &str, list_id: u64, attributes: &BTreeMap<String, String>) -> Value {
    let mut body = json!({
        "email": email,
        "listIds": [list_id],
        "updateEnabled": false,
    });
    if !attributes.is_empty() {
        body["attributes"] = json!(attributes);
    }
    body
}

/// Whether a 400 body is Brevo's duplicate-contact answer.
fn is_duplicate(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("code").and_then(Value::as_str).map(|c| c == DUPLICATE_CODE))
        .unwrap_or(false)
}

/// Map a contact-creation response to a registration outcome.
fn classify(status: reqwest::StatusCode, body: String) -> Result<Registration, RegistryError> {
    if status.is_success() {
        return Ok(Registration::Created);
    }
    if status == reqwest::StatusCode::BAD_REQUEST && is_duplicate(&body) {
        return Ok(Registration::AlreadyExists);
    }
    Err(RegistryError::Provider {
        status: status.as_u16(),
        body,
    })
}

#[async_trait::async_trait]
impl ContactRegistry for BrevoContactRegistry {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "brevo"
    }

    async fn register(
        &self,
        email: &str,
        list_id: u64,
        attributes: &BTreeMap<String, String>,
    ) -> Result<Registration, RegistryError> {
        let resp = self
            .http
            .post(format!("{}/v3/contacts", self.base_url))
            .header("api-key", &self.api_key)
            .json(&contact_body(email, list_id, attributes))
            .send()
            .await
            .map_err(|e| RegistryError::Transport {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(Registration::Created);
        }
        classify(status, resp.text().await.unwrap_or_default())
    }
}

impl std::fmt::Debug for BrevoContactRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrevoContactRegistry")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Sends rendered documents as transactional email attachments.
pub struct BrevoDocumentMailer {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    sender_email: String,
    sender_name: String,
}

impl BrevoDocumentMailer {
    /// Build a mailer. Returns `None` when no sender address is configured.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &BrevoConfig) -> Result<Option<Self>, DeliveryError> {
        let Some(sender_email) = config.sender_email.clone() else {
            return Ok(None);
        };
        let http = http_client().map_err(|e| DeliveryError::Transport {
            reason: format!("http client: {e}"),
        })?;
        Ok(Some(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            sender_email,
            sender_name: config.sender_name.clone(),
        }))
    }

    fn email_body(&self, email: &str, recipient_name: &str, file_name: &str, document: &[u8]) -> Value {
        let content = base64::engine::general_purpose::STANDARD.encode(document);
        json!({
            "sender": { "name": self.sender_name, "email": self.sender_email },
            "to": [{ "email": email, "name": recipient_name }],
            "subject": DOCUMENT_SUBJECT,
            "htmlContent": format!(
                "<p>Olá, {}!</p><p>Segue em anexo o material personalizado.</p>",
                escape_html(recipient_name)
            ),
            "attachment": [{ "name": file_name, "content": content }],
        })
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[async_trait::async_trait]
impl DocumentMailer for BrevoDocumentMailer {
    async fn deliver(
        &self,
        email: &str,
        recipient_name: &str,
        file_name: &str,
        document: &[u8],
    ) -> Result<(), DeliveryError> {
        let resp = self
            .http
            .post(format!("{}/v3/smtp/email", self.base_url))
            .header("api-key", &self.api_key)
            .json(&self.email_body(email, recipient_name, file_name, document))
            .send()
            .await
            .map_err(|e| DeliveryError::Transport {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        Err(DeliveryError::Provider {
            status: status.as_u16(),
            body: resp.text().await.unwrap_or_default(),
        })
    }
}

impl std::fmt::Debug for BrevoDocumentMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrevoDocumentMailer")
            .field("base_url", &self.base_url)
            .field("sender_email", &self.sender_email)
            .finish_non_exhaustive()
    }
}
