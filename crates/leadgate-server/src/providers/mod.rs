//! HTTP-backed collaborators.

pub mod brevo;

pub use brevo::{BrevoContactRegistry, BrevoDocumentMailer};
