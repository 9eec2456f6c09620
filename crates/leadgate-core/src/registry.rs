//! Contact registry collaborator.
//!
//! The registry is the mailing-list provider. It accepts an email against a
//! list id and reports "already present" separately from failure.

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::RwLock;

use crate::error::RegistryError;

/// Successful registry answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    AlreadyExists,
}

/// A mailing-list provider.
///
/// Implementations must be safe to share across async tasks.
#[async_trait::async_trait]
pub trait ContactRegistry: Send + Sync {
    /// The registry's name (for logs).
    fn name(&self) -> &str;

    /// Register `email` on `list_id` with optional contact attributes.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] for anything other than success or a
    /// duplicate contact.
    async fn register(
        &self,
        email: &str,
        list_id: u64,
        attributes: &BTreeMap<String, String>,
    ) -> Result<Registration, RegistryError>;
}

/// In-memory registry for development and tests.
///
/// Contacts are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryContactRegistry {
    contacts: RwLock<BTreeSet<(u64, String)>>,
}

impl MemoryContactRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `email` is registered on `list_id`.
    pub async fn contains(&self, email: &str, list_id: u64) -> bool {
        self.contacts
            .read()
            .await
            .contains(&(list_id, email.to_owned()))
    }

    /// Number of registrations across all lists.
    pub async fn len(&self) -> usize {
        self.contacts.read().await.len()
    }
}

#[async_trait::async_trait]
impl ContactRegistry for MemoryContactRegistry {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "memory"
    }

    async fn register(
        &self,
        email: &str,
        list_id: u64,
        _attributes: &BTreeMap<String, String>,
    ) -> Result<Registration, RegistryError> {
        let inserted = self
            .contacts
            .write()
            .await
            .insert((list_id, email.to_owned()));
        Ok(if inserted {
            Registration::Created
        } else {
            Registration::AlreadyExists
        })
    }
}
