//! External identity provider (account credentials).
//!
//! The service never stores passwords. Employee provisioning asks the
//! provider for a new identity and keeps only the returned subject id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{ServiceError, ServiceResult};

/// A freshly created external identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionedIdentity {
    pub user_id: String,
    pub password_reset_link: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Creates an identity. Fails with `Conflict` when the email is taken.
    async fn create_user(
        &self,
        email: &str,
        display_name: &str,
        password: &str,
    ) -> ServiceResult<ProvisionedIdentity>;

    async fn delete_user(&self, user_id: &str) -> ServiceResult<()>;
}

#[derive(Debug, Clone)]
struct StoredIdentity {
    email: String,
    display_name: String,
}

/// Identity provider backed by a map. Ids are `idp-1`, `idp-2`, …
#[derive(Debug, Default)]
pub struct InMemoryIdentityProvider {
    identities: Mutex<HashMap<String, StoredIdentity>>,
    next_id: AtomicUsize,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.identities
            .lock()
            .map(|ids| ids.contains_key(user_id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.identities.lock().map(|ids| ids.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display name stored for an identity.
    pub fn display_name(&self, user_id: &str) -> Option<String> {
        self.identities
            .lock()
            .ok()
            .and_then(|ids| ids.get(user_id).map(|i| i.display_name.clone()))
    }
}

fn poisoned() -> ServiceError {
    ServiceError::Internal("identity store lock poisoned".to_string())
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn create_user(
        &self,
        email: &str,
        display_name: &str,
        _password: &str,
    ) -> ServiceResult<ProvisionedIdentity> {
        let mut identities = self.identities.lock().map_err(|_| poisoned())?;

        if identities.values().any(|i| i.email.eq_ignore_ascii_case(email)) {
            return Err(ServiceError::Conflict(format!(
                "identity with email '{}' already exists",
                email
            )));
        }

        let user_id = format!("idp-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        identities.insert(
            user_id.clone(),
            StoredIdentity {
                email: email.to_string(),
                display_name: display_name.to_string(),
            },
        );

        Ok(ProvisionedIdentity {
            password_reset_link: Some(format!("https://auth.estante.local/reset?uid={}", user_id)),
            user_id,
        })
    }

    async fn delete_user(&self, user_id: &str) -> ServiceResult<()> {
        let mut identities = self.identities.lock().map_err(|_| poisoned())?;
        match identities.remove(user_id) {
            Some(_) => Ok(()),
            None => Err(ServiceError::not_found("Identity", user_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_delete() {
        let idp = InMemoryIdentityProvider::new();

        let created = idp.create_user("ana@sebo.com", "Ana", "pw").await.unwrap();
        assert_eq!(created.user_id, "idp-1");
        assert!(idp.contains("idp-1"));
        assert_eq!(idp.display_name("idp-1").as_deref(), Some("Ana"));

        idp.delete_user("idp-1").await.unwrap();
        assert!(idp.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let idp = InMemoryIdentityProvider::new();
        idp.create_user("ana@sebo.com", "Ana", "pw").await.unwrap();

        let result = idp.create_user("ANA@sebo.com", "Ana 2", "pw").await;
        assert!(matches!(result, Err(ServiceError::Conflict(_))));
    }
}
