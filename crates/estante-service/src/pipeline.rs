//! # Request Pipeline
//!
//! Every facade call runs through the same ordered stages.
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ authenticate │──►│  authorize  │──►│   execute    │──►│    audit     │
//! │ TokenVerifier│   │   Policy    │   │ engine call  │   │ AuditEngine  │
//! └──────┬───────┘   └──────┬──────┘   └──────┬───────┘   └──────┬───────┘
//!        │ Unauthenticated  │ Forbidden       │ any error        │ failure
//!        ▼                  ▼                 ▼                  ▼
//!     return Err         return Err       return Err     Ok(Outcome { value,
//!                                       (nothing logged)   audit_error })
//! ```
//!
//! The audit stage runs only after the engine call has committed. A failed
//! append is reported next to the value instead of replacing it.

use std::future::Future;
use std::sync::Arc;

use estante_core::{LogDetails, NewLogEntry, Principal, Role};
use tracing::{debug, warn};

use crate::collaborators::TokenVerifier;
use crate::engine::AuditEngine;
use crate::error::{ServiceError, ServiceResult};

// =============================================================================
// Policies
// =============================================================================

/// What a caller must hold to pass the authorize stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// A verified token; membership claims not required.
    Authenticated,
    /// Sebo and role claims present, role in the set.
    Roles(&'static [Role]),
}

pub const BOOKS_READ: Policy = Policy::Roles(&[Role::Admin, Role::Editor, Role::Reader]);
pub const BOOKS_WRITE: Policy = Policy::Roles(&[Role::Admin, Role::Editor]);
pub const SALES_CREATE: Policy = Policy::Roles(&[Role::Admin, Role::Editor]);
pub const SALES_READ: Policy = Policy::Roles(&[Role::Admin, Role::Editor]);
pub const SALES_ADMIN: Policy = Policy::Roles(&[Role::Admin]);
pub const LOGS: Policy = Policy::Roles(&[Role::Admin]);
pub const EMPLOYEES: Policy = Policy::Roles(&[Role::Admin]);
pub const MEMBERS: Policy = Policy::Roles(&[Role::Admin, Role::Editor, Role::Reader]);

/// Result of a successful call plus the audit append error, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub audit_error: Option<ServiceError>,
}

impl<T> Outcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            audit_error: self.audit_error,
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

#[derive(Clone)]
pub struct Pipeline {
    verifier: Arc<dyn TokenVerifier>,
    audit: AuditEngine,
}

impl Pipeline {
    pub fn new(verifier: Arc<dyn TokenVerifier>, audit: AuditEngine) -> Self {
        Pipeline { verifier, audit }
    }

    pub async fn authenticate(&self, token: Option<&str>) -> ServiceResult<Principal> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServiceError::Unauthenticated("Missing bearer token".to_string()))?;
        self.verifier.verify(token).await
    }

    pub fn authorize(principal: &Principal, policy: Policy) -> ServiceResult<()> {
        match policy {
            Policy::Authenticated => Ok(()),
            Policy::Roles(allowed) => match principal.membership() {
                None => Err(ServiceError::forbidden("account is not registered to a sebo")),
                Some((_, role)) if allowed.contains(&role) => Ok(()),
                Some((_, role)) => Err(ServiceError::forbidden(format!(
                    "role {} may not perform this action",
                    role
                ))),
            },
        }
    }

    /// Runs `execute` for an authorized caller and audits it as `action`.
    ///
    /// `execute` returns the value and the details to log. With `action`
    /// set to `None` the details are dropped.
    pub async fn run<T, F, Fut>(
        &self,
        token: Option<&str>,
        policy: Policy,
        action: Option<&'static str>,
        execute: F,
    ) -> ServiceResult<Outcome<T>>
    where
        F: FnOnce(Principal) -> Fut,
        Fut: Future<Output = ServiceResult<(T, LogDetails)>>,
    {
        let principal = self.authenticate(token).await?;
        Self::authorize(&principal, policy)?;

        let audit_as = action.map(|a| (a, principal.clone()));
        let (value, details) = execute(principal).await?;

        let audit_error = match audit_as {
            None => None,
            Some((action, principal)) => self.audit(&principal, action, details).await.err(),
        };

        Ok(Outcome { value, audit_error })
    }

    async fn audit(
        &self,
        principal: &Principal,
        action: &str,
        details: LogDetails,
    ) -> ServiceResult<()> {
        let Some((sebo_id, _)) = principal.membership() else {
            return Err(ServiceError::Internal(format!(
                "cannot audit '{}' without a sebo claim",
                action
            )));
        };

        let user_name = if principal.name.trim().is_empty() {
            principal.email.clone()
        } else {
            principal.name.clone()
        };
        let entry = NewLogEntry {
            user_id: principal.user_id.clone(),
            user_name,
            action: action.to_string(),
            details,
        };

        match self.audit.record(sebo_id, entry).await {
            Ok(stored) => {
                debug!(sebo_id = %sebo_id, action = %action, log_id = %stored.log_id, "Action audited");
                Ok(())
            }
            Err(e) => {
                warn!(sebo_id = %sebo_id, action = %action, error = %e, "Audit append failed");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StaticTokens;
    use chrono::Utc;
    use estante_core::Sebo;
    use estante_db::{Database, DbConfig};
    use serde_json::json;

    fn principal(user_id: &str, sebo: Option<&str>, role: Option<Role>) -> Principal {
        Principal {
            user_id: user_id.to_string(),
            email: format!("{}@sebo.com", user_id),
            name: String::new(),
            sebo_id: sebo.map(str::to_string),
            role,
        }
    }

    async fn setup() -> (Pipeline, AuditEngine) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.sebos()
            .insert(&Sebo {
                sebo_id: "s1".to_string(),
                owner_user_id: "admin".to_string(),
                display_name: "Sebo do Centro".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let tokens = StaticTokens::new()
            .with("t-admin", principal("admin", Some("s1"), Some(Role::Admin)))
            .with("t-reader", principal("reader", Some("s1"), Some(Role::Reader)))
            .with("t-new", principal("newcomer", None, None))
            .with("t-ghost", principal("ghost", Some("gone"), Some(Role::Admin)));

        let audit = AuditEngine::new(db);
        (Pipeline::new(Arc::new(tokens), audit.clone()), audit)
    }

    fn details() -> LogDetails {
        [("isbn".to_string(), json!("9780140449136"))].into_iter().collect()
    }

    #[tokio::test]
    async fn test_missing_and_unknown_token() {
        let (pipeline, _) = setup().await;

        let missing = pipeline
            .run(None, Policy::Authenticated, None, |_| async { Ok(((), LogDetails::new())) })
            .await;
        assert!(matches!(missing, Err(ServiceError::Unauthenticated(_))));

        let unknown = pipeline
            .run(Some("t-nope"), Policy::Authenticated, None, |_| async {
                Ok(((), LogDetails::new()))
            })
            .await;
        assert!(matches!(unknown, Err(ServiceError::Unauthenticated(_))));
    }

    #[test]
    fn test_authorize() {
        let reader = principal("reader", Some("s1"), Some(Role::Reader));
        let newcomer = principal("newcomer", None, None);

        assert!(Pipeline::authorize(&reader, BOOKS_READ).is_ok());
        assert!(matches!(
            Pipeline::authorize(&reader, BOOKS_WRITE),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(Pipeline::authorize(&newcomer, Policy::Authenticated).is_ok());
        assert!(matches!(
            Pipeline::authorize(&newcomer, BOOKS_READ),
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_success_is_audited() {
        let (pipeline, audit) = setup().await;

        let outcome = pipeline
            .run(Some("t-admin"), BOOKS_WRITE, Some("delete_book"), |p| async move {
                Ok((p.user_id, details()))
            })
            .await
            .unwrap();

        assert_eq!(outcome.value, "admin");
        assert!(outcome.audit_error.is_none());

        let logs = audit.fetch_all_logs("s1").await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "delete_book");
        assert_eq!(logs[0].user_name, "admin@sebo.com");
        assert_eq!(logs[0].details, details());
    }

    #[tokio::test]
    async fn test_failure_short_circuits_audit() {
        let (pipeline, audit) = setup().await;

        let result: ServiceResult<Outcome<()>> = pipeline
            .run(Some("t-admin"), BOOKS_WRITE, Some("delete_book"), |_| async {
                Err(ServiceError::not_found("Book", "123"))
            })
            .await;

        assert!(matches!(result, Err(ServiceError::NotFound(_))));
        assert!(audit.fetch_all_logs("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forbidden_never_executes() {
        let (pipeline, _) = setup().await;
        let mut executed = false;

        let result = pipeline
            .run(Some("t-reader"), BOOKS_WRITE, Some("delete_book"), |_| {
                executed = true;
                async { Ok(((), LogDetails::new())) }
            })
            .await;

        assert!(matches!(result, Err(ServiceError::Forbidden(_))));
        assert!(!executed);
    }

    #[tokio::test]
    async fn test_audit_failure_keeps_value() {
        let (pipeline, _) = setup().await;

        let outcome = pipeline
            .run(Some("t-ghost"), BOOKS_WRITE, Some("delete_book"), |_| async {
                Ok((42, details()))
            })
            .await
            .unwrap();

        assert_eq!(outcome.value, 42);
        assert!(matches!(outcome.audit_error, Some(ServiceError::NotFound(_))));
    }
}
