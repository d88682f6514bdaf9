//! # Account Engine
//!
//! Registration, employee provisioning, and account maintenance.
//!
//! ## Two Systems, No Shared Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add_employee                                                           │
//! │                                                                         │
//! │   1. IdentityProvider.create_user ──► identity exists                   │
//! │   2. UserRepository.register ── fails ──► IdentityProvider.delete_user  │
//! │                              │             (compensating action)        │
//! │                              ▼ ok                                       │
//! │   3. ClaimsMirror.set_claims ── fails ──► error to caller,              │
//! │                                          account stays (mirror is       │
//! │                                          retried by re-saving the role) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Business rules (who may delete or edit whom) live in
//! [`estante_core::access`]; this engine loads records and applies the plan.

use std::sync::Arc;

use chrono::Utc;
use estante_core::access::{
    check_promotion_candidate, check_user_read, check_user_update, plan_user_deletion,
    DeletionPlan, Requester,
};
use estante_core::validation::{validate_email, validate_id, validate_name, validate_new_employee};
use estante_core::{
    DeletionInfo, NewEmployee, ProvisionedEmployee, Registration, Role, Sebo, User, UserPatch,
    ValidationError,
};
use estante_db::Database;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collaborators::{ClaimsMirror, IdentityProvider};
use crate::error::{ServiceError, ServiceResult};

/// Length of generated employee passwords.
pub const TEMPORARY_PASSWORD_LEN: usize = 12;

pub fn temporary_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TEMPORARY_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

#[derive(Clone)]
pub struct AccountEngine {
    db: Database,
    identity: Arc<dyn IdentityProvider>,
    claims: Arc<dyn ClaimsMirror>,
}

impl AccountEngine {
    pub fn new(
        db: Database,
        identity: Arc<dyn IdentityProvider>,
        claims: Arc<dyn ClaimsMirror>,
    ) -> Self {
        AccountEngine {
            db,
            identity,
            claims,
        }
    }

    async fn load_user(&self, user_id: &str) -> ServiceResult<User> {
        self.db
            .users()
            .get(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", user_id))
    }

    async fn mirror_claims(&self, user: &User) -> ServiceResult<()> {
        self.claims
            .set_claims(&user.user_id, &user.sebo_id, user.role)
            .await
            .map_err(|e| {
                warn!(user_id = %user.user_id, error = %e, "Claims mirror failed after commit");
                e
            })
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers the caller's account.
    ///
    /// Joining an existing sebo yields a Reader; otherwise a new sebo is
    /// created and the caller becomes its Admin.
    pub async fn register_user(
        &self,
        user_id: &str,
        email: &str,
        name: &str,
        payload: &Registration,
    ) -> ServiceResult<User> {
        validate_id("userId", user_id)?;
        validate_email(email)?;
        validate_name("name", name)?;

        if self.db.users().get(user_id).await?.is_some() {
            return Err(ServiceError::Conflict(format!("user {} already registered", user_id)));
        }

        let requested = payload
            .sebo_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let existing = match requested {
            Some(id) => self.db.sebos().get(id).await?,
            None => None,
        };

        let now = Utc::now();
        let (user, new_sebo) = match existing {
            Some(sebo) => (
                User {
                    user_id: user_id.to_string(),
                    name: name.trim().to_string(),
                    email: email.trim().to_string(),
                    sebo_id: sebo.sebo_id,
                    role: Role::Reader,
                    registered_at: now,
                },
                None,
            ),
            None => {
                let display_name = payload
                    .sebo_name
                    .as_deref()
                    .ok_or_else(|| ValidationError::required("seboName"))?;
                validate_name("seboName", display_name)?;

                let sebo = Sebo {
                    sebo_id: requested
                        .map(str::to_string)
                        .unwrap_or_else(|| Uuid::new_v4().to_string()),
                    owner_user_id: user_id.to_string(),
                    display_name: display_name.trim().to_string(),
                    created_at: now,
                };
                let user = User {
                    user_id: user_id.to_string(),
                    name: name.trim().to_string(),
                    email: email.trim().to_string(),
                    sebo_id: sebo.sebo_id.clone(),
                    role: Role::Admin,
                    registered_at: now,
                };
                (user, Some(sebo))
            }
        };

        self.db.users().register(&user, new_sebo.as_ref()).await?;
        self.mirror_claims(&user).await?;

        Ok(user)
    }

    // =========================================================================
    // Employees
    // =========================================================================

    /// Provisions an employee account in the admin's sebo.
    pub async fn add_employee(
        &self,
        admin: &Requester<'_>,
        sebo_id: &str,
        employee: &NewEmployee,
    ) -> ServiceResult<ProvisionedEmployee> {
        if admin.role != Role::Admin || admin.sebo_id != sebo_id {
            return Err(ServiceError::forbidden(
                "only an admin of this sebo can add employees",
            ));
        }
        validate_new_employee(employee)?;

        let password = temporary_password();
        let identity = self
            .identity
            .create_user(employee.email.trim(), employee.name.trim(), &password)
            .await?;

        let user = User {
            user_id: identity.user_id.clone(),
            name: employee.name.trim().to_string(),
            email: employee.email.trim().to_string(),
            sebo_id: sebo_id.to_string(),
            role: employee.role,
            registered_at: Utc::now(),
        };

        if let Err(err) = self.db.users().register(&user, None).await {
            warn!(user_id = %user.user_id, error = %err, "Employee record failed, removing identity");
            if let Err(cleanup) = self.identity.delete_user(&user.user_id).await {
                warn!(user_id = %user.user_id, error = %cleanup, "Identity rollback failed");
            }
            return Err(err.into());
        }

        self.mirror_claims(&user).await?;

        info!(sebo_id = %sebo_id, user_id = %user.user_id, role = %user.role, "Employee added");
        Ok(ProvisionedEmployee {
            user,
            temporary_password: password,
            password_reset_link: identity.password_reset_link,
        })
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Deletes an account, handing the sebo to `promote_to` when an Admin leaves.
    pub async fn delete_user(
        &self,
        requester: &Requester<'_>,
        target_id: &str,
        promote_to: Option<&str>,
    ) -> ServiceResult<DeletionInfo> {
        let target = self.load_user(target_id).await?;
        let plan = plan_user_deletion(requester, &target, promote_to)?;

        let promoted_user_id = match plan {
            DeletionPlan::SelfDelete => {
                self.db.users().delete(&target.user_id).await?;
                None
            }
            DeletionPlan::DeleteOther => {
                self.db
                    .users()
                    .remove_member(&target.user_id, &target.sebo_id, requester.user_id)
                    .await?;
                None
            }
            DeletionPlan::PromoteThenDelete { candidate } => {
                let candidate = self.load_user(&candidate).await?;
                check_promotion_candidate(&target, &candidate)?;

                self.db
                    .users()
                    .promote_and_delete(&target.user_id, &candidate.user_id, &target.sebo_id)
                    .await?;

                let promoted = User {
                    role: Role::Admin,
                    ..candidate
                };
                self.mirror_claims(&promoted).await?;
                Some(promoted.user_id)
            }
        };

        Ok(DeletionInfo {
            user_id: target.user_id,
            email: target.email,
            promoted_user_id,
        })
    }

    pub async fn update_user(
        &self,
        requester: &Requester<'_>,
        target_id: &str,
        patch: &UserPatch,
    ) -> ServiceResult<User> {
        let target = self.load_user(target_id).await?;
        check_user_update(requester, &target, patch)?;

        let role_changed = patch.changes_role(&target);
        let updated = self.db.users().update(target_id, patch).await?;

        if role_changed {
            self.mirror_claims(&updated).await?;
        }
        Ok(updated)
    }

    pub async fn fetch_user(&self, requester: &Requester<'_>, target_id: &str) -> ServiceResult<User> {
        let target = self.load_user(target_id).await?;
        check_user_read(requester, &target)?;
        Ok(target)
    }

    /// Every account of a sebo.
    pub async fn list_users(&self, sebo_id: &str) -> ServiceResult<Vec<User>> {
        if !self.db.sebos().exists(sebo_id).await? {
            return Err(ServiceError::not_found("Sebo", sebo_id));
        }
        Ok(self.db.users().list_by_sebo(sebo_id).await?)
    }

    pub async fn fetch_sebo(&self, sebo_id: &str) -> ServiceResult<Sebo> {
        self.db
            .sebos()
            .get(sebo_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Sebo", sebo_id))
    }
}

impl std::fmt::Debug for AccountEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountEngine").finish_non_exhaustive()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryIdentityProvider, RecordingClaims};
    use estante_db::DbConfig;

    struct Fixture {
        engine: AccountEngine,
        identity: Arc<InMemoryIdentityProvider>,
        claims: Arc<RecordingClaims>,
        db: Database,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let identity = Arc::new(InMemoryIdentityProvider::new());
        let claims = Arc::new(RecordingClaims::new());
        Fixture {
            engine: AccountEngine::new(db.clone(), identity.clone(), claims.clone()),
            identity,
            claims,
            db,
        }
    }

    fn new_sebo(name: &str) -> Registration {
        Registration {
            sebo_id: None,
            sebo_name: Some(name.to_string()),
            role: None,
        }
    }

    fn join(sebo_id: &str, role: Option<Role>) -> Registration {
        Registration {
            sebo_id: Some(sebo_id.to_string()),
            sebo_name: None,
            role,
        }
    }

    fn as_requester(user: &User) -> Requester<'_> {
        Requester {
            user_id: &user.user_id,
            sebo_id: &user.sebo_id,
            role: user.role,
        }
    }

    #[tokio::test]
    async fn test_register_creates_sebo_with_admin() {
        let f = fixture().await;

        let admin = f
            .engine
            .register_user("u1", "ana@sebo.com", "Ana", &new_sebo("Sebo do Centro"))
            .await
            .unwrap();

        assert_eq!(admin.role, Role::Admin);
        let sebo = f.engine.fetch_sebo(&admin.sebo_id).await.unwrap();
        assert_eq!(sebo.owner_user_id, "u1");
        assert_eq!(f.claims.get("u1"), Some((admin.sebo_id.clone(), Role::Admin)));
    }

    #[tokio::test]
    async fn test_join_existing_sebo_as_reader() {
        let f = fixture().await;
        let admin = f
            .engine
            .register_user("u1", "ana@sebo.com", "Ana", &new_sebo("Sebo do Centro"))
            .await
            .unwrap();

        let joined = f
            .engine
            .register_user("u2", "bia@sebo.com", "Bia", &join(&admin.sebo_id, Some(Role::Admin)))
            .await
            .unwrap();

        assert_eq!(joined.role, Role::Reader);
        assert_eq!(joined.sebo_id, admin.sebo_id);
    }

    #[tokio::test]
    async fn test_register_twice_conflicts() {
        let f = fixture().await;
        f.engine
            .register_user("u1", "ana@sebo.com", "Ana", &new_sebo("Sebo"))
            .await
            .unwrap();

        let again = f
            .engine
            .register_user("u1", "ana@sebo.com", "Ana", &new_sebo("Outro"))
            .await;
        assert!(matches!(again, Err(ServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_claims_failure_reported_after_commit() {
        let f = fixture().await;
        f.claims.set_failing(true);

        let result = f
            .engine
            .register_user("u1", "ana@sebo.com", "Ana", &new_sebo("Sebo"))
            .await;

        assert!(matches!(result, Err(ServiceError::Upstream(_))));
        assert!(f.db.users().get("u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_add_employee_and_compensation() {
        let f = fixture().await;
        let admin = f
            .engine
            .register_user("u1", "ana@sebo.com", "Ana", &new_sebo("Sebo"))
            .await
            .unwrap();
        let requester = as_requester(&admin);

        let employee = NewEmployee {
            name: "Eduardo".to_string(),
            email: "edu@sebo.com".to_string(),
            role: Role::Editor,
        };
        let provisioned = f
            .engine
            .add_employee(&requester, &admin.sebo_id, &employee)
            .await
            .unwrap();
        assert_eq!(provisioned.user.user_id, "idp-1");
        assert_eq!(provisioned.temporary_password.len(), TEMPORARY_PASSWORD_LEN);
        assert!(provisioned.temporary_password.chars().all(|c| c.is_ascii_alphanumeric()));

        // The provider hands out "idp-2" next; occupy it locally so the record write fails.
        f.db
            .users()
            .register(
                &User {
                    user_id: "idp-2".to_string(),
                    name: "Squatter".to_string(),
                    email: "sq@sebo.com".to_string(),
                    sebo_id: admin.sebo_id.clone(),
                    role: Role::Reader,
                    registered_at: Utc::now(),
                },
                None,
            )
            .await
            .unwrap();

        let second = NewEmployee {
            name: "Rita".to_string(),
            email: "rita@sebo.com".to_string(),
            role: Role::Reader,
        };
        let result = f.engine.add_employee(&requester, &admin.sebo_id, &second).await;

        assert!(matches!(result, Err(ServiceError::Conflict(_))));
        assert!(!f.identity.contains("idp-2"));
        assert!(f.identity.contains("idp-1"));
    }

    #[tokio::test]
    async fn test_add_employee_other_sebo_forbidden() {
        let f = fixture().await;
        let admin = f
            .engine
            .register_user("u1", "ana@sebo.com", "Ana", &new_sebo("Sebo"))
            .await
            .unwrap();

        let employee = NewEmployee {
            name: "Eduardo".to_string(),
            email: "edu@sebo.com".to_string(),
            role: Role::Editor,
        };
        let result = f
            .engine
            .add_employee(&as_requester(&admin), "another-sebo", &employee)
            .await;

        assert!(matches!(result, Err(ServiceError::Forbidden(_))));
        assert!(f.identity.is_empty());
    }

    #[tokio::test]
    async fn test_admin_self_delete_with_promotion() {
        let f = fixture().await;
        let admin = f
            .engine
            .register_user("u1", "ana@sebo.com", "Ana", &new_sebo("Sebo"))
            .await
            .unwrap();
        let editor = f
            .engine
            .add_employee(
                &as_requester(&admin),
                &admin.sebo_id,
                &NewEmployee {
                    name: "Eduardo".to_string(),
                    email: "edu@sebo.com".to_string(),
                    role: Role::Editor,
                },
            )
            .await
            .unwrap()
            .user;

        let info = f
            .engine
            .delete_user(&as_requester(&admin), "u1", Some(&editor.user_id))
            .await
            .unwrap();

        assert_eq!(info.promoted_user_id.as_deref(), Some(editor.user_id.as_str()));
        assert!(f.db.users().get("u1").await.unwrap().is_none());
        assert_eq!(
            f.db.users().get(&editor.user_id).await.unwrap().unwrap().role,
            Role::Admin
        );
        assert_eq!(f.claims.get(&editor.user_id).map(|c| c.1), Some(Role::Admin));
    }

    #[tokio::test]
    async fn test_update_own_role_forbidden() {
        let f = fixture().await;
        let admin = f
            .engine
            .register_user("u1", "ana@sebo.com", "Ana", &new_sebo("Sebo"))
            .await
            .unwrap();
        let reader = f
            .engine
            .register_user("u2", "bia@sebo.com", "Bia", &join(&admin.sebo_id, None))
            .await
            .unwrap();

        let escalate = UserPatch {
            name: None,
            role: Some(Role::Admin),
        };
        let result = f
            .engine
            .update_user(&as_requester(&reader), "u2", &escalate)
            .await;
        assert!(matches!(result, Err(ServiceError::Forbidden(_))));

        let promote = UserPatch {
            name: None,
            role: Some(Role::Editor),
        };
        let updated = f
            .engine
            .update_user(&as_requester(&admin), "u2", &promote)
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Editor);
        assert_eq!(f.claims.get("u2").map(|c| c.1), Some(Role::Editor));
    }

    #[tokio::test]
    async fn test_fetch_user_across_sebos_forbidden() {
        let f = fixture().await;
        let a = f
            .engine
            .register_user("u1", "ana@sebo.com", "Ana", &new_sebo("A"))
            .await
            .unwrap();
        f.engine
            .register_user("u2", "bia@sebo.com", "Bia", &new_sebo("B"))
            .await
            .unwrap();

        let result = f.engine.fetch_user(&as_requester(&a), "u2").await;
        assert!(matches!(result, Err(ServiceError::Forbidden(_))));
        assert_eq!(f.engine.list_users(&a.sebo_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_admin_removing_owner_takes_ownership() {
        let f = fixture().await;
        let owner = f
            .engine
            .register_user("u1", "ana@sebo.com", "Ana", &new_sebo("Sebo"))
            .await
            .unwrap();
        f.engine
            .register_user("u2", "bia@sebo.com", "Bia", &join(&owner.sebo_id, None))
            .await
            .unwrap();
        let patch = UserPatch {
            name: None,
            role: Some(Role::Admin),
        };
        let second = f.db.users().update("u2", &patch).await.unwrap();

        let info = f
            .engine
            .delete_user(&as_requester(&second), "u1", None)
            .await
            .unwrap();

        assert_eq!(info.user_id, "u1");
        assert!(info.promoted_user_id.is_none());
        assert!(f.db.users().get("u1").await.unwrap().is_none());
        let sebo = f.engine.fetch_sebo(&owner.sebo_id).await.unwrap();
        assert_eq!(sebo.owner_user_id, "u2");
    }
}
