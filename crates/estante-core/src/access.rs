//! # Account Business Rules
//!
//! Decides who may read, change and delete accounts. Pure functions over
//! already-loaded records; the engine does the lookups and the writes.
//!
//! ## Deletion Matrix
//! ```text
//! ┌───────────────────────┬───────────────────────────────────────────────────┐
//! │ Situation             │ Outcome                                          │
//! ├───────────────────────┼───────────────────────────────────────────────────┤
//! │ self, not admin       │ SelfDelete                                       │
//! │ self, admin           │ PromoteThenDelete(promote_to)                    │
//! │   promote_to missing  │   Validation                                     │
//! │   promote_to == self  │   Validation                                     │
//! │   other sebo / role   │   Forbidden (check_promotion_candidate)          │
//! │ other, admin, same    │ DeleteOther                                      │
//! │ other, anything else  │ Forbidden                                        │
//! └───────────────────────┴───────────────────────────────────────────────────┘
//! ```
//!
//! Self-deletion of an Admin always hands the sebo to an Editor first, so a
//! sebo is never left without an administrator by its own admin leaving.

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::patch::UserPatch;
use crate::types::{Principal, Role, User};

/// The authenticated caller, with tenant and role claims present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester<'a> {
    pub user_id: &'a str,
    pub sebo_id: &'a str,
    pub role: Role,
}

impl<'a> Requester<'a> {
    /// Returns `None` when the principal has no membership claims yet.
    pub fn from_principal(principal: &'a Principal) -> Option<Self> {
        let (sebo_id, role) = principal.membership()?;
        Some(Requester {
            user_id: &principal.user_id,
            sebo_id,
            role,
        })
    }

    fn is_admin_of(&self, sebo_id: &str) -> bool {
        self.role == Role::Admin && self.sebo_id == sebo_id
    }
}

// =============================================================================
// Deletion
// =============================================================================

/// What a permitted deletion must do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionPlan {
    /// A non-admin removes their own account.
    SelfDelete,
    /// An admin removes their own account after promoting `candidate`.
    PromoteThenDelete { candidate: String },
    /// An admin removes another account of their sebo.
    DeleteOther,
}

/// Applies the deletion matrix.
///
/// For the self branch the stored role of `target` decides, not the caller's
/// claims, so a stale token cannot skip the hand-over.
pub fn plan_user_deletion(
    requester: &Requester<'_>,
    target: &User,
    promote_to: Option<&str>,
) -> CoreResult<DeletionPlan> {
    if requester.user_id == target.user_id {
        if target.role != Role::Admin {
            return Ok(DeletionPlan::SelfDelete);
        }

        let candidate = match promote_to.map(str::trim) {
            None | Some("") => {
                return Err(ValidationError::required("promoteTo").into());
            }
            Some(id) => id,
        };

        if candidate == target.user_id {
            return Err(ValidationError::invalid(
                "promoteTo",
                "an admin cannot hand the sebo over to themself",
            )
            .into());
        }

        return Ok(DeletionPlan::PromoteThenDelete {
            candidate: candidate.to_string(),
        });
    }

    if requester.is_admin_of(&target.sebo_id) {
        return Ok(DeletionPlan::DeleteOther);
    }

    Err(CoreError::forbidden(
        "only an admin of the same sebo can delete another account",
    ))
}

/// The promotion candidate must be an Editor of the leaving admin's sebo.
pub fn check_promotion_candidate(admin: &User, candidate: &User) -> CoreResult<()> {
    if candidate.sebo_id != admin.sebo_id {
        return Err(CoreError::forbidden(
            "promotion candidate belongs to another sebo",
        ));
    }
    if candidate.role != Role::Editor {
        return Err(CoreError::forbidden(format!(
            "promotion candidate must be an editor, found {}",
            candidate.role
        )));
    }
    Ok(())
}

// =============================================================================
// Reads and Updates
// =============================================================================

/// Any member may read accounts of their own sebo.
pub fn check_user_read(requester: &Requester<'_>, target: &User) -> CoreResult<()> {
    if requester.user_id == target.user_id || requester.sebo_id == target.sebo_id {
        return Ok(());
    }
    Err(CoreError::forbidden("account belongs to another sebo"))
}

/// Gates a user update.
///
/// ## Rules
/// - Your own name: always
/// - Someone else's record: Admin of their sebo
/// - Any effective role change: [`check_role_change`]
pub fn check_user_update(
    requester: &Requester<'_>,
    target: &User,
    patch: &UserPatch,
) -> CoreResult<()> {
    if requester.user_id != target.user_id && !requester.is_admin_of(&target.sebo_id) {
        return Err(CoreError::forbidden(
            "only an admin of the same sebo can edit another account",
        ));
    }

    if patch.changes_role(target) {
        check_role_change(requester, target)?;
    }

    Ok(())
}

/// Role changes need an Admin of the same sebo, acting on someone else.
pub fn check_role_change(requester: &Requester<'_>, target: &User) -> CoreResult<()> {
    if !requester.is_admin_of(&target.sebo_id) {
        return Err(CoreError::forbidden("only an admin can change roles"));
    }
    if requester.user_id == target.user_id {
        return Err(CoreError::forbidden(
            "admins cannot change their own role; delete with promotion instead",
        ));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
