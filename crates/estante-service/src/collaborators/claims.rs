//! Claims mirror.
//!
//! Copies `{seboId, userRole}` to the identity layer so later tokens carry
//! them. Not transactional with the store: a failure here is reported to
//! the caller even though the account write already committed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use estante_core::Role;

use crate::error::{ServiceError, ServiceResult};

#[async_trait]
pub trait ClaimsMirror: Send + Sync {
    async fn set_claims(&self, user_id: &str, sebo_id: &str, role: Role) -> ServiceResult<()>;
}

/// Claims mirror that records every write. Can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingClaims {
    claims: Mutex<HashMap<String, (String, Role)>>,
    failing: AtomicBool,
}

impl RecordingClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `set_claims` calls fail with `Upstream`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get(&self, user_id: &str) -> Option<(String, Role)> {
        self.claims.lock().ok().and_then(|c| c.get(user_id).cloned())
    }
}

#[async_trait]
impl ClaimsMirror for RecordingClaims {
    async fn set_claims(&self, user_id: &str, sebo_id: &str, role: Role) -> ServiceResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::Upstream(format!(
                "claims mirror unavailable for {}",
                user_id
            )));
        }
        self.claims
            .lock()
            .map_err(|_| ServiceError::Internal("claims lock poisoned".to_string()))?
            .insert(user_id.to_string(), (sebo_id.to_string(), role));
        Ok(())
    }
}
