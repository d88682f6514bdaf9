//! Bearer token verification.
//!
//! Tokens are issued by the identity provider; this side only verifies
//! them and turns the claims into a [`Principal`].

use std::collections::HashMap;

use async_trait::async_trait;
use estante_core::{Principal, Role};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> ServiceResult<Principal>;
}

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// Subject (user id)
    pub sub: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub name: String,

    /// Tenant claim, set by the claims mirror after registration
    #[serde(default)]
    pub sebo_id: Option<String>,

    /// Role claim
    #[serde(default)]
    pub user_role: Option<Role>,

    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl From<TokenClaims> for Principal {
    fn from(claims: TokenClaims) -> Self {
        Principal {
            user_id: claims.sub,
            email: claims.email,
            name: claims.name,
            sebo_id: claims.sebo_id,
            role: claims.user_role,
        }
    }
}

/// HS256 JWT verifier.
pub struct JwtVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        JwtVerifier {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Signs claims with the same secret (local development and tests).
    pub fn sign(&self, claims: &TokenClaims) -> ServiceResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| ServiceError::Internal(format!("Failed to sign token: {}", e)))
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier").finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> ServiceResult<Principal> {
        let data = decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| ServiceError::Unauthenticated(format!("Invalid token: {}", e)))?;
        Ok(data.claims.into())
    }
}

/// Fixed token → principal table.
#[derive(Debug, Default, Clone)]
pub struct StaticTokens {
    tokens: HashMap<String, Principal>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokens {
    async fn verify(&self, token: &str) -> ServiceResult<Principal> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| ServiceError::Unauthenticated("Unknown token".to_string()))
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
