//! # External Collaborators
//!
//! Systems the service talks to but does not own, each behind an async
//! trait so engines take them as `Arc<dyn …>`.
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┬──────────────────────────┐
//! │ Trait            │ Shipped implementation   │ In-memory fake           │
//! ├──────────────────┼──────────────────────────┼──────────────────────────┤
//! │ MetadataLookup   │ GoogleBooksClient        │ StaticMetadata           │
//! │ IdentityProvider │ (deployment specific)    │ InMemoryIdentityProvider │
//! │ ClaimsMirror     │ (deployment specific)    │ RecordingClaims          │
//! │ TokenVerifier    │ JwtVerifier (HS256)      │ StaticTokens             │
//! └──────────────────┴──────────────────────────┴──────────────────────────┘
//! ```

pub mod claims;
pub mod identity;
pub mod metadata;
pub mod token;

pub use claims::{ClaimsMirror, RecordingClaims};
pub use identity::{IdentityProvider, InMemoryIdentityProvider, ProvisionedIdentity};
pub use metadata::{GoogleBooksClient, MetadataLookup, StaticMetadata};
pub use token::{extract_bearer_token, JwtVerifier, StaticTokens, TokenClaims, TokenVerifier};
