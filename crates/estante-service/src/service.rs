//! # Service Facade
//!
//! [`Estante`] is what an outer transport (HTTP routes, a desktop shell)
//! calls. Each method takes the caller's bearer token, runs the
//! [`Pipeline`] with the permission for that route, and lets the engine do
//! the work inside the caller's own sebo.
//!
//! ## Routes
//! ```text
//! ┌──────────────────────┬──────────────┬──────────────────┐
//! │ Method               │ Policy       │ Audit action     │
//! ├──────────────────────┼──────────────┼──────────────────┤
//! │ register             │ signed in    │ -                │
//! │ add_employee         │ EMPLOYEES    │ add_employee     │
//! │ list_users           │ EMPLOYEES    │ -                │
//! │ fetch/update/delete  │ MEMBERS      │ update_user,     │
//! │   _user, fetch_sebo  │              │ delete_user      │
//! │ add_copy_*           │ BOOKS_WRITE  │ add_copy         │
//! │ update/delete_copy   │ BOOKS_WRITE  │ update/delete_.. │
//! │ delete/reconcile_book│ BOOKS_WRITE  │ delete/reconc..  │
//! │ fetch_book(s)        │ BOOKS_READ   │ -                │
//! │ create_sale          │ SALES_CREATE │ create_sale      │
//! │ fetch_sale(s)        │ SALES_READ   │ -                │
//! │ update/delete_sale   │ SALES_ADMIN  │ update/delete_.. │
//! │ fetch_log(s)         │ LOGS         │ -                │
//! │ update_log           │ LOGS         │ update_log       │
//! └──────────────────────┴──────────────┴──────────────────┘
//! ```
//!
//! Untyped request bodies (`serde_json::Value`) are turned into typed
//! payloads here; unknown fields in update bodies are dropped.

use std::sync::Arc;

use estante_core::access::Requester;
use estante_core::{
    AuditLogEntry, AuditLogPatch, Book, BookMetadata, BookSummary, CopyPatch, DeletedBook,
    DeletedCopy, DeletionInfo, LogDetails, NewCopy, NewEmployee, Principal, ProvisionedEmployee,
    Reconciliation, Registration, Sale, SalePatch, Sebo, User, UserPatch, ValidationError,
};
use estante_db::Database;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::cache::TtlCache;
use crate::collaborators::{
    ClaimsMirror, GoogleBooksClient, IdentityProvider, JwtVerifier, MetadataLookup, TokenVerifier,
};
use crate::config::ServiceConfig;
use crate::engine::{AccountEngine, AuditEngine, BookListCache, InventoryEngine, SaleEngine};
use crate::error::{ServiceError, ServiceResult};
use crate::pipeline::{
    Outcome, Pipeline, Policy, BOOKS_READ, BOOKS_WRITE, EMPLOYEES, LOGS, MEMBERS, SALES_ADMIN,
    SALES_CREATE, SALES_READ,
};

/// External systems the service is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub metadata: Arc<dyn MetadataLookup>,
    pub identity: Arc<dyn IdentityProvider>,
    pub claims: Arc<dyn ClaimsMirror>,
    pub tokens: Arc<dyn TokenVerifier>,
}

fn details<const N: usize>(pairs: [(&str, Value); N]) -> LogDetails {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn parse_body<T: DeserializeOwned>(entity: &str, body: &Value) -> ServiceResult<T> {
    T::deserialize(body).map_err(|e| ValidationError::malformed(entity, &e).into())
}

fn requester(principal: &Principal) -> ServiceResult<Requester<'_>> {
    Requester::from_principal(principal)
        .ok_or_else(|| ServiceError::forbidden("account is not registered to a sebo"))
}

fn display_name(principal: &Principal) -> &str {
    if principal.name.trim().is_empty() {
        &principal.email
    } else {
        &principal.name
    }
}

/// The Volta Estante back office.
#[derive(Clone)]
pub struct Estante {
    db: Database,
    pipeline: Pipeline,
    inventory: InventoryEngine,
    sales: SaleEngine,
    accounts: AccountEngine,
    audit: AuditEngine,
}

impl Estante {
    /// Opens the database (running migrations) and wires the engines.
    pub async fn start(config: &ServiceConfig, collaborators: Collaborators) -> ServiceResult<Self> {
        let db = Database::new(config.db_config()).await?;
        info!(path = %config.database_path.display(), "Estante service started");
        Ok(Self::from_parts(config, db, collaborators))
    }

    /// Production wiring: Google Books lookups and HS256 bearer tokens.
    pub async fn with_google_books(
        config: &ServiceConfig,
        identity: Arc<dyn IdentityProvider>,
        claims: Arc<dyn ClaimsMirror>,
    ) -> ServiceResult<Self> {
        let metadata = GoogleBooksClient::from_config(config)
            .map_err(|e| ServiceError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let collaborators = Collaborators {
            metadata: Arc::new(metadata),
            identity,
            claims,
            tokens: Arc::new(JwtVerifier::new(&config.jwt_secret)),
        };
        Self::start(config, collaborators).await
    }

    pub fn from_parts(config: &ServiceConfig, db: Database, collaborators: Collaborators) -> Self {
        let cache: Arc<BookListCache> = Arc::new(TtlCache::new(config.book_cache_ttl));
        let audit = AuditEngine::new(db.clone());

        Estante {
            pipeline: Pipeline::new(collaborators.tokens, audit.clone()),
            inventory: InventoryEngine::new(db.clone(), collaborators.metadata, cache.clone()),
            sales: SaleEngine::new(db.clone(), cache),
            accounts: AccountEngine::new(db.clone(), collaborators.identity, collaborators.claims),
            audit,
            db,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn run<T, F, Fut>(
        &self,
        token: Option<&str>,
        policy: Policy,
        action: Option<&'static str>,
        execute: F,
    ) -> ServiceResult<Outcome<T>>
    where
        F: FnOnce(Principal) -> Fut,
        Fut: std::future::Future<Output = ServiceResult<(T, LogDetails)>>,
    {
        self.pipeline.run(token, policy, action, execute).await
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Registers the caller, creating or joining a sebo.
    pub async fn register(&self, token: Option<&str>, body: &Value) -> ServiceResult<Outcome<User>> {
        self.run(token, Policy::Authenticated, None, |p| async move {
            let payload = parse_body::<Registration>("registration", body)?;
            let user = self
                .accounts
                .register_user(&p.user_id, &p.email, display_name(&p), &payload)
                .await?;
            Ok((user, LogDetails::new()))
        })
        .await
    }

    pub async fn add_employee(
        &self,
        token: Option<&str>,
        body: &Value,
    ) -> ServiceResult<Outcome<ProvisionedEmployee>> {
        self.run(token, EMPLOYEES, Some("add_employee"), |p| async move {
            let employee = parse_body::<NewEmployee>("employee", body)?;
            let req = requester(&p)?;
            let provisioned = self.accounts.add_employee(&req, req.sebo_id, &employee).await?;
            let logged = details([
                ("userId", json!(provisioned.user.user_id)),
                ("email", json!(provisioned.user.email)),
                ("role", json!(provisioned.user.role)),
            ]);
            Ok((provisioned, logged))
        })
        .await
    }

    pub async fn list_users(&self, token: Option<&str>) -> ServiceResult<Outcome<Vec<User>>> {
        self.run(token, EMPLOYEES, None, |p| async move {
            let req = requester(&p)?;
            Ok((self.accounts.list_users(req.sebo_id).await?, LogDetails::new()))
        })
        .await
    }

    pub async fn fetch_user(&self, token: Option<&str>, user_id: &str) -> ServiceResult<Outcome<User>> {
        self.run(token, MEMBERS, None, |p| async move {
            let user = self.accounts.fetch_user(&requester(&p)?, user_id).await?;
            Ok((user, LogDetails::new()))
        })
        .await
    }

    pub async fn update_user(
        &self,
        token: Option<&str>,
        user_id: &str,
        body: &Value,
    ) -> ServiceResult<Outcome<User>> {
        self.run(token, MEMBERS, Some("update_user"), |p| async move {
            let patch = UserPatch::from_json(body)?;
            let user = self.accounts.update_user(&requester(&p)?, user_id, &patch).await?;
            let logged = details([("userId", json!(user_id)), ("changes", body.clone())]);
            Ok((user, logged))
        })
        .await
    }

    /// Deletes an account; an admin deleting themself names `promote_to`.
    pub async fn delete_user(
        &self,
        token: Option<&str>,
        user_id: &str,
        promote_to: Option<&str>,
    ) -> ServiceResult<Outcome<DeletionInfo>> {
        self.run(token, MEMBERS, Some("delete_user"), |p| async move {
            let info = self
                .accounts
                .delete_user(&requester(&p)?, user_id, promote_to)
                .await?;
            let logged = details([
                ("userId", json!(info.user_id)),
                ("email", json!(info.email)),
                ("promotedUserId", json!(info.promoted_user_id)),
            ]);
            Ok((info, logged))
        })
        .await
    }

    pub async fn fetch_sebo(&self, token: Option<&str>) -> ServiceResult<Outcome<Sebo>> {
        self.run(token, MEMBERS, None, |p| async move {
            let sebo = self.accounts.fetch_sebo(requester(&p)?.sebo_id).await?;
            Ok((sebo, LogDetails::new()))
        })
        .await
    }

    // =========================================================================
    // Inventory
    // =========================================================================

    /// Adds a copy of `isbn`, looking the title up when it is new to the sebo.
    pub async fn add_copy_by_isbn(
        &self,
        token: Option<&str>,
        isbn: &str,
        copy: &Value,
    ) -> ServiceResult<Outcome<Book>> {
        self.run(token, BOOKS_WRITE, Some("add_copy"), |p| async move {
            let copy = NewCopy::from_json(copy)?;
            let book = self
                .inventory
                .add_copy_by_isbn(requester(&p)?.sebo_id, isbn, &copy)
                .await?;
            let logged = details([
                ("isbn", json!(book.isbn())),
                ("price", json!(copy.price)),
                ("conservationState", json!(copy.conservation_state)),
            ]);
            Ok((book, logged))
        })
        .await
    }

    pub async fn add_copy_manual(
        &self,
        token: Option<&str>,
        metadata: BookMetadata,
        copy: &Value,
    ) -> ServiceResult<Outcome<Book>> {
        self.run(token, BOOKS_WRITE, Some("add_copy"), |p| async move {
            let copy = NewCopy::from_json(copy)?;
            let book = self
                .inventory
                .add_copy_manual(requester(&p)?.sebo_id, metadata, &copy)
                .await?;
            let logged = details([
                ("isbn", json!(book.isbn())),
                ("title", json!(book.metadata.title)),
                ("price", json!(copy.price)),
            ]);
            Ok((book, logged))
        })
        .await
    }

    pub async fn fetch_book(&self, token: Option<&str>, isbn: &str) -> ServiceResult<Outcome<Book>> {
        self.run(token, BOOKS_READ, None, |p| async move {
            let book = self.inventory.fetch_book(requester(&p)?.sebo_id, isbn).await?;
            Ok((book, LogDetails::new()))
        })
        .await
    }

    pub async fn fetch_all_books(
        &self,
        token: Option<&str>,
    ) -> ServiceResult<Outcome<Arc<Vec<BookSummary>>>> {
        self.run(token, BOOKS_READ, None, |p| async move {
            let books = self.inventory.fetch_all_books(requester(&p)?.sebo_id).await?;
            Ok((books, LogDetails::new()))
        })
        .await
    }

    pub async fn update_copy(
        &self,
        token: Option<&str>,
        isbn: &str,
        copy_id: &str,
        body: &Value,
    ) -> ServiceResult<Outcome<Book>> {
        self.run(token, BOOKS_WRITE, Some("update_copy"), |p| async move {
            let patch = CopyPatch::from_json(body)?;
            let book = self
                .inventory
                .update_copy(requester(&p)?.sebo_id, isbn, copy_id, &patch)
                .await?;
            let logged = details([
                ("isbn", json!(book.isbn())),
                ("copyId", json!(copy_id)),
                ("changes", body.clone()),
            ]);
            Ok((book, logged))
        })
        .await
    }

    pub async fn delete_copy(
        &self,
        token: Option<&str>,
        isbn: &str,
        copy_id: &str,
    ) -> ServiceResult<Outcome<DeletedCopy>> {
        self.run(token, BOOKS_WRITE, Some("delete_copy"), |p| async move {
            let deleted = self
                .inventory
                .delete_copy(requester(&p)?.sebo_id, isbn, copy_id)
                .await?;
            let logged = details([
                ("isbn", json!(deleted.isbn)),
                ("copyId", json!(deleted.copy_id)),
            ]);
            Ok((deleted, logged))
        })
        .await
    }

    pub async fn delete_book(
        &self,
        token: Option<&str>,
        isbn: &str,
    ) -> ServiceResult<Outcome<DeletedBook>> {
        self.run(token, BOOKS_WRITE, Some("delete_book"), |p| async move {
            let deleted = self.inventory.delete_book(requester(&p)?.sebo_id, isbn).await?;
            let logged = details([
                ("isbn", json!(deleted.isbn)),
                ("copiesRemoved", json!(deleted.copies_removed)),
            ]);
            Ok((deleted, logged))
        })
        .await
    }

    pub async fn reconcile_book(
        &self,
        token: Option<&str>,
        isbn: &str,
    ) -> ServiceResult<Outcome<Reconciliation>> {
        self.run(token, BOOKS_WRITE, Some("reconcile_book"), |p| async move {
            let result = self.inventory.reconcile_book(requester(&p)?.sebo_id, isbn).await?;
            let logged = details([
                ("isbn", json!(result.isbn)),
                ("previous", json!(result.previous)),
                ("recounted", json!(result.recounted)),
            ]);
            Ok((result, logged))
        })
        .await
    }

    // =========================================================================
    // Sales
    // =========================================================================

    pub async fn create_sale(
        &self,
        token: Option<&str>,
        isbn: &str,
        copy_id: &str,
    ) -> ServiceResult<Outcome<Sale>> {
        self.run(token, SALES_CREATE, Some("create_sale"), |p| async move {
            let sale = self
                .sales
                .create_sale(&p.user_id, display_name(&p), requester(&p)?.sebo_id, isbn, copy_id)
                .await?;
            let logged = details([
                ("saleId", json!(sale.sale_id)),
                ("isbn", json!(sale.isbn)),
                ("price", json!(sale.price().to_decimal())),
            ]);
            Ok((sale, logged))
        })
        .await
    }

    pub async fn fetch_sale(&self, token: Option<&str>, sale_id: &str) -> ServiceResult<Outcome<Sale>> {
        self.run(token, SALES_READ, None, |p| async move {
            let sale = self.sales.fetch_sale(requester(&p)?.sebo_id, sale_id).await?;
            Ok((sale, LogDetails::new()))
        })
        .await
    }

    pub async fn fetch_all_sales(&self, token: Option<&str>) -> ServiceResult<Outcome<Vec<Sale>>> {
        self.run(token, SALES_READ, None, |p| async move {
            let sales = self.sales.fetch_all_sales(requester(&p)?.sebo_id).await?;
            Ok((sales, LogDetails::new()))
        })
        .await
    }

    pub async fn update_sale(
        &self,
        token: Option<&str>,
        sale_id: &str,
        body: &Value,
    ) -> ServiceResult<Outcome<Sale>> {
        self.run(token, SALES_ADMIN, Some("update_sale"), |p| async move {
            let patch = SalePatch::from_json(body)?;
            let sale = self
                .sales
                .update_sale(requester(&p)?.sebo_id, sale_id, &patch)
                .await?;
            let logged = details([("saleId", json!(sale_id)), ("changes", body.clone())]);
            Ok((sale, logged))
        })
        .await
    }

    pub async fn delete_sale(&self, token: Option<&str>, sale_id: &str) -> ServiceResult<Outcome<()>> {
        self.run(token, SALES_ADMIN, Some("delete_sale"), |p| async move {
            self.sales.delete_sale(requester(&p)?.sebo_id, sale_id).await?;
            Ok(((), details([("saleId", json!(sale_id))])))
        })
        .await
    }

    // =========================================================================
    // Audit Log
    // =========================================================================

    pub async fn fetch_log(
        &self,
        token: Option<&str>,
        log_id: &str,
    ) -> ServiceResult<Outcome<AuditLogEntry>> {
        self.run(token, LOGS, None, |p| async move {
            let entry = self.audit.fetch_log(requester(&p)?.sebo_id, log_id).await?;
            Ok((entry, LogDetails::new()))
        })
        .await
    }

    pub async fn fetch_all_logs(
        &self,
        token: Option<&str>,
    ) -> ServiceResult<Outcome<Vec<AuditLogEntry>>> {
        self.run(token, LOGS, None, |p| async move {
            let logs = self.audit.fetch_all_logs(requester(&p)?.sebo_id).await?;
            Ok((logs, LogDetails::new()))
        })
        .await
    }

    pub async fn update_log(
        &self,
        token: Option<&str>,
        log_id: &str,
        body: &Value,
    ) -> ServiceResult<Outcome<AuditLogEntry>> {
        self.run(token, LOGS, Some("update_log"), |p| async move {
            let patch = AuditLogPatch::from_json(body)?;
            let entry = self
                .audit
                .update_log(requester(&p)?.sebo_id, log_id, &patch)
                .await?;
            let logged = details([("logId", json!(log_id)), ("changes", body.clone())]);
            Ok((entry, logged))
        })
        .await
    }
}

impl std::fmt::Debug for Estante {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Estante")
            .field("inventory", &self.inventory)
            .finish_non_exhaustive()
    }
}
