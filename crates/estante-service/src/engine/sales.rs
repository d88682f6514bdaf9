//! # Sale Engine
//!
//! Copy → Sale conversion plus administrative access to sale records.
//! The conversion itself runs as one transaction in
//! [`SaleRepository::create_from_copy`](estante_db::SaleRepository::create_from_copy).

use std::sync::Arc;

use estante_core::validation::validate_name;
use estante_core::{Sale, SalePatch};
use estante_db::Database;
use tracing::debug;

use crate::engine::inventory::BookListCache;
use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct SaleEngine {
    db: Database,
    cache: Arc<BookListCache>,
}

impl SaleEngine {
    pub fn new(db: Database, cache: Arc<BookListCache>) -> Self {
        SaleEngine { db, cache }
    }

    async fn ensure_sebo(&self, sebo_id: &str) -> ServiceResult<()> {
        if self.db.sebos().exists(sebo_id).await? {
            Ok(())
        } else {
            Err(ServiceError::not_found("Sebo", sebo_id))
        }
    }

    /// Sells one copy: records the sale, removes the copy, decrements stock.
    pub async fn create_sale(
        &self,
        user_id: &str,
        user_name: &str,
        sebo_id: &str,
        isbn: &str,
        copy_id: &str,
    ) -> ServiceResult<Sale> {
        validate_name("userName", user_name)?;

        let sale = self
            .db
            .sales()
            .create_from_copy(sebo_id, isbn, copy_id, user_id, user_name.trim())
            .await?;
        self.cache.invalidate(&sebo_id.to_string()).await;

        Ok(sale)
    }

    pub async fn fetch_sale(&self, sebo_id: &str, sale_id: &str) -> ServiceResult<Sale> {
        self.ensure_sebo(sebo_id).await?;
        self.db
            .sales()
            .get(sebo_id, sale_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Sale", sale_id))
    }

    /// All sales of a sebo, most recent first.
    pub async fn fetch_all_sales(&self, sebo_id: &str) -> ServiceResult<Vec<Sale>> {
        self.ensure_sebo(sebo_id).await?;
        let sales = self.db.sales().list(sebo_id).await?;
        debug!(sebo_id = %sebo_id, count = sales.len(), "Sales loaded");
        Ok(sales)
    }

    pub async fn update_sale(
        &self,
        sebo_id: &str,
        sale_id: &str,
        patch: &SalePatch,
    ) -> ServiceResult<Sale> {
        self.ensure_sebo(sebo_id).await?;
        Ok(self.db.sales().update(sebo_id, sale_id, patch).await?)
    }

    pub async fn delete_sale(&self, sebo_id: &str, sale_id: &str) -> ServiceResult<()> {
        self.ensure_sebo(sebo_id).await?;
        Ok(self.db.sales().delete(sebo_id, sale_id).await?)
    }
}
