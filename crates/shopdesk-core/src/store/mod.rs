//! Record store gateway abstraction.
//!
//! The [`RecordStore`] trait is the only path from Shopdesk to the
//! relational store that owns products and orders. Backends: SQLite
//! (`shopdesk::sqlite_store`) and the in-memory [`memory::InMemoryRecordStore`].
//!
//! Every method returns `Err` only when the store could not be reached or
//! the query itself failed. "No such row" is `Ok(None)` / a shorter `Vec`.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Order, Product, ProductProjection};

/// Read-only gateway over the product and order tables.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`fetch_order`](RecordStore::fetch_order) | Exact order lookup |
/// | [`fetch_product`](RecordStore::fetch_product) | Exact product lookup |
/// | [`fetch_products_by_ids`](RecordStore::fetch_products_by_ids) | Batched, rank-preserving hydration |
/// | [`list_product_projections`](RecordStore::list_product_projections) | Source rows for the index build |
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up one order by its exact id.
    async fn fetch_order(&self, order_id: &str) -> Result<Option<Order>>;

    /// Look up one product by its exact id.
    async fn fetch_product(&self, product_id: &str) -> Result<Option<Product>>;

    /// Fetch all products whose id is in `ordered_ids`.
    ///
    /// Rows come back in the same order as `ordered_ids`. Ids that do not
    /// resolve are skipped, so the result may be shorter than the input.
    async fn fetch_products_by_ids(&self, ordered_ids: &[String]) -> Result<Vec<Product>>;

    /// The `(id, name, description)` projection of every product.
    async fn list_product_projections(&self) -> Result<Vec<ProductProjection>>;
}
