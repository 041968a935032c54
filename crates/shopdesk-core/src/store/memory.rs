//! In-memory [`RecordStore`] implementation for tests and demos.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. The store can be switched
//! offline to simulate an unreachable database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{Order, Product, ProductProjection};

use super::RecordStore;

/// In-memory product and order tables.
pub struct InMemoryRecordStore {
    products: RwLock<HashMap<String, Product>>,
    orders: RwLock<HashMap<String, Order>>,
    offline: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            products: RwLock::new(HashMap::new()),
            orders: RwLock::new(HashMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn with_data(products: Vec<Product>, orders: Vec<Order>) -> Self {
        let store = Self::new();
        for p in products {
            store.insert_product(p);
        }
        for o in orders {
            store.insert_order(o);
        }
        store
    }

    pub fn insert_product(&self, product: Product) {
        if let Ok(mut products) = self.products.write() {
            products.insert(product.id.clone(), product);
        }
    }

    pub fn remove_product(&self, id: &str) {
        if let Ok(mut products) = self.products.write() {
            products.remove(id);
        }
    }

    pub fn insert_order(&self, order: Order) {
        if let Ok(mut orders) = self.orders.write() {
            orders.insert(order.order_id.clone(), order);
        }
    }

    /// Make every subsequent call fail as if the database were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            bail!("connection refused: in-memory store is offline");
        }
        Ok(())
    }

    fn products(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Product>>> {
        self.products
            .read()
            .map_err(|_| anyhow!("product table lock poisoned"))
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn fetch_order(&self, order_id: &str) -> Result<Option<Order>> {
        self.check_online()?;
        let orders = self
            .orders
            .read()
            .map_err(|_| anyhow!("order table lock poisoned"))?;
        Ok(orders.get(order_id).cloned())
    }

    async fn fetch_product(&self, product_id: &str) -> Result<Option<Product>> {
        self.check_online()?;
        Ok(self.products()?.get(product_id).cloned())
    }

    async fn fetch_products_by_ids(&self, ordered_ids: &[String]) -> Result<Vec<Product>> {
        self.check_online()?;
        let products = self.products()?;
        Ok(ordered_ids
            .iter()
            .filter_map(|id| products.get(id).cloned())
            .collect())
    }

    async fn list_product_projections(&self) -> Result<Vec<ProductProjection>> {
        self.check_online()?;
        let mut rows: Vec<ProductProjection> =
            self.products()?.values().map(Product::projection).collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }
}
