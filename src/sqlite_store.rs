//! SQLite-backed [`RecordStore`].
//!
//! Every lookup is a parameterized query on its own pooled connection.
//! Batched product hydration keeps the caller's id order with an explicit
//! ordinal clause, one statement per chunk of ids:
//!
//! ```sql
//! SELECT ... FROM products WHERE id IN (?, ?, ?)
//! ORDER BY CASE id WHEN ? THEN 0 WHEN ? THEN 1 WHEN ? THEN 2 END
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use shopdesk_core::models::{Order, Product, ProductProjection};
use shopdesk_core::store::RecordStore;

const PRODUCT_COLUMNS: &str = "id, name, description, specifications, price, activity";
const ORDER_COLUMNS: &str = "order_id, user_id, product_ids, status, total_amount, \
     create_time, pay_time, ship_time, receive_time, logistics_info";

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn product_from_row(row: &SqliteRow) -> Result<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        specifications: row.try_get("specifications")?,
        price: row.try_get("price")?,
        activity: row.try_get("activity")?,
    })
}

fn parse_time(row: &SqliteRow, column: &str) -> Result<Option<NaiveDateTime>> {
    let raw: Option<String> = row.try_get(column)?;
    Ok(raw.and_then(|s| {
        match NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S") {
            Ok(ts) => Some(ts),
            Err(e) => {
                warn!(column, value = %s, error = %e, "unparseable timestamp");
                None
            }
        }
    }))
}

fn order_from_row(row: &SqliteRow) -> Result<Order> {
    Ok(Order {
        order_id: row.try_get("order_id")?,
        user_id: row.try_get("user_id")?,
        product_ids: row.try_get("product_ids")?,
        status: row.try_get("status")?,
        total_amount: row.try_get("total_amount")?,
        create_time: parse_time(row, "create_time")?,
        pay_time: parse_time(row, "pay_time")?,
        ship_time: parse_time(row, "ship_time")?,
        receive_time: parse_time(row, "receive_time")?,
        logistics_info: row.try_get("logistics_info")?,
    })
}

/// Ids per batched statement. Each id is bound twice, so this stays well
/// under SQLite's host-parameter limit.
const MAX_IDS_PER_STATEMENT: usize = 400;

/// Build the rank-preserving batch query for `n` ids.
fn ordered_batch_sql(n: usize) -> String {
    let placeholders = vec!["?"; n].join(", ");
    let ordinal: String = (0..n).map(|i| format!(" WHEN ? THEN {}", i)).collect();
    format!(
        "SELECT {} FROM products WHERE id IN ({}) ORDER BY CASE id{} END",
        PRODUCT_COLUMNS, placeholders, ordinal
    )
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn fetch_order(&self, order_id: &str) -> Result<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE order_id = ?", ORDER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("order lookup failed for {}", order_id))?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn fetch_product(&self, product_id: &str) -> Result<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?", PRODUCT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("product lookup failed for {}", product_id))?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn fetch_products_by_ids(&self, ordered_ids: &[String]) -> Result<Vec<Product>> {
        if ordered_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut products = Vec::with_capacity(ordered_ids.len());
        for chunk in ordered_ids.chunks(MAX_IDS_PER_STATEMENT) {
            let sql = ordered_batch_sql(chunk.len());
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id);
            }
            for id in chunk {
                query = query.bind(id);
            }

            let rows = query
                .fetch_all(&self.pool)
                .await
                .context("batched product lookup failed")?;
            for row in &rows {
                products.push(product_from_row(row)?);
            }
        }
        Ok(products)
    }

    async fn list_product_projections(&self) -> Result<Vec<ProductProjection>> {
        let rows = sqlx::query("SELECT id, name, description FROM products ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("failed to list products")?;

        rows.iter()
            .map(|row| {
                Ok(ProductProjection {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    description: row.try_get("description")?,
                })
            })
            .collect()
    }
}
