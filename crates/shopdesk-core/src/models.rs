//! Catalog and order records shared by every Shopdesk component.
//!
//! The relational store is authoritative for all of these; the semantic
//! index only ever holds a [`ProductProjection`] of each product.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Placeholder rendered for any optional field that has no value.
pub const UNKNOWN: &str = "未知";

/// A product row as stored in the relational store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub specifications: Option<String>,
    /// Display price, e.g. `"99元"`.
    pub price: Option<String>,
    /// Active promotion text.
    pub activity: Option<String>,
}

impl Product {
    /// The `(id, name, description)` projection that gets embedded.
    pub fn projection(&self) -> ProductProjection {
        ProductProjection {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

/// Denormalized product view used to build the semantic index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductProjection {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl ProductProjection {
    /// Text fed to the embedding function for this product.
    pub fn index_text(&self) -> String {
        format!(
            "商品名称: {}\n商品描述: {}",
            self.name,
            self.description.as_deref().unwrap_or("")
        )
    }
}

/// An order row as stored in the relational store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub user_id: Option<String>,
    /// Comma-joined product ids, e.g. `"001,003"`.
    pub product_ids: Option<String>,
    /// Free-text status: 待付款, 已付款, 已发货, 已签收, 已取消.
    pub status: Option<String>,
    pub total_amount: Option<f64>,
    pub create_time: Option<NaiveDateTime>,
    pub pay_time: Option<NaiveDateTime>,
    pub ship_time: Option<NaiveDateTime>,
    pub receive_time: Option<NaiveDateTime>,
    pub logistics_info: Option<String>,
}

impl Order {
    /// Individual product ids referenced by this order.
    pub fn product_id_list(&self) -> Vec<&str> {
        self.product_ids
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Format a timestamp the way the store writes it (`YYYY-MM-DD HH:MM:SS`).
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
