//! Capability tools: the operations the reasoning engine can invoke.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  ToolRegistry                    │
//! │  ┌─────────────┐ ┌───────────────┐ ┌───────────┐ │
//! │  │ query_order │ │ query_product │ │  search_  │ │
//! │  │             │ │               │ │ products  │ │
//! │  └──────┬──────┘ └───────┬───────┘ └─────┬─────┘ │
//! └─────────┼────────────────┼───────────────┼───────┘
//!           ▼                ▼               ▼
//!      RecordStore      RecordStore    HybridRetriever
//! ```
//!
//! Every tool returns text. Failures never escape as errors:
//! [`ToolRegistry::invoke`] renders them into a message the reasoning
//! engine can relay to the customer.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use shopdesk_core::models::{format_timestamp, Order, Product, UNKNOWN};
use shopdesk_core::retrieval::{
    HybridRetriever, NoMatchReason, RankedProduct, RetrievalError, RetrievalOutcome,
};
use shopdesk_core::store::RecordStore;

use crate::config::Config;
use crate::runtime::Runtime;

/// Failure inside a tool, rendered to text by [`ToolError::user_message`].
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("record store unavailable: {0}")]
    StoreUnavailable(anyhow::Error),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

impl ToolError {
    pub fn user_message(&self) -> String {
        match self {
            ToolError::InvalidArguments(detail) => format!("参数错误：{}", detail),
            ToolError::StoreUnavailable(_) => "错误：无法连接到数据库。".to_string(),
            ToolError::Retrieval(RetrievalError::EmbeddingUnavailable(_)) => {
                "错误：语义搜索服务不可用，无法执行商品搜索。".to_string()
            }
            ToolError::Retrieval(RetrievalError::IndexUnavailable(_)) => {
                "错误：商品向量索引不可用，无法执行语义搜索。".to_string()
            }
            ToolError::Retrieval(RetrievalError::StoreUnavailable(_)) => {
                "错误：成功进行了语义搜索，但无法连接到数据库以获取商品详情。".to_string()
            }
        }
    }
}

/// A self-describing capability.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier the reasoning engine uses to select the tool.
    fn name(&self) -> &str;

    /// Natural-language description, including the argument format.
    fn description(&self) -> &str;

    /// JSON Schema (`type: "object"`) for the tool's arguments.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `params` is whatever the reasoning engine produced:
    /// an object, or a bare string/number for the single argument.
    async fn execute(&self, params: &Value, ctx: &ToolContext) -> Result<String, ToolError>;
}

/// Shared handles every tool invocation may use.
#[derive(Clone)]
pub struct ToolContext {
    pub store: Arc<dyn RecordStore>,
    pub retriever: HybridRetriever,
    pub top_k: usize,
}

/// Wire form of a tool descriptor (`GET /tools/list`, reasoning prompts).
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Pull a single string argument out of loosely shaped input.
///
/// Accepts `{"key": "v"}`, `{"key": 12345}`, `"v"` and `12345`. Surrounding
/// quotes and whitespace are stripped.
pub fn string_arg(params: &Value, key: &str) -> Result<String, ToolError> {
    let raw = match params {
        Value::Object(map) => match map.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "{} 必须是字符串，收到 {}",
                    key, other
                )))
            }
            None => {
                return Err(ToolError::InvalidArguments(format!("缺少参数 {}", key)));
            }
        },
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "无法从 {} 中解析 {}",
                other, key
            )))
        }
    };

    let value = raw.trim().trim_matches(|c: char| c == '\'' || c == '"').trim();
    if value.is_empty() {
        return Err(ToolError::InvalidArguments(format!("{} 不能为空", key)));
    }
    Ok(value.to_string())
}

fn or_unknown(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => UNKNOWN,
    }
}

// ============ query_order ============

pub struct QueryOrderTool;

pub fn format_order(order: &Order) -> String {
    let amount = order
        .total_amount
        .map(|a| format!("{:.2}元", a))
        .unwrap_or_else(|| format!("{}元", UNKNOWN));
    let create = order.create_time.as_ref().map(format_timestamp);
    let receive = order.receive_time.as_ref().map(format_timestamp);

    let mut text = format!("订单 {} 信息：\n", order.order_id);
    text.push_str(&format!("- 状态：[{}]\n", or_unknown(order.status.as_deref())));
    text.push_str(&format!("- 总金额：[{}]\n", amount));
    text.push_str(&format!("- 创建时间：[{}]\n", or_unknown(create.as_deref())));
    text.push_str(&format!("- 签收时间：[{}]\n", or_unknown(receive.as_deref())));
    text.push_str(&format!("- 商品ID：[{}]", or_unknown(order.product_ids.as_deref())));
    if let Some(logistics) = order.logistics_info.as_deref().filter(|l| !l.trim().is_empty()) {
        text.push_str(&format!("\n- 物流信息：[{}]", logistics));
    }
    text
}

#[async_trait]
impl Tool for QueryOrderTool {
    fn name(&self) -> &str {
        "query_order"
    }

    fn description(&self) -> &str {
        "查询订单详情（含状态、金额、时间、商品ID和物流信息）。参数为order_id（订单编号，纯数字字符串，如12345）"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "order_id": { "type": "string", "description": "订单编号，如 12345" }
            },
            "required": ["order_id"]
        })
    }

    async fn execute(&self, params: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let order_id = string_arg(params, "order_id")?;
        info!(order_id = %order_id, "query_order");

        match ctx
            .store
            .fetch_order(&order_id)
            .await
            .map_err(ToolError::StoreUnavailable)?
        {
            Some(order) => Ok(format_order(&order)),
            None => {
                warn!(order_id = %order_id, "order not found");
                Ok(format!("未找到订单编号为 {} 的信息", order_id))
            }
        }
    }
}

// ============ query_product ============

pub struct QueryProductTool;

pub fn format_product(product: &Product) -> String {
    format!(
        "商品ID {} 的详细信息：\n- 名称：{}\n- 规格：{}\n- 描述：{}\n- 价格：{}\n- 活动：{}",
        product.id,
        or_unknown(Some(product.name.as_str())),
        or_unknown(product.specifications.as_deref()),
        or_unknown(product.description.as_deref()),
        or_unknown(product.price.as_deref()),
        or_unknown(product.activity.as_deref()),
    )
}

#[async_trait]
impl Tool for QueryProductTool {
    fn name(&self) -> &str {
        "query_product"
    }

    fn description(&self) -> &str {
        "按商品ID精确查询商品详情（含规格、描述、价格和活动）。参数为product_id（商品ID，例如'001'）"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "product_id": { "type": "string", "description": "商品ID，例如 001" }
            },
            "required": ["product_id"]
        })
    }

    async fn execute(&self, params: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let product_id = string_arg(params, "product_id")?;
        info!(product_id = %product_id, "query_product");

        match ctx
            .store
            .fetch_product(&product_id)
            .await
            .map_err(ToolError::StoreUnavailable)?
        {
            Some(product) => Ok(format_product(&product)),
            None => {
                warn!(product_id = %product_id, "product not found");
                Ok(format!("数据库中未找到商品ID为 {} 的信息", product_id))
            }
        }
    }
}

// ============ search_products ============

pub struct SearchProductsTool;

pub fn format_search_results(query: &str, results: &[RankedProduct]) -> String {
    let mut text = format!("根据您的描述 '{}'，为您找到以下最相关的商品：", query);
    for r in results {
        let p = &r.product;
        text.push_str(&format!(
            "\n{}. 商品ID: {}\n   名称: {}\n   规格: {}\n   价格: {}\n   活动: {}",
            r.rank,
            p.id,
            or_unknown(Some(p.name.as_str())),
            or_unknown(p.specifications.as_deref()),
            or_unknown(p.price.as_deref()),
            p.activity.as_deref().filter(|a| !a.trim().is_empty()).unwrap_or("无"),
        ));
    }
    text
}

#[async_trait]
impl Tool for SearchProductsTool {
    fn name(&self) -> &str {
        "search_products"
    }

    fn description(&self) -> &str {
        "通过自然语言描述进行语义搜索，查找相关商品。参数为query（商品描述），例如：'适合户外徒步的鞋'、'送给女朋友的生日礼物'"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "想要的商品的自然语言描述" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let query = string_arg(params, "query")?;
        info!(query = %query, k = ctx.top_k, "search_products");

        match ctx.retriever.retrieve(&query, ctx.top_k).await? {
            RetrievalOutcome::Found { products, .. } => Ok(format_search_results(&query, &products)),
            RetrievalOutcome::NoMatch(NoMatchReason::NoCandidates) => {
                Ok(format!("未找到与 '{}' 相关的商品。", query))
            }
            RetrievalOutcome::NoMatch(NoMatchReason::NoIdentifiers) => {
                Ok("找到了相似的描述，但无法关联到具体的商品ID。".to_string())
            }
            RetrievalOutcome::NoMatch(NoMatchReason::OutOfSync) => {
                Ok("数据库中未找到向量索引返回的商品ID，数据可能不同步。".to_string())
            }
        }
    }
}

// ============ Registry ============

/// Ordered collection of tools offered to the reasoning engine.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// `query_order`, `query_product` and `search_products`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(QueryOrderTool));
        registry.register(Box::new(QueryProductTool));
        registry.register(Box::new(SearchProductsTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Run a tool by name, always producing text.
    pub async fn invoke(&self, name: &str, params: &Value, ctx: &ToolContext) -> String {
        let Some(tool) = self.find(name) else {
            warn!(tool = name, "unknown tool requested");
            let names: Vec<&str> = self.tools.iter().map(|t| t.name()).collect();
            return format!("未知工具：{}。可用工具：{}", name, names.join(", "));
        };

        match tool.execute(params, ctx).await {
            Ok(text) => text,
            Err(e) => {
                warn!(tool = name, error = %e, "tool failed");
                e.user_message()
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============ CLI ============

/// `shopdesk tool list`: print each tool with its parameter schema.
pub fn list_tools() -> anyhow::Result<()> {
    let registry = ToolRegistry::with_builtins();
    for d in registry.descriptors() {
        println!("{}", d.name);
        println!("    {}", d.description);
        println!("    parameters: {}", d.parameters);
        println!();
    }
    Ok(())
}

/// `shopdesk tool call`: invoke one tool with `key=value` parameters and
/// print the text it would hand to the reasoning engine.
pub async fn run_tool(
    config: &Config,
    name: &str,
    params: Vec<(String, String)>,
) -> anyhow::Result<()> {
    let runtime = Runtime::load(config).await?;
    if runtime.tools.find(name).is_none() {
        let names: Vec<&str> = runtime.tools.tools().iter().map(|t| t.name()).collect();
        anyhow::bail!("Unknown tool: {} (available: {})", name, names.join(", "));
    }
    let args: serde_json::Map<String, Value> = params
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    let text = runtime
        .tools
        .invoke(name, &Value::Object(args), &runtime.ctx)
        .await;
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use shopdesk_core::embedding::Embedder;
    use shopdesk_core::index::{DistanceMetric, FlatIndex, IndexEntry};
    use shopdesk_core::store::memory::InMemoryRecordStore;

    struct ConstEmbedder;

    #[async_trait]
    impl Embedder for ConstEmbedder {
        fn model_name(&self) -> &str {
            "const"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0]).collect())
        }
    }

    fn bare_order(id: &str) -> Order {
        Order {
            order_id: id.to_string(),
            user_id: None,
            product_ids: None,
            status: None,
            total_amount: None,
            create_time: None,
            pay_time: None,
            ship_time: None,
            receive_time: None,
            logistics_info: None,
        }
    }

    fn product(id: &str, name: &str) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            specifications: Some("S/M".to_string()),
            price: Some("99元".to_string()),
            activity: None,
        }
    }

    fn ctx_with(store: InMemoryRecordStore, entries: Vec<IndexEntry>) -> (ToolContext, Arc<InMemoryRecordStore>) {
        let store = Arc::new(store);
        let index = FlatIndex::new("const", 1, DistanceMetric::L2, entries).unwrap();
        let retriever = HybridRetriever::new(Arc::new(ConstEmbedder), Arc::new(index), store.clone());
        (
            ToolContext {
                store: store.clone(),
                retriever,
                top_k: 5,
            },
            store,
        )
    }

    fn entry(id: &str, x: f32) -> IndexEntry {
        IndexEntry {
            product_id: Some(id.to_string()),
            text_hash: String::new(),
            vector: vec![x],
        }
    }

    #[test]
    fn test_string_arg_shapes() {
        assert_eq!(string_arg(&json!({"order_id": "12345"}), "order_id").unwrap(), "12345");
        assert_eq!(string_arg(&json!({"order_id": 12345}), "order_id").unwrap(), "12345");
        assert_eq!(string_arg(&json!("'001'"), "product_id").unwrap(), "001");
        assert_eq!(string_arg(&json!(42), "order_id").unwrap(), "42");
        assert!(string_arg(&json!({}), "order_id").is_err());
        assert!(string_arg(&json!("  "), "order_id").is_err());
        assert!(string_arg(&json!([1]), "order_id").is_err());
    }

    #[test]
    fn test_format_order_marks_absent_fields_unknown() {
        let text = format_order(&bare_order("777"));
        assert!(text.contains("777"));
        assert!(text.contains("- 状态：[未知]"));
        assert!(text.contains("- 总金额：[未知元]"));
        assert!(text.contains("- 创建时间：[未知]"));
        assert!(text.contains("- 签收时间：[未知]"));
        assert!(text.contains("- 商品ID：[未知]"));
        assert!(!text.contains("物流信息"));
    }

    #[test]
    fn test_format_order_full() {
        let mut order = bare_order("12345");
        order.status = Some("已签收".into());
        order.total_amount = Some(398.0);
        order.product_ids = Some("001,003".into());
        order.create_time =
            NaiveDateTime::parse_from_str("2023-10-01 09:30:00", "%Y-%m-%d %H:%M:%S").ok();
        order.logistics_info = Some("圆通快递: YT1234567890".into());
        let text = format_order(&order);
        assert!(text.contains("[已签收]"));
        assert!(text.contains("[398.00元]"));
        assert!(text.contains("[2023-10-01 09:30:00]"));
        assert!(text.contains("- 物流信息：[圆通快递: YT1234567890]"));
    }

    #[tokio::test]
    async fn test_query_order_not_found() {
        let (ctx, _) = ctx_with(InMemoryRecordStore::new(), vec![]);
        let registry = ToolRegistry::with_builtins();
        let text = registry
            .invoke("query_order", &json!({"order_id": "99999"}), &ctx)
            .await;
        assert_eq!(text, "未找到订单编号为 99999 的信息");
    }

    #[tokio::test]
    async fn test_query_product_missing_mentions_id() {
        let (ctx, _) = ctx_with(InMemoryRecordStore::with_data(vec![product("001", "T恤")], vec![]), vec![]);
        let text = ToolRegistry::with_builtins()
            .invoke("query_product", &json!("999"), &ctx)
            .await;
        assert!(text.contains("999"));
        assert!(text.contains("未找到"));
    }

    #[tokio::test]
    async fn test_store_outage_becomes_text() {
        let (ctx, store) = ctx_with(InMemoryRecordStore::new(), vec![]);
        store.set_offline(true);
        let text = ToolRegistry::with_builtins()
            .invoke("query_product", &json!({"product_id": "001"}), &ctx)
            .await;
        assert_eq!(text, "错误：无法连接到数据库。");
    }

    #[tokio::test]
    async fn test_search_reflects_live_store_values() {
        let (ctx, store) = ctx_with(
            InMemoryRecordStore::with_data(vec![product("001", "T恤"), product("002", "裤子")], vec![]),
            vec![entry("002", 0.5), entry("001", 1.0)],
        );
        let mut repriced = product("001", "T恤");
        repriced.price = Some("79元".into());
        store.insert_product(repriced);

        let text = ToolRegistry::with_builtins()
            .invoke("search_products", &json!({"query": "衣服"}), &ctx)
            .await;
        let first = text.find("商品ID: 002").unwrap();
        let second = text.find("商品ID: 001").unwrap();
        assert!(first < second);
        assert!(text.contains("79元"));
        assert!(text.contains("活动: 无"));
    }

    #[tokio::test]
    async fn test_search_lists_at_most_top_k() {
        let ids = ["001", "002", "003", "004"];
        let (mut ctx, _) = ctx_with(
            InMemoryRecordStore::with_data(ids.iter().map(|id| product(id, "衣服")).collect(), vec![]),
            ids.iter().enumerate().map(|(i, id)| entry(id, i as f32)).collect(),
        );
        ctx.top_k = 2;
        let text = ToolRegistry::with_builtins()
            .invoke("search_products", &json!("衣服"), &ctx)
            .await;
        assert!(text.contains("\n1. 商品ID: 001"));
        assert!(text.contains("\n2. 商品ID: 002"));
        assert!(!text.contains("\n3. "));
    }

    #[tokio::test]
    async fn test_search_empty_index_message() {
        let (ctx, _) = ctx_with(InMemoryRecordStore::new(), vec![]);
        let text = ToolRegistry::with_builtins()
            .invoke("search_products", &json!("登山鞋"), &ctx)
            .await;
        assert_eq!(text, "未找到与 '登山鞋' 相关的商品。");
    }

    #[tokio::test]
    async fn test_search_store_down_after_search() {
        let (ctx, store) = ctx_with(InMemoryRecordStore::new(), vec![entry("001", 0.0)]);
        store.set_offline(true);
        let text = ToolRegistry::with_builtins()
            .invoke("search_products", &json!("T恤"), &ctx)
            .await;
        assert!(text.contains("成功进行了语义搜索"));
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_available() {
        let (ctx, _) = ctx_with(InMemoryRecordStore::new(), vec![]);
        let text = ToolRegistry::with_builtins()
            .invoke("refund", &json!({}), &ctx)
            .await;
        assert!(text.contains("refund"));
        assert!(text.contains("search_products"));
    }

    #[test]
    fn test_descriptors_are_complete() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.len(), 3);
        for d in registry.descriptors() {
            assert!(!d.description.is_empty());
            assert_eq!(d.parameters["type"], "object");
            assert_eq!(d.parameters["required"].as_array().unwrap().len(), 1);
        }
    }
}
