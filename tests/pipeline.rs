//! End-to-end turns over a seeded SQLite catalog and a hash-embedded index.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::sync::Arc;
use tempfile::TempDir;

use shopdesk::embedding::HashEmbedder;
use shopdesk::index_store::{build_index, index_status, load_index, save_index};
use shopdesk::orchestrator::{Orchestrator, Session};
use shopdesk::reasoning::{ReasoningEngine, ReasoningRequest};
use shopdesk::sqlite_store::SqliteRecordStore;
use shopdesk::tools::{ToolContext, ToolRegistry};
use shopdesk::{migrate, seed};
use shopdesk_core::index::{DistanceMetric, FlatIndex};
use shopdesk_core::retrieval::{HybridRetriever, RetrievalOutcome};

/// Looks up order 12345, then answers with the tool's observation.
struct OrderLookupEngine;

#[async_trait]
impl ReasoningEngine for OrderLookupEngine {
    async fn next_action(&self, request: &ReasoningRequest<'_>) -> Result<String> {
        let reply = match request.scratchpad.last() {
            None => json!({"action": "query_order", "action_input": {"order_id": "12345"}}),
            Some(step) => json!({
                "action": "Final Answer",
                "action_input": format!("为您查到：\n{}", step.observation)
            }),
        };
        Ok(reply.to_string())
    }
}

/// Searches the catalog with the customer's question, then relays the result.
struct SearchEngine;

#[async_trait]
impl ReasoningEngine for SearchEngine {
    async fn next_action(&self, request: &ReasoningRequest<'_>) -> Result<String> {
        let reply = match request.scratchpad.last() {
            None => json!({"action": "search_products", "action_input": {"query": request.question}}),
            Some(step) => json!({"action": "Final Answer", "action_input": step.observation}),
        };
        Ok(reply.to_string())
    }
}

async fn seeded_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    seed::run_seed(&pool).await.unwrap();
    pool
}

async fn indexed(store: &SqliteRecordStore, embedder: &HashEmbedder) -> FlatIndex {
    let (index, stats) = build_index(store, embedder, DistanceMetric::L2, 8, None)
        .await
        .unwrap();
    assert_eq!(stats.products, 15);
    index
}

async fn orchestrator(pool: SqlitePool, engine: Arc<dyn ReasoningEngine>) -> Orchestrator {
    let store = Arc::new(SqliteRecordStore::new(pool));
    let embedder = Arc::new(HashEmbedder::new(256));
    let index = indexed(&store, &embedder).await;
    let ctx = ToolContext {
        store: store.clone(),
        retriever: HybridRetriever::new(embedder, Arc::new(index), store),
        top_k: 5,
    };
    Orchestrator::new(engine, Arc::new(ToolRegistry::with_builtins()), ctx, 2)
}

#[tokio::test]
async fn test_order_question_answered_from_store() {
    let orch = orchestrator(seeded_pool().await, Arc::new(OrderLookupEngine)).await;
    let mut session = Session::new("e2e", 10);

    let outcome = orch
        .handle_question(&mut session, "我的订单12345到哪了？")
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.tool_calls, 1);
    assert!(outcome.answer.contains("12345"));
    assert!(outcome.answer.contains("已签收"));
    assert!(outcome.answer.contains("398"));
    assert_eq!(session.history().len(), 1);
}

#[tokio::test]
async fn test_catalog_edits_visible_without_reindexing() {
    let pool = seeded_pool().await;
    let orch = orchestrator(pool.clone(), Arc::new(SearchEngine)).await;

    sqlx::query("UPDATE products SET price = '89元', activity = '限时秒杀' WHERE id = '001'")
        .execute(&pool)
        .await
        .unwrap();

    let mut session = Session::new("e2e", 10);
    let outcome = orch
        .handle_question(&mut session, "适合夏天穿的纯棉衣服")
        .await;
    assert!(outcome.success);
    assert!(outcome.answer.contains("商品ID: 001"));
    assert!(outcome.answer.contains("89元"));
    assert!(outcome.answer.contains("限时秒杀"));
}

#[tokio::test]
async fn test_deleted_product_is_reported_stale() {
    let pool = seeded_pool().await;
    let store = Arc::new(SqliteRecordStore::new(pool.clone()));
    let embedder = Arc::new(HashEmbedder::new(256));
    let index = Arc::new(indexed(&store, &embedder).await);

    sqlx::query("DELETE FROM products WHERE id = '003'")
        .execute(&pool)
        .await
        .unwrap();

    let retriever = HybridRetriever::new(embedder, index.clone(), store.clone());
    match retriever.retrieve("轻便透气的跑步运动鞋", 15).await.unwrap() {
        RetrievalOutcome::Found {
            products,
            stale_ids,
        } => {
            assert_eq!(stale_ids, vec!["003".to_string()]);
            assert_eq!(products.len(), 14);
            assert!(products.iter().all(|r| r.product.id != "003"));
            let ranks: Vec<usize> = products.iter().map(|r| r.rank).collect();
            assert_eq!(ranks, (1..=14).collect::<Vec<_>>());
        }
        other => panic!("expected products, got {:?}", other),
    }

    let status = index_status(&index, store.as_ref()).await.unwrap();
    assert_eq!(status.entries, 15);
    assert_eq!(status.stale_ids, vec!["003".to_string()]);
}

#[tokio::test]
async fn test_index_file_round_trip_keeps_ranking() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("data/products.index.json");

    let pool = seeded_pool().await;
    let store = Arc::new(SqliteRecordStore::new(pool));
    let embedder = Arc::new(HashEmbedder::new(256));
    let built = indexed(&store, &embedder).await;
    save_index(&path, &built).unwrap();
    let loaded = load_index(&path).unwrap();

    let query = "保暖的冬季外套";
    let a = HybridRetriever::new(embedder.clone(), Arc::new(built), store.clone())
        .retrieve(query, 5)
        .await
        .unwrap();
    let b = HybridRetriever::new(embedder, Arc::new(loaded), store)
        .retrieve(query, 5)
        .await
        .unwrap();
    assert_eq!(a, b);
}
