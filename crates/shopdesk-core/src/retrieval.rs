//! Hybrid product retrieval: semantic candidates, authoritative hydration.
//!
//! The retriever never reads product fields from the semantic index. The
//! index only proposes ranked ids; names, prices, and promotions always
//! come from the record store at call time, so catalog edits are visible
//! without re-embedding.
//!
//! # Algorithm
//!
//! 1. Embed the query.
//! 2. Take the `k` nearest index entries (lower distance = more relevant).
//! 3. Keep their product ids in rank order, dropping missing ids and
//!    later duplicates.
//! 4. Hydrate all ids with one batched, rank-preserving store lookup.
//! 5. Drop ids the store no longer knows (stale index) and return the rest
//!    in their original rank order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::embedding::{embed_one, Embedder};
use crate::index::{IndexCandidate, SemanticIndex};
use crate::models::Product;
use crate::store::RecordStore;

/// Number of candidates requested from the index when not configured.
pub const DEFAULT_TOP_K: usize = 5;

/// Failures that stop a retrieval. "Nothing found" is not one of them;
/// see [`RetrievalOutcome::NoMatch`].
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The embedding function could not be invoked.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    /// The semantic index rejected the query.
    #[error("semantic index unavailable: {0}")]
    IndexUnavailable(String),
    /// Semantic search succeeded but the record store could not be reached.
    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Why a retrieval produced no products.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMatchReason {
    /// The index returned zero candidates.
    NoCandidates,
    /// Candidates were found but none carried a product id.
    NoIdentifiers,
    /// Every candidate id was missing from the record store.
    OutOfSync,
}

/// A hydrated product with its position in the result list.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedProduct {
    /// 1-based position among the returned products.
    pub rank: usize,
    /// Distance reported by the semantic index.
    pub distance: f32,
    pub product: Product,
}

/// Result of a successful retrieval call.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalOutcome {
    Found {
        products: Vec<RankedProduct>,
        /// Index ids that the store did not resolve, in rank order.
        stale_ids: Vec<String>,
    },
    NoMatch(NoMatchReason),
}

/// Combines a [`SemanticIndex`] with a [`RecordStore`].
///
/// Holds only shared immutable handles; cloning is cheap and every call is
/// independent.
#[derive(Clone)]
pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn SemanticIndex>,
    store: Arc<dyn RecordStore>,
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn SemanticIndex>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        if embedder.model_name() != index.model_name() {
            warn!(
                embedder = embedder.model_name(),
                index = index.model_name(),
                "embedding model differs from the model the index was built with"
            );
        }
        Self {
            embedder,
            index,
            store,
        }
    }

    /// Resolve a free-text query into at most `k` ranked, hydrated products.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        let query_vec = embed_one(self.embedder.as_ref(), query)
            .await
            .map_err(|e| RetrievalError::EmbeddingUnavailable(e.to_string()))?;

        let candidates = self
            .index
            .query(&query_vec, k)
            .map_err(|e| RetrievalError::IndexUnavailable(e.to_string()))?;

        if candidates.is_empty() {
            info!(query, "semantic index returned no candidates");
            return Ok(RetrievalOutcome::NoMatch(NoMatchReason::NoCandidates));
        }

        for c in &candidates {
            debug!(product_id = ?c.product_id, distance = c.distance, "index candidate");
        }

        let ranked = ranked_ids(&candidates);
        if ranked.is_empty() {
            warn!(
                query,
                candidates = candidates.len(),
                "index candidates carry no product id"
            );
            return Ok(RetrievalOutcome::NoMatch(NoMatchReason::NoIdentifiers));
        }

        let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
        let rows = self
            .store
            .fetch_products_by_ids(&ids)
            .await
            .map_err(|e| RetrievalError::StoreUnavailable(e.to_string()))?;

        let (products, stale_ids) = hydrate(&ranked, rows);

        if !stale_ids.is_empty() {
            warn!(
                ?stale_ids,
                resolved = products.len(),
                "semantic index references products missing from the store"
            );
        }

        if products.is_empty() {
            return Ok(RetrievalOutcome::NoMatch(NoMatchReason::OutOfSync));
        }

        info!(query, results = products.len(), "hybrid retrieval complete");
        Ok(RetrievalOutcome::Found {
            products,
            stale_ids,
        })
    }
}

/// Product ids in rank order, first occurrence wins, id-less hits dropped.
fn ranked_ids(candidates: &[IndexCandidate]) -> Vec<(String, f32)> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter_map(|c| {
            let id = c.product_id.as_deref()?.trim();
            if id.is_empty() || !seen.insert(id.to_string()) {
                return None;
            }
            Some((id.to_string(), c.distance))
        })
        .collect()
}

/// Join store rows back onto the ranked id list.
///
/// Rows are re-sorted by their requested position so a backend that
/// ignores the ordering contract still cannot reorder results.
fn hydrate(ranked: &[(String, f32)], rows: Vec<Product>) -> (Vec<RankedProduct>, Vec<String>) {
    let position: HashMap<&str, usize> = ranked
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (id.as_str(), i))
        .collect();

    let mut by_position: Vec<(usize, Product)> = Vec::with_capacity(rows.len());
    let mut resolved = HashSet::new();
    for row in rows {
        if let Some(&pos) = position.get(row.id.as_str()) {
            if resolved.insert(pos) {
                by_position.push((pos, row));
            }
        }
    }
    by_position.sort_by_key(|(pos, _)| *pos);

    let products = by_position
        .into_iter()
        .enumerate()
        .map(|(i, (pos, product))| RankedProduct {
            rank: i + 1,
            distance: ranked[pos].1,
            product,
        })
        .collect();

    let stale_ids = ranked
        .iter()
        .enumerate()
        .filter(|(i, _)| !resolved.contains(i))
        .map(|(_, (id, _))| id.clone())
        .collect();

    (products, stale_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DistanceMetric, FlatIndex, IndexEntry};
    use crate::store::memory::InMemoryRecordStore;
    use anyhow::{bail, Result};
    use async_trait::async_trait;

    /// Embeds `"x,y"` strings directly into 2-d vectors.
    struct CoordEmbedder;

    #[async_trait]
    impl Embedder for CoordEmbedder {
        fn model_name(&self) -> &str {
            "coords"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            texts
                .iter()
                .map(|t| {
                    let parts: Vec<f32> = t
                        .split(',')
                        .map(|p| p.trim().parse::<f32>())
                        .collect::<Result<_, _>>()?;
                    Ok(parts)
                })
                .collect()
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn model_name(&self) -> &str {
            "coords"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            bail!("model not loaded")
        }
    }

    fn product(id: &str) -> Product {
        Product {
            id: id.to_string(),
            name: format!("product {}", id),
            description: None,
            specifications: Some("M".into()),
            price: Some("10元".into()),
            activity: None,
        }
    }

    fn entry(id: Option<&str>, x: f32) -> IndexEntry {
        IndexEntry {
            product_id: id.map(str::to_string),
            text_hash: String::new(),
            vector: vec![x, 0.0],
        }
    }

    fn retriever(entries: Vec<IndexEntry>, store: InMemoryRecordStore) -> HybridRetriever {
        let index = FlatIndex::new("coords", 2, DistanceMetric::L2, entries).unwrap();
        HybridRetriever::new(Arc::new(CoordEmbedder), Arc::new(index), Arc::new(store))
    }

    fn found_ids(outcome: &RetrievalOutcome) -> Vec<String> {
        match outcome {
            RetrievalOutcome::Found { products, .. } => {
                products.iter().map(|p| p.product.id.clone()).collect()
            }
            RetrievalOutcome::NoMatch(r) => panic!("expected results, got {:?}", r),
        }
    }

    #[tokio::test]
    async fn test_rank_follows_distance_not_id() {
        // ids deliberately anti-correlated with distance
        let r = retriever(
            vec![
                entry(Some("001"), 9.0),
                entry(Some("002"), 1.0),
                entry(Some("003"), 5.0),
            ],
            InMemoryRecordStore::with_data(vec![product("001"), product("002"), product("003")], vec![]),
        );
        let outcome = r.retrieve("0,0", 5).await.unwrap();
        assert_eq!(found_ids(&outcome), vec!["002", "003", "001"]);
        if let RetrievalOutcome::Found { products, .. } = outcome {
            assert!(products.windows(2).all(|w| w[0].distance <= w[1].distance));
            assert_eq!(products[0].rank, 1);
            assert_eq!(products[2].rank, 3);
        }
    }

    #[tokio::test]
    async fn test_partial_staleness_returns_resolved_subset_in_order() {
        let r = retriever(
            vec![
                entry(Some("a"), 1.0),
                entry(Some("gone"), 2.0),
                entry(Some("b"), 3.0),
                entry(Some("also-gone"), 4.0),
                entry(Some("c"), 5.0),
            ],
            InMemoryRecordStore::with_data(vec![product("a"), product("b"), product("c")], vec![]),
        );
        let outcome = r.retrieve("0,0", 5).await.unwrap();
        assert_eq!(found_ids(&outcome), vec!["a", "b", "c"]);
        match outcome {
            RetrievalOutcome::Found {
                products,
                stale_ids,
            } => {
                assert_eq!(products.len(), 3);
                assert_eq!(stale_ids, vec!["gone", "also-gone"]);
                let ranks: Vec<usize> = products.iter().map(|p| p.rank).collect();
                assert_eq!(ranks, vec![1, 2, 3]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_index_is_no_match() {
        let r = retriever(vec![], InMemoryRecordStore::new());
        let outcome = r.retrieve("0,0", 5).await.unwrap();
        assert_eq!(outcome, RetrievalOutcome::NoMatch(NoMatchReason::NoCandidates));
    }

    #[tokio::test]
    async fn test_candidates_without_ids_is_no_match() {
        let r = retriever(
            vec![entry(None, 1.0), entry(Some("  "), 2.0)],
            InMemoryRecordStore::with_data(vec![product("001")], vec![]),
        );
        let outcome = r.retrieve("0,0", 5).await.unwrap();
        assert_eq!(outcome, RetrievalOutcome::NoMatch(NoMatchReason::NoIdentifiers));
    }

    #[tokio::test]
    async fn test_all_stale_is_out_of_sync() {
        let r = retriever(
            vec![entry(Some("x"), 1.0), entry(Some("y"), 2.0)],
            InMemoryRecordStore::with_data(vec![product("001")], vec![]),
        );
        let outcome = r.retrieve("0,0", 5).await.unwrap();
        assert_eq!(outcome, RetrievalOutcome::NoMatch(NoMatchReason::OutOfSync));
    }

    #[tokio::test]
    async fn test_duplicate_ids_keep_first_occurrence() {
        let r = retriever(
            vec![
                entry(Some("a"), 1.0),
                entry(Some("b"), 2.0),
                entry(Some("a"), 3.0),
            ],
            InMemoryRecordStore::with_data(vec![product("a"), product("b")], vec![]),
        );
        let outcome = r.retrieve("0,0", 5).await.unwrap();
        assert_eq!(found_ids(&outcome), vec!["a", "b"]);
        if let RetrievalOutcome::Found { products, .. } = outcome {
            assert!((products[0].distance - 1.0).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_candidate_without_id_is_skipped() {
        let r = retriever(
            vec![entry(None, 1.0), entry(Some("b"), 2.0)],
            InMemoryRecordStore::with_data(vec![product("b")], vec![]),
        );
        let outcome = r.retrieve("0,0", 5).await.unwrap();
        assert_eq!(found_ids(&outcome), vec!["b"]);
    }

    #[tokio::test]
    async fn test_store_offline_is_store_unavailable() {
        let store = InMemoryRecordStore::with_data(vec![product("a")], vec![]);
        store.set_offline(true);
        let r = retriever(vec![entry(Some("a"), 1.0)], store);
        let err = r.retrieve("0,0", 5).await.unwrap_err();
        assert!(matches!(err, RetrievalError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_embedding_unavailable() {
        let index = FlatIndex::new("coords", 2, DistanceMetric::L2, vec![entry(Some("a"), 1.0)])
            .unwrap();
        let r = HybridRetriever::new(
            Arc::new(BrokenEmbedder),
            Arc::new(index),
            Arc::new(InMemoryRecordStore::new()),
        );
        let err = r.retrieve("anything", 5).await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_index_unavailable() {
        let r = retriever(vec![entry(Some("a"), 1.0)], InMemoryRecordStore::new());
        let err = r.retrieve("1,2,3", 5).await.unwrap_err();
        assert!(matches!(err, RetrievalError::IndexUnavailable(_)));
    }

    #[tokio::test]
    async fn test_k_limits_candidates() {
        let entries = (0..8).map(|i| entry(Some(&format!("p{}", i)), i as f32)).collect();
        let products = (0..8).map(|i| product(&format!("p{}", i))).collect();
        let r = retriever(entries, InMemoryRecordStore::with_data(products, vec![]));
        let outcome = r.retrieve("0,0", DEFAULT_TOP_K).await.unwrap();
        assert_eq!(found_ids(&outcome), vec!["p0", "p1", "p2", "p3", "p4"]);
    }

    #[test]
    fn test_hydrate_reorders_misbehaving_backend() {
        let ranked = vec![("a".to_string(), 0.1), ("b".to_string(), 0.2)];
        let (products, stale) = hydrate(&ranked, vec![product("b"), product("a")]);
        assert!(stale.is_empty());
        assert_eq!(products[0].product.id, "a");
        assert_eq!(products[1].product.id, "b");
    }
}
