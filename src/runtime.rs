//! Wiring: builds the shared handles every command and the server use.

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::{info, warn};

use shopdesk_core::index::{DistanceMetric, IndexCandidate, SemanticIndex};
use shopdesk_core::retrieval::HybridRetriever;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::index_store::load_index;
use crate::migrate::run_migrations;
use crate::orchestrator::Orchestrator;
use crate::reasoning::ReasoningEngine;
use crate::sqlite_store::SqliteRecordStore;
use crate::tools::{ToolContext, ToolRegistry};

/// Stand-in for an index that could not be loaded. Every query fails, so
/// semantic search reports the index as unavailable while exact lookups
/// keep working.
pub struct UnavailableIndex {
    model: String,
    reason: String,
    metric: DistanceMetric,
}

impl UnavailableIndex {
    pub fn new(model: impl Into<String>, reason: impl Into<String>, metric: DistanceMetric) -> Self {
        Self {
            model: model.into(),
            reason: reason.into(),
            metric,
        }
    }
}

impl SemanticIndex for UnavailableIndex {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        0
    }
    fn metric(&self) -> DistanceMetric {
        self.metric
    }
    fn len(&self) -> usize {
        0
    }
    fn query(&self, _vector: &[f32], _k: usize) -> Result<Vec<IndexCandidate>> {
        bail!("semantic index not loaded: {}", self.reason)
    }
}

/// Everything built from a [`Config`] at startup.
pub struct Runtime {
    pub store: Arc<SqliteRecordStore>,
    pub tools: Arc<ToolRegistry>,
    pub ctx: ToolContext,
    pub index_loaded: bool,
}

impl Runtime {
    pub async fn load(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        run_migrations(&pool).await?;
        let store = Arc::new(SqliteRecordStore::new(pool));

        let embedder = create_embedder(&config.embedding)?;

        let (index, index_loaded): (Arc<dyn SemanticIndex>, bool) =
            match load_index(&config.index.path) {
                Ok(index) => {
                    if index.metric() != config.index.metric {
                        warn!(
                            built = %index.metric(),
                            configured = %config.index.metric,
                            "index was built with a different metric; using the built one"
                        );
                    }
                    info!(
                        path = %config.index.path.display(),
                        entries = index.len(),
                        model = index.model_name(),
                        "semantic index loaded"
                    );
                    (Arc::new(index) as Arc<dyn SemanticIndex>, true)
                }
                Err(e) => {
                    warn!(error = %e, "semantic index unavailable");
                    (
                        Arc::new(UnavailableIndex::new(
                            embedder.model_name(),
                            e.to_string(),
                            config.index.metric,
                        )),
                        false,
                    )
                }
            };

        let retriever = HybridRetriever::new(embedder, index, store.clone());
        let ctx = ToolContext {
            store: store.clone(),
            retriever,
            top_k: config.retrieval.top_k,
        };

        Ok(Self {
            store,
            tools: Arc::new(ToolRegistry::with_builtins()),
            ctx,
            index_loaded,
        })
    }

    pub fn orchestrator(&self, engine: Arc<dyn ReasoningEngine>, config: &Config) -> Orchestrator {
        Orchestrator::new(
            engine,
            self.tools.clone(),
            self.ctx.clone(),
            config.conversation.max_parse_retries,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_index_rejects_queries() {
        let index = UnavailableIndex::new("hash-ngram-8", "missing file", DistanceMetric::L2);
        assert_eq!(index.model_name(), "hash-ngram-8");
        assert!(index.is_empty());
        let err = index.query(&[0.0; 8], 5).unwrap_err();
        assert!(err.to_string().contains("missing file"));
    }
}
