//! Offline build, persistence, and health check of the semantic index.
//!
//! The index file is a JSON manifest:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "model": "bge-small-zh-v1.5",
//!   "dims": 512,
//!   "metric": "l2",
//!   "built_at": "2024-01-01T00:00:00Z",
//!   "entries": [
//!     { "product_id": "001", "text_hash": "<sha256 hex>", "vector": "<base64 LE f32>" }
//!   ]
//! }
//! ```
//!
//! Each entry stores the SHA-256 of the text that was embedded, so an
//! incremental build can reuse vectors for products whose name and
//! description did not change.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use shopdesk_core::embedding::{blob_to_vec, vec_to_blob, Embedder};
use shopdesk_core::index::{DistanceMetric, FlatIndex, IndexEntry, SemanticIndex};
use shopdesk_core::store::RecordStore;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::sqlite_store::SqliteRecordStore;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    format_version: u32,
    model: String,
    dims: usize,
    metric: DistanceMetric,
    built_at: DateTime<Utc>,
    entries: Vec<EntryRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryRecord {
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    text_hash: String,
    vector: String,
}

/// Counters reported by [`build_index`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    pub products: usize,
    pub embedded: usize,
    pub reused: usize,
}

/// Result of [`index_status`].
#[derive(Debug, Clone)]
pub struct IndexStatus {
    pub model: String,
    pub dims: usize,
    pub metric: DistanceMetric,
    pub entries: usize,
    /// Index ids that no longer resolve in the record store.
    pub stale_ids: Vec<String>,
}

pub fn text_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Load a previously built index.
pub fn load_index(path: &Path) -> Result<FlatIndex> {
    if !path.exists() {
        bail!(
            "Index file not found: {}. Run `shopdesk index build` first.",
            path.display()
        );
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read index file: {}", path.display()))?;
    let file: IndexFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse index file: {}", path.display()))?;

    if file.format_version != FORMAT_VERSION {
        bail!(
            "Unsupported index format version {} (expected {})",
            file.format_version,
            FORMAT_VERSION
        );
    }

    let entries = file
        .entries
        .into_iter()
        .map(|e| {
            let bytes = STANDARD
                .decode(&e.vector)
                .with_context(|| format!("Invalid vector encoding for {:?}", e.product_id))?;
            Ok(IndexEntry {
                product_id: e.product_id,
                text_hash: e.text_hash,
                vector: blob_to_vec(&bytes),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    FlatIndex::new(file.model, file.dims, file.metric, entries)
}

/// Write an index atomically (temp file + rename).
pub fn save_index(path: &Path, index: &FlatIndex) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = IndexFile {
        format_version: FORMAT_VERSION,
        model: index.model_name().to_string(),
        dims: index.dims(),
        metric: index.metric(),
        built_at: Utc::now(),
        entries: index
            .entries()
            .iter()
            .map(|e| EntryRecord {
                product_id: e.product_id.clone(),
                text_hash: e.text_hash.clone(),
                vector: STANDARD.encode(vec_to_blob(&e.vector)),
            })
            .collect(),
    };

    let json = serde_json::to_string(&file)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .with_context(|| format!("Failed to write index file: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move index into place: {}", path.display()))?;
    Ok(())
}

/// Embed the store's product projection into a fresh [`FlatIndex`].
///
/// With `previous`, vectors are reused for products whose text hash is
/// unchanged, provided the previous index was built with the same model
/// and dimensionality.
pub async fn build_index(
    store: &dyn RecordStore,
    embedder: &dyn Embedder,
    metric: DistanceMetric,
    batch_size: usize,
    previous: Option<&FlatIndex>,
) -> Result<(FlatIndex, BuildStats)> {
    let projections = store
        .list_product_projections()
        .await
        .context("Failed to read products for indexing")?;

    let reusable: HashMap<&str, &IndexEntry> = match previous {
        Some(prev) if prev.model_name() == embedder.model_name() && prev.dims() == embedder.dims() => {
            prev.entries()
                .iter()
                .filter_map(|e| e.product_id.as_deref().map(|id| (id, e)))
                .collect()
        }
        Some(prev) => {
            info!(
                previous = prev.model_name(),
                current = embedder.model_name(),
                "embedding model changed, rebuilding every vector"
            );
            HashMap::new()
        }
        None => HashMap::new(),
    };

    let mut stats = BuildStats {
        products: projections.len(),
        ..BuildStats::default()
    };

    // Slots keep catalog order; `None` marks entries still to embed.
    let mut slots: Vec<(String, String, Option<Vec<f32>>)> = Vec::with_capacity(projections.len());
    let mut pending: Vec<(usize, String)> = Vec::new();

    for p in &projections {
        let text = p.index_text();
        let hash = text_hash(&text);
        match reusable.get(p.id.as_str()) {
            Some(entry) if entry.text_hash == hash => {
                slots.push((p.id.clone(), hash, Some(entry.vector.clone())));
                stats.reused += 1;
            }
            _ => {
                pending.push((slots.len(), text));
                slots.push((p.id.clone(), hash, None));
            }
        }
    }

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != texts.len() {
            bail!(
                "Embedding provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            );
        }
        for ((slot, _), vector) in batch.iter().zip(vectors) {
            slots[*slot].2 = Some(vector);
        }
        stats.embedded += batch.len();
        debug!(embedded = stats.embedded, total = pending.len(), "embedding batch done");
    }

    let entries = slots
        .into_iter()
        .map(|(id, hash, vector)| {
            let vector = vector.with_context(|| format!("No vector produced for product {}", id))?;
            Ok(IndexEntry {
                product_id: Some(id),
                text_hash: hash,
                vector,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let index = FlatIndex::new(embedder.model_name(), embedder.dims(), metric, entries)?;
    info!(
        products = stats.products,
        embedded = stats.embedded,
        reused = stats.reused,
        "semantic index built"
    );
    Ok((index, stats))
}

/// Compare the index against the record store.
pub async fn index_status(index: &FlatIndex, store: &dyn RecordStore) -> Result<IndexStatus> {
    let ids: Vec<String> = index
        .entries()
        .iter()
        .filter_map(|e| e.product_id.clone())
        .collect();
    let resolved = store.fetch_products_by_ids(&ids).await?;
    let known: std::collections::HashSet<&str> = resolved.iter().map(|p| p.id.as_str()).collect();
    let stale_ids = ids
        .iter()
        .filter(|id| !known.contains(id.as_str()))
        .cloned()
        .collect();

    Ok(IndexStatus {
        model: index.model_name().to_string(),
        dims: index.dims(),
        metric: index.metric(),
        entries: index.len(),
        stale_ids,
    })
}

/// `shopdesk index build`: embed the catalog and write the index file.
///
/// With `incremental`, an existing index at the configured path is used to
/// skip products whose text did not change.
pub async fn run_index_build(config: &Config, incremental: bool) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in the config to build the index.");
    }
    let pool = db::connect(config).await?;
    let store = SqliteRecordStore::new(pool);
    let embedder = create_embedder(&config.embedding)?;

    let previous = if incremental && config.index.path.exists() {
        Some(load_index(&config.index.path)?)
    } else {
        None
    };

    let (index, stats) = build_index(
        &store,
        embedder.as_ref(),
        config.index.metric,
        config.embedding.batch_size,
        previous.as_ref(),
    )
    .await?;
    save_index(&config.index.path, &index)?;

    println!("index build");
    println!("  model: {} ({} dims, {})", index.model_name(), index.dims(), index.metric());
    println!("  products: {}", stats.products);
    println!("  embedded: {}", stats.embedded);
    println!("  reused: {}", stats.reused);
    println!("  written to: {}", config.index.path.display());
    Ok(())
}

/// `shopdesk index status`: describe the index and list stale ids.
pub async fn run_index_status(config: &Config) -> Result<()> {
    let index = load_index(&config.index.path)?;
    let pool = db::connect(config).await?;
    let store = SqliteRecordStore::new(pool);
    let status = index_status(&index, &store).await?;

    println!("index status");
    println!("  path: {}", config.index.path.display());
    println!("  model: {} ({} dims, {})", status.model, status.dims, status.metric);
    println!("  entries: {}", status.entries);
    if status.stale_ids.is_empty() {
        println!("  stale: none");
    } else {
        println!(
            "  stale: {} ({})",
            status.stale_ids.len(),
            status.stale_ids.join(", ")
        );
    }
    if config.embedding.is_enabled() {
        let embedder = create_embedder(&config.embedding)?;
        if embedder.model_name() != status.model || embedder.dims() != status.dims {
            println!(
                "  warning: configured embedder is {} ({} dims); rebuild the index",
                embedder.model_name(),
                embedder.dims()
            );
        }
    }
    Ok(())
}
