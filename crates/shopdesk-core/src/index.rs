//! Semantic index: an immutable nearest-neighbour structure over embedded
//! product projections.
//!
//! [`FlatIndex`] is an exact (brute-force) implementation. It is built once,
//! either offline by `shopdesk index build` or in tests, and then shared
//! read-only behind an `Arc` by every concurrent retriever.
//!
//! Distances follow the "lower is more relevant" convention for every
//! [`DistanceMetric`].

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::embedding::{cosine_similarity, l2_distance_squared};

/// Distance function used to rank index entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance.
    #[default]
    L2,
    /// `1 - cosine_similarity`.
    Cosine,
}

impl DistanceMetric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => l2_distance_squared(a, b),
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::Cosine => "cosine",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "l2" => Ok(DistanceMetric::L2),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => bail!("Unknown distance metric: '{}'. Must be l2 or cosine.", other),
        }
    }
}

/// One embedded product projection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Product id from the entry's metadata. May be absent in damaged or
    /// hand-built indexes; such entries can match but never hydrate.
    pub product_id: Option<String>,
    /// SHA-256 (hex) of the embedded text, used for incremental rebuilds.
    pub text_hash: String,
    pub vector: Vec<f32>,
}

/// A single nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexCandidate {
    pub product_id: Option<String>,
    pub distance: f32,
}

/// Read-only top-k similarity search.
pub trait SemanticIndex: Send + Sync {
    /// Embedding model the index was built with.
    fn model_name(&self) -> &str;
    /// Vector dimensionality of every entry.
    fn dims(&self) -> usize;
    fn metric(&self) -> DistanceMetric;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return up to `k` candidates ordered by non-decreasing distance.
    ///
    /// Errors when the query vector does not match the index dimensionality.
    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexCandidate>>;
}

/// Exact nearest-neighbour index over an in-memory list of entries.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    model: String,
    dims: usize,
    metric: DistanceMetric,
    entries: Vec<IndexEntry>,
}

impl FlatIndex {
    /// Build an index, rejecting entries whose length differs from `dims`.
    pub fn new(
        model: impl Into<String>,
        dims: usize,
        metric: DistanceMetric,
        entries: Vec<IndexEntry>,
    ) -> Result<Self> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dims) {
            bail!(
                "index entry {:?} has {} dims, expected {}",
                bad.product_id,
                bad.vector.len(),
                dims
            );
        }
        Ok(Self {
            model: model.into(),
            dims,
            metric,
            entries,
        })
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }
}

impl SemanticIndex for FlatIndex {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexCandidate>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if vector.len() != self.dims {
            bail!(
                "query vector has {} dims but index '{}' expects {}",
                vector.len(),
                self.model,
                self.dims
            );
        }

        let mut hits: Vec<IndexCandidate> = self
            .entries
            .iter()
            .map(|e| IndexCandidate {
                product_id: e.product_id.clone(),
                distance: self.metric.distance(vector, &e.vector),
            })
            .collect();

        // Stable sort: ties keep build order.
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }
}
