//! Dense retrieval boundary.
//!
//! The hybrid search only sees `VectorRetriever`; `USearchStore` is the
//! in-process implementation, remote stores plug in the same way.

pub mod usearch_db;

use crate::search::MetadataFilter;
use crate::types::{Metadata, RetrievalResult, ResultSource};
use crate::Result;
use async_trait::async_trait;

/// One hit from a similarity search, best first
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    /// Similarity, higher is closer
    pub score: f32,
}

impl From<VectorHit> for RetrievalResult {
    fn from(hit: VectorHit) -> Self {
        Self {
            id: hit.id,
            content: hit.content,
            metadata: hit.metadata,
            score: hit.score,
            fused_score: None,
            source: ResultSource::Vector,
        }
    }
}

#[async_trait]
pub trait VectorRetriever: Send + Sync {
    /// Top `k` chunks by embedding similarity to `query`. May fail on
    /// transport errors; callers degrade rather than propagate.
    async fn search_similar(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>>;

    fn backend_name(&self) -> &str;
}

pub use usearch_db::USearchStore;
