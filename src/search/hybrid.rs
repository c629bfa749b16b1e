//! Hybrid search entry point: query analysis, per-sub-query vector and
//! lexical retrieval, then Reciprocal Rank Fusion.

use super::bm25::{Bm25Index, LexicalIndex};
use super::expansion::expand_query;
use super::filter::MetadataFilter;
use super::fusion::RrfFusion;
use crate::config::SearchConfig;
use crate::query::QueryAnalyzer;
use crate::types::{Chunk, QueryAnalysis, RetrievalResult, SearchResponse, SearchStats};
use crate::vectordb::VectorRetriever;
use crate::{Error, Result};
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct HybridSearch {
    lexical: Arc<LexicalIndex>,
    vector: Option<Arc<dyn VectorRetriever>>,
    analyzer: Option<Arc<QueryAnalyzer>>,
    fusion: RrfFusion,
    config: SearchConfig,
}

impl HybridSearch {
    pub fn new(lexical: Arc<LexicalIndex>, config: SearchConfig) -> Self {
        Self {
            lexical,
            vector: None,
            analyzer: None,
            fusion: RrfFusion::new(config.rrf_k),
            config,
        }
    }

    pub fn with_vector(mut self, vector: Arc<dyn VectorRetriever>) -> Self {
        self.vector = Some(vector);
        self
    }

    /// Complex queries are decomposed when `decompose_queries` is set.
    pub fn with_analyzer(mut self, analyzer: Arc<QueryAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn build_index(&self, chunks: Vec<Chunk>) {
        self.lexical.build(chunks);
    }

    pub fn add_chunks(&self, chunks: Vec<Chunk>) {
        self.lexical.add_chunks(chunks);
    }

    pub fn stats(&self) -> SearchStats {
        let indexed_chunks = self.lexical.len();
        SearchStats {
            indexed_chunks,
            has_lexical_index: indexed_chunks > 0,
            rrf_k: self.fusion.k(),
            vector_backend: self.vector.as_ref().map(|v| v.backend_name().to_string()),
        }
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        self.search_with_cancel(query, top_k, filter, &CancellationToken::new())
            .await
    }

    /// Search with the first matching lay term expanded to its clinical
    /// synonym, whatever `expand_synonyms` says.
    pub async fn search_with_expansion(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        let response = self
            .run(query, top_k, filter, &CancellationToken::new(), true)
            .await?;
        Ok(response.results)
    }

    /// Returns `Error::Cancelled` once `cancel` fires; collaborator failures
    /// only drop the affected signal.
    pub async fn search_with_cancel(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalResult>> {
        Ok(self.search_detailed(query, top_k, filter, cancel).await?.results)
    }

    /// Like `search_with_cancel`, also returning the analysis whose
    /// sub-queries were retrieved for. The query is analyzed once.
    pub async fn search_detailed(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        self.run(query, top_k, filter, cancel, self.config.expand_synonyms)
            .await
    }

    async fn run(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
        cancel: &CancellationToken,
        expand: bool,
    ) -> Result<SearchResponse> {
        if top_k == 0 {
            return Err(Error::InvalidArgument("top_k must be at least 1".to_string()));
        }

        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchResponse::default());
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let query = if expand {
            let expanded = expand_query(query);
            if expanded != query {
                debug!("[HYBRID] Expanded query: \"{}\"", expanded);
            }
            expanded
        } else {
            query.to_string()
        };

        let analysis = self.analyze(&query, cancel).await?;
        let sub_queries = match &analysis {
            Some(analysis) => analysis.sub_queries.clone(),
            None => vec![query.clone()],
        };

        let results = self
            .retrieve(&query, &sub_queries, top_k, filter, cancel)
            .await?;
        Ok(SearchResponse { analysis, results })
    }

    /// Full analysis when decomposition is enabled; otherwise everything but
    /// the decomposition, so no remote call is made.
    async fn analyze(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<QueryAnalysis>> {
        let Some(analyzer) = &self.analyzer else {
            return Ok(None);
        };
        if !self.config.decompose_queries {
            return Ok(Some(analyzer.summarize(query)));
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(Error::Cancelled),

            analysis = analyzer.analyze(query) => Ok(Some(analysis)),
        }
    }

    async fn retrieve(
        &self,
        query: &str,
        sub_queries: &[String],
        top_k: usize,
        filter: Option<&MetadataFilter>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalResult>> {
        let fanout = self.config.fanout(top_k);

        // one snapshot per request: chunk indices stay valid across a rebuild
        let index = self.lexical.snapshot();

        let mut vector_lists = Vec::with_capacity(sub_queries.len());
        let mut lexical_lists = Vec::with_capacity(sub_queries.len());
        for sub_query in sub_queries {
            vector_lists.push(
                self.vector_candidates(sub_query, fanout, filter, cancel)
                    .await?,
            );
            lexical_lists.push(index.search_filtered(sub_query, fanout, filter));
        }

        let vector_results = interleave(vector_lists, |r: &RetrievalResult| r.id.clone());
        let lexical_results = interleave(lexical_lists, |&(idx, _): &(usize, f32)| idx);

        debug!(
            "[HYBRID] {} sub-queries, {} vector and {} lexical candidates",
            sub_queries.len(),
            vector_results.len(),
            lexical_results.len()
        );

        let mut results = if lexical_results.is_empty() {
            vector_results
        } else if vector_results.is_empty() {
            lexical_only(&lexical_results, &index, top_k)
        } else {
            self.fusion.fuse(&vector_results, &lexical_results, &index)
        };
        results.truncate(top_k);

        info!("[HYBRID] Returning {} results for \"{}\"", results.len(), query);
        Ok(results)
    }

    async fn vector_candidates(
        &self,
        query: &str,
        fanout: usize,
        filter: Option<&MetadataFilter>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalResult>> {
        let Some(vector) = &self.vector else {
            return Ok(Vec::new());
        };

        let outcome = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(Error::Cancelled),

            outcome = vector.search_similar(query, fanout, filter) => outcome,
        };

        match outcome {
            Ok(hits) => Ok(hits.into_iter().map(RetrievalResult::from).collect()),
            Err(e) => {
                warn!(
                    "[HYBRID] Vector search via {} failed for \"{}\", continuing lexical-only: {}",
                    vector.backend_name(),
                    query,
                    e
                );
                Ok(Vec::new())
            }
        }
    }
}

/// Merge ranked lists round-robin by rank; the first occurrence of a key wins.
fn interleave<T, K, F>(lists: Vec<Vec<T>>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    let mut iters: Vec<_> = lists.into_iter().map(Vec::into_iter).collect();

    loop {
        let mut progressed = false;
        for iter in iters.iter_mut() {
            if let Some(item) = iter.next() {
                progressed = true;
                if seen.insert(key(&item)) {
                    merged.push(item);
                }
            }
        }
        if !progressed {
            break;
        }
    }
    merged
}

fn lexical_only(
    lexical: &[(usize, f32)],
    index: &Bm25Index,
    top_k: usize,
) -> Vec<RetrievalResult> {
    lexical
        .iter()
        .filter_map(|&(idx, score)| {
            index
                .chunk(idx)
                .map(|chunk| RetrievalResult::from_chunk(chunk, idx, score))
        })
        .take(top_k)
        .collect()
}
