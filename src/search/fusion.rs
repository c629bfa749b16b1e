//! Reciprocal Rank Fusion of a vector ranking and a lexical ranking.
//!
//! Cosine similarities and BM25 scores live on incomparable scales, so only
//! rank positions are combined: each list contributes `1 / (k + rank + 1)`
//! (rank counted from 0) and contributions for the same id are summed.

use super::bm25::Bm25Index;
use crate::types::{RetrievalResult, ResultSource};
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// Default RRF constant
pub const RRF_K: usize = 60;

#[derive(Debug, Clone, Copy)]
pub struct RrfFusion {
    k: usize,
}

impl RrfFusion {
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn contribution(&self, rank: usize) -> f32 {
        1.0 / (self.k + rank + 1) as f32
    }

    /// Fuse vector results with lexical `(chunk_index, score)` pairs whose
    /// indices refer to `corpus`.
    ///
    /// Output is sorted by fused score; equal scores keep first-seen order,
    /// vector list first. Display fields come from whichever list carried
    /// the id first. An id repeated within one list only counts once.
    pub fn fuse(
        &self,
        vector_results: &[RetrievalResult],
        lexical_results: &[(usize, f32)],
        corpus: &Bm25Index,
    ) -> Vec<RetrievalResult> {
        let mut fused: Vec<RetrievalResult> = Vec::new();
        let mut position: HashMap<String, usize> = HashMap::new();

        let mut seen: HashSet<&str> = HashSet::new();
        for (rank, result) in vector_results.iter().enumerate() {
            if !seen.insert(result.id.as_str()) {
                continue;
            }
            let contribution = self.contribution(rank);
            match position.entry(result.id.clone()) {
                Entry::Occupied(slot) => {
                    add_score(&mut fused[*slot.get()], contribution);
                }
                Entry::Vacant(slot) => {
                    slot.insert(fused.len());
                    let mut entry = result.clone();
                    entry.fused_score = Some(contribution);
                    fused.push(entry);
                }
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        for (rank, &(chunk_index, score)) in lexical_results.iter().enumerate() {
            let Some(chunk) = corpus.chunk(chunk_index) else {
                continue;
            };
            let id = chunk.lexical_id(chunk_index);
            if !seen.insert(id.clone()) {
                continue;
            }
            let contribution = self.contribution(rank);
            match position.entry(id) {
                Entry::Occupied(slot) => {
                    let entry = &mut fused[*slot.get()];
                    add_score(entry, contribution);
                    if entry.source == ResultSource::Vector {
                        entry.source = ResultSource::Hybrid;
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(fused.len());
                    let mut entry = RetrievalResult::from_chunk(chunk, chunk_index, score);
                    entry.fused_score = Some(contribution);
                    fused.push(entry);
                }
            }
        }

        // sort_by is stable, so ties keep insertion order
        fused.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(Ordering::Equal)
        });
        fused
    }
}

impl Default for RrfFusion {
    fn default() -> Self {
        Self::new(RRF_K)
    }
}

fn add_score(result: &mut RetrievalResult, contribution: f32) {
    result.fused_score = Some(result.fused_score.unwrap_or(0.0) + contribution);
}
