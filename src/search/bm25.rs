//! In-memory BM25 (Okapi) lexical index.
//!
//! `Bm25Index` is immutable once built. `LexicalIndex` is the shared handle
//! readers search through: a rebuild constructs a fresh `Bm25Index` off to
//! the side and swaps the `Arc`, so a search runs against either the old or
//! the new corpus and never a partially built one.

use super::filter::MetadataFilter;
use super::tokenizer::tokenize;
use crate::config::Bm25Config;
use crate::types::Chunk;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use tracing::info;

pub struct Bm25Index {
    chunks: Vec<Chunk>,
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<usize>,
    idf: HashMap<String, f64>,
    avgdl: f64,
    params: Bm25Config,
}

impl Bm25Index {
    pub fn empty(params: Bm25Config) -> Self {
        Self::build(Vec::new(), params)
    }

    /// Tokenize every chunk and compute corpus statistics. Cost is linear in
    /// corpus size; there is no incremental path.
    pub fn build(chunks: Vec<Chunk>, params: Bm25Config) -> Self {
        let analyzed: Vec<(HashMap<String, u32>, usize)> = chunks
            .par_iter()
            .map(|chunk| {
                let tokens = tokenize(&chunk.content);
                let len = tokens.len();
                let mut tf: HashMap<String, u32> = HashMap::new();
                for token in tokens {
                    *tf.entry(token).or_insert(0) += 1;
                }
                (tf, len)
            })
            .collect();

        let (term_freqs, doc_lens): (Vec<_>, Vec<_>) = analyzed.into_iter().unzip();

        // ordered so the idf sum, and with it every score, is reproducible
        let mut doc_freq: BTreeMap<&str, usize> = BTreeMap::new();
        for tf in &term_freqs {
            for term in tf.keys() {
                *doc_freq.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let corpus_size = chunks.len();
        let total_len: usize = doc_lens.iter().sum();
        let avgdl = if corpus_size == 0 {
            0.0
        } else {
            total_len as f64 / corpus_size as f64
        };

        // Okapi idf; terms present in more than half the corpus go negative
        // and are floored to epsilon * average idf.
        let n = corpus_size as f64;
        let mut idf: HashMap<String, f64> = HashMap::with_capacity(doc_freq.len());
        let mut idf_sum = 0.0;
        let mut negative = Vec::new();
        for (term, freq) in &doc_freq {
            let freq = *freq as f64;
            let value = (n - freq + 0.5).ln() - (freq + 0.5).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.to_string());
            }
            idf.insert(term.to_string(), value);
        }
        if !idf.is_empty() {
            let floor = f64::from(params.epsilon) * (idf_sum / idf.len() as f64);
            for term in negative {
                idf.insert(term, floor);
            }
        }

        Self {
            chunks,
            term_freqs,
            doc_lens,
            idf,
            avgdl,
            params,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    /// BM25 score of every chunk for the given query tokens, in corpus order.
    /// Repeated query tokens count once per occurrence.
    pub fn scores(&self, query_tokens: &[String]) -> Vec<f32> {
        let k1 = f64::from(self.params.k1);
        let b = f64::from(self.params.b);

        let mut scores = vec![0.0f64; self.chunks.len()];
        for token in query_tokens {
            let Some(idf) = self.idf.get(token) else {
                continue;
            };
            for (doc, score) in scores.iter_mut().enumerate() {
                let tf = f64::from(self.term_freqs[doc].get(token).copied().unwrap_or(0));
                if tf == 0.0 {
                    continue;
                }
                let length_ratio = if self.avgdl > 0.0 {
                    self.doc_lens[doc] as f64 / self.avgdl
                } else {
                    1.0
                };
                *score += idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * length_ratio));
            }
        }

        scores.into_iter().map(|s| s as f32).collect()
    }

    /// Top `top_k` chunks as `(chunk_index, score)`, best first; equal
    /// scores keep corpus order. A query with no tokens matches nothing.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(usize, f32)> {
        self.search_filtered(query, top_k, None)
    }

    pub fn search_filtered(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<(usize, f32)> {
        if self.chunks.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<(usize, f32)> = self
            .scores(&tokens)
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| filter.map_or(true, |f| f.matches(&self.chunks[*idx].metadata)))
            .collect();

        // stable: ties stay in corpus order
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked.truncate(top_k);
        ranked
    }
}

/// Process-wide lexical index shared by concurrent searches.
pub struct LexicalIndex {
    current: RwLock<Arc<Bm25Index>>,
    // serializes writers so add_chunks never loses a concurrent rebuild
    rebuild: Mutex<()>,
    params: Bm25Config,
}

impl LexicalIndex {
    pub fn new(params: Bm25Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(Bm25Index::empty(params))),
            rebuild: Mutex::new(()),
            params,
        }
    }

    /// The index searches should run against. Chunk indices returned by a
    /// search are only meaningful for the snapshot that produced them.
    pub fn snapshot(&self) -> Arc<Bm25Index> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the whole corpus.
    pub fn build(&self, chunks: Vec<Chunk>) {
        let _writer = self.rebuild.lock().unwrap_or_else(|e| e.into_inner());
        self.rebuild_locked(chunks);
    }

    /// Append chunks and rebuild over the full corpus.
    pub fn add_chunks(&self, chunks: Vec<Chunk>) {
        let _writer = self.rebuild.lock().unwrap_or_else(|e| e.into_inner());
        let mut corpus = self.snapshot().chunks().to_vec();
        corpus.extend(chunks);
        self.rebuild_locked(corpus);
    }

    fn rebuild_locked(&self, chunks: Vec<Chunk>) {
        let count = chunks.len();
        let index = Arc::new(Bm25Index::build(chunks, self.params));
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = index;
        info!("[BM25] Built index with {} chunks", count);
    }

    pub fn search(&self, query: &str, top_k: usize) -> Vec<(usize, f32)> {
        self.snapshot().search(query, top_k)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

impl Default for LexicalIndex {
    fn default() -> Self {
        Self::new(Bm25Config::default())
    }
}
