use super::{VectorHit, VectorRetriever};
use crate::embeddings::EmbeddingProvider;
use crate::search::MetadataFilter;
use crate::types::Chunk;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};
use usearch::{Index, MetricKind, ScalarKind};

const STORAGE_BATCH_SIZE: usize = 50;

/// In-memory cosine index over chunk embeddings.
pub struct USearchStore {
    index: Index,
    embedding: Arc<dyn EmbeddingProvider>,
    entries: RwLock<HashMap<u64, Chunk>>,
    next_key: AtomicU64,
    dimension: usize,
}

impl USearchStore {
    /// The provider must already know its dimension.
    pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let dimension = embedding.dimension();
        if dimension == 0 {
            return Err(Error::VectorSearch(format!(
                "{} reported dimension 0; initialize the provider first",
                embedding.provider_name()
            )));
        }

        let index = Index::new(&usearch::IndexOptions {
            dimensions: dimension,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
            multi: false,
        })
        .map_err(|e| Error::VectorSearch(format!("Failed to create index: {e:?}")))?;

        Ok(Self {
            index,
            embedding,
            entries: RwLock::new(HashMap::new()),
            next_key: AtomicU64::new(0),
            dimension,
        })
    }

    /// Embed and index chunks, returning how many were added.
    ///
    /// Keys are insertion positions. A chunk without an id is named from its
    /// position the way the lexical index names it, so both sides agree when
    /// fed the same corpus in the same order.
    pub async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        let mut added = 0;

        for (i, batch) in chunks.chunks(STORAGE_BATCH_SIZE).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedding.embed_batch(&texts).await?;

            self.index
                .reserve(self.index.size() + batch.len())
                .map_err(|e| Error::VectorSearch(format!("Failed to reserve capacity: {e:?}")))?;

            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            for (chunk, vector) in batch.iter().zip(vectors.iter()) {
                if vector.len() != self.dimension {
                    return Err(Error::VectorSearch(format!(
                        "Vector dimension mismatch: expected {}, got {}",
                        self.dimension,
                        vector.len()
                    )));
                }
                let key = self.next_key.fetch_add(1, Ordering::Relaxed);
                self.index
                    .add(key, vector)
                    .map_err(|e| Error::VectorSearch(format!("Failed to add vector: {e:?}")))?;
                let mut stored = chunk.clone();
                stored.id = chunk.lexical_id(key as usize);
                entries.insert(key, stored);
                added += 1;
            }

            debug!("[VECTOR] Inserted batch {} ({} vectors)", i + 1, batch.len());
        }

        info!("[VECTOR] Indexed {} chunks ({} total)", added, self.len());
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorRetriever for USearchStore {
    async fn search_similar(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedding.embed(query).await?;
        if query_vector.len() != self.dimension {
            return Err(Error::VectorSearch(format!(
                "Query vector dimension mismatch: expected {}, got {}",
                self.dimension,
                query_vector.len()
            )));
        }

        // filtered searches overfetch so the filter has something to drop
        let count = match filter {
            Some(_) => k.saturating_mul(4).max(k.saturating_add(32)).min(self.len()),
            None => k.min(self.len()),
        };

        let matches = self
            .index
            .search(&query_vector, count)
            .map_err(|e| Error::VectorSearch(format!("Search failed: {e:?}")))?;

        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let hits = matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter_map(|(key, distance)| {
                let chunk = entries.get(key)?;
                if filter.is_some_and(|f| !f.matches(&chunk.metadata)) {
                    return None;
                }
                Some(VectorHit {
                    id: chunk.id.clone(),
                    content: chunk.content.clone(),
                    metadata: chunk.metadata.clone(),
                    score: 1.0 - distance,
                })
            })
            .take(k)
            .collect();

        Ok(hits)
    }

    fn backend_name(&self) -> &str {
        "usearch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOCABULARY: [&str; 7] = [
        "diabetes",
        "symptoms",
        "treatment",
        "insulin",
        "hypertension",
        "causes",
        "salt",
    ];

    /// Bag-of-words over a fixed vocabulary, plus a bias term so no vector is zero.
    struct BagOfWords;

    #[async_trait]
    impl EmbeddingProvider for BagOfWords {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let lowered = text.to_lowercase();
            let mut vector: Vec<f32> = VOCABULARY
                .iter()
                .map(|word| lowered.matches(word).count() as f32)
                .collect();
            vector.push(0.05);
            Ok(vector)
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimension(&self) -> usize {
            VOCABULARY.len() + 1
        }

        fn provider_name(&self) -> &str {
            "bag-of-words"
        }
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            Chunk::new("c1", "Diabetes symptoms").with_metadata("topic", "diabetes"),
            Chunk::new("c2", "Diabetes treatment with insulin").with_metadata("topic", "diabetes"),
            Chunk::new("c3", "Hypertension causes: salt").with_metadata("topic", "cardio"),
        ]
    }

    #[tokio::test]
    async fn test_insert_and_search() {
        let store = USearchStore::new(Arc::new(BagOfWords)).unwrap();
        assert_eq!(store.insert_chunks(&corpus()).await.unwrap(), 3);

        let hits = store.search_similar("diabetes symptoms", 2, None).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "c1");
        assert_eq!(hits[1].id, "c2");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_filtered_search() {
        let store = USearchStore::new(Arc::new(BagOfWords)).unwrap();
        store.insert_chunks(&corpus()).await.unwrap();

        let filter = MetadataFilter::eq("topic", "cardio");
        let hits = store.search_similar("diabetes symptoms", 2, Some(&filter)).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c3");
    }

    #[tokio::test]
    async fn test_chunks_without_id_are_named_by_position() {
        let store = USearchStore::new(Arc::new(BagOfWords)).unwrap();
        let chunks = vec![
            Chunk::new("", "Diabetes symptoms"),
            Chunk::new("c2", "Diabetes treatment with insulin"),
            Chunk::new("", "Hypertension causes: salt"),
        ];
        store.insert_chunks(&chunks).await.unwrap();

        let mut ids: Vec<String> = store
            .search_similar("diabetes", 3, None)
            .await
            .unwrap()
            .into_iter()
            .map(|hit| hit.id)
            .collect();
        ids.sort();

        assert_eq!(ids, vec!["bm25_0", "bm25_2", "c2"]);
    }

    #[tokio::test]
    async fn test_huge_k_with_filter_does_not_overflow() {
        let store = USearchStore::new(Arc::new(BagOfWords)).unwrap();
        store.insert_chunks(&corpus()).await.unwrap();

        let filter = MetadataFilter::eq("topic", "diabetes");
        let hits = store.search_similar("diabetes", usize::MAX, Some(&filter)).await.unwrap();

        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let store = USearchStore::new(Arc::new(BagOfWords)).unwrap();
        assert!(store.search_similar("anything", 5, None).await.unwrap().is_empty());
    }
}
