use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Chunk metadata: source document id, tags, page number and so on.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A unit of retrievable text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Id used by the lexical side of fusion. Chunks ingested without an
    /// id get one derived from their corpus position.
    pub fn lexical_id(&self, index: usize) -> String {
        if self.id.is_empty() {
            format!("bm25_{index}")
        } else {
            self.id.clone()
        }
    }
}

/// Where a retrieval result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Vector,
    Bm25,
    /// Carried by both the vector and the lexical ranking
    Hybrid,
}

/// One scored candidate from a retrieval source or from fusion.
///
/// `score` is source-native (cosine similarity or BM25) and is not
/// comparable across sources. `fused_score` is only set by fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fused_score: Option<f32>,
    pub source: ResultSource,
}

impl RetrievalResult {
    pub fn from_chunk(chunk: &Chunk, index: usize, score: f32) -> Self {
        Self {
            id: chunk.lexical_id(index),
            content: chunk.content.clone(),
            metadata: chunk.metadata.clone(),
            score,
            fused_score: None,
            source: ResultSource::Bm25,
        }
    }
}

/// Medical query categories, checked in priority order by the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Emergency,
    Symptom,
    Treatment,
    Diagnosis,
    Prevention,
    General,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Emergency => "emergency",
            QueryType::Symptom => "symptom",
            QueryType::Treatment => "treatment",
            QueryType::Diagnosis => "diagnosis",
            QueryType::Prevention => "prevention",
            QueryType::General => "general",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse keyword matches per category, in keyword-list order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalEntities {
    pub conditions: Vec<String>,
    pub symptoms: Vec<String>,
    pub body_parts: Vec<String>,
    pub medications: Vec<String>,
}

impl MedicalEntities {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
            && self.symptoms.is_empty()
            && self.body_parts.is_empty()
            && self.medications.is_empty()
    }
}

/// Result of analyzing one user query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub original_query: String,
    pub is_complex: bool,
    pub query_type: QueryType,
    pub entities: MedicalEntities,
    /// Never empty; `[original_query]` when the query is not complex
    pub sub_queries: Vec<String>,
}

/// Results of one search, with the analysis that chose its sub-queries.
/// `analysis` is absent when no analyzer is configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<QueryAnalysis>,
    pub results: Vec<RetrievalResult>,
}

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchStats {
    pub indexed_chunks: usize,
    pub has_lexical_index: bool,
    pub rrf_k: usize,
    pub vector_backend: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexical_id_falls_back_to_position() {
        let named = Chunk::new("doc-1#0", "text");
        let unnamed = Chunk::new("", "text");

        assert_eq!(named.lexical_id(4), "doc-1#0");
        assert_eq!(unnamed.lexical_id(4), "bm25_4");
    }

    #[test]
    fn test_chunk_deserializes_without_optional_fields() {
        let chunk: Chunk = serde_json::from_str(r#"{"content": "flu shots"}"#).unwrap();
        assert!(chunk.id.is_empty());
        assert!(chunk.metadata.is_empty());
    }

    #[test]
    fn test_serialized_tags_are_lowercase() {
        assert_eq!(serde_json::to_string(&QueryType::Emergency).unwrap(), "\"emergency\"");
        assert_eq!(serde_json::to_string(&ResultSource::Bm25).unwrap(), "\"bm25\"");
    }
}
