use super::decompose::Decomposer;
use crate::config::DecompositionConfig;
use crate::llm::CompletionClient;
use crate::types::{MedicalEntities, QueryAnalysis, QueryType};
use crate::Result;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

const CONJUNCTIONS: [&str; 5] = [" and ", " also ", " as well as ", " plus ", " both "];
const MAX_SIMPLE_WORDS: usize = 15;

const EMERGENCY_KEYWORDS: [&str; 10] = [
    "emergency",
    "urgent",
    "immediately",
    "911",
    "chest pain",
    "can't breathe",
    "severe bleeding",
    "heart attack",
    "stroke",
    "choking",
];

const SYMPTOM_PATTERNS: [&str; 5] = [
    r"symptom",
    r"sign[s]? of",
    r"how do i know",
    r"what does .* feel like",
    r"is it normal",
];
const TREATMENT_PATTERNS: [&str; 9] = [
    r"treat",
    r"cure",
    r"remedy",
    r"medicine",
    r"medication",
    r"drug",
    r"how to get rid",
    r"what can i take",
    r"what helps",
];
const DIAGNOSIS_PATTERNS: [&str; 6] = [
    r"what is",
    r"what are",
    r"define",
    r"explain",
    r"cause[sd]?",
    r"why do",
];
const PREVENTION_PATTERNS: [&str; 5] = [
    r"prevent",
    r"avoid",
    r"reduce risk",
    r"protect",
    r"stop .* from",
];

// Substring matches: "cold" also hits "coldplay"
const CONDITION_KEYWORDS: [&str; 13] = [
    "diabetes",
    "hypertension",
    "asthma",
    "arthritis",
    "flu",
    "cold",
    "fever",
    "infection",
    "allergy",
    "migraine",
    "anxiety",
    "depression",
    "cancer",
];
const SYMPTOM_KEYWORDS: [&str; 12] = [
    "pain",
    "ache",
    "fever",
    "cough",
    "fatigue",
    "nausea",
    "dizziness",
    "swelling",
    "rash",
    "headache",
    "sore throat",
    "runny nose",
];
const BODY_PART_KEYWORDS: [&str; 14] = [
    "head", "chest", "stomach", "back", "neck", "throat", "knee", "shoulder", "arm", "leg", "heart",
    "lung", "liver", "kidney",
];
const MEDICATION_KEYWORDS: [&str; 8] = [
    "aspirin",
    "ibuprofen",
    "acetaminophen",
    "tylenol",
    "advil",
    "antibiotic",
    "insulin",
    "vitamin",
];

/// Query type patterns in the order they are tried after the emergency check
struct TypePatterns {
    query_type: QueryType,
    patterns: Vec<Regex>,
}

/// Classifies medical questions and splits compound ones
pub struct QueryAnalyzer {
    type_patterns: Vec<TypePatterns>,
    decomposer: Decomposer,
}

impl QueryAnalyzer {
    pub fn new() -> Result<Self> {
        let compile = |query_type: QueryType, sources: &[&str]| -> Result<TypePatterns> {
            let patterns = sources
                .iter()
                .map(|p| Regex::new(p))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(TypePatterns { query_type, patterns })
        };

        Ok(Self {
            type_patterns: vec![
                compile(QueryType::Symptom, &SYMPTOM_PATTERNS[..])?,
                compile(QueryType::Treatment, &TREATMENT_PATTERNS[..])?,
                compile(QueryType::Diagnosis, &DIAGNOSIS_PATTERNS[..])?,
                compile(QueryType::Prevention, &PREVENTION_PATTERNS[..])?,
            ],
            decomposer: Decomposer::new()?,
        })
    }

    /// Enable the remote decomposition tier.
    pub fn with_completion(
        mut self,
        client: Arc<dyn CompletionClient>,
        config: DecompositionConfig,
    ) -> Self {
        self.decomposer = self.decomposer.with_completion(client, config);
        self
    }

    /// Complex iff at least two indicators hold. Each conjunction marker
    /// counts as its own indicator.
    pub fn is_complex(&self, query: &str) -> bool {
        let lowered = query.to_lowercase();

        let mut indicators = usize::from(query.matches('?').count() > 1);
        indicators += CONJUNCTIONS.iter().filter(|c| lowered.contains(*c)).count();
        indicators += usize::from(query.split_whitespace().count() > MAX_SIMPLE_WORDS);
        indicators += usize::from(query.contains("; "));

        indicators >= 2
    }

    /// Emergency keywords win over every other category.
    pub fn classify_type(&self, query: &str) -> QueryType {
        let lowered = query.to_lowercase();

        if EMERGENCY_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            return QueryType::Emergency;
        }

        self.type_patterns
            .iter()
            .find(|group| group.patterns.iter().any(|p| p.is_match(&lowered)))
            .map_or(QueryType::General, |group| group.query_type)
    }

    pub fn extract_entities(&self, query: &str) -> MedicalEntities {
        let lowered = query.to_lowercase();
        let matching = |keywords: &[&str]| -> Vec<String> {
            keywords
                .iter()
                .filter(|kw| lowered.contains(*kw))
                .map(|kw| kw.to_string())
                .collect()
        };

        MedicalEntities {
            conditions: matching(&CONDITION_KEYWORDS[..]),
            symptoms: matching(&SYMPTOM_KEYWORDS[..]),
            body_parts: matching(&BODY_PART_KEYWORDS[..]),
            medications: matching(&MEDICATION_KEYWORDS[..]),
        }
    }

    pub async fn decompose(&self, query: &str) -> Vec<String> {
        self.decomposer.decompose(query).await
    }

    /// Everything but decomposition: `sub_queries` is always `[query]`.
    pub fn summarize(&self, query: &str) -> QueryAnalysis {
        QueryAnalysis {
            original_query: query.to_string(),
            is_complex: self.is_complex(query),
            query_type: self.classify_type(query),
            entities: self.extract_entities(query),
            sub_queries: vec![query.to_string()],
        }
    }

    /// Complex queries are decomposed; simple ones keep `[query]`.
    pub async fn analyze(&self, query: &str) -> QueryAnalysis {
        let mut analysis = self.summarize(query);
        if analysis.is_complex {
            analysis.sub_queries = self.decompose(query).await;
        }

        debug!(
            "[QUERY] type={} complex={} sub_queries={}",
            analysis.query_type,
            analysis.is_complex,
            analysis.sub_queries.len()
        );
        analysis
    }
}
