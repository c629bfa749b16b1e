//! Compound question decomposition: rule-based splitting first, then an
//! optional remote completion, then a no-op.

use crate::cache::{cache_key, TtlCache};
use crate::config::DecompositionConfig;
use crate::llm::{CompletionClient, CompletionRequest};
use crate::Result;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_REMOTE_SUB_QUERIES: usize = 3;
const MIN_SUB_QUERY_CHARS: usize = 6;

const DECOMPOSE_PROMPT: &str = "Break this medical question into 2-3 simpler, focused sub-questions.
Each sub-question should be answerable independently.
Return only the sub-questions, one per line.
No numbering, no explanations.

Question: {query}

Sub-questions:";

/// A split point. `resume_group`, when set, names a capture group whose
/// start is where the next part begins, so the group is kept in the output.
struct Separator {
    pattern: Regex,
    resume_group: Option<usize>,
}

impl Separator {
    fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            resume_group: None,
        })
    }

    fn keeping(pattern: &str, group: usize) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            resume_group: Some(group),
        })
    }

    fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut parts = Vec::new();
        let mut last = 0;

        for caps in self.pattern.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            parts.push(&text[last..whole.start()]);
            last = self
                .resume_group
                .and_then(|g| caps.get(g))
                .map_or(whole.end(), |m| m.start());
        }

        parts.push(&text[last..]);
        parts
    }
}

pub struct Decomposer {
    separators: Vec<Separator>,
    topic_pair: Regex,
    list_prefix: Regex,
    completion: Option<Arc<dyn CompletionClient>>,
    config: DecompositionConfig,
    cache: TtlCache<Vec<String>>,
}

impl Decomposer {
    pub fn new() -> Result<Self> {
        let config = DecompositionConfig::default();
        Ok(Self {
            separators: vec![
                Separator::new(r"(?i)\?\s*(?:and|also|additionally)")?,
                Separator::new(r"(?i)\.\s*(?:and|also|additionally)")?,
                Separator::new(r";\s*")?,
                Separator::keeping(r"(?i)\s+and\s+(what|how|why|when|where|can|does|is)", 1)?,
            ],
            topic_pair: Regex::new(
                r"(?i)^(?:what (?:are|is)|tell me about|explain)\s+(.+?)\s+and\s+(.+?)(?:\?|$)",
            )?,
            list_prefix: Regex::new(r"^[\d\.\-\*\)]+\s*")?,
            completion: None,
            cache: TtlCache::new(config.cache_ttl_secs),
            config,
        })
    }

    pub fn with_completion(
        mut self,
        client: Arc<dyn CompletionClient>,
        config: DecompositionConfig,
    ) -> Self {
        self.cache = TtlCache::new(config.cache_ttl_secs);
        self.completion = Some(client);
        self.config = config;
        self
    }

    /// Never fails: returns `[query]` when no tier produces sub-queries.
    pub async fn decompose(&self, query: &str) -> Vec<String> {
        let sub_queries = self.rule_based(query);
        if !sub_queries.is_empty() {
            debug!("[QUERY] Rule-based decomposition: {:?}", sub_queries);
            return sub_queries;
        }

        if let Some(sub_queries) = self.remote(query).await {
            debug!("[QUERY] Remote decomposition: {:?}", sub_queries);
            return sub_queries;
        }

        vec![query.to_string()]
    }

    pub fn rule_based(&self, query: &str) -> Vec<String> {
        for separator in &self.separators {
            let parts: Vec<String> = separator
                .split(query)
                .into_iter()
                .map(|p| p.trim().trim_start_matches(',').trim_start())
                .filter(|p| !p.is_empty())
                .map(terminate)
                .collect();

            if parts.len() >= 2 {
                return parts;
            }
        }

        match self.topic_pair.captures(query) {
            Some(caps) => {
                let first = caps.get(1).map_or("", |m| m.as_str().trim());
                let second = caps.get(2).map_or("", |m| m.as_str().trim());
                vec![format!("What is {first}?"), format!("What is {second}?")]
            }
            None => Vec::new(),
        }
    }

    async fn remote(&self, query: &str) -> Option<Vec<String>> {
        let client = self.completion.as_ref()?;

        let key = cache_key("decompose", &query.trim().to_lowercase());
        if let Some(cached) = self.cache.get(&key) {
            debug!("[QUERY] Decomposition cache hit");
            return Some(cached);
        }

        let prompt = DECOMPOSE_PROMPT.replace("{query}", query);
        let request = CompletionRequest::new(prompt, &self.config.model)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);

        let outcome = tokio::time::timeout(self.config.timeout(), client.complete(&request)).await;
        let response = match outcome {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("[QUERY] Remote decomposition failed: {}", e);
                return None;
            }
            Err(_) => {
                warn!("[QUERY] Remote decomposition timed out after {:?}", self.config.timeout());
                return None;
            }
        };

        let sub_queries = self.parse_lines(&response);
        if sub_queries.is_empty() {
            return None;
        }

        self.cache.purge_expired();
        self.cache.insert(key, sub_queries.clone());
        Some(sub_queries)
    }

    fn parse_lines(&self, response: &str) -> Vec<String> {
        response
            .trim()
            .lines()
            .map(|line| self.list_prefix.replace(line.trim(), "").into_owned())
            .filter(|line| line.chars().count() >= MIN_SUB_QUERY_CHARS)
            .map(|line| if line.ends_with('?') { line } else { format!("{line}?") })
            .take(MAX_REMOTE_SUB_QUERIES)
            .collect()
    }
}

fn terminate(part: &str) -> String {
    if part.ends_with('?') || part.ends_with('.') {
        part.to_string()
    } else {
        format!("{part}?")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Scripted {
        reply: Option<String>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for Scripted {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(request.prompt.contains("Question: "));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply
                .clone()
                .ok_or_else(|| Error::Completion("rate limited".to_string()))
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }
    }

    const NOVEL: &str =
        "Compare the long-term outlook for type one versus type two diabetes patients";

    const TWO_LINES: &str = "What is type 1 diabetes?\nWhat is type 2 diabetes?";

    #[test]
    fn test_split_on_question_then_also() {
        let decomposer = Decomposer::new().unwrap();
        assert_eq!(
            decomposer.rule_based("What is diabetes? Also, how is it treated?"),
            vec!["What is diabetes?", "how is it treated?"]
        );
    }

    #[test]
    fn test_split_on_semicolon() {
        let decomposer = Decomposer::new().unwrap();
        assert_eq!(
            decomposer.rule_based("What causes flu; how long does it last"),
            vec!["What causes flu?", "how long does it last?"]
        );
    }

    #[test]
    fn test_split_before_question_word_keeps_it() {
        let decomposer = Decomposer::new().unwrap();
        assert_eq!(
            decomposer.rule_based("What is asthma and how is it treated?"),
            vec!["What is asthma?", "how is it treated?"]
        );
    }

    #[test]
    fn test_topic_pair() {
        let decomposer = Decomposer::new().unwrap();
        assert_eq!(
            decomposer.rule_based("Tell me about diabetes and hypertension"),
            vec!["What is diabetes?", "What is hypertension?"]
        );
    }

    #[test]
    fn test_single_part_split_is_not_a_decomposition() {
        let decomposer = Decomposer::new().unwrap();
        assert!(decomposer.rule_based("What helps a sore throat;").is_empty());
    }

    #[tokio::test]
    async fn test_no_op_without_remote() {
        let decomposer = Decomposer::new().unwrap();
        assert_eq!(decomposer.decompose("What is asthma?").await, vec!["What is asthma?"]);
        assert_eq!(decomposer.decompose(NOVEL).await, vec![NOVEL]);
    }

    #[tokio::test]
    async fn test_remote_tier_parses_and_caps() {
        let client = Arc::new(Scripted::replying(
            "1. What is type 1 diabetes?\n2. What is type 2 diabetes\n- ok\n\n* How do outcomes differ?\n4) One more question",
        ));
        let decomposer = Decomposer::new()
            .unwrap()
            .with_completion(client.clone(), DecompositionConfig::default());

        assert_eq!(
            decomposer.decompose(NOVEL).await,
            vec![
                "What is type 1 diabetes?",
                "What is type 2 diabetes?",
                "How do outcomes differ?"
            ]
        );
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remote_tier_is_skipped_when_rules_match() {
        let client = Arc::new(Scripted::replying("Should not be used"));
        let decomposer = Decomposer::new()
            .unwrap()
            .with_completion(client.clone(), DecompositionConfig::default());

        decomposer.decompose("What is asthma and how is it treated?").await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_remote_result_is_cached() {
        let client = Arc::new(Scripted::replying(TWO_LINES));
        let decomposer = Decomposer::new()
            .unwrap()
            .with_completion(client.clone(), DecompositionConfig::default());

        let first = decomposer.decompose(NOVEL).await;
        let second = decomposer.decompose(&format!("  {}  ", NOVEL.to_uppercase())).await;

        assert_eq!(first, second);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_decompositions_are_purged_on_insert() {
        let client = Arc::new(Scripted::replying(TWO_LINES));
        let config = DecompositionConfig {
            cache_ttl_secs: -1,
            ..Default::default()
        };
        let decomposer = Decomposer::new().unwrap().with_completion(client.clone(), config);

        decomposer.decompose(NOVEL).await;
        decomposer.decompose("Compare recovery times after knee versus hip replacement").await;

        assert_eq!(decomposer.cache.len(), 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_remote_failure_degrades_to_query() {
        let decomposer = Decomposer::new()
            .unwrap()
            .with_completion(Arc::new(Scripted::failing()), DecompositionConfig::default());

        assert_eq!(decomposer.decompose(NOVEL).await, vec![NOVEL]);
    }

    #[tokio::test]
    async fn test_remote_timeout_degrades_to_query() {
        let client = Scripted {
            delay: Some(Duration::from_secs(30)),
            ..Scripted::replying("What is type 1 diabetes?")
        };
        let config = DecompositionConfig {
            timeout_secs: 1,
            ..Default::default()
        };
        let decomposer = Decomposer::new().unwrap().with_completion(Arc::new(client), config);

        assert_eq!(decomposer.decompose(NOVEL).await, vec![NOVEL]);
    }
}
