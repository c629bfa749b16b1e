//! Answer generation over retrieved passages.
//!
//! `ChatGenerator` is the single seam; the backend is picked from
//! `ChatConfig::backend` by `build_generator`.

use crate::config::{ChatBackend, ChatConfig};
use crate::llm::{CompletionClient, CompletionRequest};
use crate::types::RetrievalResult;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const FALLBACK_CONTEXT_CHARS: usize = 800;
const MAX_HISTORY_TURNS: usize = 6;

const URGENT_KEYWORDS: [&str; 8] = [
    "chest pain",
    "can't breathe",
    "bleeding",
    "emergency",
    "severe pain",
    "heart attack",
    "stroke",
    "choking",
];

const SYSTEM_PROMPT: &str = "You are a friendly medical assistant. Give short, simple health advice in everyday language.

- Answer directly, without greetings or introductions.
- Use short bullet points under bold section headers.
- Avoid medical jargon.
- For emergencies, tell the user to call emergency services first.
- Always end with a **See a doctor if:** section.";

const DISCLAIMER: &str = "\n\n**Note:** For personalized medical advice, please consult a healthcare professional.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, context: &str, history: &[ChatTurn]) -> Result<String>;

    fn name(&self) -> &str;
}

/// Deterministic answer built from the retrieved context alone
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn respond(context: &str) -> String {
        if context.trim().is_empty() {
            return "**AI Service Temporarily Unavailable**\n\n\
                    The assistant cannot answer right now.\n\n\
                    **What you can do:**\n\n\
                    - Try asking your question again in a moment\n\
                    - Upload medical documents for context\n\
                    - Consult a healthcare professional for urgent medical advice"
                .to_string();
        }

        format!(
            "**Based on Available Medical Information:**\n\n{}\n\n---\n\n\
             **Note:** The AI service is currently unavailable. The information above is from the medical knowledge base.\n\n\
             **Recommendation:** Please consult a healthcare professional for personalized medical advice.",
            truncate_chars(context, FALLBACK_CONTEXT_CHARS)
        )
    }
}

#[async_trait]
impl ChatGenerator for TemplateGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        context: &str,
        _history: &[ChatTurn],
    ) -> Result<String> {
        Ok(Self::respond(context))
    }

    fn name(&self) -> &str {
        "template"
    }
}

/// Answers through a remote completion model, falling back to the template
/// text when the call fails.
pub struct CompletionGenerator {
    client: Arc<dyn CompletionClient>,
    config: ChatConfig,
}

impl CompletionGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, config: ChatConfig) -> Self {
        Self { client, config }
    }

    fn user_content(&self, prompt: &str, context: &str, history: &[ChatTurn]) -> String {
        let mut content = String::new();

        let recent = &history[history.len().saturating_sub(MAX_HISTORY_TURNS)..];
        if !recent.is_empty() {
            content.push_str("Previous conversation:\n");
            for turn in recent {
                let speaker = match turn.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                content.push_str(&format!("{speaker}: {}\n", turn.content));
            }
            content.push('\n');
        }

        if is_urgent(prompt) {
            content.push_str(&format!(
                "URGENT: {prompt}\n\n(Provide emergency guidance immediately)"
            ));
        } else if !context.trim().is_empty() {
            content.push_str(&format!(
                "Question: {prompt}\n\nRelevant medical info:\n{}",
                truncate_chars(context, self.config.context_chars)
            ));
        } else {
            content.push_str(prompt);
        }
        content
    }
}

#[async_trait]
impl ChatGenerator for CompletionGenerator {
    async fn generate(&self, prompt: &str, context: &str, history: &[ChatTurn]) -> Result<String> {
        let content = self.user_content(prompt, context, history);
        let request = CompletionRequest::new(content, &self.config.model)
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);

        match self.client.complete(&request).await {
            Ok(answer) => {
                info!("[CHAT] Generated answer via {}", self.client.provider_name());
                Ok(with_disclaimer(answer))
            }
            Err(e) => {
                warn!(
                    "[CHAT] {} failed, using template answer: {}",
                    self.client.provider_name(),
                    e
                );
                Ok(TemplateGenerator::respond(context))
            }
        }
    }

    fn name(&self) -> &str {
        "remote"
    }
}

pub fn build_generator(
    config: &ChatConfig,
    client: Option<Arc<dyn CompletionClient>>,
) -> Arc<dyn ChatGenerator> {
    match (config.backend, client) {
        (ChatBackend::Remote, Some(client)) => {
            Arc::new(CompletionGenerator::new(client, config.clone()))
        }
        (ChatBackend::Remote, None) => {
            warn!(
                "[CHAT] Remote backend selected but no completion API key configured, using template"
            );
            Arc::new(TemplateGenerator)
        }
        (ChatBackend::Template, _) => Arc::new(TemplateGenerator),
    }
}

/// Join passages best first, each cut to `max_chars`.
pub fn build_context(results: &[RetrievalResult], max_chars: usize) -> String {
    results
        .iter()
        .map(|r| truncate_chars(r.content.trim(), max_chars))
        .filter(|passage| !passage.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn is_urgent(prompt: &str) -> bool {
    let lowered = prompt.to_lowercase();
    URGENT_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

fn with_disclaimer(answer: String) -> String {
    let lowered = answer.to_lowercase();
    if lowered.contains("consult") || lowered.contains("healthcare professional") {
        answer
    } else {
        answer + DISCLAIMER
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
