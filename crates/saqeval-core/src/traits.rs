//! Core trait definitions for language-model backends.
//!
//! The async `LlmProvider` trait is implemented by the `saqeval-providers`
//! crate and by test doubles. Everything above it talks to a backend only
//! through [`crate::judge::JudgmentClient`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LLM Provider trait
// ---------------------------------------------------------------------------

/// Trait for LLM backends that answer a single prompt.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "openai").
    fn name(&self) -> &str;

    /// Produce a completion for a prompt.
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse>;

    /// List available models for this provider.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// Request for a single completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier (e.g. "gpt-4o-mini").
    pub model: String,
    /// The main prompt.
    pub prompt: String,
    /// Optional system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// JSON schema the answer must conform to, when structured output is wanted.
    #[serde(default)]
    pub response_schema: Option<ResponseSchema>,
}

/// A named JSON schema for structured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    /// Schema name, as required by some backends.
    pub name: String,
    /// The JSON schema document.
    pub schema: serde_json::Value,
}

/// Response from a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The raw response content.
    pub content: String,
    /// Model that actually generated the response.
    pub model: String,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting for one completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub estimated_cost_usd: f64,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
    /// Cost per 1K input tokens in USD.
    pub cost_per_1k_input: f64,
    /// Cost per 1K output tokens in USD.
    pub cost_per_1k_output: f64,
}

/// System prompt used when a request does not supply one.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an expert grading assistant for short-answer questions. Be precise and concise.";

/// Instruction appended to the system prompt for backends without native
/// structured-output support.
pub fn schema_instruction(schema: &ResponseSchema) -> String {
    format!(
        "Respond ONLY with a single JSON object conforming to this JSON schema \
         (no prose, no markdown):\n{}",
        schema.schema
    )
}

// ---------------------------------------------------------------------------
// Structured output extraction
// ---------------------------------------------------------------------------

/// Extract the first JSON object from an LLM response.
///
/// Handles:
/// - ```json``` fenced blocks (preferred)
/// - Generic ``` blocks
/// - Bare JSON, possibly surrounded by prose
pub fn extract_json_object(response: &str) -> Option<serde_json::Value> {
    let body = fenced_body(response).unwrap_or(response);
    let start = body.find('{')?;
    let value = serde_json::Deserializer::from_str(&body[start..])
        .into_iter::<serde_json::Value>()
        .next()?
        .ok()?;
    value.is_object().then_some(value)
}

fn fenced_body(response: &str) -> Option<&str> {
    let mut generic = None;
    let mut rest = response;

    while let Some(open) = rest.find("```") {
        let after_ticks = &rest[open + 3..];
        let line_end = after_ticks.find('\n')?;
        let lang = after_ticks[..line_end].trim().to_lowercase();
        let block_start = &after_ticks[line_end + 1..];
        // Truncated (unclosed) blocks still count.
        let (block, remainder) = match block_start.find("```") {
            Some(close) => (&block_start[..close], &block_start[close + 3..]),
            None => (block_start, ""),
        };

        if lang == "json" {
            return Some(block);
        }
        if lang.is_empty() && generic.is_none() {
            generic = Some(block);
        }
        rest = remainder;
    }

    generic
}
