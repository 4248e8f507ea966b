//! Deterministic `LlmProvider` test double.
//!
//! Substitutes the language-model backend at the provider boundary so the
//! evaluation pipeline can be driven through exact, scripted replies and
//! failures.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::model::FeedbackCategory;
use crate::traits::{GenerateRequest, GenerateResponse, LlmProvider, ModelInfo, TokenUsage};

/// One scripted provider behaviour.
#[derive(Debug, Clone)]
pub enum Step {
    /// Answer with this content.
    Reply(String),
    /// Fail with `ProviderError::NetworkError`.
    NetworkError(String),
    /// Fail with `ProviderError::AuthenticationFailed`.
    AuthFailure,
    /// Sleep before answering, long enough to trip a timeout.
    Hang(Duration),
}

impl Step {
    pub fn reply(content: impl Into<String>) -> Self {
        Step::Reply(content.into())
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        Step::NetworkError(message.into())
    }

    pub fn auth_failure() -> Self {
        Step::AuthFailure
    }

    /// A structured semantic-evaluation reply.
    pub fn evaluation(correctness: f64, category: FeedbackCategory) -> Self {
        Step::Reply(
            serde_json::json!({
                "correctness": correctness,
                "feedback_category": category,
                "reasoning": "scripted",
            })
            .to_string(),
        )
    }
}

/// Replays a queue of [`Step`]s, then repeats `fallback` (if any).
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Step>>,
    fallback: Option<Step>,
    call_count: AtomicU32,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            fallback: None,
            call_count: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that repeats `step` forever.
    pub fn always(step: Step) -> Self {
        Self {
            fallback: Some(step),
            ..Self::new(Vec::new())
        }
    }

    /// A provider whose every call fails with a network error.
    pub fn failing() -> Self {
        Self::always(Step::network_error("backend unreachable"))
    }

    /// Number of `generate` calls received.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_step(&self) -> Option<Step> {
        let queued = self.script.lock().ok().and_then(|mut s| s.pop_front());
        queued.or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let content = match self.next_step() {
            Some(Step::Reply(content)) => content,
            Some(Step::NetworkError(message)) => {
                return Err(ProviderError::NetworkError(message).into())
            }
            Some(Step::AuthFailure) => {
                return Err(ProviderError::AuthenticationFailed("scripted".into()).into())
            }
            Some(Step::Hang(delay)) => {
                tokio::time::sleep(delay).await;
                String::new()
            }
            None => anyhow::bail!("script exhausted"),
        };

        Ok(GenerateResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage::default(),
            latency_ms: 0,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "scripted".into(),
            name: "Scripted".into(),
            provider: "scripted".into(),
            max_context: 8_192,
            cost_per_1k_input: 0.0,
            cost_per_1k_output: 0.0,
        }]
    }
}
