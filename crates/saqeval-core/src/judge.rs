//! The Judgment Client: one prompt in, one schema-conformant value out.
//!
//! Wraps an [`LlmProvider`] with a bounded per-call timeout, transport retries
//! with exponential backoff, and structured-output parsing. Every failure is
//! classified as a [`JudgmentError`]; callers collapse it further into
//! [`crate::error::JudgmentUnavailable`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;

use crate::error::{JudgmentError, ProviderError};
use crate::traits::{extract_json_object, GenerateRequest, LlmProvider, ResponseSchema};

/// A value the backend can be asked to produce as structured output.
pub trait StructuredOutput: DeserializeOwned {
    /// The JSON schema sent to the backend.
    fn response_schema() -> ResponseSchema;
}

/// Transport-level knobs for the Judgment Client.
#[derive(Debug, Clone)]
pub struct JudgmentConfig {
    /// Model identifier passed to the provider.
    pub model: String,
    /// Upper bound for a single provider call.
    pub timeout: Duration,
    /// Retries on transient provider errors (not on timeouts or bad output).
    pub max_retries: u32,
    /// Initial delay between retries; doubled on each retry.
    pub retry_delay: Duration,
    /// Cap for the backoff delay.
    pub max_retry_delay: Duration,
}

impl Default for JudgmentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(8),
        }
    }
}

/// Sampling settings for one kind of call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallSettings {
    pub temperature: f64,
    pub max_tokens: u32,
}

/// A fully-built prompt ready to send.
#[derive(Debug, Clone)]
pub struct JudgmentPrompt {
    pub system: String,
    pub user: String,
    pub settings: CallSettings,
}

/// Capability wrapping a language-model backend.
#[derive(Clone)]
pub struct JudgmentClient {
    provider: Arc<dyn LlmProvider>,
    config: JudgmentConfig,
}

impl JudgmentClient {
    pub fn new(provider: Arc<dyn LlmProvider>, config: JudgmentConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn config(&self) -> &JudgmentConfig {
        &self.config
    }

    /// Ask for a value of type `T` and validate the answer against it.
    pub async fn structured<T: StructuredOutput>(
        &self,
        prompt: &JudgmentPrompt,
    ) -> Result<T, JudgmentError> {
        let content = self.call(prompt, Some(T::response_schema())).await?;
        parse_structured(&content)
    }

    /// Ask for free text. An empty completion counts as non-conformant.
    pub async fn text(&self, prompt: &JudgmentPrompt) -> Result<String, JudgmentError> {
        let content = self.call(prompt, None).await?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(JudgmentError::SchemaValidation("empty completion".into()));
        }
        Ok(trimmed.to_string())
    }

    async fn call(
        &self,
        prompt: &JudgmentPrompt,
        response_schema: Option<ResponseSchema>,
    ) -> Result<String, JudgmentError> {
        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.user.clone(),
            system_prompt: Some(prompt.system.clone()),
            max_tokens: prompt.settings.max_tokens,
            temperature: prompt.settings.temperature,
            response_schema,
        };

        let start = Instant::now();
        let mut retry_delay = self.config.retry_delay;
        let mut last_error = None;

        for retry in 0..=self.config.max_retries {
            if retry > 0 {
                tokio::time::sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(self.config.max_retry_delay);
            }

            let attempt = tokio::time::timeout(self.config.timeout, self.provider.generate(&request));
            match attempt.await {
                Err(_) => {
                    return Err(JudgmentError::Timeout {
                        timeout_ms: self.config.timeout.as_millis() as u64,
                    });
                }
                Ok(Ok(response)) => {
                    tracing::debug!(
                        provider = self.provider.name(),
                        model = %response.model,
                        latency_ms = start.elapsed().as_millis() as u64,
                        retries = retry,
                        "judgment call complete"
                    );
                    return Ok(response.content);
                }
                Ok(Err(e)) => {
                    if let Some(provider_err) = e.downcast_ref::<ProviderError>() {
                        if provider_err.is_permanent() {
                            return Err(JudgmentError::Transport(e));
                        }
                        if let ProviderError::Timeout(_) = provider_err {
                            return Err(JudgmentError::Timeout {
                                timeout_ms: start.elapsed().as_millis() as u64,
                            });
                        }
                        if let Some(ms) = provider_err.retry_after_ms() {
                            retry_delay = Duration::from_millis(ms).min(self.config.max_retry_delay);
                        }
                    }
                    tracing::debug!(retry, error = %e, "transient judgment failure");
                    last_error = Some(e);
                }
            }
        }

        Err(JudgmentError::Transport(
            last_error.unwrap_or_else(|| anyhow::anyhow!("no attempt was made")),
        ))
    }
}

fn parse_structured<T: DeserializeOwned>(content: &str) -> Result<T, JudgmentError> {
    let value = extract_json_object(content).ok_or_else(|| {
        JudgmentError::SchemaValidation("no JSON object found in completion".into())
    })?;
    serde_json::from_value(value).map_err(|e| JudgmentError::SchemaValidation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SemanticEvaluationResult;
    use crate::testing::{ScriptedProvider, Step};

    fn client(provider: Arc<ScriptedProvider>, max_retries: u32) -> JudgmentClient {
        JudgmentClient::new(
            provider,
            JudgmentConfig {
                model: "test-model".into(),
                timeout: Duration::from_millis(200),
                max_retries,
                retry_delay: Duration::from_millis(1),
                max_retry_delay: Duration::from_millis(5),
            },
        )
    }

    fn prompt() -> JudgmentPrompt {
        JudgmentPrompt {
            system: "system".into(),
            user: "user".into(),
            settings: CallSettings {
                temperature: 0.1,
                max_tokens: 100,
            },
        }
    }

    #[tokio::test]
    async fn structured_output_is_parsed() {
        let provider = Arc::new(ScriptedProvider::new(vec![Step::reply(
            r#"{"correctness": 0.95, "feedback_category": "correct", "reasoning": "same meaning"}"#,
        )]));
        let judge = client(provider.clone(), 0);

        let result: SemanticEvaluationResult = judge.structured(&prompt()).await.unwrap();
        assert_eq!(result.correctness(), 0.95);

        let sent = provider.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].model, "test-model");
        assert!(sent[0].response_schema.is_some());
    }

    #[tokio::test]
    async fn out_of_range_score_is_schema_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![Step::reply(
            r#"{"correctness": 7, "feedback_category": "correct"}"#,
        )]));
        let err = client(provider, 0)
            .structured::<SemanticEvaluationResult>(&prompt())
            .await
            .unwrap_err();
        assert!(matches!(err, JudgmentError::SchemaValidation(_)));
    }

    #[tokio::test]
    async fn prose_is_schema_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![Step::reply("Looks right to me.")]));
        let err = client(provider, 0)
            .structured::<SemanticEvaluationResult>(&prompt())
            .await
            .unwrap_err();
        assert!(matches!(err, JudgmentError::SchemaValidation(_)));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Step::network_error("connection reset"),
            Step::reply("A useful hint."),
        ]));
        let text = client(provider.clone(), 2).text(&prompt()).await.unwrap();
        assert_eq!(text, "A useful hint.");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![Step::auth_failure()]));
        let err = client(provider.clone(), 3).text(&prompt()).await.unwrap_err();
        assert!(matches!(err, JudgmentError::Transport(_)));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let provider = Arc::new(ScriptedProvider::failing());
        let err = client(provider.clone(), 2).text(&prompt()).await.unwrap_err();
        assert!(matches!(err, JudgmentError::Transport(_)));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let provider = Arc::new(ScriptedProvider::new(vec![Step::Hang(Duration::from_secs(5))]));
        let err = client(provider, 2).text(&prompt()).await.unwrap_err();
        assert!(matches!(err, JudgmentError::Timeout { timeout_ms: 200 }));
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let provider = Arc::new(ScriptedProvider::new(vec![Step::reply("   ")]));
        let err = client(provider, 0).text(&prompt()).await.unwrap_err();
        assert!(matches!(err, JudgmentError::SchemaValidation(_)));
    }
}
