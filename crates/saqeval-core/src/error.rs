//! Error types shared across the evaluation pipeline.
//!
//! `ProviderError` lives here (not in `saqeval-providers`) so the Judgment
//! Client can downcast backend failures and decide whether a transport retry
//! is worthwhile without string matching.

use thiserror::Error;

/// Errors that can occur when interacting with an LLM provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Classified failure of a single Judgment Client call.
#[derive(Debug, Error)]
pub enum JudgmentError {
    /// The backend could not be reached or answered with an error status.
    #[error("transport failure: {0:#}")]
    Transport(anyhow::Error),

    /// The call did not complete within the per-call budget.
    #[error("judgment call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The backend answered, but not with the requested structured shape.
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
}

/// The only failure callers above the Evaluator/Synthesizer boundary observe.
///
/// The underlying cause is logged where it is collapsed and deliberately not
/// carried further so the fallback policy stays uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("judgment unavailable")]
pub struct JudgmentUnavailable;

impl From<JudgmentError> for JudgmentUnavailable {
    fn from(err: JudgmentError) -> Self {
        tracing::warn!(error = %err, "judgment client failed");
        JudgmentUnavailable
    }
}

/// A malformed evaluation request. Rejected before any model call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("candidate answer is empty")]
    EmptyCandidateAnswer,

    #[error("reference answer is missing")]
    MissingReferenceAnswer,

    #[error("question text is missing")]
    MissingQuestionText,

    #[error("{0} is missing")]
    MissingIdentifier(&'static str),

    #[error("unknown question: {0}")]
    UnknownQuestion(String),

    #[error("question {0} has no reference answer")]
    NoReferenceAnswer(String),

    #[error("quiz session is already complete")]
    SessionComplete,
}

/// Invalid `SemanticEvaluationResult` contents.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("correctness {0} is outside [0.0, 1.0]")]
    CorrectnessOutOfRange(f64),

    #[error("unknown feedback category: {0}")]
    UnknownCategory(String),
}
