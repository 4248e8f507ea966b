//! Evaluation orchestrator.
//!
//! Drives Semantic Evaluator -> Feedback Synthesizer -> Retry Controller for
//! each submission, and applies the deterministic fallback policy whenever the
//! semantic judgment is unavailable. The student always receives a verdict.
//! Submissions to a closed question are answered without a model call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};

use crate::audit::{AuditSink, EngineStats, EngineStatsSnapshot, EvaluationAudit, NoopAuditSink};
use crate::error::{JudgmentUnavailable, RequestError};
use crate::evaluator::{CategoryPolicy, SemanticEvaluator};
use crate::feedback::{FeedbackSettings, FeedbackSynthesizer};
use crate::judge::{CallSettings, JudgmentClient, JudgmentConfig};
use crate::model::{
    DynamicFeedback, EvaluationOutcome, EvaluationRequest, FeedbackCategory,
    SemanticEvaluationResult,
};
use crate::retry::{transition, RetryKey, RetryPhase, RetryState, RetryStore};
use crate::traits::LlmProvider;

/// Shown to the student whenever the fallback policy produced the verdict.
pub const FALLBACK_NOTICE: &str = "We couldn't fully evaluate this answer automatically.";

/// Configuration for the evaluation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Judgment Client transport settings.
    pub judgment: JudgmentConfig,
    /// Sampling for the semantic evaluation call.
    pub evaluation: CallSettings,
    /// Sampling for the hint and explanation calls.
    pub feedback: FeedbackSettings,
    /// How the final category is chosen.
    pub category_policy: CategoryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            judgment: JudgmentConfig::default(),
            evaluation: CallSettings {
                temperature: 0.1,
                max_tokens: 400,
            },
            feedback: FeedbackSettings::default(),
            category_policy: CategoryPolicy::default(),
        }
    }
}

/// The public entry point of the evaluation pipeline.
pub struct EvaluationEngine {
    evaluator: SemanticEvaluator,
    synthesizer: FeedbackSynthesizer,
    retries: RetryStore,
    audit: Arc<dyn AuditSink>,
    stats: EngineStats,
}

impl EvaluationEngine {
    pub fn new(provider: Arc<dyn LlmProvider>, config: EngineConfig) -> Self {
        let judge = JudgmentClient::new(provider, config.judgment);
        Self {
            evaluator: SemanticEvaluator::new(
                judge.clone(),
                config.evaluation,
                config.category_policy,
            ),
            synthesizer: FeedbackSynthesizer::new(judge, config.feedback),
            retries: RetryStore::new(),
            audit: Arc::new(NoopAuditSink),
            stats: EngineStats::default(),
        }
    }

    /// Deliver one audit record per processed submission to `sink`.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Evaluate one submission.
    ///
    /// Only malformed requests fail; they are rejected before any model call.
    pub async fn process(
        &self,
        request: &EvaluationRequest,
    ) -> Result<EvaluationOutcome, RequestError> {
        if let Err(e) = request.validate() {
            self.stats.record_rejection();
            tracing::warn!(
                session_id = %request.session_id,
                question_id = %request.question_id,
                error = %e,
                "rejected evaluation request"
            );
            return Err(e);
        }

        let start = Instant::now();
        let guard = self
            .retries
            .acquire(RetryKey::new(&request.session_id, &request.question_id))
            .await;
        let attempt = guard.attempt();

        let outcome = if guard.state().phase == RetryPhase::Exhausted {
            let decided = guard.resolve_forced(false);
            EvaluationOutcome {
                advance: decided.advance,
                is_correct: decided.is_correct,
                feedback: closed_feedback(&request.ideal_answer),
                correctness: None,
                fallback_used: false,
                attempt,
            }
        } else {
            match self.evaluate(request).await {
                Ok(result) => {
                    let offer_retry = transition(guard.state().phase, result.feedback_category())
                        .requires_retry;
                    let mut feedback = self.feedback(request, &result, offer_retry).await;
                    let decided = guard.resolve(feedback.evaluation);
                    feedback.requires_retry = decided.requires_retry;
                    EvaluationOutcome {
                        advance: decided.advance,
                        is_correct: decided.is_correct,
                        feedback,
                        correctness: Some(result.correctness()),
                        fallback_used: false,
                        attempt,
                    }
                }
                Err(JudgmentUnavailable) => {
                    let is_correct =
                        fallback_is_correct(&request.student_answer, &request.ideal_answer);
                    tracing::warn!(
                        session_id = %request.session_id,
                        question_id = %request.question_id,
                        is_correct,
                        "judgment unavailable, applying fallback policy"
                    );
                    let decided = guard.resolve_forced(is_correct);
                    EvaluationOutcome {
                        advance: decided.advance,
                        is_correct: decided.is_correct,
                        feedback: fallback_feedback(&request.ideal_answer, is_correct),
                        correctness: None,
                        fallback_used: true,
                        attempt,
                    }
                }
            }
        };

        let audit = EvaluationAudit {
            session_id: request.session_id.clone(),
            question_id: request.question_id.clone(),
            attempt,
            category: outcome.feedback.evaluation,
            correctness: outcome.correctness,
            fallback_used: outcome.fallback_used,
            advance: outcome.advance,
            is_correct: outcome.is_correct,
            requires_retry: outcome.feedback.requires_retry,
            latency_ms: start.elapsed().as_millis() as u64,
            recorded_at: chrono::Utc::now(),
        };
        self.stats.record(&audit);
        self.audit.record(&audit);

        Ok(outcome)
    }

    /// Evaluate many submissions. Sessions run concurrently, up to
    /// `parallelism` at a time; each session's submissions run in input order.
    /// Results are returned in input order.
    pub async fn process_batch(
        &self,
        requests: &[EvaluationRequest],
        parallelism: usize,
    ) -> Vec<Result<EvaluationOutcome, RequestError>> {
        let mut group_of: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (i, request) in requests.iter().enumerate() {
            let group = *group_of
                .entry(request.session_id.as_str())
                .or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
            groups[group].push(i);
        }

        let mut slots: Vec<Option<Result<EvaluationOutcome, RequestError>>> =
            vec![None; requests.len()];
        let mut finished = stream::iter(groups)
            .map(|indices| async move {
                let mut out = Vec::with_capacity(indices.len());
                for i in indices {
                    out.push((i, self.process(&requests[i]).await));
                }
                out
            })
            .buffer_unordered(parallelism.max(1));

        while let Some(group) = finished.next().await {
            for (i, result) in group {
                slots[i] = Some(result);
            }
        }

        slots.into_iter().flatten().collect()
    }

    async fn evaluate(
        &self,
        request: &EvaluationRequest,
    ) -> Result<SemanticEvaluationResult, JudgmentUnavailable> {
        self.evaluator
            .evaluate(
                &request.question_text,
                &request.ideal_answer,
                &request.student_answer,
            )
            .await
    }

    /// Feedback never overturns a verdict: a failed hint or explanation call
    /// degrades to deterministic text.
    async fn feedback(
        &self,
        request: &EvaluationRequest,
        result: &SemanticEvaluationResult,
        offer_retry: bool,
    ) -> DynamicFeedback {
        let (question, reference, candidate) = (
            request.question_text.as_str(),
            request.ideal_answer.as_str(),
            request.student_answer.as_str(),
        );
        if offer_retry {
            self.synthesizer
                .synthesize(result, question, reference, candidate)
                .await
        } else {
            self.synthesizer
                .synthesize_closing(result, question, reference, candidate)
                .await
        }
    }

    /// Current retry state of one question.
    pub async fn retry_state(&self, session_id: &str, question_id: &str) -> RetryState {
        self.retries
            .snapshot(&RetryKey::new(session_id, question_id))
            .await
    }

    /// Forget all retry state of a finished session.
    pub fn end_session(&self, session_id: &str) -> usize {
        let removed = self.retries.forget_session(session_id);
        tracing::debug!(session_id, removed, "session retry state cleared");
        removed
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Degraded-mode verdict: the candidate, case-insensitively, occurs within
/// the reference answer.
pub fn fallback_is_correct(candidate_answer: &str, reference_answer: &str) -> bool {
    let candidate = candidate_answer.trim().to_lowercase();
    let reference = reference_answer.trim().to_lowercase();
    if candidate.is_empty() || reference.is_empty() {
        return false;
    }
    reference.contains(&candidate)
}

/// Feedback for a submission to a question that is already closed.
pub fn closed_feedback(reference_answer: &str) -> DynamicFeedback {
    DynamicFeedback {
        evaluation: FeedbackCategory::Incorrect,
        explanation_or_hint: format!(
            "This question is already closed. The correct answer is: {reference_answer}"
        ),
        correct_answer: reference_answer.to_string(),
        requires_retry: false,
    }
}

/// Feedback for a fallback verdict. Never offers a retry.
pub fn fallback_feedback(reference_answer: &str, is_correct: bool) -> DynamicFeedback {
    DynamicFeedback {
        evaluation: if is_correct {
            FeedbackCategory::Correct
        } else {
            FeedbackCategory::Incorrect
        },
        explanation_or_hint: format!(
            "{FALLBACK_NOTICE} The reference answer is: {reference_answer}"
        ),
        correct_answer: reference_answer.to_string(),
        requires_retry: false,
    }
}
