//! Student-facing feedback for a semantic evaluation.
//!
//! `correct` answers get a fixed phrase with no model call. `partially_correct`
//! answers get a short Socratic hint and `incorrect` answers an explanation,
//! both model-generated. A partially correct answer that closes the question
//! is explained like an incorrect one. When the model call fails,
//! [`FeedbackSynthesizer::synthesize`] degrades to deterministic text;
//! [`FeedbackSynthesizer::try_synthesize`] reports the failure instead.

use crate::error::JudgmentUnavailable;
use crate::judge::{CallSettings, JudgmentClient, JudgmentPrompt};
use crate::model::{DynamicFeedback, FeedbackCategory, SemanticEvaluationResult};

const CORRECT_RESPONSES: &[&str] = &[
    "Excellent! You've got it exactly right.",
    "Perfect answer! You clearly understand the concept.",
    "Spot on! That's exactly what I was looking for.",
    "Outstanding! Your answer demonstrates complete understanding.",
    "Exactly right! Well done.",
];

const HINT_SYSTEM_PROMPT: &str =
    "You are a motivating tutor who gives encouraging hints to students who are partially correct.";

const EXPLANATION_SYSTEM_PROMPT: &str = "You are an expert tutor who provides clear explanations for why answers are incorrect and helps students understand the correct reasoning.";

/// Deterministic hint used when no usable model hint is available.
pub const FALLBACK_HINT: &str =
    "You're on the right track! Think about what else might be important to include in your answer.";

/// Maximum number of sentences in a hint.
pub const MAX_HINT_SENTENCES: usize = 2;

/// Sampling settings for the two model-backed branches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackSettings {
    pub hint: CallSettings,
    pub explanation: CallSettings,
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            hint: CallSettings {
                temperature: 0.3,
                max_tokens: 100,
            },
            explanation: CallSettings {
                temperature: 0.3,
                max_tokens: 200,
            },
        }
    }
}

pub struct FeedbackSynthesizer {
    judge: JudgmentClient,
    settings: FeedbackSettings,
}

impl FeedbackSynthesizer {
    pub fn new(judge: JudgmentClient, settings: FeedbackSettings) -> Self {
        Self { judge, settings }
    }

    /// Feedback for `result`, never failing. A failed model call yields the
    /// deterministic text for the category.
    pub async fn synthesize(
        &self,
        result: &SemanticEvaluationResult,
        question: &str,
        reference_answer: &str,
        candidate_answer: &str,
    ) -> DynamicFeedback {
        self.synthesize_with(result, question, reference_answer, candidate_answer, true)
            .await
    }

    /// Like [`synthesize`](Self::synthesize), for a verdict that closes the
    /// question. A partially correct answer gets the explanation and the
    /// reference answer instead of a hint.
    pub async fn synthesize_closing(
        &self,
        result: &SemanticEvaluationResult,
        question: &str,
        reference_answer: &str,
        candidate_answer: &str,
    ) -> DynamicFeedback {
        self.synthesize_with(result, question, reference_answer, candidate_answer, false)
            .await
    }

    /// Feedback for `result`, surfacing a failed model call.
    pub async fn try_synthesize(
        &self,
        result: &SemanticEvaluationResult,
        question: &str,
        reference_answer: &str,
        candidate_answer: &str,
    ) -> Result<DynamicFeedback, JudgmentUnavailable> {
        self.generate(result, question, reference_answer, candidate_answer, true)
            .await
    }

    async fn synthesize_with(
        &self,
        result: &SemanticEvaluationResult,
        question: &str,
        reference_answer: &str,
        candidate_answer: &str,
        retry_offered: bool,
    ) -> DynamicFeedback {
        match self
            .generate(result, question, reference_answer, candidate_answer, retry_offered)
            .await
        {
            Ok(feedback) => feedback,
            Err(JudgmentUnavailable) => {
                tracing::warn!(
                    category = %result.feedback_category(),
                    retry_offered,
                    "feedback generation failed, using deterministic text"
                );
                if retry_offered {
                    deterministic_feedback(result.feedback_category(), reference_answer, candidate_answer)
                } else {
                    closing_feedback(result.feedback_category(), reference_answer, candidate_answer)
                }
            }
        }
    }

    async fn generate(
        &self,
        result: &SemanticEvaluationResult,
        question: &str,
        reference_answer: &str,
        candidate_answer: &str,
        retry_offered: bool,
    ) -> Result<DynamicFeedback, JudgmentUnavailable> {
        let category = result.feedback_category();
        let hinted = retry_offered && category == FeedbackCategory::PartiallyCorrect;
        let explanation_or_hint = match category {
            FeedbackCategory::Correct => correct_message(candidate_answer).to_string(),
            FeedbackCategory::PartiallyCorrect if hinted => {
                let prompt = JudgmentPrompt {
                    system: HINT_SYSTEM_PROMPT.to_string(),
                    user: build_hint_prompt(
                        question,
                        reference_answer,
                        candidate_answer,
                        result.correctness(),
                    ),
                    settings: self.settings.hint,
                };
                let raw = self.judge.text(&prompt).await?;
                sanitize_hint(&raw, reference_answer)
            }
            FeedbackCategory::PartiallyCorrect | FeedbackCategory::Incorrect => {
                let prompt = JudgmentPrompt {
                    system: EXPLANATION_SYSTEM_PROMPT.to_string(),
                    user: build_explanation_prompt(question, reference_answer, candidate_answer),
                    settings: self.settings.explanation,
                };
                let explanation = self.judge.text(&prompt).await?;
                format!("{explanation}\n\nThe correct answer is: {reference_answer}")
            }
        };

        Ok(DynamicFeedback {
            evaluation: category,
            explanation_or_hint,
            correct_answer: reference_answer.to_string(),
            requires_retry: hinted,
        })
    }
}

/// Model-free feedback for a category.
pub fn deterministic_feedback(
    category: FeedbackCategory,
    reference_answer: &str,
    candidate_answer: &str,
) -> DynamicFeedback {
    let explanation_or_hint = match category {
        FeedbackCategory::Correct => correct_message(candidate_answer).to_string(),
        FeedbackCategory::PartiallyCorrect => FALLBACK_HINT.to_string(),
        FeedbackCategory::Incorrect => format!(
            "Not quite right. The correct answer is: {reference_answer}. \
             Please review the material and try again."
        ),
    };
    DynamicFeedback {
        evaluation: category,
        explanation_or_hint,
        correct_answer: reference_answer.to_string(),
        requires_retry: category == FeedbackCategory::PartiallyCorrect,
    }
}

/// Model-free feedback for a verdict that closes the question.
pub fn closing_feedback(
    category: FeedbackCategory,
    reference_answer: &str,
    candidate_answer: &str,
) -> DynamicFeedback {
    let explanation_or_hint = match category {
        FeedbackCategory::Correct => correct_message(candidate_answer).to_string(),
        FeedbackCategory::PartiallyCorrect => format!(
            "Close, but not complete. The correct answer is: {reference_answer}."
        ),
        FeedbackCategory::Incorrect => format!(
            "Not quite right. The correct answer is: {reference_answer}. \
             Please review the material."
        ),
    };
    DynamicFeedback {
        evaluation: category,
        explanation_or_hint,
        correct_answer: reference_answer.to_string(),
        requires_retry: false,
    }
}

/// Stable choice, so identical answers always read identically.
fn correct_message(candidate_answer: &str) -> &'static str {
    let seed = candidate_answer
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_add(b as usize));
    CORRECT_RESPONSES[seed % CORRECT_RESPONSES.len()]
}

pub fn build_hint_prompt(
    question: &str,
    reference_answer: &str,
    candidate_answer: &str,
    correctness: f64,
) -> String {
    format!(
        "You are a motivating Socratic tutor. The student is on the right track but needs guidance.\n\n\
         CONTEXT:\n\
         Question: {question}\n\
         Student's Answer: {candidate_answer}\n\
         Ideal Answer: {reference_answer}\n\
         Correctness Score: {correctness:.2}\n\n\
         Generate a SHORT, encouraging hint (max {MAX_HINT_SENTENCES} sentences) that:\n\
         1. Acknowledges what they got right\n\
         2. Points toward the specific missing concept\n\
         3. Never states the ideal answer or repeats it verbatim\n\
         4. Uses encouraging language\n\n\
         Example: \"You're definitely on the right track with X! What about the aspect related to Y?\""
    )
}

pub fn build_explanation_prompt(
    question: &str,
    reference_answer: &str,
    candidate_answer: &str,
) -> String {
    format!(
        "You are an expert tutor providing clear, educational feedback on incorrect answers.\n\n\
         Question: {question}\n\
         Student's Answer: {candidate_answer}\n\
         Correct Answer: {reference_answer}\n\n\
         Generate a concise explanation (at most 2 sentences) that states the correct answer \
         and gives a one-line rationale for why it is right. Use an encouraging tone."
    )
}

/// Enforce the hint constraints the prompt asks for.
fn sanitize_hint(raw: &str, reference_answer: &str) -> String {
    let hint = limit_sentences(raw, MAX_HINT_SENTENCES);
    if hint.is_empty() || reveals_answer(&hint, reference_answer) {
        tracing::debug!("discarding model hint");
        return FALLBACK_HINT.to_string();
    }
    hint
}

/// Keep at most `max` sentences.
pub fn limit_sentences(text: &str, max: usize) -> String {
    let text = text.trim();
    let mut seen = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                seen += 1;
                if seen == max {
                    return text[..idx + c.len_utf8()].to_string();
                }
            }
        }
    }
    text.to_string()
}

/// Whether `text` contains the reference answer as a contiguous word sequence.
pub fn reveals_answer(text: &str, reference_answer: &str) -> bool {
    let needle = words(reference_answer);
    if needle.is_empty() {
        return false;
    }
    let haystack = words(text);
    haystack
        .windows(needle.len())
        .any(|window| window == needle.as_slice())
}

fn words(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}
