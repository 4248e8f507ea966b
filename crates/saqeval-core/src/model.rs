//! Core data model types for saqeval.
//!
//! These are the values that flow through the evaluation pipeline: the
//! submitted request, the model's semantic judgment, the student-facing
//! feedback, and the final decision handed back to the caller.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RequestError, ValidationError};

/// One submitted answer to a short-answer question. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// The question text shown to the student.
    pub question_text: String,
    /// The reference ("ideal") answer.
    pub ideal_answer: String,
    /// The student's answer.
    pub student_answer: String,
    /// Question identifier, unique within a question bank.
    pub question_id: String,
    /// Quiz session identifier.
    pub session_id: String,
}

impl EvaluationRequest {
    pub fn new(
        question_text: impl Into<String>,
        ideal_answer: impl Into<String>,
        student_answer: impl Into<String>,
        question_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            question_text: question_text.into(),
            ideal_answer: ideal_answer.into(),
            student_answer: student_answer.into(),
            question_id: question_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Reject requests that must never reach a model.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.session_id.trim().is_empty() {
            return Err(RequestError::MissingIdentifier("session_id"));
        }
        if self.question_id.trim().is_empty() {
            return Err(RequestError::MissingIdentifier("question_id"));
        }
        if self.question_text.trim().is_empty() {
            return Err(RequestError::MissingQuestionText);
        }
        if self.ideal_answer.trim().is_empty() {
            return Err(RequestError::MissingReferenceAnswer);
        }
        if self.student_answer.trim().is_empty() {
            return Err(RequestError::EmptyCandidateAnswer);
        }
        Ok(())
    }
}

/// The categorical judgment on an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCategory {
    Correct,
    PartiallyCorrect,
    Incorrect,
}

impl FeedbackCategory {
    /// Lower bound of the `correct` score band.
    pub const CORRECT_THRESHOLD: f64 = 0.9;
    /// Lower bound of the `partially_correct` score band.
    pub const PARTIAL_THRESHOLD: f64 = 0.5;

    /// Derive a category from the score bands of the grading rubric.
    pub fn from_score(correctness: f64) -> Self {
        if correctness >= Self::CORRECT_THRESHOLD {
            FeedbackCategory::Correct
        } else if correctness >= Self::PARTIAL_THRESHOLD {
            FeedbackCategory::PartiallyCorrect
        } else {
            FeedbackCategory::Incorrect
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackCategory::Correct => "correct",
            FeedbackCategory::PartiallyCorrect => "partially_correct",
            FeedbackCategory::Incorrect => "incorrect",
        }
    }
}

impl fmt::Display for FeedbackCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "correct" => Ok(FeedbackCategory::Correct),
            "partially_correct" => Ok(FeedbackCategory::PartiallyCorrect),
            "incorrect" => Ok(FeedbackCategory::Incorrect),
            other => Err(ValidationError::UnknownCategory(other.to_string())),
        }
    }
}

/// The semantic judgment produced by the evaluator.
///
/// `correctness` is guaranteed to be a finite value in `[0.0, 1.0]`; both the
/// constructor and deserialization reject anything else rather than clamping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSemanticEvaluation")]
pub struct SemanticEvaluationResult {
    correctness: f64,
    feedback_category: FeedbackCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<String>,
}

#[derive(Deserialize)]
struct RawSemanticEvaluation {
    correctness: f64,
    feedback_category: FeedbackCategory,
    #[serde(default)]
    reasoning: Option<String>,
}

impl TryFrom<RawSemanticEvaluation> for SemanticEvaluationResult {
    type Error = ValidationError;

    fn try_from(raw: RawSemanticEvaluation) -> Result<Self, Self::Error> {
        SemanticEvaluationResult::new(raw.correctness, raw.feedback_category, raw.reasoning)
    }
}

impl SemanticEvaluationResult {
    pub fn new(
        correctness: f64,
        feedback_category: FeedbackCategory,
        reasoning: Option<String>,
    ) -> Result<Self, ValidationError> {
        if !correctness.is_finite() || !(0.0..=1.0).contains(&correctness) {
            return Err(ValidationError::CorrectnessOutOfRange(correctness));
        }
        Ok(Self {
            correctness,
            feedback_category,
            reasoning,
        })
    }

    pub fn correctness(&self) -> f64 {
        self.correctness
    }

    pub fn feedback_category(&self) -> FeedbackCategory {
        self.feedback_category
    }

    /// Internal-only rationale. Never shown to the student.
    pub fn reasoning(&self) -> Option<&str> {
        self.reasoning.as_deref()
    }

    /// Whether the asserted category agrees with the rubric's score bands.
    pub fn is_consistent(&self) -> bool {
        FeedbackCategory::from_score(self.correctness) == self.feedback_category
    }

    /// Replace the category with the one implied by the score.
    pub fn with_category_from_score(mut self) -> Self {
        self.feedback_category = FeedbackCategory::from_score(self.correctness);
        self
    }
}

/// Student-facing feedback for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicFeedback {
    /// Mirrors the evaluation's feedback category.
    pub evaluation: FeedbackCategory,
    /// Hint or explanation shown to the student. Never empty.
    pub explanation_or_hint: String,
    /// The reference answer, always populated.
    pub correct_answer: String,
    /// Whether the student may answer the same question again.
    pub requires_retry: bool,
}

/// The orchestrator's final decision for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    /// Move on to the next question.
    pub advance: bool,
    /// Whether the submission counts as correct for scoring.
    pub is_correct: bool,
    /// The feedback shown to the student.
    pub feedback: DynamicFeedback,
    /// Semantic score, absent when the deterministic fallback judged the answer.
    #[serde(default)]
    pub correctness: Option<f64>,
    /// Whether the degraded, model-free path produced this outcome.
    #[serde(default)]
    pub fallback_used: bool,
    /// 1-based submission number for this question within the session.
    pub attempt: u32,
}

// ---------------------------------------------------------------------------
// Question bank
// ---------------------------------------------------------------------------

/// Supported question formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    /// Short-answer question, graded semantically.
    Saq,
    /// Multiple-choice question, graded by exact option match.
    Mcq,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::Saq => write!(f, "saq"),
            QuestionType::Mcq => write!(f, "mcq"),
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "saq" | "short" | "short_answer" => Ok(QuestionType::Saq),
            "mcq" | "multiple_choice" => Ok(QuestionType::Mcq),
            other => Err(format!("unknown question type: {other}")),
        }
    }
}

/// A multiple-choice option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqOption {
    pub option_id: u32,
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// A question as supplied by the question-bank store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: String,
    pub question_text: String,
    pub question_type: QuestionType,
    /// Reference answer for short-answer questions.
    #[serde(default)]
    pub ideal_answer: Option<String>,
    #[serde(default)]
    pub mcq_options: Vec<McqOption>,
    /// Source page the question was generated from, if known.
    #[serde(default)]
    pub page_number: Option<u32>,
}

impl Question {
    /// The answer to reveal to the student for this question.
    pub fn reference_answer(&self) -> Option<&str> {
        match self.question_type {
            QuestionType::Saq => self.ideal_answer.as_deref(),
            QuestionType::Mcq => self
                .mcq_options
                .iter()
                .find(|o| o.is_correct)
                .map(|o| o.text.as_str()),
        }
    }
}

/// An ordered collection of questions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionBank {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl QuestionBank {
    pub fn get(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.question_id == question_id)
    }

    /// Position of a question within the bank.
    pub fn index_of(&self, question_id: &str) -> Option<usize> {
        self.questions
            .iter()
            .position(|q| q.question_id == question_id)
    }

    /// The question that follows `question_id`, if any.
    pub fn next_after(&self, question_id: &str) -> Option<&Question> {
        self.index_of(question_id)
            .and_then(|i| self.questions.get(i + 1))
    }
}
