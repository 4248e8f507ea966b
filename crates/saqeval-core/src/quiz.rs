//! Quiz progression over a question bank.
//!
//! Short-answer questions go through the [`EvaluationEngine`]; multiple-choice
//! questions are graded by exact option match. The session only moves on when
//! the engine says to advance, so a question held for a retry is neither scored
//! nor counted as answered until its retry is evaluated.

use serde::{Deserialize, Serialize};

use crate::engine::EvaluationEngine;
use crate::error::RequestError;
use crate::model::{EvaluationRequest, FeedbackCategory, Question, QuestionBank, QuestionType};

/// What the student sees after one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizFeedback {
    pub is_correct: bool,
    pub feedback_type: FeedbackCategory,
    /// Set when the student may try the same question again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub requires_retry: bool,
    pub correct_answer: String,
    /// The question to present next: the same question while it is held for a
    /// retry, `None` once the bank is finished.
    #[serde(default)]
    pub next_question: Option<Question>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<String>,
    pub new_score: u32,
    pub new_total_questions_answered: u32,
    #[serde(default)]
    pub fallback_used: bool,
}

/// One student's pass through a question bank.
#[derive(Debug, Clone)]
pub struct QuizSession {
    session_id: String,
    bank: QuestionBank,
    current: usize,
    score: u32,
    answered: u32,
}

impl QuizSession {
    pub fn new(bank: QuestionBank, session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            bank,
            current: 0,
            score: 0,
            answered: 0,
        }
    }

    /// Start a session with a fresh random id.
    pub fn start(bank: QuestionBank) -> Self {
        Self::new(bank, uuid::Uuid::new_v4().to_string())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.bank.questions.get(self.current)
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn answered(&self) -> u32 {
        self.answered
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.bank.questions.len()
    }

    /// Answer the current question.
    pub async fn submit(
        &mut self,
        engine: &EvaluationEngine,
        answer: &str,
    ) -> Result<QuizFeedback, RequestError> {
        let question = self
            .current_question()
            .cloned()
            .ok_or(RequestError::SessionComplete)?;

        let graded = match question.question_type {
            QuestionType::Mcq => grade_mcq(&question, answer)?,
            QuestionType::Saq => self.grade_saq(engine, &question, answer).await?,
        };

        if graded.advance {
            self.answered += 1;
            if graded.is_correct {
                self.score += 1;
            }
            self.current += 1;
        }

        let next_question = self.current_question().cloned();
        let final_score = if self.is_complete() {
            engine.end_session(&self.session_id);
            tracing::info!(
                session_id = %self.session_id,
                score = self.score,
                answered = self.answered,
                "quiz complete"
            );
            Some(format!(
                "Quiz Complete! Your score: {}/{}",
                self.score, self.answered
            ))
        } else {
            None
        };

        let (hint, explanation) = if graded.requires_retry {
            (graded.text, None)
        } else {
            (None, graded.text)
        };

        Ok(QuizFeedback {
            is_correct: graded.is_correct,
            feedback_type: graded.category,
            hint,
            explanation,
            requires_retry: graded.requires_retry,
            correct_answer: graded.correct_answer,
            next_question,
            final_score,
            new_score: self.score,
            new_total_questions_answered: self.answered,
            fallback_used: graded.fallback_used,
        })
    }

    async fn grade_saq(
        &self,
        engine: &EvaluationEngine,
        question: &Question,
        answer: &str,
    ) -> Result<Graded, RequestError> {
        let reference = question
            .reference_answer()
            .ok_or_else(|| RequestError::NoReferenceAnswer(question.question_id.clone()))?;
        let request = EvaluationRequest::new(
            &question.question_text,
            reference,
            answer,
            &question.question_id,
            &self.session_id,
        );
        let outcome = engine.process(&request).await?;
        Ok(Graded {
            advance: outcome.advance,
            is_correct: outcome.is_correct,
            category: outcome.feedback.evaluation,
            requires_retry: outcome.feedback.requires_retry,
            text: Some(outcome.feedback.explanation_or_hint),
            correct_answer: outcome.feedback.correct_answer,
            fallback_used: outcome.fallback_used,
        })
    }
}

struct Graded {
    advance: bool,
    is_correct: bool,
    category: FeedbackCategory,
    requires_retry: bool,
    text: Option<String>,
    correct_answer: String,
    fallback_used: bool,
}

/// Exact match on the correct option's text, or on its numeric id.
fn grade_mcq(question: &Question, answer: &str) -> Result<Graded, RequestError> {
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(RequestError::EmptyCandidateAnswer);
    }
    let correct = question
        .mcq_options
        .iter()
        .find(|o| o.is_correct)
        .ok_or_else(|| RequestError::NoReferenceAnswer(question.question_id.clone()))?;

    let is_correct = answer == correct.text
        || answer
            .parse::<u32>()
            .is_ok_and(|id| id == correct.option_id);

    Ok(Graded {
        advance: true,
        is_correct,
        category: if is_correct {
            FeedbackCategory::Correct
        } else {
            FeedbackCategory::Incorrect
        },
        requires_retry: false,
        text: (!is_correct).then(|| format!("The correct answer is: {}", correct.text)),
        correct_answer: correct.text.clone(),
        fallback_used: false,
    })
}
