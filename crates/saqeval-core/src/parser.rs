//! Question bank parser.
//!
//! Loads question banks from TOML (or JSON) files and directories, and
//! validates them.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{McqOption, Question, QuestionBank, QuestionType};

/// Intermediate TOML structure for parsing question bank files.
#[derive(Debug, Deserialize)]
struct TomlBankFile {
    bank: TomlBankHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlBankHeader {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: String,
    text: String,
    #[serde(rename = "type", default = "default_type_str")]
    question_type: String,
    #[serde(default)]
    ideal_answer: Option<String>,
    #[serde(default)]
    options: Vec<TomlOption>,
    #[serde(default)]
    page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TomlOption {
    #[serde(default)]
    id: Option<u32>,
    text: String,
    #[serde(default)]
    correct: bool,
}

fn default_type_str() -> String {
    "saq".to_string()
}

/// Parse a single bank file. `.json` files hold a serialized [`QuestionBank`];
/// anything else is read as TOML.
pub fn parse_question_bank(path: &Path) -> Result<QuestionBank> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question bank: {}", path.display()))?;

    if path.extension().is_some_and(|ext| ext == "json") {
        return serde_json::from_str(&content)
            .with_context(|| format!("failed to parse JSON: {}", path.display()));
    }
    parse_question_bank_str(&content, path)
}

/// Parse a TOML string into a `QuestionBank` (useful for testing).
pub fn parse_question_bank_str(content: &str, source_path: &Path) -> Result<QuestionBank> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let questions = parsed
        .questions
        .into_iter()
        .map(|q| {
            let question_type: QuestionType = q
                .question_type
                .parse()
                .map_err(|e: String| anyhow::anyhow!("question {}: {}", q.id, e))?;

            let mcq_options = q
                .options
                .into_iter()
                .enumerate()
                .map(|(i, o)| McqOption {
                    option_id: o.id.unwrap_or(i as u32 + 1),
                    text: o.text,
                    is_correct: o.correct,
                })
                .collect();

            Ok(Question {
                question_id: q.id,
                question_text: q.text,
                question_type,
                ideal_answer: q.ideal_answer,
                mcq_options,
                page_number: q.page,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(QuestionBank {
        id: parsed.bank.id,
        name: parsed.bank.name,
        questions,
    })
}

/// Recursively load all `.toml` and `.json` question banks from a directory.
pub fn load_bank_directory(dir: &Path) -> Result<Vec<QuestionBank>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            banks.extend(load_bank_directory(&path)?);
        } else if path
            .extension()
            .is_some_and(|ext| ext == "toml" || ext == "json")
        {
            match parse_question_bank(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path.display(), e);
                }
            }
        }
    }

    Ok(banks)
}

/// A warning from question bank validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question ID (if applicable).
    pub question_id: Option<String>,
    pub message: String,
}

impl ValidationWarning {
    fn question(question: &Question, message: impl Into<String>) -> Self {
        Self {
            question_id: Some(question.question_id.clone()),
            message: message.into(),
        }
    }
}

/// Validate a question bank for issues that would break a quiz.
pub fn validate_question_bank(bank: &QuestionBank) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if bank.questions.is_empty() {
        warnings.push(ValidationWarning {
            question_id: None,
            message: "bank has no questions".into(),
        });
    }

    let mut seen_ids = std::collections::HashSet::new();
    for question in &bank.questions {
        if !seen_ids.insert(&question.question_id) {
            warnings.push(ValidationWarning::question(
                question,
                format!("duplicate question ID: {}", question.question_id),
            ));
        }
    }

    for question in &bank.questions {
        if question.question_text.trim().is_empty() {
            warnings.push(ValidationWarning::question(question, "question text is empty"));
        }

        match question.question_type {
            QuestionType::Saq => {
                if question
                    .ideal_answer
                    .as_deref()
                    .map_or(true, |a| a.trim().is_empty())
                {
                    warnings.push(ValidationWarning::question(
                        question,
                        "short-answer question has no ideal_answer",
                    ));
                }
                if !question.mcq_options.is_empty() {
                    warnings.push(ValidationWarning::question(
                        question,
                        "options on a short-answer question are ignored",
                    ));
                }
            }
            QuestionType::Mcq => {
                if question.mcq_options.len() < 2 {
                    warnings.push(ValidationWarning::question(
                        question,
                        "multiple-choice question needs at least two options",
                    ));
                }
                let correct = question.mcq_options.iter().filter(|o| o.is_correct).count();
                if correct != 1 {
                    warnings.push(ValidationWarning::question(
                        question,
                        format!("multiple-choice question has {correct} correct options, expected 1"),
                    ));
                }
            }
        }
    }

    warnings
}
