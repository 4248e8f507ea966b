//! The `saqeval quiz` command.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use tokio::io::{AsyncBufReadExt, BufReader};

use saqeval_core::error::RequestError;
use saqeval_core::integrity::{parse_events_jsonl, RiskSummary};
use saqeval_core::model::{FeedbackCategory, Question, QuestionType};
use saqeval_core::parser::{parse_question_bank, validate_question_bank};
use saqeval_core::quiz::{QuizFeedback, QuizSession};
use saqeval_core::report::{BankSummary, SessionReport};

pub async fn execute(
    bank_path: PathBuf,
    report_path: Option<PathBuf>,
    events_path: Option<PathBuf>,
    provider: Option<String>,
    model: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let bank = parse_question_bank(&bank_path)?;
    for w in validate_question_bank(&bank) {
        let id = w.question_id.as_deref().unwrap_or("-");
        eprintln!("  [{id}] WARNING: {}", w.message);
    }
    anyhow::ensure!(!bank.questions.is_empty(), "question bank has no questions");

    let events = events_path
        .as_deref()
        .map(|p| {
            let content = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read events: {}", p.display()))?;
            parse_events_jsonl(&content)
        })
        .transpose()?;

    let session = super::connect(config_path.as_deref(), provider, model)?;
    let summary = BankSummary {
        id: bank.id.clone(),
        name: bank.name.clone(),
        question_count: bank.questions.len(),
    };
    let total = bank.questions.len();
    let mut quiz = QuizSession::start(bank);

    println!("Quiz: {} ({total} questions)", summary.name);
    if let Some(question) = quiz.current_question() {
        print_question(question, 1, total);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while !quiz.is_complete() {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            eprintln!("Input closed, ending quiz early.");
            break;
        };

        match quiz.submit(&session.engine, &line).await {
            Ok(feedback) => {
                print_feedback(&feedback);
                if let Some(final_score) = &feedback.final_score {
                    println!("\n{final_score}");
                } else if feedback.requires_retry {
                    println!("Try again.");
                } else if let Some(next) = &feedback.next_question {
                    let position = quiz.answered() as usize + 1;
                    print_question(next, position, total);
                }
            }
            Err(RequestError::EmptyCandidateAnswer) => println!("Please enter an answer."),
            Err(e) => return Err(e.into()),
        }
    }

    let audits = session.audits.records();
    let mut report = SessionReport::new(
        quiz.session_id(),
        summary,
        &session.provider,
        &session.model,
        audits,
    )
    .with_score(quiz.score(), quiz.answered());
    if let Some(events) = &events {
        report = report.with_risk(RiskSummary::assess(events));
    }

    print_summary(&report);

    if let Some(path) = report_path {
        write_report(&report, &path)?;
        eprintln!("Report saved to: {}", path.display());
    }

    Ok(())
}

fn print_question(question: &Question, position: usize, total: usize) {
    println!("\nQuestion {position}/{total}: {}", question.question_text);
    if question.question_type == QuestionType::Mcq {
        for option in &question.mcq_options {
            println!("  {}. {}", option.option_id, option.text);
        }
    }
}

fn print_feedback(feedback: &QuizFeedback) {
    let verdict = match (feedback.is_correct, feedback.feedback_type) {
        (true, _) => "Correct",
        (false, FeedbackCategory::PartiallyCorrect) => "Partially correct",
        (false, _) => "Incorrect",
    };
    println!("{verdict}.");
    if let Some(hint) = &feedback.hint {
        println!("Hint: {hint}");
    }
    if let Some(explanation) = &feedback.explanation {
        println!("{explanation}");
    }
    println!(
        "Score: {}/{}",
        feedback.new_score, feedback.new_total_questions_answered
    );
}

fn print_summary(report: &SessionReport) {
    let mut table = Table::new();
    table.set_header(vec!["Question", "Attempt", "Category", "Score", "Fallback"]);
    for audit in &report.audits {
        table.add_row(vec![
            Cell::new(&audit.question_id),
            Cell::new(audit.attempt),
            Cell::new(audit.category),
            Cell::new(
                audit
                    .correctness
                    .map(|c| format!("{c:.2}"))
                    .unwrap_or_else(|| "-".into()),
            ),
            Cell::new(if audit.fallback_used { "yes" } else { "no" }),
        ]);
    }
    eprintln!("\n{table}");

    if let Some(risk) = &report.risk {
        eprintln!("Integrity risk: {} (score {})", risk.level, risk.score);
    }
}

/// Markdown for `.md` paths, JSON otherwise.
fn write_report(report: &SessionReport, path: &Path) -> Result<()> {
    if path.extension().is_some_and(|ext| ext == "md") {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, report.to_markdown())
            .with_context(|| format!("failed to write report to {}", path.display()))
    } else {
        report.save_json(path)
    }
}
