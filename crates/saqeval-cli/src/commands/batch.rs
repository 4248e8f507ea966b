//! The `saqeval batch` command.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use serde::Serialize;

use saqeval_core::model::{EvaluationOutcome, EvaluationRequest};
use saqeval_core::statistics::SessionStats;

/// One output line: the outcome, or why the request was rejected.
#[derive(Serialize)]
struct BatchLine<'a> {
    session_id: &'a str,
    question_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'a EvaluationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn execute(
    submissions_path: PathBuf,
    parallelism: Option<usize>,
    provider: Option<String>,
    model: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let content = std::fs::read_to_string(&submissions_path)
        .with_context(|| format!("failed to read {}", submissions_path.display()))?;
    let requests = parse_submissions(&content)?;
    anyhow::ensure!(!requests.is_empty(), "no submissions found");

    let session = super::connect(config_path.as_deref(), provider, model)?;
    let parallelism = parallelism.unwrap_or(session.config.parallelism);
    anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");

    eprintln!(
        "saqeval v{} — Evaluating {} submissions with {}/{}",
        env!("CARGO_PKG_VERSION"),
        requests.len(),
        session.provider,
        session.model
    );

    let start = Instant::now();
    let results = session.engine.process_batch(&requests, parallelism).await;

    let mut rejected = 0usize;
    for (request, result) in requests.iter().zip(&results) {
        let (outcome, error) = match result {
            Ok(outcome) => (Some(outcome), None),
            Err(e) => {
                rejected += 1;
                (None, Some(e.to_string()))
            }
        };
        let line = BatchLine {
            session_id: &request.session_id,
            question_id: &request.question_id,
            outcome,
            error,
        };
        println!("{}", serde_json::to_string(&line)?);
    }

    print_summary(&SessionStats::from_audits(&session.audits.records()), rejected);
    eprintln!("Completed in {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn parse_submissions(content: &str) -> Result<Vec<EvaluationRequest>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("invalid submission on line {}", i + 1))
        })
        .collect()
}

fn print_summary(stats: &SessionStats, rejected: usize) {
    let mut table = Table::new();
    table.set_header(vec![
        "Evaluations",
        "Correct",
        "Retries",
        "Fallback %",
        "Mean score",
        "Rejected",
    ]);
    table.add_row(vec![
        Cell::new(stats.evaluations),
        Cell::new(stats.correct),
        Cell::new(stats.retries_granted),
        Cell::new(format!("{:.1}%", stats.fallback_rate * 100.0)),
        Cell::new(
            stats
                .mean_correctness
                .map(|m| format!("{m:.2}"))
                .unwrap_or_else(|| "-".into()),
        ),
        Cell::new(rejected),
    ]);
    eprintln!("\n{table}");
}

