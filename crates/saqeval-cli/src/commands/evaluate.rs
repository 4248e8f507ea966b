//! The `saqeval evaluate` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use saqeval_core::model::EvaluationRequest;

/// One answer given on the command line.
pub struct Submission {
    pub question: String,
    pub reference: String,
    pub answer: String,
    pub session: String,
    pub question_id: String,
}

pub async fn execute(
    submission: Submission,
    provider: Option<String>,
    model: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let session = super::connect(config_path.as_deref(), provider, model)?;

    let request = EvaluationRequest::new(
        submission.question,
        submission.reference,
        submission.answer,
        submission.question_id,
        submission.session,
    );
    let outcome = session
        .engine
        .process(&request)
        .await
        .context("request rejected")?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
