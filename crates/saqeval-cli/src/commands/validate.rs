//! The `saqeval validate` command.

use std::path::PathBuf;

use anyhow::Result;

use saqeval_core::parser::{load_bank_directory, parse_question_bank, validate_question_bank};

pub fn execute(bank_path: PathBuf) -> Result<()> {
    let banks = if bank_path.is_dir() {
        load_bank_directory(&bank_path)?
    } else {
        vec![parse_question_bank(&bank_path)?]
    };

    let mut total_warnings = 0;

    for bank in &banks {
        println!(
            "Question bank: {} ({} questions)",
            bank.name,
            bank.questions.len()
        );

        let warnings = validate_question_bank(bank);
        for w in &warnings {
            let prefix = w
                .question_id
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All question banks valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
