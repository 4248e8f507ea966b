//! The `saqeval risk` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use saqeval_core::integrity::{parse_events_jsonl, RiskSummary};

pub fn execute(events_path: PathBuf, format: String) -> Result<()> {
    let content = std::fs::read_to_string(&events_path)
        .with_context(|| format!("failed to read events: {}", events_path.display()))?;
    let events = parse_events_jsonl(&content)?;
    let by_session = RiskSummary::assess_by_session(&events);

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&by_session)?),
        "text" => {
            if by_session.is_empty() {
                println!("No events found.");
                return Ok(());
            }
            let mut table = Table::new();
            table.set_header(vec!["Session", "Events", "Score", "Risk", "Breakdown"]);
            for (session, summary) in &by_session {
                let breakdown = summary
                    .counts
                    .iter()
                    .map(|(kind, n)| format!("{kind}={n}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                table.add_row(vec![
                    Cell::new(session),
                    Cell::new(summary.events),
                    Cell::new(summary.score),
                    Cell::new(summary.level),
                    Cell::new(breakdown),
                ]);
            }
            println!("{table}");
        }
        other => anyhow::bail!("unknown format: {other} (expected text or json)"),
    }

    Ok(())
}
