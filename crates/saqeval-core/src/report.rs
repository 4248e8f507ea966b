//! Session report with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::EvaluationAudit;
use crate::integrity::RiskSummary;
use crate::statistics::SessionStats;

/// Everything recorded about one quiz session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    pub session_id: String,
    /// Question bank the session ran against.
    pub bank: BankSummary,
    /// Provider and model that judged the answers.
    pub provider: String,
    pub model: String,
    /// Final score and questions answered.
    pub score: u32,
    pub total_questions_answered: u32,
    /// One record per processed submission.
    pub audits: Vec<EvaluationAudit>,
    pub stats: SessionStats,
    /// Advisory integrity assessment, when events were collected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskSummary>,
}

/// Summary of a question bank (without the questions themselves).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankSummary {
    pub id: String,
    pub name: String,
    pub question_count: usize,
}

impl SessionReport {
    /// Build a report from a session's audit trail.
    pub fn new(
        session_id: impl Into<String>,
        bank: BankSummary,
        provider: impl Into<String>,
        model: impl Into<String>,
        audits: Vec<EvaluationAudit>,
    ) -> Self {
        let session_id = session_id.into();
        let audits: Vec<EvaluationAudit> = audits
            .into_iter()
            .filter(|a| a.session_id == session_id)
            .collect();
        let stats = SessionStats::from_audits(&audits);
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            session_id,
            bank,
            provider: provider.into(),
            model: model.into(),
            score: 0,
            total_questions_answered: 0,
            audits,
            stats,
            risk: None,
        }
    }

    pub fn with_score(mut self, score: u32, total_questions_answered: u32) -> Self {
        self.score = score;
        self.total_questions_answered = total_questions_answered;
        self
    }

    pub fn with_risk(mut self, risk: RiskSummary) -> Self {
        self.risk = Some(risk);
        self
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: SessionReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Format the report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Session {}** on {} ({}/{})\n\n",
            self.session_id, self.bank.name, self.provider, self.model
        ));
        md.push_str(&format!(
            "**Score:** {}/{}\n\n",
            self.score, self.total_questions_answered
        ));

        md.push_str("| Question | Attempt | Category | Score | Fallback |\n");
        md.push_str("|----------|---------|----------|-------|----------|\n");
        for a in &self.audits {
            let score = a
                .correctness
                .map(|c| format!("{:.2}", c))
                .unwrap_or_else(|| "-".into());
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                a.question_id,
                a.attempt,
                a.category,
                score,
                if a.fallback_used { "yes" } else { "no" }
            ));
        }
        md.push('\n');

        md.push_str(&format!(
            "Fallback rate: {:.1}%\n",
            self.stats.fallback_rate * 100.0
        ));
        if let Some(risk) = &self.risk {
            md.push_str(&format!("Integrity risk: {} ({})\n", risk.level, risk.score));
        }

        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FeedbackCategory;

    fn audit(session: &str, question: &str, fallback_used: bool) -> EvaluationAudit {
        EvaluationAudit {
            session_id: session.into(),
            question_id: question.into(),
            attempt: 1,
            category: FeedbackCategory::Correct,
            correctness: (!fallback_used).then_some(0.95),
            fallback_used,
            advance: true,
            is_correct: true,
            requires_retry: false,
            latency_ms: 0,
            recorded_at: Utc::now(),
        }
    }

    fn make_report() -> SessionReport {
        SessionReport::new(
            "s1",
            BankSummary {
                id: "geo".into(),
                name: "Geography".into(),
                question_count: 2,
            },
            "mock",
            "mock-model",
            vec![audit("s1", "q1", false), audit("s2", "q1", false), audit("s1", "q2", true)],
        )
        .with_score(2, 2)
    }

    #[test]
    fn only_keeps_own_session() {
        let report = make_report();
        assert_eq!(report.audits.len(), 2);
        assert_eq!(report.stats.evaluations, 2);
        assert_eq!(report.stats.fallbacks, 1);
    }

    #[test]
    fn json_persistence() {
        let report = make_report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");

        report.save_json(&path).unwrap();
        let loaded = SessionReport::load_json(&path).unwrap();

        assert_eq!(loaded.id, report.id);
        assert_eq!(loaded.bank.id, "geo");
        assert_eq!(loaded.score, 2);
        assert!(loaded.risk.is_none());
    }

    #[test]
    fn markdown_output() {
        let md = make_report().to_markdown();
        assert!(md.contains("**Score:** 2/2"));
        assert!(md.contains("| q2 | 1 | correct | - | yes |"));
        assert!(md.contains("Fallback rate: 50.0%"));
    }
}
