//! Aggregate statistics over evaluation audit records.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::audit::EvaluationAudit;
use crate::model::FeedbackCategory;

/// Summary of a set of evaluations (one session, or many).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Processed submissions.
    pub evaluations: usize,
    /// Distinct questions answered.
    pub questions: usize,
    /// Submissions judged by the fallback policy.
    pub fallbacks: usize,
    /// `fallbacks / evaluations`, 0.0 when empty.
    pub fallback_rate: f64,
    /// Retries granted.
    pub retries_granted: usize,
    /// Submissions counted as correct.
    pub correct: usize,
    /// Count per feedback category.
    pub category_distribution: BTreeMap<FeedbackCategory, usize>,
    /// Mean model score over non-fallback submissions.
    pub mean_correctness: Option<f64>,
    /// Share of scored submissions whose category agrees with the 0.9 boundary.
    pub consistency_rate: Option<f64>,
    /// Mean time per submission in milliseconds.
    pub avg_latency_ms: u64,
}

impl SessionStats {
    /// Compute statistics from audit records.
    pub fn from_audits(audits: &[EvaluationAudit]) -> Self {
        if audits.is_empty() {
            return Self::default();
        }

        let evaluations = audits.len();
        let fallbacks = audits.iter().filter(|a| a.fallback_used).count();
        let retries_granted = audits.iter().filter(|a| a.requires_retry).count();
        let correct = audits.iter().filter(|a| a.is_correct).count();
        let questions = audits
            .iter()
            .map(|a| (a.session_id.as_str(), a.question_id.as_str()))
            .collect::<HashSet<_>>()
            .len();

        let mut category_distribution = BTreeMap::new();
        for audit in audits {
            *category_distribution.entry(audit.category).or_insert(0) += 1;
        }

        let scored: Vec<(FeedbackCategory, f64)> = audits
            .iter()
            .filter(|a| !a.fallback_used)
            .filter_map(|a| a.correctness.map(|c| (a.category, c)))
            .collect();

        let mean_correctness = (!scored.is_empty())
            .then(|| scored.iter().map(|(_, c)| c).sum::<f64>() / scored.len() as f64);

        let consistency_rate = (!scored.is_empty()).then(|| {
            let consistent = scored
                .iter()
                .filter(|(category, score)| {
                    let high = *score >= FeedbackCategory::CORRECT_THRESHOLD;
                    (*category == FeedbackCategory::Correct) == high
                })
                .count();
            consistent as f64 / scored.len() as f64
        });

        let avg_latency_ms =
            audits.iter().map(|a| a.latency_ms).sum::<u64>() / evaluations as u64;

        Self {
            evaluations,
            questions,
            fallbacks,
            fallback_rate: fallbacks as f64 / evaluations as f64,
            retries_granted,
            correct,
            category_distribution,
            mean_correctness,
            consistency_rate,
            avg_latency_ms,
        }
    }

    pub fn category_count(&self, category: FeedbackCategory) -> usize {
        self.category_distribution
            .get(&category)
            .copied()
            .unwrap_or(0)
    }
}
