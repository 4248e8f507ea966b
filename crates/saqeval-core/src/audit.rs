//! Per-evaluation audit events and engine counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::FeedbackCategory;

/// One record per processed submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationAudit {
    pub session_id: String,
    pub question_id: String,
    /// 1-based submission number for this question.
    pub attempt: u32,
    pub category: FeedbackCategory,
    /// Absent when the fallback policy judged the answer.
    pub correctness: Option<f64>,
    pub fallback_used: bool,
    pub advance: bool,
    pub is_correct: bool,
    pub requires_retry: bool,
    pub latency_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Receives audit records. Delivery is best effort and must not block.
pub trait AuditSink: Send + Sync {
    fn record(&self, audit: &EvaluationAudit);
}

/// Discards every record.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _: &EvaluationAudit) {}
}

/// Emits each record as a structured `tracing` event.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, audit: &EvaluationAudit) {
        tracing::info!(
            target: "saqeval::audit",
            session_id = %audit.session_id,
            question_id = %audit.question_id,
            attempt = audit.attempt,
            category = %audit.category,
            correctness = ?audit.correctness,
            fallback_used = audit.fallback_used,
            advance = audit.advance,
            is_correct = audit.is_correct,
            requires_retry = audit.requires_retry,
            latency_ms = audit.latency_ms,
            "evaluation recorded"
        );
    }
}

/// Keeps records in memory, for reports and tests.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<EvaluationAudit>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EvaluationAudit> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, audit: &EvaluationAudit) {
        if let Ok(mut records) = self.records.lock() {
            records.push(audit.clone());
        }
    }
}

/// Fans a record out to several sinks.
pub struct CompositeAuditSink {
    sinks: Vec<std::sync::Arc<dyn AuditSink>>,
}

impl CompositeAuditSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for CompositeAuditSink {
    fn record(&self, audit: &EvaluationAudit) {
        for sink in &self.sinks {
            sink.record(audit);
        }
    }
}

/// Running counters kept by the engine.
#[derive(Debug, Default)]
pub struct EngineStats {
    evaluations: AtomicU64,
    fallbacks: AtomicU64,
    retries_granted: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatsSnapshot {
    pub evaluations: u64,
    pub fallbacks: u64,
    pub retries_granted: u64,
    pub rejected: u64,
}

impl EngineStats {
    pub(crate) fn record(&self, audit: &EvaluationAudit) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        if audit.fallback_used {
            self.fallbacks.fetch_add(1, Ordering::Relaxed);
        }
        if audit.requires_retry {
            self.retries_granted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_rejection(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            evaluations: self.evaluations.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            retries_granted: self.retries_granted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
