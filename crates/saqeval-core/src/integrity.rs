//! Academic-integrity events reported by the quiz client, and an advisory
//! risk assessment over them. Nothing here influences grading.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Classified event types. Unrecognised types are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IntegrityEventType {
    PasteDetected,
    UnusualTiming,
    TabUnfocused,
    TabFocused,
    PageUnloaded,
    Other(String),
}

impl IntegrityEventType {
    pub fn as_str(&self) -> &str {
        match self {
            IntegrityEventType::PasteDetected => "PASTE_DETECTED",
            IntegrityEventType::UnusualTiming => "UNUSUAL_TIMING",
            IntegrityEventType::TabUnfocused => "TAB_UNFOCUSED",
            IntegrityEventType::TabFocused => "TAB_FOCUSED",
            IntegrityEventType::PageUnloaded => "PAGE_UNLOADED",
            IntegrityEventType::Other(s) => s,
        }
    }

    /// Contribution of one event of this type to the risk score.
    pub fn weight(&self) -> u32 {
        match self {
            IntegrityEventType::PasteDetected => 3,
            IntegrityEventType::UnusualTiming => 2,
            IntegrityEventType::TabUnfocused | IntegrityEventType::PageUnloaded => 1,
            IntegrityEventType::TabFocused | IntegrityEventType::Other(_) => 0,
        }
    }
}

impl From<String> for IntegrityEventType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PASTE_DETECTED" => IntegrityEventType::PasteDetected,
            "UNUSUAL_TIMING" => IntegrityEventType::UnusualTiming,
            "TAB_UNFOCUSED" => IntegrityEventType::TabUnfocused,
            "TAB_FOCUSED" => IntegrityEventType::TabFocused,
            "PAGE_UNLOADED" => IntegrityEventType::PageUnloaded,
            _ => IntegrityEventType::Other(s),
        }
    }
}

impl From<IntegrityEventType> for String {
    fn from(t: IntegrityEventType) -> Self {
        match t {
            IntegrityEventType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for IntegrityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event as sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityEvent {
    pub session_id: String,
    pub event_type: IntegrityEventType,
    /// Client clock, milliseconds since the epoch.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Parse newline-delimited JSON events. Blank lines are skipped.
pub fn parse_events_jsonl(content: &str) -> Result<Vec<IntegrityEvent>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid event on line {}", i + 1))
        })
        .collect()
}

/// In-memory event log, keyed by session.
#[derive(Default)]
pub struct IntegrityLog {
    events: Mutex<Vec<IntegrityEvent>>,
}

impl IntegrityLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn events(&self) -> MutexGuard<'_, Vec<IntegrityEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, event: IntegrityEvent) {
        tracing::info!(
            session_id = %event.session_id,
            event_type = %event.event_type,
            "integrity event received"
        );
        self.events().push(event);
    }

    /// Events of one session, in arrival order.
    pub fn for_session(&self, session_id: &str) -> Vec<IntegrityEvent> {
        self.events()
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Remove a session's events. Returns the number removed.
    pub fn clear_session(&self, session_id: &str) -> usize {
        let mut events = self.events();
        let before = events.len();
        events.retain(|e| e.session_id != session_id);
        let cleared = before - events.len();
        tracing::info!(session_id, cleared, "integrity events cleared");
        cleared
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=2 => RiskLevel::Low,
            3..=5 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Weighted summary of a set of events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub score: u32,
    pub level: RiskLevel,
    pub events: usize,
    pub counts: BTreeMap<String, usize>,
}

impl RiskSummary {
    pub fn assess(events: &[IntegrityEvent]) -> Self {
        let mut counts = BTreeMap::new();
        let mut score = 0u32;
        for event in events {
            *counts.entry(event.event_type.to_string()).or_insert(0) += 1;
            score = score.saturating_add(event.event_type.weight());
        }
        Self {
            score,
            level: RiskLevel::from_score(score),
            events: events.len(),
            counts,
        }
    }

    /// One summary per session present in `events`.
    pub fn assess_by_session(events: &[IntegrityEvent]) -> BTreeMap<String, RiskSummary> {
        let mut grouped: BTreeMap<String, Vec<IntegrityEvent>> = BTreeMap::new();
        for event in events {
            grouped
                .entry(event.session_id.clone())
                .or_default()
                .push(event.clone());
        }
        grouped
            .into_iter()
            .map(|(session, events)| (session, Self::assess(&events)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(session: &str, event_type: &str) -> IntegrityEvent {
        IntegrityEvent {
            session_id: session.into(),
            event_type: event_type.to_string().into(),
            timestamp_ms: 1_700_000_000_000,
            payload: None,
        }
    }

    #[test]
    fn event_types_round_trip_through_json() {
        let line = r#"{"session_id":"s1","event_type":"PASTE_DETECTED","timestamp":1700000000000,"payload":{"question_id":"q1"}}"#;
        let parsed: IntegrityEvent = serde_json::from_str(line).unwrap();
        assert_eq!(parsed.event_type, IntegrityEventType::PasteDetected);
        assert_eq!(parsed.timestamp_ms, 1_700_000_000_000);

        let unknown: IntegrityEvent = serde_json::from_str(
            r#"{"session_id":"s1","event_type":"DEVTOOLS_OPEN","timestamp":1}"#,
        )
        .unwrap();
        assert_eq!(
            unknown.event_type,
            IntegrityEventType::Other("DEVTOOLS_OPEN".into())
        );
        assert!(serde_json::to_string(&unknown).unwrap().contains("DEVTOOLS_OPEN"));
    }

    #[test]
    fn log_is_per_session() {
        let log = IntegrityLog::new();
        log.record(event("s1", "TAB_UNFOCUSED"));
        log.record(event("s1", "TAB_FOCUSED"));
        log.record(event("s2", "PASTE_DETECTED"));

        assert_eq!(log.for_session("s1").len(), 2);
        assert_eq!(log.clear_session("s1"), 2);
        assert!(log.for_session("s1").is_empty());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn risk_levels() {
        let low = RiskSummary::assess(&[event("s1", "TAB_UNFOCUSED"), event("s1", "TAB_FOCUSED")]);
        assert_eq!(low.score, 1);
        assert_eq!(low.level, RiskLevel::Low);

        let medium = RiskSummary::assess(&[event("s1", "PASTE_DETECTED")]);
        assert_eq!(medium.level, RiskLevel::Medium);

        let high = RiskSummary::assess(&[
            event("s1", "PASTE_DETECTED"),
            event("s1", "UNUSUAL_TIMING"),
            event("s1", "PAGE_UNLOADED"),
        ]);
        assert_eq!(high.score, 6);
        assert_eq!(high.level, RiskLevel::High);
        assert_eq!(high.counts.get("PASTE_DETECTED"), Some(&1));
    }

    #[test]
    fn jsonl_parsing_reports_line() {
        let content = "{\"session_id\":\"s1\",\"event_type\":\"TAB_FOCUSED\",\"timestamp\":1}\n\nnot json\n";
        let err = parse_events_jsonl(content).unwrap_err();
        assert!(format!("{err:#}").contains("line 3"));

        let ok = parse_events_jsonl("{\"session_id\":\"s1\",\"event_type\":\"TAB_FOCUSED\",\"timestamp\":1}\n").unwrap();
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn by_session() {
        let summaries = RiskSummary::assess_by_session(&[
            event("s1", "PASTE_DETECTED"),
            event("s2", "TAB_UNFOCUSED"),
            event("s1", "PASTE_DETECTED"),
        ]);
        assert_eq!(summaries["s1"].score, 6);
        assert_eq!(summaries["s2"].level, RiskLevel::Low);
    }
}
