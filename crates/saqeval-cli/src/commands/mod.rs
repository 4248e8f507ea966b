//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use saqeval_core::audit::{AuditSink, CompositeAuditSink, MemoryAuditSink, TracingAuditSink};
use saqeval_core::engine::EvaluationEngine;
use saqeval_providers::config::{create_provider, load_config_from, SaqevalConfig};

pub mod batch;
pub mod evaluate;
pub mod init;
pub mod list_models;
pub mod quiz;
pub mod risk;
pub mod validate;

/// An engine wired to the configured provider, with audit records retained.
pub struct Session {
    pub engine: EvaluationEngine,
    pub audits: Arc<MemoryAuditSink>,
    pub config: SaqevalConfig,
    pub provider: String,
    pub model: String,
}

/// Load the config and build an engine for `provider` (or the default one).
pub fn connect(
    config_path: Option<&Path>,
    provider: Option<String>,
    model: Option<String>,
) -> Result<Session> {
    let config = load_config_from(config_path)?;
    let provider = provider.unwrap_or_else(|| config.default_provider.clone());
    let backend = create_provider(config.provider(&provider)?)?;

    let engine_config = config.engine_config(model.as_deref());
    let model = engine_config.judgment.model.clone();

    let audits = Arc::new(MemoryAuditSink::new());
    let sinks: Vec<Arc<dyn AuditSink>> = vec![audits.clone(), Arc::new(TracingAuditSink)];
    let engine = EvaluationEngine::new(backend, engine_config)
        .with_audit_sink(Arc::new(CompositeAuditSink::new(sinks)));

    tracing::debug!(%provider, %model, "engine ready");

    Ok(Session {
        engine,
        audits,
        config,
        provider,
        model,
    })
}
