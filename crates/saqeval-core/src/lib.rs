//! saqeval-core — Short-answer evaluation engine, retry policy, and feedback.
//!
//! This crate defines the data model, the `LlmProvider` seam, and the
//! evaluation pipeline (judgment client, semantic evaluator, feedback
//! synthesizer, retry controller, orchestrator) that the rest of saqeval
//! builds on.

pub mod audit;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod feedback;
pub mod integrity;
pub mod judge;
pub mod model;
pub mod parser;
pub mod quiz;
pub mod report;
pub mod retry;
pub mod statistics;
pub mod testing;
pub mod traits;
