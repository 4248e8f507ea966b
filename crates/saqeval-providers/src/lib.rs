//! saqeval-providers — language-model backends for the evaluation engine.
//!
//! Implements the `LlmProvider` trait for OpenAI, Anthropic, Ollama, and an
//! offline rule-based mock, plus the TOML configuration that selects them.

pub mod anthropic;
pub mod config;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{create_provider, load_config, load_config_from, ProviderConfig, SaqevalConfig};
pub use saqeval_core::error::ProviderError;
