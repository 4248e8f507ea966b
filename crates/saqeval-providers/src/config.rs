//! Provider configuration and factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use saqeval_core::engine::EngineConfig;
use saqeval_core::evaluator::CategoryPolicy;
use saqeval_core::feedback::FeedbackSettings;
use saqeval_core::judge::{CallSettings, JudgmentConfig};
use saqeval_core::traits::LlmProvider;

use crate::anthropic::AnthropicProvider;
use crate::mock::{MockProvider, MockRule};
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

/// Configuration for a single LLM provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    /// Offline provider answering from prompt-matching rules.
    Mock {
        #[serde(default)]
        responses: Vec<MockRule>,
        #[serde(default)]
        default_response: Option<String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Mock { responses, .. } => f
                .debug_struct("Mock")
                .field("rules", &responses.len())
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Top-level saqeval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaqevalConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Default provider to use.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Default model to use.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Sampling temperature for semantic evaluation.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Sampling temperature for hints and explanations.
    #[serde(default = "default_feedback_temperature")]
    pub feedback_temperature: f64,
    /// Upper bound for a single model call, in seconds.
    #[serde(default = "default_timeout")]
    pub judgment_timeout_secs: u64,
    /// Max retries on transient provider errors.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// How the final feedback category is chosen.
    #[serde(default)]
    pub category_policy: CategoryPolicy,
    /// Max sessions evaluated concurrently in batch mode.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.1
}
fn default_feedback_temperature() -> f64 {
    0.3
}
fn default_timeout() -> u64 {
    30
}
fn default_retries() -> u32 {
    2
}
fn default_retry_delay() -> u64 {
    500
}
fn default_parallelism() -> usize {
    4
}

impl Default for SaqevalConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: default_temperature(),
            feedback_temperature: default_feedback_temperature(),
            judgment_timeout_secs: default_timeout(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            category_policy: CategoryPolicy::default(),
            parallelism: default_parallelism(),
        }
    }
}

impl SaqevalConfig {
    /// Look up a configured provider by name.
    pub fn provider(&self, name: &str) -> Result<&ProviderConfig> {
        self.providers.get(name).with_context(|| {
            format!("provider '{name}' is not configured. Run `saqeval init` for a sample config")
        })
    }

    /// Engine settings derived from this configuration.
    pub fn engine_config(&self, model: Option<&str>) -> EngineConfig {
        let defaults = EngineConfig::default();
        let feedback = FeedbackSettings {
            hint: CallSettings {
                temperature: self.feedback_temperature,
                ..defaults.feedback.hint
            },
            explanation: CallSettings {
                temperature: self.feedback_temperature,
                ..defaults.feedback.explanation
            },
        };

        EngineConfig {
            judgment: JudgmentConfig {
                model: model.unwrap_or(&self.default_model).to_string(),
                timeout: Duration::from_secs(self.judgment_timeout_secs),
                max_retries: self.max_retries,
                retry_delay: Duration::from_millis(self.retry_delay_ms),
                ..defaults.judgment
            },
            evaluation: CallSettings {
                temperature: self.temperature,
                ..defaults.evaluation
            },
            feedback,
            category_policy: self.category_policy,
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
            org_id: org_id.as_ref().map(|o| resolve_env_vars(o)),
        },
        ProviderConfig::Anthropic { api_key, base_url } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
        ProviderConfig::Mock { .. } => config.clone(),
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `saqeval.toml` in the current directory
/// 2. `~/.config/saqeval/config.toml`
///
/// Environment variable overrides: `SAQEVAL_OPENAI_KEY`, `SAQEVAL_ANTHROPIC_KEY`.
pub fn load_config() -> Result<SaqevalConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<SaqevalConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("saqeval.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<SaqevalConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => SaqevalConfig::default(),
    };

    apply_env_overrides(&mut config);

    // Resolve env vars in all provider configs
    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();

    Ok(config)
}

fn apply_env_overrides(config: &mut SaqevalConfig) {
    if let Ok(key) = std::env::var("SAQEVAL_ANTHROPIC_KEY") {
        let entry = config
            .providers
            .entry("anthropic".into())
            .or_insert(ProviderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
            });
        if let ProviderConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("SAQEVAL_OPENAI_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("saqeval"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config {
        ProviderConfig::Anthropic { api_key, base_url } => {
            Arc::new(AnthropicProvider::new(api_key, base_url.clone())?)
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Arc::new(OpenAiProvider::new(
            api_key,
            base_url.clone(),
            org_id.clone(),
        )?),
        ProviderConfig::Ollama { base_url } => Arc::new(OllamaProvider::new(base_url)?),
        ProviderConfig::Mock {
            responses,
            default_response,
        } => Arc::new(MockProvider::new(
            responses.clone(),
            default_response.clone(),
        )),
    };
    Ok(provider)
}
