//! Gateway configuration: which provider, which models, which key.
//!
//! Stored as opaque JSON by the host. Secure storage of the key itself is
//! the host's concern; the engine only resolves a default key from the
//! provider's conventional environment variable when the field is empty.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    Openai,
    Google,
}

impl ProviderKind {
    /// The conventional environment variable holding a default API key.
    pub fn default_key_env(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::Openai => "OPENAI_API_KEY",
            ProviderKind::Google => "GEMINI_API_KEY",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Openai => "openai",
            ProviderKind::Google => "google",
        }
    }
}

/// Persisted gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub provider: ProviderKind,
    /// Director (expensive) model id.
    pub model: String,
    /// API key. Empty string = resolve from the provider's env var.
    #[serde(default)]
    pub api_key: String,
    /// Cheap model for classification and memory work. Defaults to `model`.
    #[serde(default)]
    pub cost_model: Option<String>,
}

impl GatewayConfig {
    /// Resolve the effective API key: the stored key, or the provider's
    /// conventional env var when the stored key is empty.
    pub fn resolve_api_key(&self) -> Result<String> {
        if !self.api_key.is_empty() {
            return Ok(self.api_key.clone());
        }
        let var = self.provider.default_key_env();
        std::env::var(var).map_err(|_| {
            Error::ProviderUnconfigured(format!(
                "no API key set and environment variable '{var}' is empty"
            ))
        })
    }

    /// The model used for cheap calls (classifier, memory extraction).
    pub fn cost_model(&self) -> &str {
        self.cost_model.as_deref().unwrap_or(&self.model)
    }
}
