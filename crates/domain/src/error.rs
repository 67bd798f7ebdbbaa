/// Shared error type used across all taleweave crates.
///
/// Provider errors are classified into distinct variants (`InvalidKey`,
/// `RateLimited`, `QuotaExceeded`, `Network`) so the engine can surface
/// actionable messages; everything the adapters cannot classify lands in
/// `Provider`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("no story loaded")]
    NoStoryLoaded,

    #[error("provider not configured: {0}")]
    ProviderUnconfigured(String),

    #[error("invalid API key: {0}")]
    InvalidKey(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("network: {0}")]
    Network(String),

    #[error("cancelled")]
    Cancelled,

    #[error("parse: {0}")]
    Parse(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("invalid save: {0}")]
    InvalidSave(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short stable label for metrics and trace events.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Http(_) => "http",
            Error::Timeout(_) => "timeout",
            Error::Provider { .. } => "provider",
            Error::NoStoryLoaded => "no_story_loaded",
            Error::ProviderUnconfigured(_) => "provider_unconfigured",
            Error::InvalidKey(_) => "invalid_key",
            Error::RateLimited(_) => "rate_limited",
            Error::QuotaExceeded(_) => "quota_exceeded",
            Error::Network(_) => "network",
            Error::Cancelled => "cancelled",
            Error::Parse(_) => "parse",
            Error::Validation(_) => "validation",
            Error::InvalidSave(_) => "invalid_save",
            Error::Config(_) => "config",
            Error::Other(_) => "other",
        }
    }

    /// A message fit for the player-facing transcript.
    ///
    /// Provider failures get an actionable suggestion; cancellation gets a
    /// terse note; everything else falls back to `Display`.
    pub fn player_message(&self) -> String {
        match self {
            Error::NoStoryLoaded => "No story is loaded. Load a story before playing.".into(),
            Error::ProviderUnconfigured(_) => {
                "The model provider is not configured. Set an API key and model first.".into()
            }
            Error::InvalidKey(_) => {
                "The configured API key was rejected. Check your provider settings.".into()
            }
            Error::RateLimited(_) => {
                "The model provider is rate limiting requests. Wait a moment and try again.".into()
            }
            Error::QuotaExceeded(_) => {
                "The provider reports your usage quota is exhausted. Check your plan or billing."
                    .into()
            }
            Error::Network(_) | Error::Http(_) | Error::Timeout(_) => {
                "Could not reach the model provider. Check your connection and try again.".into()
            }
            Error::Cancelled => "(cancelled)".into(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(Error::Cancelled.kind(), "cancelled");
        assert_eq!(Error::RateLimited("x".into()).kind(), "rate_limited");
        assert_eq!(Error::NoStoryLoaded.kind(), "no_story_loaded");
    }

    #[test]
    fn player_message_is_actionable_for_rate_limit() {
        let msg = Error::RateLimited("429".into()).player_message();
        assert!(msg.contains("try again"), "got: {msg}");
    }

    #[test]
    fn player_message_for_cancelled_is_terse() {
        assert_eq!(Error::Cancelled.player_message(), "(cancelled)");
    }

    #[test]
    fn display_includes_context() {
        let err = Error::Provider {
            provider: "anthropic".into(),
            message: "HTTP 500".into(),
        };
        assert_eq!(err.to_string(), "provider anthropic: HTTP 500");
    }
}
