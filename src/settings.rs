use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_TOKENS: u32 = 600;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.openai.com/v1";
pub const RELAY_USER_AGENT: &str = "routine-assist-relay/0.1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CompletionParams {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectiveParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Request values win over configured defaults, which win over the built-in
/// defaults.
pub fn resolve_completion_params(
    configured: &CompletionParams,
    request: &CompletionParams,
) -> EffectiveParams {
    EffectiveParams {
        model: request
            .model
            .clone()
            .filter(|m| !m.is_empty())
            .or_else(|| configured.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        max_tokens: request
            .max_tokens
            .filter(|n| *n > 0)
            .or(configured.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS),
        // An explicit 0 is kept; only an absent value falls back.
        temperature: request
            .temperature
            .or(configured.temperature)
            .unwrap_or(DEFAULT_TEMPERATURE),
    }
}

/// Relay configuration. The credential lives only here and is never echoed.
#[derive(Clone, Default)]
pub struct RelaySettings {
    pub api_key: Option<String>,
    pub upstream_base_url: String,
    pub defaults: CompletionParams,
}

impl RelaySettings {
    pub fn from_env() -> Self {
        let upstream_base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_UPSTREAM_BASE_URL.into());
        let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty());
        Self { api_key, upstream_base_url, defaults: CompletionParams::default() }
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.upstream_base_url.trim_end_matches('/'))
    }
}

impl std::fmt::Debug for RelaySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("upstream_base_url", &self.upstream_base_url)
            .field("defaults", &self.defaults)
            .finish()
    }
}

/// Settings for the chat client side.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub relay_url: url::Url,
    pub params: EffectiveParams,
}

impl ClientSettings {
    pub fn with_params(relay_url: url::Url, overrides: &CompletionParams) -> Self {
        Self { relay_url, params: resolve_completion_params(&CompletionParams::default(), overrides) }
    }
}
