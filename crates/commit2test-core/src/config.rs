use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::CoreError;
use crate::prompt::DEFAULT_SYSTEM_PROMPT;

const DEFAULT_DELTA_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_CONTENT_BLOCK_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "gpt-4";

/// Streaming wire convention used by the model provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderFamily {
    /// `data:` lines carrying `choices[0].delta.content`, ended by `[DONE]`.
    DeltaStyle,
    /// `data:` lines carrying typed events; text lives in `content_block_delta`.
    ContentBlock,
}

impl ProviderFamily {
    /// Returns a short stable name, used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeltaStyle => "delta-style",
            Self::ContentBlock => "content-block",
        }
    }

    /// Endpoint used when the configuration does not name one.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::DeltaStyle => DEFAULT_DELTA_ENDPOINT,
            Self::ContentBlock => DEFAULT_CONTENT_BLOCK_ENDPOINT,
        }
    }
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderFamily {
    type Err = CoreError;

    /// Accepts provider kinds (`openai`, `custom`, `anthropic`) as well as the
    /// family names themselves.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "custom" | "delta-style" => Ok(Self::DeltaStyle),
            "anthropic" | "content-block" => Ok(Self::ContentBlock),
            other => Err(CoreError::ConfigurationMissing(format!(
                "unsupported AI provider: {other}"
            ))),
        }
    }
}

/// Immutable configuration bundle for one generator.
///
/// The core never reads ambient state while streaming; everything the
/// transport needs is captured here before the session starts.
#[derive(Clone)]
pub struct GenerationConfig {
    pub provider_family: ProviderFamily,
    pub model: String,
    /// Empty means `DEFAULT_SYSTEM_PROMPT`.
    pub system_prompt: String,
    /// `None` means the family's default endpoint.
    pub endpoint: Option<String>,
    pub api_key: String,
    /// Optional HTTP timeout applied by the default transport.
    pub timeout: Option<Duration>,
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("provider_family", &self.provider_family)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("has_api_key", &!self.api_key.trim().is_empty())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GenerationConfig {
    /// Creates a config with default model, prompt and endpoint.
    pub fn new(provider_family: ProviderFamily, api_key: impl Into<String>) -> Self {
        Self {
            provider_family,
            model: DEFAULT_MODEL.to_string(),
            system_prompt: String::new(),
            endpoint: None,
            api_key: api_key.into(),
            timeout: None,
        }
    }

    /// Builds a config from `COMMIT2TEST_*` environment variables.
    ///
    /// - `COMMIT2TEST_PROVIDER`: `openai` (default), `custom` or `anthropic`.
    /// - `COMMIT2TEST_API_KEY`: required.
    /// - `COMMIT2TEST_MODEL`, `COMMIT2TEST_ENDPOINT`, `COMMIT2TEST_SYSTEM_PROMPT`:
    ///   optional overrides.
    /// - `COMMIT2TEST_TIMEOUT_SECS`: optional request timeout.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`GenerationConfig::from_env`] but reads values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let family = match read("COMMIT2TEST_PROVIDER") {
            Some(kind) => kind.parse()?,
            None => ProviderFamily::DeltaStyle,
        };
        let mut config = Self::new(family, read("COMMIT2TEST_API_KEY").unwrap_or_default());
        if let Some(model) = read("COMMIT2TEST_MODEL") {
            config.model = model;
        }
        if let Some(endpoint) = read("COMMIT2TEST_ENDPOINT") {
            config.endpoint = Some(endpoint);
        }
        if let Some(prompt) = read("COMMIT2TEST_SYSTEM_PROMPT") {
            config.system_prompt = prompt;
        }
        if let Some(raw) = read("COMMIT2TEST_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                CoreError::ConfigurationMissing(format!(
                    "COMMIT2TEST_TIMEOUT_SECS must be a whole number of seconds, got {raw:?}"
                ))
            })?;
            config.timeout = Some(Duration::from_secs(secs));
        }
        Ok(config)
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Endpoint the transport should call.
    pub fn resolved_endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| self.provider_family.default_endpoint())
    }

    /// System prompt sent with the request, falling back to the built-in one.
    pub fn resolved_system_prompt(&self) -> &str {
        let prompt = self.system_prompt.trim();
        if prompt.is_empty() {
            DEFAULT_SYSTEM_PROMPT
        } else {
            prompt
        }
    }

    /// Checks the preconditions a caller must meet before starting a session.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.api_key.trim().is_empty() {
            return Err(CoreError::ConfigurationMissing(
                "请先配置 AI API 密钥。".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn provider_kinds_map_to_families() {
        assert_eq!(
            "openai".parse::<ProviderFamily>().expect("openai"),
            ProviderFamily::DeltaStyle
        );
        assert_eq!(
            "Custom".parse::<ProviderFamily>().expect("custom"),
            ProviderFamily::DeltaStyle
        );
        assert_eq!(
            "anthropic".parse::<ProviderFamily>().expect("anthropic"),
            ProviderFamily::ContentBlock
        );
        assert!(matches!(
            "gemini".parse::<ProviderFamily>(),
            Err(CoreError::ConfigurationMissing(msg)) if msg.contains("gemini")
        ));
    }

    #[test]
    fn from_lookup_applies_defaults_and_overrides() {
        let config = GenerationConfig::from_lookup(lookup_from(&[
            ("COMMIT2TEST_PROVIDER", "anthropic"),
            ("COMMIT2TEST_API_KEY", "sk-test"),
            ("COMMIT2TEST_MODEL", "claude-3-5-sonnet"),
            ("COMMIT2TEST_TIMEOUT_SECS", "30"),
        ]))
        .expect("config");
        assert_eq!(config.provider_family, ProviderFamily::ContentBlock);
        assert_eq!(config.model, "claude-3-5-sonnet");
        assert_eq!(config.resolved_endpoint(), DEFAULT_CONTENT_BLOCK_ENDPOINT);
        assert_eq!(config.resolved_system_prompt(), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_key_fails_validation() {
        let config = GenerationConfig::from_lookup(lookup_from(&[])).expect("config");
        assert_eq!(config.provider_family, ProviderFamily::DeltaStyle);
        assert!(matches!(
            config.validate(),
            Err(CoreError::ConfigurationMissing(msg)) if msg.contains("API 密钥")
        ));
    }

    #[test]
    fn bad_timeout_is_reported() {
        let result = GenerationConfig::from_lookup(lookup_from(&[(
            "COMMIT2TEST_TIMEOUT_SECS",
            "soon",
        )]));
        assert!(matches!(result, Err(CoreError::ConfigurationMissing(_))));
    }

    #[test]
    fn blank_model_is_left_to_the_provider() {
        let config = GenerationConfig::new(ProviderFamily::DeltaStyle, "sk-test").model("");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config = GenerationConfig::new(ProviderFamily::DeltaStyle, "sk-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("has_api_key: true"));
    }
}
