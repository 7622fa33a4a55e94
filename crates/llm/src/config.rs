use std::sync::Arc;
use std::time::Duration;

use quill_common::{QuillError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::LlmClient;
use crate::openai::OpenAiClient;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai", or "ollama" for a local OpenAI-compatible server
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            api_url: None,
            temperature: None,
            max_tokens: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let api_url = match config.provider.as_str() {
        "openai" => config.api_url.clone(),
        "ollama" => Some(
            config
                .api_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
        ),
        other => {
            return Err(QuillError::Config(format!(
                "Unknown LLM provider: {other}"
            )));
        }
    };

    if config.provider == "openai" && config.api_key.is_none() && config.api_url.is_none() {
        return Err(QuillError::Config(
            "OpenAI provider requires an API key (set OPENAI_API_KEY)".to_string(),
        ));
    }

    let client = OpenAiClient::with_connect_timeout(
        api_url,
        config.model.clone(),
        config.api_key.clone(),
        Duration::from_millis(config.connect_timeout_ms),
    )?
    .with_sampling(config.temperature, config.max_tokens);

    info!(provider = %config.provider, model = %config.model, "LLM client ready");

    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML_CONFIG: &str = r#"
provider = "ollama"
model = "llama3"
api_url = "http://localhost:11434"
temperature = 0.2
"#;

    #[test]
    fn deserialize_config_from_toml() {
        let config: LlmConfig = toml::from_str(TOML_CONFIG).unwrap();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3");
        assert_eq!(config.api_url.as_deref(), Some("http://localhost:11434"));
        assert!(config.api_key.is_none());
        assert_eq!(config.temperature, Some(0.2));
        assert_eq!(config.connect_timeout_ms, 10_000);
    }

    #[test]
    fn deserialize_config_defaults() {
        let config: LlmConfig = toml::from_str("").unwrap();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, "gpt-4o-mini");
        assert!(config.max_tokens.is_none());
    }

    #[test]
    fn api_key_is_never_serialized() {
        let config = LlmConfig {
            api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn build_openai_client() {
        let config = LlmConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let client = build_llm_client(&config).unwrap();
        assert_eq!(client.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn build_openai_without_key_fails() {
        assert!(build_llm_client(&LlmConfig::default()).is_err());
    }

    #[test]
    fn build_ollama_without_key() {
        let config = LlmConfig {
            provider: "ollama".into(),
            model: "llama3".into(),
            ..Default::default()
        };
        let client = build_llm_client(&config).unwrap();
        assert_eq!(client.model_name(), "llama3");
    }

    #[test]
    fn build_unknown_provider_fails() {
        let config = LlmConfig {
            provider: "gemini".into(),
            ..Default::default()
        };
        assert!(build_llm_client(&config).is_err());
    }
}
