//! Server configuration.
//!
//! Loaded from a TOML file, then overridden by environment variables. On
//! Unix the file is refused if it is world-writable, or world-readable while
//! holding secrets.

use quill_llm::LlmConfig;
use quill_memory::{EmbeddingConfig, VectorStoreConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::news::NewsConfig;
use crate::persona::{PersonaConfig, default_personas};
use crate::rate_limit::RateLimitConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitSettings,
    pub personas: Vec<PersonaConfig>,
    pub news: NewsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitSettings::default(),
            personas: default_personas(),
            news: NewsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
    /// Sessions idle longer than this are dropped.
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8080,
            cors_origins: Vec::new(),
            session_idle_secs: 3600,
        }
    }
}

/// Single-user credentials checked at login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Persona messages and news requests allowed per window, per session.
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_secs: 60,
        }
    }
}

impl RateLimitSettings {
    pub fn to_limiter_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.max_requests,
            window: Duration::from_secs(self.window_secs),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, validating its permissions first.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;

        if config.has_secrets() {
            warn!(
                "Secrets found in config file '{}'. Prefer environment variables \
                 (OPENAI_API_KEY, QDRANT_API_KEY, QUILL_PASSWORD).",
                path.display()
            );
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides using `lookup` in place of the process environment.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            self.llm.api_key = Some(key.clone());
            self.embedding.api_key = Some(key);
        }
        if let Some(url) = get("QDRANT_URL") {
            self.vector_store.url = url;
        }
        if let Some(key) = get("QDRANT_API_KEY") {
            self.vector_store.api_key = Some(key);
        }
        if let Some(user) = get("QUILL_USERNAME") {
            self.auth.username = Some(user);
        }
        if let Some(password) = get("QUILL_PASSWORD") {
            self.auth.password = Some(password);
        }
        if let Some(bind) = get("QUILL_BIND_ADDR") {
            self.server.bind = bind;
        }
    }

    pub fn persona(&self, name: &str) -> Option<&PersonaConfig> {
        self.personas.iter().find(|p| p.name == name)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, persona) in self.personas.iter().enumerate() {
            if persona.name.is_empty() {
                anyhow::bail!("Persona #{} has an empty name", i + 1);
            }
            if self.personas[..i].iter().any(|p| p.name == persona.name) {
                anyhow::bail!("Duplicate persona name '{}'", persona.name);
            }
        }
        if self.rate_limit.window_secs == 0 {
            anyhow::bail!("rate_limit.window_secs must be greater than zero");
        }
        Ok(())
    }

    fn has_secrets(&self) -> bool {
        self.llm.api_key.is_some()
            || self.embedding.api_key.is_some()
            || self.vector_store.api_key.is_some()
            || self.auth.password.is_some()
    }
}

/// Requirements:
/// - regular file (not a directory or device)
/// - not world-writable
/// - not world-readable when it holds secrets
#[cfg(unix)]
fn validate_config_file_permissions(path: &std::path::Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

    if !metadata.is_file() {
        anyhow::bail!("Config path '{}' is not a regular file.", path.display());
    }

    let permission_bits = metadata.permissions().mode() & 0o777;

    if permission_bits & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {:04o}). Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    let content = std::fs::read_to_string(path).unwrap_or_default();
    let has_secret = ["api_key", "password"]
        .iter()
        .any(|needle| content.lines().any(|l| l.trim_start().starts_with(needle)));

    if has_secret && permission_bits & 0o004 != 0 {
        anyhow::bail!(
            "Config file '{}' contains secrets but is world-readable (mode {:04o}). \
             Fix with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    if has_secret && permission_bits & 0o040 != 0 {
        warn!(
            "Config file '{}' contains secrets and is group-readable (mode {:04o}).",
            path.display(),
            permission_bits
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_config(content: &str, mode: u32) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(mode)).unwrap();
        }
        #[cfg(not(unix))]
        let _ = mode;
        file
    }

    #[test]
    fn defaults_include_builtin_personas() {
        let config = AppConfig::default();
        assert!(config.persona("joy").is_some());
        assert!(config.persona("chat").is_some());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.embedding.dimension, 1536);
    }

    #[test]
    fn parses_full_file() {
        let file = write_config(
            r#"
            [server]
            port = 9000

            [llm]
            model = "gpt-4o"

            [vector_store]
            collection = "diary"
            top_k = 5

            [rate_limit]
            max_requests = 3

            [[personas]]
            name = "pirate"
            system_prompt = "Arr."
            marker = "Captain:"

            [news]
            headlines = ["Only headline"]
            "#,
            0o644,
        );

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.vector_store.collection, "diary");
        assert_eq!(config.rate_limit.max_requests, 3);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.personas.len(), 1);
        assert_eq!(config.persona("pirate").unwrap().marker.as_deref(), Some("Captain:"));
        assert_eq!(config.news.headlines, vec!["Only headline".to_string()]);
        assert!(!config.news.ads.is_empty());
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-env"),
            ("QDRANT_URL", "http://qdrant:6333"),
            ("QUILL_USERNAME", "fredrik"),
            ("QUILL_PASSWORD", "hunter2"),
            ("QUILL_BIND_ADDR", ""),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_from(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.vector_store.url, "http://qdrant:6333");
        assert_eq!(config.auth.username.as_deref(), Some("fredrik"));
        assert_eq!(config.auth.password.as_deref(), Some("hunter2"));
        // Empty values do not override
        assert_eq!(config.server.bind, "127.0.0.1");
    }

    #[test]
    fn duplicate_personas_rejected() {
        let file = write_config(
            r#"
            [[personas]]
            name = "joy"
            system_prompt = "a"

            [[personas]]
            name = "joy"
            system_prompt = "b"
            "#,
            0o600,
        );
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Duplicate persona"));
    }

    #[test]
    fn password_is_not_serialized() {
        let config = AppConfig {
            auth: AuthConfig {
                username: Some("u".into()),
                password: Some("secret".into()),
            },
            ..Default::default()
        };
        let rendered = serde_json::to_string(&config).unwrap();
        assert!(!rendered.contains("secret"));
    }

    #[cfg(unix)]
    #[test]
    fn world_writable_rejected() {
        let file = write_config("[server]\nport = 1\n", 0o666);
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("world-writable"));
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_secrets_rejected() {
        let file = write_config("[auth]\npassword = \"hunter2\"\n", 0o644);
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("world-readable"));

        let private = write_config("[auth]\npassword = \"hunter2\"\n", 0o600);
        assert!(AppConfig::from_file(private.path()).is_ok());
    }
}
