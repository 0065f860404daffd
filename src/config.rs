use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// On-disk location of the SQLite state file.
    pub path: PathBuf,
}

/// Endpoints and model names for the external embedding and chat services.
///
/// Both services live behind a single OpenAI-compatible base URL
/// (`{base_url}/embeddings` and `{base_url}/chat/completions`).
#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    #[serde(default = "default_base_url")]
    pub llamacpp_base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Request timeout in seconds for both services. Embedding batches on a
    /// CPU-bound llama.cpp server can take minutes, so this is generous.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            llamacpp_base_url: default_base_url(),
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8091/v1".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text-v1.5".to_string()
}
fn default_chat_model() -> String {
    "qwen3:8b".to_string()
}
fn default_timeout_secs() -> u64 {
    180
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Fallback k when a query omits `top_k`.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.retrieval.default_top_k == 0 {
        anyhow::bail!("retrieval.default_top_k must be >= 1");
    }

    if config.services.llamacpp_base_url.trim_end_matches('/').is_empty() {
        anyhow::bail!("services.llamacpp_base_url must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config: Config = toml::from_str(
            r#"
            [db]
            path = "./data/recall.sqlite"
            "#,
        )
        .unwrap();

        assert_eq!(config.retrieval.default_top_k, 5);
        assert_eq!(config.services.timeout_secs, 180);
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.services.embedding_model, "nomic-embed-text-v1.5");
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let config: Config = toml::from_str(
            r#"
            [db]
            path = "/tmp/x.sqlite"

            [services]
            llamacpp_base_url = "http://10.0.0.2:9000/v1"
            embedding_model = "mxbai-embed-large"

            [retrieval]
            default_top_k = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.retrieval.default_top_k, 8);
        assert_eq!(config.services.embedding_model, "mxbai-embed-large");
        assert_eq!(config.services.llamacpp_base_url, "http://10.0.0.2:9000/v1");
    }
}
