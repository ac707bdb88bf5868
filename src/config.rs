//! Configuration loading.
//!
//! Values come from environment variables first and fall back to a JSON file
//! (`spica-config.json` by default) shaped as `{ "baseUrl": ..., "apiKey": ... }`.
//! The resulting [`Config`] is built once at startup and handed to the
//! transports that need it.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

/// Environment variable holding the Spica instance URL.
pub const ENV_BASE_URL: &str = "SPICA_BASE_URL";
/// Environment variable holding the raw Spica `Authorization` value.
pub const ENV_API_KEY: &str = "SPICA_API_KEY";
/// Environment variable holding the documentation provider key.
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
/// Environment variable naming the vector store used for documentation search.
pub const ENV_VECTOR_STORE_ID: &str = "VECTOR_STORE_ID";
/// Environment variable overriding the documentation provider base URL.
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
/// Environment variable overriding the chat model.
pub const ENV_OPENAI_MODEL: &str = "OPENAI_MODEL";

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "spica-config.json";

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Shape of the on-disk fallback file.
#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    /// Spica instance URL
    #[serde(default)]
    pub base_url: Option<String>,
    /// Raw credential
    #[serde(default)]
    pub api_key: Option<String>,
}

impl FileConfig {
    /// Read the file at `path`.
    ///
    /// A missing file yields an empty config. A malformed file is logged and
    /// also yields an empty config, so the failure surfaces on the first
    /// request instead of at startup.
    pub fn read(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "config file not read");
                return Self::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse config file");
                Self::default()
            }
        }
    }
}

/// Settings for the documentation search provider.
#[derive(Debug, Clone, PartialEq)]
pub struct DocsConfig {
    /// Provider API key; docs tools refuse to run without it
    pub openai_api_key: Option<String>,
    /// Vector store to search; docs tools refuse to run without it
    pub vector_store_id: Option<String>,
    /// Provider REST base, e.g. `https://api.openai.com/v1`
    pub openai_base_url: String,
    /// Chat model used by `answer_question`
    pub model: String,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            vector_store_id: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
        }
    }
}

impl DocsConfig {
    /// Whether both the provider key and the vector store id are set.
    pub fn is_configured(&self) -> bool {
        self.openai_api_key.is_some() && self.vector_store_id.is_some()
    }
}

/// Immutable process configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Spica instance URL, possibly empty when unconfigured
    pub base_url: String,
    /// Raw `Authorization` header value, possibly empty when unconfigured
    pub api_key: String,
    /// Documentation provider settings
    pub docs: DocsConfig,
}

impl Config {
    /// Load from the process environment with `path` as the file fallback.
    pub fn load(path: &Path) -> Self {
        let file = FileConfig::read(path);
        Self::from_sources(file, |name| std::env::var(name).ok())
    }

    /// Combine a file config with an environment lookup; the environment wins.
    ///
    /// Empty environment values count as unset.
    pub fn from_sources<F>(file: FileConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let mut docs = DocsConfig {
            openai_api_key: lookup(ENV_OPENAI_API_KEY),
            vector_store_id: lookup(ENV_VECTOR_STORE_ID),
            ..DocsConfig::default()
        };
        if let Some(url) = lookup(ENV_OPENAI_BASE_URL) {
            docs.openai_base_url = url;
        }
        if let Some(model) = lookup(ENV_OPENAI_MODEL) {
            docs.model = model;
        }

        Self {
            base_url: lookup(ENV_BASE_URL).or(file.base_url).unwrap_or_default(),
            api_key: lookup(ENV_API_KEY).or(file.api_key).unwrap_or_default(),
            docs,
        }
    }
}
