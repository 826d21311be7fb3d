//! # Configuration Management
//!
//! This module loads client settings from `earthos.toml` and the environment.
//! The file is optional; environment variables always win over it:
//!
//! - `EARTHOS_ENGINE_HOST`: engine base URL (default `https://engine.earthos.ai`)
//! - `EARTHOS_APIKEY`: bearer token sent with every request

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_HOST: &str = "https://engine.earthos.ai";
pub const HOST_VAR: &str = "EARTHOS_ENGINE_HOST";
pub const APIKEY_VAR: &str = "EARTHOS_APIKEY";
pub const CONFIG_FILE: &str = "earthos.toml";

/// Client configuration loaded from earthos.toml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Engine connection settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Defaults for rendered output
    #[serde(default)]
    pub render: RenderConfig,
}

/// Engine connection settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL, without trailing slash
    pub host: String,
    /// API key; usually left out of the file and supplied through the environment
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Defaults for rendered output
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Preset used when no colorscale is given
    pub colorscale: String,
    /// Region request width in pixels
    pub width: u32,
    /// Region request height in pixels
    pub height: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            host: DEFAULT_HOST.to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            colorscale: "black-white".to_string(),
            width: 2000,
            height: 1000,
        }
    }
}

impl Config {
    /// Load configuration from earthos.toml, then apply environment overrides
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE).with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), host = %config.engine.host, "loaded configuration");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Apply `EARTHOS_ENGINE_HOST` / `EARTHOS_APIKEY` from `lookup`.
    ///
    /// Empty values are ignored.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = non_empty(HOST_VAR) {
            self.engine.host = host;
        }
        if let Some(key) = non_empty(APIKEY_VAR) {
            self.engine.api_key = Some(key);
        }
        self.engine.host = self.engine.host.trim_end_matches('/').to_string();
        self
    }

    /// Write configuration to `path` (API key included if set)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), contents)?;
        tracing::info!(path = %path.as_ref().display(), "configuration saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.host, "https://engine.earthos.ai");
        assert_eq!(config.engine.api_key, None);
        assert_eq!(config.engine.timeout_secs, 30);
        assert_eq!(config.render.colorscale, "black-white");
        assert_eq!((config.render.width, config.render.height), (2000, 1000));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.engine.api_key = Some("secret".to_string());
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: Config = toml::from_str("[engine]\nhost = \"http://localhost:8080\"\n").unwrap();
        assert_eq!(parsed.engine.host, "http://localhost:8080");
        assert_eq!(parsed.engine.timeout_secs, 30);
        assert_eq!(parsed.render, RenderConfig::default());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_then_load() {
        let file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.render.colorscale = "waves".to_string();
        config.save(file.path()).unwrap();

        let loaded = Config::load_from_path(file.path());
        assert_eq!(loaded.render.colorscale, "waves");
    }

    #[test]
    fn test_env_overrides_file() {
        let config = Config::default().with_env_overrides(env(&[
            (HOST_VAR, "http://127.0.0.1:9000/"),
            (APIKEY_VAR, "abc123"),
        ]));
        assert_eq!(config.engine.host, "http://127.0.0.1:9000");
        assert_eq!(config.engine.api_key.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let config = Config::default().with_env_overrides(env(&[(APIKEY_VAR, "  ")]));
        assert_eq!(config.engine.api_key, None);
        assert_eq!(config.engine.host, DEFAULT_HOST);
    }
}
