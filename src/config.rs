use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::sync::carry_over::Authority;
use crate::sync::ollama::{DEFAULT_BASE_URL, DEFAULT_MODEL};

pub const STORE_URL_ENV: &str = "DAYROLL_STORE_URL";
pub const STORE_KEY_ENV: &str = "DAYROLL_STORE_KEY";

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("dayroll")
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct DayrollConfig {
    /// Where the local cache keeps its JSON files.
    pub data_directory: PathBuf,
    pub debug_logging: bool,
    pub authority: Authority,
    pub store: StoreConfig,
    pub assistant: AssistantConfig,
    pub server: ServerConfig,
}

impl Default for DayrollConfig {
    fn default() -> Self {
        Self {
            data_directory: default_data_dir(),
            debug_logging: false,
            authority: Authority::default(),
            store: StoreConfig::default(),
            assistant: AssistantConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// PostgREST endpoint. An empty `url` runs against an in-memory store.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

impl StoreConfig {
    pub fn is_remote(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            timeout_secs: 120,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DayrollConfig {
    /// `$XDG_CONFIG_HOME/dayroll/config.toml` or the platform equivalent.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("dayroll")
            .join("config.toml")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("{}: {}", parent.display(), e)))?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Apply `DAYROLL_STORE_URL` / `DAYROLL_STORE_KEY` from the environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(STORE_URL_ENV) {
            self.store.url = url;
        }
        if let Some(key) = lookup(STORE_KEY_ENV) {
            self.store.api_key = key;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: DayrollConfig = toml::from_str(
            r#"
            authority = "durable_store"

            [store]
            url = "https://example.supabase.co"
            "#,
        )
        .unwrap();
        assert_eq!(config.authority, Authority::DurableStore);
        assert!(config.store.is_remote());
        assert_eq!(config.store.timeout_secs, 30);
        assert_eq!(config.assistant.model, "qwen2.5:0.5b");
        assert_eq!(config.server.bind_addr(), "127.0.0.1:3000");
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = DayrollConfig::default();
        config.debug_logging = true;
        config.server.port = 8080;
        config.save_to_file(&path).unwrap();

        assert_eq!(DayrollConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempdir().unwrap();
        let config = DayrollConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, DayrollConfig::default());
        assert!(!config.store.is_remote());
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        assert!(matches!(DayrollConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn env_overrides_store() {
        let mut config = DayrollConfig::default();
        config.apply_overrides(|name| match name {
            STORE_URL_ENV => Some("http://localhost:54321".into()),
            _ => None,
        });
        assert_eq!(config.store.url, "http://localhost:54321");
        assert_eq!(config.store.api_key, "");
    }

    #[test]
    fn default_path_is_under_dayroll() {
        let path = DayrollConfig::default_path();
        assert!(path.ends_with("dayroll/config.toml"));
    }
}
