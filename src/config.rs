use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use crate::error::ChatError;

pub const PASSWORD_ENV: &str = "ALICE_CACHE_PASSWORD";

// Which response cache to use
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    None,
    Memory,
    Sqlite,
}

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "alice-chat")]
#[command(about = "Terminal chat front-end for local language models")]
pub struct Args {
    // Path to the JSON config file (model registry, cache settings)
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    // Model to select at startup, overrides last_model from the config
    #[arg(short, long)]
    pub model: Option<String>,

    // Ollama server url
    #[arg(short, long, default_value = "http://localhost:11434")]
    pub ollama_url: String,

    // Response cache backend
    #[arg(long, value_enum, default_value_t = CacheBackend::Sqlite)]
    pub cache: CacheBackend,

    // Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

// Connection options for the cache store. No defaults for secrets.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl CacheConfig {
    pub fn is_local(&self) -> bool {
        matches!(self.host.as_str(), "" | "localhost" | "127.0.0.1" | "::1")
    }

    // Environment wins over the file so the password never has to be written down
    pub fn apply_env(&mut self) {
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            self.password = password;
        }
    }
}

// On-disk config file
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default)]
    pub models: BTreeMap<String, PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ChatError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let mut config: FileConfig = serde_json::from_str(&raw)
            .map_err(|e| ChatError::Config(format!("invalid {}: {}", path.display(), e)))?;
        if let Some(cache) = config.cache.as_mut() {
            cache.apply_env();
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ChatError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ChatError::Config(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| ChatError::Config(format!("cannot write {}: {}", path.display(), e)))
    }
}

// Rewrites last_model in the config file, keeping everything else as it is on disk
pub fn persist_last_model(path: &Path, name: &str) -> Result<(), ChatError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ChatError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let mut doc: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| ChatError::Config(format!("invalid {}: {}", path.display(), e)))?;
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| ChatError::Config(format!("{} is not a JSON object", path.display())))?;
    obj.insert("last_model".to_string(), serde_json::Value::String(name.to_string()));
    let json = serde_json::to_string_pretty(&doc).map_err(|e| ChatError::Config(e.to_string()))?;
    std::fs::write(path, json)
        .map_err(|e| ChatError::Config(format!("cannot write {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "models": { "Mistral": "model/mistral.gguf", "Hermes": "model/hermes.gguf" },
        "last_model": "Mistral",
        "cache": { "user": "alice", "database": "alice.db" }
    }"#;

    #[test]
    fn loads_registry_and_cache_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = FileConfig::load(&path).unwrap();
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.last_model.as_deref(), Some("Mistral"));
        let cache = config.cache.unwrap();
        assert_eq!(cache.host, "localhost");
        assert_eq!(cache.database, "alice.db");
        assert!(cache.is_local());
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn persist_last_model_keeps_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, SAMPLE).unwrap();

        persist_last_model(&path, "Hermes").unwrap();

        let config = FileConfig::load(&path).unwrap();
        assert_eq!(config.last_model.as_deref(), Some("Hermes"));
        assert_eq!(config.models.len(), 2);
        assert!(config.cache.is_some());
    }

    #[test]
    fn save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = FileConfig::default();
        config.models.insert("Mistral".into(), PathBuf::from("m.gguf"));
        config.last_model = Some("Mistral".into());
        config.save(&path).unwrap();
        assert_eq!(FileConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn remote_host_is_not_local() {
        let cache = CacheConfig {
            host: "10.0.0.5".into(),
            user: String::new(),
            password: String::new(),
            database: "ia".into(),
        };
        assert!(!cache.is_local());
    }

    #[test]
    fn cli_defaults() {
        let args = Args::parse_from(["alice-chat"]);
        assert_eq!(args.config, PathBuf::from("config.json"));
        assert_eq!(args.cache, CacheBackend::Sqlite);
        assert!(args.model.is_none());
    }
}
