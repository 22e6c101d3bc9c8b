use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MnemographConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub linking: LinkingConfig,
    pub maintenance: MaintenanceConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Move a corrupted database aside and start fresh instead of refusing to open.
    pub auto_recover: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `local` (ONNX model), `hash` (feature hashing, no model) or `none`.
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    pub expansion_threshold: f64,
    pub max_expansion: usize,
    pub recency_horizon_days: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LinkingConfig {
    pub candidate_limit: usize,
    pub similar_candidates: usize,
    pub min_overlap: f64,
    pub min_similarity: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub prune_days: u64,
    pub prune_importance: f64,
    pub dedup_threshold: f64,
    pub promote_min_access: u32,
    pub promote_min_importance: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub chunk_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 8931,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_mnemograph_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            auto_recover: true,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_mnemograph_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
            timeout_ms: 5000,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 7,
            expansion_threshold: 0.85,
            max_expansion: 3,
            recency_horizon_days: 365.0,
        }
    }
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            candidate_limit: 50,
            similar_candidates: 10,
            min_overlap: 0.1,
            min_similarity: 0.3,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            prune_days: 30,
            prune_importance: 0.3,
            dedup_threshold: 0.95,
            promote_min_access: 5,
            promote_min_importance: 0.5,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { chunk_chars: 1000 }
    }
}

/// Returns `~/.mnemograph/`, or `./.mnemograph/` when no home directory is known.
pub fn default_mnemograph_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mnemograph")
}

/// Returns the default config file path: `~/.mnemograph/config.toml`
pub fn default_config_path() -> PathBuf {
    default_mnemograph_dir().join("config.toml")
}

impl MnemographConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MnemographConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (MNEMOGRAPH_DB, MNEMOGRAPH_LOG_LEVEL, MNEMOGRAPH_EMBEDDING).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MNEMOGRAPH_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MNEMOGRAPH_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("MNEMOGRAPH_EMBEDDING") {
            self.embedding.provider = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MnemographConfig::default();
        assert_eq!(config.server.transport, "stdio");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.retrieval.default_limit, 7);
        assert_eq!(config.maintenance.prune_days, 30);
        assert_eq!(config.maintenance.promote_min_access, 5);
        assert!((config.maintenance.dedup_threshold - 0.95).abs() < f64::EPSILON);
        assert!(config.storage.db_path.ends_with("memory.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
db_path = "/tmp/test.db"

[retrieval]
default_limit = 10

[embedding]
provider = "hash"
"#;
        let config: MnemographConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.retrieval.default_limit, 10);
        assert_eq!(config.embedding.provider, "hash");
        // defaults still apply for unset fields
        assert!((config.retrieval.expansion_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.embedding.timeout_ms, 5000);
        assert!(config.storage.auto_recover);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = MnemographConfig::default();
        std::env::set_var("MNEMOGRAPH_DB", "/tmp/override.db");
        std::env::set_var("MNEMOGRAPH_LOG_LEVEL", "trace");
        std::env::set_var("MNEMOGRAPH_EMBEDDING", "none");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.embedding.provider, "none");

        std::env::remove_var("MNEMOGRAPH_DB");
        std::env::remove_var("MNEMOGRAPH_LOG_LEVEL");
        std::env::remove_var("MNEMOGRAPH_EMBEDDING");
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/var/db/x.db"), PathBuf::from("/var/db/x.db"));
    }
}
