//! Process settings: defaults, an optional TOML file, then `MCP_*` env vars.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SmcpError};

/// Prefix for environment overrides, e.g. `MCP_INDEX_PATH`.
pub const ENV_PREFIX: &str = "MCP";

/// Which embedder implementation the process constructs at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Deterministic feature-hashing embedder; no model download.
    Hash,
    /// Sentence-transformer model via fastembed (cargo feature `fastembed`).
    Fastembed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app_name: String,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    /// Vector index file. The catalog lives next to it as `<stem>.meta.json`.
    pub index_path: PathBuf,
    pub embedding_backend: EmbeddingBackend,
    pub embedding_model_name: String,
    pub embedding_dim: usize,
    /// Default result limit for searches that do not pass one.
    pub top_k: usize,
    /// Fixed score given to keyword-fallback hits when merged with vector hits.
    pub keyword_score: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "smart-mcp".to_string(),
            data_dir: PathBuf::from("data"),
            database_path: PathBuf::from("data/mcp.db"),
            index_path: PathBuf::from("data/vectors.index"),
            embedding_backend: EmbeddingBackend::Hash,
            embedding_model_name: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            embedding_dim: 384,
            top_k: 5,
            keyword_score: 0.5,
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file, then apply process env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Config`] if the file cannot be parsed or a value is invalid.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        Self::load_with_env(config_file, Environment::with_prefix(ENV_PREFIX))
    }

    /// Layer defaults, the optional file, and `env`, in that order.
    fn load_with_env(config_file: Option<&Path>, env: Environment) -> Result<Self> {
        let defaults = Config::try_from(&Self::default()).map_err(config_error)?;
        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let settings: Self = builder
            .add_source(env)
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(config_error)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the rest of the system cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Config`] naming the offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            return Err(SmcpError::Config("embedding_dim must be positive".to_string()));
        }
        if self.top_k == 0 {
            return Err(SmcpError::Config("top_k must be positive".to_string()));
        }
        if !self.keyword_score.is_finite() {
            return Err(SmcpError::Config("keyword_score must be finite".to_string()));
        }
        Ok(())
    }

    /// Path of the vector catalog companion file.
    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        catalog_path_for(&self.index_path)
    }
}

/// The catalog sits beside the index file: `vectors.index` -> `vectors.meta.json`.
#[must_use]
pub fn catalog_path_for(index_path: &Path) -> PathBuf {
    index_path.with_extension("meta.json")
}

fn config_error(e: config::ConfigError) -> SmcpError {
    SmcpError::Config(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.embedding_dim, 384);
        assert_eq!(s.top_k, 5);
        assert!((s.keyword_score - 0.5).abs() < f32::EPSILON);
        assert_eq!(s.embedding_backend, EmbeddingBackend::Hash);
        assert_eq!(s.catalog_path(), PathBuf::from("data/vectors.meta.json"));
    }

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn no_file_and_no_env_gives_defaults() {
        let s = Settings::load_with_env(None, env(&[])).unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("smcp.toml");
        std::fs::write(&path, "top_k = 9\nindex_path = \"/tmp/x.index\"\n").unwrap();

        let s = Settings::load_with_env(Some(&path), env(&[])).unwrap();
        assert_eq!(s.top_k, 9);
        assert_eq!(s.index_path, PathBuf::from("/tmp/x.index"));
        assert_eq!(s.embedding_dim, 384);
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            Settings::load_with_env(Some(&path), env(&[])),
            Err(SmcpError::Config(_))
        ));
    }

    #[test]
    fn env_overrides_apply_after_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("smcp.toml");
        std::fs::write(&path, "top_k = 9\nembedding_dim = 64\n").unwrap();

        let s = Settings::load_with_env(
            Some(&path),
            env(&[
                ("MCP_TOP_K", "12"),
                ("MCP_EMBEDDING_BACKEND", "fastembed"),
                ("MCP_KEYWORD_SCORE", "0.4"),
                ("HOME", "/root"),
            ]),
        )
        .unwrap();
        assert_eq!(s.top_k, 12);
        assert_eq!(s.embedding_dim, 64);
        assert_eq!(s.embedding_backend, EmbeddingBackend::Fastembed);
        assert!((s.keyword_score - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn unrelated_mcp_variables_are_ignored() {
        let s = Settings::load_with_env(None, env(&[("MCP_SERVER_URL", "http://x")])).unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn env_override_with_bad_number_is_config_error() {
        let err = Settings::load_with_env(None, env(&[("MCP_EMBEDDING_DIM", "many")])).unwrap_err();
        assert!(matches!(err, SmcpError::Config(_)));
    }

    #[test]
    fn env_override_failing_validation_is_rejected() {
        let err = Settings::load_with_env(None, env(&[("MCP_TOP_K", "0")])).unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn validate_rejects_zero_dimension() {
        let s = Settings {
            embedding_dim: 0,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }
}
