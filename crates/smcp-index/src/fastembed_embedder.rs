//! Sentence-transformer embedder backed by fastembed (ONNX Runtime).

use std::path::PathBuf;
use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use smcp_core::{Result, SmcpError};

use crate::embedder::{normalize, Embedder};

/// Embedder that loads its model on first use and keeps it for the
/// lifetime of the handle.
pub struct FastEmbedder {
    model: EmbeddingModel,
    model_id: String,
    dimension: usize,
    cache_dir: PathBuf,
    loaded: Mutex<Option<TextEmbedding>>,
}

impl FastEmbedder {
    /// # Errors
    ///
    /// Returns [`SmcpError::Config`] if `model_name` is not a supported model.
    pub fn new(model_name: &str, dimension: usize, cache_dir: PathBuf) -> Result<Self> {
        let model = resolve_model(model_name)?;
        Ok(Self {
            model,
            model_id: model_name.to_string(),
            dimension,
            cache_dir,
            loaded: Mutex::new(None),
        })
    }
}

fn resolve_model(name: &str) -> Result<EmbeddingModel> {
    let short = name.rsplit('/').next().unwrap_or(name).to_ascii_lowercase();
    match short.as_str() {
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        _ => Err(SmcpError::Config(format!(
            "unsupported embedding model '{name}'"
        ))),
    }
}

impl Embedder for FastEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut guard = self
            .loaded
            .lock()
            .map_err(|_| SmcpError::Embedding("embedding model lock poisoned".to_string()))?;

        if guard.is_none() {
            tracing::info!(model = %self.model_id, "loading embedding model");
            let options = InitOptions::new(self.model.clone())
                .with_cache_dir(self.cache_dir.clone())
                .with_show_download_progress(false);
            let model = TextEmbedding::try_new(options)
                .map_err(|e| SmcpError::Embedding(format!("failed to load model: {e}")))?;
            *guard = Some(model);
        }
        let Some(model) = guard.as_mut() else {
            return Err(SmcpError::Embedding("embedding model unavailable".to_string()));
        };

        let owned: Vec<String> = texts.iter().map(|t| (*t).to_string()).collect();
        let mut vectors = model
            .embed(owned, None)
            .map_err(|e| SmcpError::Embedding(e.to_string()))?;

        for vector in &mut vectors {
            if vector.len() != self.dimension {
                return Err(SmcpError::Embedding(format!(
                    "model {} produced {} dimensions, configured for {}",
                    self.model_id,
                    vector.len(),
                    self.dimension
                )));
            }
            normalize(vector);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_model_names() {
        assert!(resolve_model("sentence-transformers/all-MiniLM-L6-v2").is_ok());
        assert!(resolve_model("BAAI/bge-small-en-v1.5").is_ok());
        assert!(resolve_model("nonexistent/model").is_err());
    }

    #[test]
    fn construction_does_not_load_the_model() {
        let dir = tempfile::TempDir::new().unwrap();
        let embedder =
            FastEmbedder::new("all-MiniLM-L6-v2", 384, dir.path().to_path_buf()).unwrap();
        assert!(embedder.loaded.lock().unwrap().is_none());
        assert_eq!(embedder.dimension(), 384);
    }
}
