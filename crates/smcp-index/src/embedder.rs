//! Text embedders.
//!
//! The process builds one [`SharedEmbedder`] at startup and hands clones of
//! it to whatever needs embeddings. Model-backed embedders load their model
//! on first use and keep it for the lifetime of the handle.

use std::sync::Arc;

use smcp_core::{EmbeddingBackend, Result, Settings, SmcpError};

/// Turns text into fixed-dimension unit vectors.
///
/// Implementations must be deterministic for a fixed model: the same text
/// always yields the same vector.
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Stable identifier of the model, for status reporting.
    fn model_id(&self) -> &str;

    /// Embed a batch of texts, preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Embedding`] if the model is unavailable or rejects the input.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Embedding`] if the model is unavailable or rejects the input.
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| SmcpError::Embedding("embedder returned no vector".to_string()))
    }
}

/// Process-wide embedder handle.
pub type SharedEmbedder = Arc<dyn Embedder>;

/// Construct the embedder selected by `settings.embedding_backend`.
///
/// # Errors
///
/// Returns [`SmcpError::Config`] if the backend is not compiled in or the model
/// name is unknown.
pub fn build_embedder(settings: &Settings) -> Result<SharedEmbedder> {
    match settings.embedding_backend {
        EmbeddingBackend::Hash => Ok(Arc::new(HashEmbedder::new(settings.embedding_dim))),
        #[cfg(feature = "fastembed")]
        EmbeddingBackend::Fastembed => Ok(Arc::new(crate::fastembed_embedder::FastEmbedder::new(
            &settings.embedding_model_name,
            settings.embedding_dim,
            settings.data_dir.join("models"),
        )?)),
        #[cfg(not(feature = "fastembed"))]
        EmbeddingBackend::Fastembed => Err(SmcpError::Config(
            "embedding_backend = \"fastembed\" requires building with --features fastembed"
                .to_string(),
        )),
    }
}

/// Feature-hashing embedder.
///
/// Text is split into lowercase alphanumeric tokens; each token is hashed
/// with FNV-1a into one of `dimension` buckets with a hash-derived sign. The
/// bucket counts are L2-normalized. Texts sharing vocabulary score high,
/// unrelated texts score near zero. A text with no tokens embeds to the
/// zero vector, which scores 0 against everything.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: format!("fnv1a-hash-{dimension}"),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }
        for token in tokenize(text) {
            let hash = fnv1a_64(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Scale `vector` to unit length in place. The zero vector is left alone.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return;
    }
    for value in vector {
        *value /= norm;
    }
}

/// Inner product; equals cosine similarity for unit vectors.
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        dot(v, v).sqrt()
    }

    #[test]
    fn hash_embedder_is_deterministic_and_unit_length() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("FAISS enables similarity search").unwrap();
        let b = embedder.embed("FAISS enables similarity search").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!((norm(&a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_scores_higher_than_disjoint() {
        let embedder = HashEmbedder::new(384);
        let query = embedder.embed("similarity search").unwrap();
        let related = embedder.embed("FAISS enables similarity search").unwrap();
        let unrelated = embedder.embed("rebuild embeddings index").unwrap();
        assert!(dot(&query, &related) > dot(&query, &unrelated));
        assert!(dot(&query, &related) > 0.3);
    }

    #[test]
    fn tokenization_ignores_case_and_punctuation() {
        let embedder = HashEmbedder::new(128);
        let a = embedder.embed("Rebuild, the INDEX!").unwrap();
        let b = embedder.embed("rebuild the index").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed("").unwrap();
        assert_eq!(v, vec![0.0; 16]);
        let v = embedder.embed("  ,;  ").unwrap();
        assert_eq!(v, vec![0.0; 16]);
    }

    #[test]
    fn batch_preserves_order() {
        let embedder = HashEmbedder::new(32);
        let batch = embedder.embed_batch(&["alpha", "beta"]).unwrap();
        assert_eq!(batch[0], embedder.embed("alpha").unwrap());
        assert_eq!(batch[1], embedder.embed("beta").unwrap());
    }

    #[test]
    fn build_embedder_uses_configured_dimension() {
        let settings = Settings {
            embedding_dim: 48,
            ..Settings::default()
        };
        let embedder = build_embedder(&settings).unwrap();
        assert_eq!(embedder.dimension(), 48);
        assert_eq!(embedder.model_id(), "fnv1a-hash-48");
    }

    #[cfg(not(feature = "fastembed"))]
    #[test]
    fn fastembed_backend_requires_feature() {
        let settings = Settings {
            embedding_backend: EmbeddingBackend::Fastembed,
            ..Settings::default()
        };
        assert!(matches!(build_embedder(&settings), Err(SmcpError::Config(_))));
    }
}
