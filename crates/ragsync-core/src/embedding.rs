//! Embedding provider trait, distance metrics, and vector utilities.
//!
//! Concrete providers (OpenAI, Ollama, fastembed, the offline hashing
//! embedder) live in the `ragsync` app crate. The trait lives here so the
//! retriever and tests can work against any backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;

/// An embedding backend.
///
/// `embed` performs exactly one attempt; retry, backoff, and timeouts are
/// the caller's policy.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier recorded with every indexed chunk for provenance.
    fn model_name(&self) -> &str;
    /// Vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Embed a single query, optionally prefixed with an instruction string
/// for instruction-aware models. The prefix is concatenated verbatim.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    instruction: Option<&str>,
    query: &str,
) -> Result<Vec<f32>, EmbeddingError> {
    let text = match instruction {
        Some(prefix) => format!("{}{}", prefix, query),
        None => query.to_string(),
    };
    provider
        .embed(&[text])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| EmbeddingError::Permanent("empty embedding response".to_string()))
}

/// How semantic closeness is measured. Every metric yields a distance:
/// lower is closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`, in `[0, 2]`.
    #[default]
    #[serde(rename = "cosine")]
    Cosine,
    /// Squared Euclidean distance.
    #[serde(rename = "l2")]
    L2,
    /// `1 - a·b`.
    #[serde(rename = "ip")]
    InnerProduct,
}

impl DistanceMetric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f64 {
        match self {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b) as f64,
            DistanceMetric::L2 => {
                if a.len() != b.len() {
                    return f64::INFINITY;
                }
                a.iter()
                    .zip(b.iter())
                    .map(|(x, y)| {
                        let d = (*x - *y) as f64;
                        d * d
                    })
                    .sum()
            }
            DistanceMetric::InnerProduct => {
                if a.len() != b.len() {
                    return f64::INFINITY;
                }
                let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x * *y) as f64).sum();
                1.0 - dot
            }
        }
    }

    /// Map a distance to a similarity that grows as the distance shrinks.
    pub fn similarity(&self, distance: f64) -> f64 {
        match self {
            DistanceMetric::Cosine | DistanceMetric::InnerProduct => 1.0 - distance,
            DistanceMetric::L2 => 1.0 / (1.0 + distance),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
            DistanceMetric::InnerProduct => "ip",
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use ragsync_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty, mismatched, or
/// zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoLen;

    #[async_trait]
    impl EmbeddingProvider for EchoLen {
        fn model_name(&self) -> &str {
            "echo"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_cosine_distance() {
        let d = DistanceMetric::Cosine.distance(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((d - 2.0).abs() < 1e-6);
        assert!((DistanceMetric::Cosine.similarity(d) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_distance_is_squared() {
        let d = DistanceMetric::L2.distance(&[0.0, 0.0], &[3.0, 4.0]);
        assert!((d - 25.0).abs() < 1e-6);
        assert!((DistanceMetric::L2.similarity(0.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_inner_product_distance() {
        let d = DistanceMetric::InnerProduct.distance(&[0.5, 0.5], &[1.0, 1.0]);
        assert!(d.abs() < 1e-6);
    }

    #[test]
    fn test_mismatched_dims_are_infinitely_far() {
        assert!(DistanceMetric::L2.distance(&[1.0], &[1.0, 2.0]).is_infinite());
    }

    #[test]
    fn test_metric_serde_names() {
        let m: DistanceMetric = serde_json::from_str("\"ip\"").unwrap();
        assert_eq!(m, DistanceMetric::InnerProduct);
        assert_eq!(serde_json::to_string(&DistanceMetric::L2).unwrap(), "\"l2\"");
    }

    #[tokio::test]
    async fn test_embed_query_prefixes_instruction() {
        let plain = embed_query(&EchoLen, None, "abc").await.unwrap();
        let prefixed = embed_query(&EchoLen, Some("Query: "), "abc").await.unwrap();
        assert_eq!(plain, vec![3.0]);
        assert_eq!(prefixed, vec![10.0]);
    }
}
