// src/embeddings.rs
// Embedding provider abstraction. The default implementation is a
// deterministic pseudo-embedding used for development and tests; a real
// deployment supplies an HTTP-backed provider over the same trait.

use crate::error::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dim(&self) -> usize;
}

/// Deterministic hash-based embedding: expands a SHA-256 digest of the input
/// into `dim` floats via repeated re-hashing, then L2-normalizes. Same text,
/// same dim, same vector every time — no network, no API key.
pub struct MockEmbeddingProvider {
    dim: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(pseudo_embedding(text, self.dim))
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

fn pseudo_embedding(text: &str, dim: usize) -> Vec<f32> {
    let mut values = Vec::with_capacity(dim);
    let mut block = 0u32;
    let mut seed = Sha256::digest(text.as_bytes());
    while values.len() < dim {
        for byte in seed.iter() {
            if values.len() >= dim {
                break;
            }
            // Map a byte into [-1.0, 1.0).
            values.push((*byte as f32 / 128.0) - 1.0);
        }
        block += 1;
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(block.to_le_bytes());
        seed = hasher.finalize();
    }
    l2_normalize(&mut values);
    values
}

fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Encodes an embedding vector as a little-endian f32 BLOB for storage.
pub fn encode_embedding(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

/// Decodes a BLOB written by `encode_embedding` back into floats.
pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity between two equal-length vectors; 0.0 if either is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_is_deterministic() {
        let provider = MockEmbeddingProvider::new(64);
        let a = provider.embed("hello world").await.unwrap();
        let b = provider.embed("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn embed_is_normalized() {
        let provider = MockEmbeddingProvider::new(32);
        let v = provider.embed("normalize me").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn different_text_differs() {
        let provider = MockEmbeddingProvider::new(32);
        let a = provider.embed("alpha").await.unwrap();
        let b = provider.embed("beta").await.unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn roundtrip_encoding() {
        let v = vec![0.5f32, -0.25, 1.0, 0.0];
        let bytes = encode_embedding(&v);
        let decoded = decode_embedding(&bytes);
        assert_eq!(v, decoded);
    }

    #[test]
    fn cosine_identical_vectors_is_one() {
        let v = vec![1.0f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
