//! Local deterministic embedding backend.
//!
//! Hashes word and character-trigram features into a fixed-dimension vector
//! and unit-normalizes the result. Requires no network and is bitwise
//! reproducible for identical inputs, which makes it the safe fallback when
//! no provider credentials are configured and the workhorse for tests.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingBackend;

/// Hash-based embedding backend of a configurable dimension.
pub struct HashEmbeddingBackend {
    dimension: usize,
}

impl HashEmbeddingBackend {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return v;
        }

        for feature in features(text) {
            let digest = Sha256::digest(feature.as_bytes());
            let h = u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"));
            let idx = (h % self.dimension as u64) as usize;
            let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }

        l2_normalize(&v)
    }
}

#[async_trait]
impl EmbeddingBackend for HashEmbeddingBackend {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Feature stream for a text: lowercase words plus character trigrams, so
/// morphologically related words land on overlapping dimensions.
fn features(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in text.to_lowercase().split_whitespace() {
        let word: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if word.is_empty() {
            continue;
        }
        out.push(format!("w:{word}"));

        let chars: Vec<char> = word.chars().collect();
        for gram in chars.windows(3) {
            out.push(format!("g:{}", gram.iter().collect::<String>()));
        }
    }
    out
}

/// L2-normalize a vector. Returns a zero vector if the input norm is zero.
fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let v = vec![3.0, 4.0];
        let normalized = l2_normalize(&v);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
        let norm: f32 = normalized.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let v = vec![0.0, 0.0, 0.0];
        let normalized = l2_normalize(&v);
        assert_eq!(normalized, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn identical_inputs_embed_identically() {
        let backend = HashEmbeddingBackend::new(64);
        let a = backend.embed_sync("Rust is a systems programming language");
        let b = backend.embed_sync("Rust is a systems programming language");
        assert_eq!(a, b, "same input must produce identical output");
    }

    #[test]
    fn output_is_unit_length() {
        let backend = HashEmbeddingBackend::new(64);
        let v = backend.embed_sync("hello world");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "L2 norm should be ~1.0, got {norm}");
    }

    #[test]
    fn related_words_share_features() {
        let backend = HashEmbeddingBackend::new(64);
        let a = backend.embed_sync("number");
        let b = backend.embed_sync("numbers");
        let c = backend.embed_sync("zebra");

        let dot = |x: &[f32], y: &[f32]| -> f32 { x.iter().zip(y).map(|(a, b)| a * b).sum() };
        assert!(
            dot(&a, &b) > dot(&a, &c),
            "shared trigrams should pull related words closer"
        );
    }

    #[test]
    fn different_dimensions_are_respected() {
        for dim in [8, 128, 768] {
            let backend = HashEmbeddingBackend::new(dim);
            assert_eq!(backend.embed_sync("abc").len(), dim);
        }
    }
}
