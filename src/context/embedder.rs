//! Deterministic text embedder
//!
//! Maps text to a fixed-length vector by slicing a SHA-256 digest into
//! little-endian `u32` words and scaling each into `[0, 1)`. This is a
//! structural placeholder, not a semantic model: its only guarantees are
//! determinism and full use of the digest's entropy.
//!
//! Vectors longer than one digest (8 words) are extended with further
//! digests of the text salted by a little-endian block counter, so the
//! first 8 components never depend on the configured length.

use sha2::{Digest, Sha256};

/// Default embedding length.
pub const DEFAULT_DIMENSION: usize = 8;

const WORD_BYTES: usize = 4;
const WORDS_PER_DIGEST: usize = 32 / WORD_BYTES;
const WORD_SCALE: f64 = 4_294_967_296.0; // 2^32

/// Pure, deterministic text -> vector function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Embedder {
    dimension: usize,
}

impl Embedder {
    /// Create an embedder producing vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Output vector length.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed text into a vector of exactly `dimension()` components.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = Vec::with_capacity(self.dimension);
        let mut block: u32 = 0;

        while vector.len() < self.dimension {
            let digest = Self::digest_block(text, block);
            for word in digest.chunks_exact(WORD_BYTES).take(WORDS_PER_DIGEST) {
                if vector.len() == self.dimension {
                    break;
                }
                let value = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                vector.push((f64::from(value) / WORD_SCALE) as f32);
            }
            block += 1;
        }

        vector
    }

    fn digest_block(text: &str, block: u32) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        if block > 0 {
            hasher.update(block.to_le_bytes());
        }
        hasher.finalize().into()
    }
}

impl Default for Embedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

/// Cosine similarity of two equal-length vectors (0.0 for zero vectors).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
