//! Deterministic embedding provider for tests and offline runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{Embedder, EmbedError, check_input};

/// Produces stable pseudo-random unit vectors derived from the input text.
///
/// The same text always maps to the same vector, which makes retrieval
/// pipelines reproducible in CI without any network access. Specific texts
/// can be pinned to hand-crafted vectors, and the whole provider can be
/// switched into a failure mode to exercise error propagation.
pub struct MockEmbedder {
    dimension: usize,
    pinned: Mutex<FxHashMap<String, Vec<f32>>>,
    failure: Option<EmbedError>,
}

impl MockEmbedder {
    /// A mock with the given output dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            pinned: Mutex::new(FxHashMap::default()),
            failure: None,
        }
    }

    /// A mock whose every call fails with `error`.
    pub fn failing(dimension: usize, error: EmbedError) -> Self {
        Self {
            dimension,
            pinned: Mutex::new(FxHashMap::default()),
            failure: Some(error),
        }
    }

    /// Pins `text` to an exact vector, overriding the derived one.
    ///
    /// # Panics
    /// Panics if the vector's length differs from the mock's dimension;
    /// that is a test-authoring mistake.
    pub fn pin(&self, text: impl Into<String>, vector: Vec<f32>) {
        assert_eq!(vector.len(), self.dimension, "pinned vector dimension");
        self.pinned.lock().insert(text.into(), vector);
    }

    fn derive(&self, text: &str) -> Vec<f32> {
        // FNV-style accumulation seeds a small LCG; cheap and stable.
        let mut seed: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.bytes() {
            seed ^= u64::from(byte);
            seed = seed.wrapping_mul(0x0000_0100_0000_01b3);
        }
        let mut state = seed | 1;
        let mut vector = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
            vector.push((unit * 2.0 - 1.0) as f32);
        }
        normalize(&mut vector);
        vector
    }
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        check_input(text)?;
        if let Some(pinned) = self.pinned.lock().get(text) {
            return Ok(pinned.clone());
        }
        Ok(self.derive(text))
    }
}
