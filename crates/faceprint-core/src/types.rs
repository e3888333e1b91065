use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Rectangular detection box in pixel coordinates.
///
/// Produced transiently by face detection and consumed immediately;
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    /// Center point of the box.
    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    /// A zero-width or zero-height box carries no usable geometry.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Which extraction path produced an embedding.
///
/// The two paths use different component semantics; embeddings are only
/// ever compared against embeddings from the same source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingSource {
    /// Geometric descriptor from the cascade fallback, always 128-dim.
    Geometric,
    /// Model-backed embedding, tagged with the model version (e.g. "w600k_r50").
    Model(String),
}

/// Face embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub source: EmbeddingSource,
}

impl Embedding {
    /// Cosine similarity between two embeddings, in [-1, 1].
    ///
    /// A zero-norm operand yields 0.0 by convention rather than
    /// dividing by zero.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }
}

/// Result of comparing two embeddings from the same path.
///
/// `distance` and `threshold` share one metric space per path and are
/// never compared across paths. `confidence` decreases monotonically
/// with `distance` in both paths.
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub verified: bool,
    pub distance: f32,
    pub threshold: f32,
    pub confidence: f32,
}

/// Locates face regions in a grayscale image.
///
/// The cascade detector is the production implementation; tests
/// substitute stubs to exercise the extraction pipeline in isolation.
pub trait FaceLocator {
    fn locate(&self, gray: &GrayImage) -> Vec<FaceRegion>;
}
