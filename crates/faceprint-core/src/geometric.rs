//! Geometric fallback extraction and verification.
//!
//! Used when the model engine is unavailable. The descriptor encodes
//! the position, size, and aspect ratio of the detected box, not
//! identity: two faces photographed at the same framing and distance
//! register as similar. Downstream thresholds and messages are tuned
//! against exactly this behavior, so keep it as is.

use crate::cascade::CascadeDetector;
use crate::types::{Comparison, Embedding, EmbeddingSource, FaceLocator, FaceRegion};
use image::GrayImage;
use std::path::Path;
use thiserror::Error;

/// Fixed length of the geometric descriptor.
pub const GEOMETRIC_EMBEDDING_DIM: usize = 128;
/// Number of leading components that carry geometry; the rest are zero.
const GEOMETRIC_FEATURES: usize = 7;
/// Fixed cosine-distance threshold for the fallback verifier.
pub const GEOMETRIC_VERIFY_THRESHOLD: f32 = 0.3;

#[derive(Error, Debug)]
pub enum GeometricError {
    #[error("image could not be loaded")]
    ImageLoad(#[source] image::ImageError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("degenerate face region (zero-sized detection box)")]
    DegenerateRegion(FaceRegion),
}

/// Fallback pipeline: cascade detection plus the geometric descriptor.
pub struct GeometricPipeline {
    locator: Box<dyn FaceLocator>,
}

impl Default for GeometricPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl GeometricPipeline {
    pub fn new() -> Self {
        Self {
            locator: Box::new(CascadeDetector::default()),
        }
    }

    /// Substitute the face locator; used by tests to pin detections.
    pub fn with_locator(locator: Box<dyn FaceLocator>) -> Self {
        Self { locator }
    }

    /// Decode an image, locate the first face, build its descriptor.
    pub(crate) fn embed_image(&self, image: &Path) -> Result<Embedding, GeometricError> {
        let gray = load_gray(image)?;
        let regions = self.locator.locate(&gray);
        // First region in detector order; no ranking by size or score.
        let region = regions
            .first()
            .copied()
            .ok_or(GeometricError::NoFaceDetected)?;
        descriptor(region)
    }

    /// Compare two images through the fallback descriptor.
    pub(crate) fn compare(&self, left: &Path, right: &Path) -> Result<Comparison, GeometricError> {
        let a = self.embed_image(left)?;
        let b = self.embed_image(right)?;

        let similarity = a.similarity(&b);
        let distance = 1.0 - similarity;

        Ok(Comparison {
            verified: distance < GEOMETRIC_VERIFY_THRESHOLD,
            distance,
            threshold: GEOMETRIC_VERIFY_THRESHOLD,
            // Reported as the similarity itself, not 1 - distance; the
            // two are equal by construction and kept defined this way.
            confidence: similarity,
        })
    }
}

fn load_gray(path: &Path) -> Result<GrayImage, GeometricError> {
    let img = image::open(path).map_err(GeometricError::ImageLoad)?;
    Ok(img.to_luma8())
}

/// Build the 128-component descriptor for a detection box.
///
/// Layout: `[x, y, w, h, w/h, cx, cy]` followed by zero padding.
/// Zero-sized boxes are rejected before the aspect-ratio division.
fn descriptor(region: FaceRegion) -> Result<Embedding, GeometricError> {
    if region.is_degenerate() {
        return Err(GeometricError::DegenerateRegion(region));
    }

    let (cx, cy) = region.center();
    let mut values = vec![0.0f32; GEOMETRIC_EMBEDDING_DIM];
    values[0] = region.x as f32;
    values[1] = region.y as f32;
    values[2] = region.width as f32;
    values[3] = region.height as f32;
    values[4] = region.width as f32 / region.height as f32;
    values[5] = cx;
    values[6] = cy;
    debug_assert!(values[GEOMETRIC_FEATURES..].iter().all(|&v| v == 0.0));

    Ok(Embedding {
        values,
        source: EmbeddingSource::Geometric,
    })
}
