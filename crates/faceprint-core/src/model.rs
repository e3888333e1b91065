//! Model-backed extraction and verification.
//!
//! Detection and representation both run through the ONNX engine with
//! strict enforcement: an image without a detectable face is an error,
//! never a degraded success.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{Comparison, Embedding};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

/// Cosine-distance cutoff for a same-identity decision with
/// w600k_r50 embeddings; the distance form of a 0.40 similarity
/// threshold.
pub const MODEL_DISTANCE_THRESHOLD: f32 = 0.60;

const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("image could not be loaded")]
    ImageLoad(#[source] image::ImageError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
}

/// The model-backed strategy: SCRFD detection plus ArcFace embeddings.
#[derive(Debug)]
pub struct ModelPipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl ModelPipeline {
    /// Load both ONNX sessions from `model_dir`.
    ///
    /// This is the capability probe: a failure here puts the process
    /// into geometric fallback mode for its entire lifetime.
    pub fn load(model_dir: &Path) -> Result<Self, ModelError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self {
            detector,
            recognizer,
        })
    }

    /// Decode an image, detect faces, embed the first (highest
    /// confidence) one.
    pub(crate) fn embed_image(&mut self, image: &Path) -> Result<Embedding, ModelError> {
        let rgb = load_rgb(image)?;
        let detections = self.detector.detect(&rgb)?;
        let face = detections.first().ok_or(ModelError::NoFaceDetected)?;
        Ok(self.recognizer.extract(&rgb, face)?)
    }

    /// Paired comparison: embed both images and reduce to a decision.
    pub(crate) fn compare(&mut self, left: &Path, right: &Path) -> Result<Comparison, ModelError> {
        let a = self.embed_image(left)?;
        let b = self.embed_image(right)?;

        let distance = 1.0 - a.similarity(&b);

        Ok(Comparison {
            verified: distance < MODEL_DISTANCE_THRESHOLD,
            distance,
            threshold: MODEL_DISTANCE_THRESHOLD,
            // Unclamped: distances beyond 1 yield negative confidence.
            confidence: 1.0 - distance,
        })
    }

    /// True face count for an image; zero faces is an error under
    /// strict enforcement.
    pub(crate) fn count(&mut self, image: &Path) -> Result<usize, ModelError> {
        let rgb = load_rgb(image)?;
        let count = self.detector.detect(&rgb)?.len();
        if count == 0 {
            return Err(ModelError::NoFaceDetected);
        }
        Ok(count)
    }
}

fn load_rgb(path: &Path) -> Result<RgbImage, ModelError> {
    let img = image::open(path).map_err(ModelError::ImageLoad)?;
    Ok(img.to_rgb8())
}
