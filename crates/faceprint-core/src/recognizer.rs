//! ArcFace face recognizer via ONNX Runtime.
//!
//! Produces 512-dimensional L2-normalized embeddings from aligned
//! 112x112 face crops (w600k_r50 weights).

use crate::alignment::{self, ALIGNED_SIZE};
use crate::detector::Detection;
use crate::types::{Embedding, EmbeddingSource};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const REC_MEAN: f32 = 127.5;
// Symmetric normalization; deliberately not the detector's 128.0.
const REC_STD: f32 = 127.5;
const REC_EMBEDDING_DIM: usize = 512;
pub const REC_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognition model not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("embedding inference failed: {0}")]
    Inference(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

#[derive(Debug)]
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model.
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "ArcFace recognizer loaded");

        Ok(Self { session })
    }

    /// Extract an embedding for one detected face.
    ///
    /// Aligns the face to the canonical crop via its landmarks, runs
    /// inference, and L2-normalizes the result.
    pub fn extract(
        &mut self,
        rgb: &RgbImage,
        face: &Detection,
    ) -> Result<Embedding, RecognizerError> {
        let aligned = alignment::align_face(rgb, &face.landmarks);
        let input = preprocess(&aligned);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::Inference(format!("embedding extraction: {e}")))?;

        if raw.len() != REC_EMBEDDING_DIM {
            return Err(RecognizerError::Inference(format!(
                "expected {REC_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        let norm: f32 = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
        let values: Vec<f32> = if norm > 0.0 {
            raw.iter().map(|v| v / norm).collect()
        } else {
            raw.to_vec()
        };

        Ok(Embedding {
            values,
            source: EmbeddingSource::Model(REC_MODEL_VERSION.to_string()),
        })
    }
}

/// Normalize an aligned RGB crop into a NCHW tensor.
fn preprocess(aligned: &RgbImage) -> Array4<f32> {
    let size = ALIGNED_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in aligned.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - REC_MEAN) / REC_STD;
        }
    }
    tensor
}
