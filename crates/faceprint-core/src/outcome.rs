//! JSON outcome envelopes for the process boundary.
//!
//! Every operation produces exactly one envelope, failure included;
//! typed errors collapse here into the `success` flag plus a
//! human-readable message. The schema does not discriminate error
//! causes beyond the message text.

use crate::geometric::{GeometricError, GEOMETRIC_VERIFY_THRESHOLD};
use crate::pipeline::{EngineMode, PipelineError};
use crate::types::{Comparison, Embedding, EmbeddingSource};
use serde::Serialize;

/// Envelope for `embed`.
#[derive(Debug, Serialize)]
pub struct EmbedOutcome {
    pub success: bool,
    pub embedding: Option<Vec<f32>>,
    pub message: String,
}

impl EmbedOutcome {
    pub fn from_result(result: Result<Embedding, PipelineError>) -> Self {
        match result {
            Ok(embedding) => {
                let message = match embedding.source {
                    EmbeddingSource::Geometric => "fallback embedding created",
                    EmbeddingSource::Model(_) => "embedding created",
                };
                Self {
                    success: true,
                    embedding: Some(embedding.values),
                    message: message.to_string(),
                }
            }
            Err(err) => Self {
                success: false,
                embedding: None,
                message: err.to_string(),
            },
        }
    }
}

/// Envelope for `verify`.
#[derive(Debug, Serialize)]
pub struct VerifyOutcome {
    pub success: bool,
    pub verified: bool,
    pub distance: f32,
    pub threshold: f32,
    pub confidence: f32,
    pub message: String,
}

impl VerifyOutcome {
    /// Failure metrics depend on the active strategy: the geometric
    /// path reports maximal distance against its fixed threshold, the
    /// model path zeroes every field.
    pub fn from_result(mode: EngineMode, result: Result<Comparison, PipelineError>) -> Self {
        match result {
            Ok(comparison) => Self {
                success: true,
                verified: comparison.verified,
                distance: comparison.distance,
                threshold: comparison.threshold,
                confidence: comparison.confidence,
                message: "comparison complete".to_string(),
            },
            Err(err) => match mode {
                EngineMode::Geometric => Self {
                    success: false,
                    verified: false,
                    distance: 1.0,
                    threshold: GEOMETRIC_VERIFY_THRESHOLD,
                    confidence: 0.0,
                    message: verify_failure_message(&err),
                },
                EngineMode::Model => Self {
                    success: false,
                    verified: false,
                    distance: 0.0,
                    threshold: 0.0,
                    confidence: 0.0,
                    message: err.to_string(),
                },
            },
        }
    }
}

/// Detection misses keep the historical wording; other causes carry
/// their own detail.
fn verify_failure_message(err: &PipelineError) -> String {
    match err {
        PipelineError::Geometric(GeometricError::NoFaceDetected) => "face not detected".to_string(),
        other => other.to_string(),
    }
}

/// Envelope for `detect`.
#[derive(Debug, Serialize)]
pub struct DetectOutcome {
    pub success: bool,
    pub face_detected: bool,
    pub face_count: usize,
    pub message: String,
}

impl DetectOutcome {
    pub fn from_result(result: Result<usize, PipelineError>) -> Self {
        match result {
            Ok(count) => Self {
                success: true,
                face_detected: true,
                face_count: count,
                message: format!("{count} face(s) detected"),
            },
            Err(err) => Self {
                success: false,
                face_detected: false,
                face_count: 0,
                message: err.to_string(),
            },
        }
    }
}

/// Minimal envelope for invocation errors.
#[derive(Debug, Serialize)]
pub struct UsageOutcome {
    pub success: bool,
    pub message: String,
}

impl UsageOutcome {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
