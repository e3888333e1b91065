//! faceprint-core — Face embedding and verification engine.
//!
//! Two extraction strategies behind one contract: a model path using
//! SCRFD for detection and ArcFace for embeddings (both via ONNX
//! Runtime), and a geometric cascade fallback that needs no model
//! files. The capability probe in [`pipeline`] picks the strategy once
//! at startup.

pub mod alignment;
pub mod cascade;
pub mod detector;
pub mod geometric;
pub mod model;
pub mod outcome;
pub mod pipeline;
pub mod recognizer;
pub mod types;

pub use geometric::{GeometricPipeline, GEOMETRIC_EMBEDDING_DIM, GEOMETRIC_VERIFY_THRESHOLD};
pub use model::{ModelPipeline, MODEL_DISTANCE_THRESHOLD};
pub use outcome::{DetectOutcome, EmbedOutcome, UsageOutcome, VerifyOutcome};
pub use pipeline::{
    load_pipeline, EngineConfig, EngineMode, FacePipeline, ModeSelection, PipelineError,
};
pub use types::{Comparison, Embedding, EmbeddingSource, FaceLocator, FaceRegion};

/// Default directory searched for the ONNX model files.
pub fn default_model_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("models")
}
