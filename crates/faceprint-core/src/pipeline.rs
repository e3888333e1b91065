//! Strategy selection: the shared pipeline contract and the one-time
//! capability probe.

use crate::geometric::{GeometricError, GeometricPipeline};
use crate::model::{ModelError, ModelPipeline};
use crate::types::{Comparison, Embedding};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Which strategy a pipeline runs. Failure envelopes differ per mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    Model,
    Geometric,
}

/// Strategy preference supplied at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeSelection {
    /// Probe the model engine once; fall back to geometric if it is
    /// unavailable.
    #[default]
    Auto,
    /// Require the model engine; fail if it cannot be loaded.
    Model,
    /// Skip the probe and run the geometric fallback.
    Geometric,
}

/// Startup configuration, passed explicitly into the probe rather than
/// read from ambient state.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model_dir: PathBuf,
    pub mode: ModeSelection,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_dir: crate::default_model_dir(),
            mode: ModeSelection::Auto,
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Geometric(#[from] GeometricError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Contract shared by both extraction strategies.
///
/// Exactly one implementation is selected per process; every
/// operation dispatches through the same handle.
pub trait FacePipeline {
    fn mode(&self) -> EngineMode;

    /// One image in, one embedding out.
    fn embed(&mut self, image: &Path) -> Result<Embedding, PipelineError>;

    /// Two images in, one same-identity decision out.
    fn verify(&mut self, left: &Path, right: &Path) -> Result<Comparison, PipelineError>;

    /// Number of faces found in one image.
    fn count_faces(&mut self, image: &Path) -> Result<usize, PipelineError>;
}

impl FacePipeline for GeometricPipeline {
    fn mode(&self) -> EngineMode {
        EngineMode::Geometric
    }

    fn embed(&mut self, image: &Path) -> Result<Embedding, PipelineError> {
        Ok(self.embed_image(image)?)
    }

    fn verify(&mut self, left: &Path, right: &Path) -> Result<Comparison, PipelineError> {
        Ok(self.compare(left, right)?)
    }

    fn count_faces(&mut self, image: &Path) -> Result<usize, PipelineError> {
        // The fallback path only knows presence, not count: one face
        // when extraction succeeds.
        self.embed_image(image)?;
        Ok(1)
    }
}

impl FacePipeline for ModelPipeline {
    fn mode(&self) -> EngineMode {
        EngineMode::Model
    }

    fn embed(&mut self, image: &Path) -> Result<Embedding, PipelineError> {
        Ok(self.embed_image(image)?)
    }

    fn verify(&mut self, left: &Path, right: &Path) -> Result<Comparison, PipelineError> {
        Ok(self.compare(left, right)?)
    }

    fn count_faces(&mut self, image: &Path) -> Result<usize, PipelineError> {
        Ok(self.count(image)?)
    }
}

/// Capability probe. Runs once at startup; the returned handle serves
/// every subsequent operation, with no per-call re-check.
pub fn load_pipeline(config: &EngineConfig) -> Result<Box<dyn FacePipeline>, PipelineError> {
    match config.mode {
        ModeSelection::Geometric => Ok(Box::new(GeometricPipeline::new())),
        ModeSelection::Model => Ok(Box::new(ModelPipeline::load(&config.model_dir)?)),
        ModeSelection::Auto => match ModelPipeline::load(&config.model_dir) {
            Ok(pipeline) => {
                tracing::info!(model_dir = %config.model_dir.display(), "model engine loaded");
                Ok(Box::new(pipeline))
            }
            Err(err) => {
                // One-time diagnostic; never part of an Outcome.
                tracing::warn!(
                    error = %err,
                    model_dir = %config.model_dir.display(),
                    "model engine unavailable; running in geometric fallback mode"
                );
                Ok(Box::new(GeometricPipeline::new()))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FaceLocator, FaceRegion};
    use image::{GrayImage, Luma};

    struct OneFace;

    impl FaceLocator for OneFace {
        fn locate(&self, _gray: &GrayImage) -> Vec<FaceRegion> {
            vec![FaceRegion {
                x: 10,
                y: 10,
                width: 50,
                height: 50,
            }]
        }
    }

    fn temp_png(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        GrayImage::from_pixel(64, 64, Luma([100]))
            .save(&path)
            .expect("save png");
        path
    }

    #[test]
    fn test_auto_probe_without_models_falls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = EngineConfig {
            model_dir: dir.path().to_path_buf(),
            mode: ModeSelection::Auto,
        };
        let pipeline = load_pipeline(&config).expect("pipeline");
        assert_eq!(pipeline.mode(), EngineMode::Geometric);
    }

    #[test]
    fn test_forced_model_without_models_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = EngineConfig {
            model_dir: dir.path().to_path_buf(),
            mode: ModeSelection::Model,
        };
        assert!(load_pipeline(&config).is_err());
    }

    #[test]
    fn test_forced_geometric_never_probes() {
        let config = EngineConfig {
            model_dir: PathBuf::from("/nonexistent"),
            mode: ModeSelection::Geometric,
        };
        let pipeline = load_pipeline(&config).expect("pipeline");
        assert_eq!(pipeline.mode(), EngineMode::Geometric);
    }

    #[test]
    fn test_geometric_count_is_presence_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = temp_png(&dir, "face.png");
        let mut pipeline = GeometricPipeline::with_locator(Box::new(OneFace));
        // Presence maps to a count of exactly one, whatever the locator saw.
        assert_eq!(pipeline.count_faces(&path).expect("count"), 1);
    }

    #[test]
    fn test_geometric_count_miss_is_error() {
        struct NoFace;
        impl FaceLocator for NoFace {
            fn locate(&self, _gray: &GrayImage) -> Vec<FaceRegion> {
                Vec::new()
            }
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let path = temp_png(&dir, "empty.png");
        let mut pipeline = GeometricPipeline::with_locator(Box::new(NoFace));
        let err = pipeline.count_faces(&path).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Geometric(GeometricError::NoFaceDetected)
        ));
    }
}
