//! Artifact resolution
//!
//! Finds the trained model and its label vocabulary among the configured
//! candidate locations. Resolution never fails: a missing or broken artifact
//! yields `None` and the engine runs with inference disabled.

use crate::backend::ModelBackend;
use crate::config::EngineConfig;
use crate::vocabulary::LabelVocabulary;
use agrovision_core::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(feature = "onnx")]
use crate::backend::{probe_output_dim, DeviceType, OnnxBackend};
#[cfg(feature = "onnx")]
use crate::preprocess::INPUT_SHAPE;

/// Turns a model file into a usable backend
pub trait ArtifactLoader: Send + Sync {
    /// Load the artifact at `path`. Errors mean "try the next candidate".
    fn load(&self, path: &Path) -> Result<Arc<dyn ModelBackend>>;
}

/// Loads ONNX graphs through `candle-onnx`
#[cfg(feature = "onnx")]
pub struct OnnxLoader {
    device: DeviceType,
}

#[cfg(feature = "onnx")]
impl OnnxLoader {
    /// Create a loader targeting the given device
    pub fn new(device: DeviceType) -> Self {
        Self { device }
    }
}

#[cfg(feature = "onnx")]
impl ArtifactLoader for OnnxLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn ModelBackend>> {
        let backend = OnnxBackend::load(path, self.device)?;

        let backend = match backend.output_dim() {
            Some(_) => backend,
            None => {
                debug!("{} declares no output width, probing", path.display());
                let dim = probe_output_dim(&backend, &INPUT_SHAPE)?;
                backend.with_output_dim(dim)
            }
        };

        Ok(Arc::new(backend))
    }
}

/// A trained classifier found on disk
#[derive(Clone)]
pub struct ModelArtifact {
    /// Where the artifact was loaded from
    pub path: PathBuf,

    /// Loaded model, shared read-only
    pub handle: Arc<dyn ModelBackend>,
}

impl fmt::Debug for ModelArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelArtifact")
            .field("path", &self.path)
            .field("model", &self.handle.name())
            .field("output_dim", &self.handle.output_dim())
            .finish()
    }
}

/// What happened at one candidate location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// No file at the path
    Missing,
    /// File exists but could not be loaded
    Failed(String),
    /// File loaded; resolution stopped here
    Loaded,
}

/// One model candidate that was checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadAttempt {
    pub path: PathBuf,
    pub outcome: AttemptOutcome,
}

/// Outcome of startup resolution
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The winning model, if any candidate loaded
    pub model: Option<ModelArtifact>,

    /// Raw vocabulary, not yet fitted to the model head
    pub vocabulary: LabelVocabulary,

    /// Every model candidate checked, in order
    pub attempts: Vec<LoadAttempt>,
}

impl Resolution {
    /// True when no model could be loaded
    pub fn is_unavailable(&self) -> bool {
        self.model.is_none()
    }
}

/// Resolves the model and vocabulary from configured candidates
pub struct ArtifactResolver<'a> {
    config: &'a EngineConfig,
    loader: &'a dyn ArtifactLoader,
}

impl<'a> ArtifactResolver<'a> {
    /// Create a resolver over the config's candidate locations
    pub fn new(config: &'a EngineConfig, loader: &'a dyn ArtifactLoader) -> Self {
        Self { config, loader }
    }

    /// Resolve model and vocabulary
    pub fn resolve(&self) -> Resolution {
        let (model, attempts) = self.resolve_model();
        let vocabulary = self.resolve_vocabulary(model.as_ref().map(|m| m.path.as_path()));

        Resolution {
            model,
            vocabulary,
            attempts,
        }
    }

    /// Try each `(directory, filename)` pair in order; first loadable wins
    pub fn resolve_model(&self) -> (Option<ModelArtifact>, Vec<LoadAttempt>) {
        let mut attempts = Vec::new();

        for path in self.config.model_candidates() {
            if !path.is_file() {
                debug!("No model at {}", path.display());
                attempts.push(LoadAttempt {
                    path,
                    outcome: AttemptOutcome::Missing,
                });
                continue;
            }

            info!("Loading model candidate {}", path.display());
            match self.loader.load(&path) {
                Ok(handle) => {
                    info!(
                        "✓ Model loaded from {} ({} outputs)",
                        path.display(),
                        handle
                            .output_dim()
                            .map(|d| d.to_string())
                            .unwrap_or_else(|| "unknown".to_string())
                    );
                    attempts.push(LoadAttempt {
                        path: path.clone(),
                        outcome: AttemptOutcome::Loaded,
                    });
                    return (Some(ModelArtifact { path, handle }), attempts);
                }
                Err(e) => {
                    warn!("✗ Failed to load model at {}: {}. Trying next candidate", path.display(), e);
                    attempts.push(LoadAttempt {
                        path,
                        outcome: AttemptOutcome::Failed(e.to_string()),
                    });
                }
            }
        }

        warn!(
            "No trained model found in {} candidate locations; image prediction is disabled",
            attempts.len()
        );
        (None, attempts)
    }

    /// First label file that exists and parses wins; otherwise the built-in list
    pub fn resolve_vocabulary(&self, model_path: Option<&Path>) -> LabelVocabulary {
        for path in self.config.vocabulary_candidates(model_path) {
            if !path.is_file() {
                continue;
            }

            match LabelVocabulary::from_file(&path) {
                Ok(vocabulary) => {
                    info!("Loaded {} class names from {}", vocabulary.len(), path.display());
                    return vocabulary;
                }
                Err(e) => {
                    warn!("{} is unusable ({}). Trying next candidate", path.display(), e);
                }
            }
        }

        info!("No class names file found; using built-in class list");
        LabelVocabulary::builtin_default()
    }
}
