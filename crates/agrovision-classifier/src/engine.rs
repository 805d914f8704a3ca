//! The classification engine
//!
//! Built once at startup from a [`Resolution`] and shared behind an `Arc`.
//! Everything it holds is immutable; tests construct it directly with fake
//! backends.

use crate::backend::ModelBackend;
use crate::normalizer::{normalize, OutputHead, RawOutput};
use crate::preprocess;
use crate::resolver::{ModelArtifact, Resolution};
use crate::vocabulary::{LabelVocabulary, VocabularyFit};
use agrovision_core::{ClassificationResult, Error, Result, Verdict};
use candle_core::Tensor;
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[cfg(feature = "onnx")]
use crate::config::EngineConfig;
#[cfg(feature = "onnx")]
use crate::resolver::{ArtifactResolver, OnnxLoader};

/// Model plus the head shape fixed at load time
struct LoadedModel {
    artifact: ModelArtifact,
    head: OutputHead,
}

/// Leaf image classifier
pub struct ClassifierEngine {
    model: Option<LoadedModel>,
    vocabulary: LabelVocabulary,
    fit: Option<VocabularyFit>,
    top_k: usize,
}

impl ClassifierEngine {
    /// Build an engine from a resolved model and vocabulary.
    ///
    /// A model that does not declare a usable output width is dropped and
    /// the engine starts disabled.
    pub fn new(model: Option<ModelArtifact>, vocabulary: LabelVocabulary, top_k: usize) -> Self {
        let model = model.and_then(|artifact| {
            match artifact.handle.output_dim().and_then(OutputHead::from_output_dim) {
                Some(head) => Some(LoadedModel { artifact, head }),
                None => {
                    warn!(
                        "Model at {} has no usable output dimension; image prediction is disabled",
                        artifact.path.display()
                    );
                    None
                }
            }
        });

        match model {
            Some(loaded) => {
                let (vocabulary, fit) = loaded.head.fit_vocabulary(vocabulary);
                debug!("Engine ready: {} head, {} labels", loaded.head, vocabulary.len());
                Self {
                    model: Some(loaded),
                    vocabulary,
                    fit: Some(fit),
                    top_k,
                }
            }
            None => Self {
                model: None,
                vocabulary,
                fit: None,
                top_k,
            },
        }
    }

    /// Build from the result of [`ArtifactResolver::resolve`]
    pub fn from_resolution(resolution: Resolution, top_k: usize) -> Self {
        Self::new(resolution.model, resolution.vocabulary, top_k)
    }

    /// Resolve ONNX artifacts from the configured candidates and build an
    /// engine. Never fails; see [`ClassifierEngine::is_enabled`].
    #[cfg(feature = "onnx")]
    pub fn from_config(config: &EngineConfig) -> Self {
        let loader = OnnxLoader::new(config.device.to_device_type());
        let resolution = ArtifactResolver::new(config, &loader).resolve();
        Self::from_resolution(resolution, config.top_k)
    }

    /// Engine with inference disabled
    pub fn disabled(vocabulary: LabelVocabulary) -> Self {
        Self::new(None, vocabulary, 0)
    }

    /// True when a model is loaded
    pub fn is_enabled(&self) -> bool {
        self.model.is_some()
    }

    /// Head shape of the loaded model
    pub fn head(&self) -> Option<OutputHead> {
        self.model.as_ref().map(|m| m.head)
    }

    /// Path of the loaded model
    pub fn model_path(&self) -> Option<&Path> {
        self.model.as_ref().map(|m| m.artifact.path.as_path())
    }

    /// Vocabulary in use (after reconciliation when a model is loaded)
    pub fn vocabulary(&self) -> &LabelVocabulary {
        &self.vocabulary
    }

    /// How the vocabulary matched the model; `None` when disabled
    pub fn vocabulary_fit(&self) -> Option<VocabularyFit> {
        self.fit
    }

    /// Classify encoded image bytes
    pub fn classify_bytes(&self, bytes: &[u8]) -> Result<ClassificationResult> {
        record(self.run_bytes(bytes))
    }

    /// Classify an image file
    pub fn classify_path(&self, path: impl AsRef<Path>) -> Result<ClassificationResult> {
        let path = path.as_ref();
        record(self.loaded().and_then(|_| {
            let bytes = std::fs::read(path)?;
            self.run_bytes(&bytes)
        }))
    }

    /// Classify an already decoded image
    pub fn classify_image(&self, image: &DynamicImage) -> Result<ClassificationResult> {
        record(self.loaded().and_then(|model| {
            let input = preprocess::to_input_tensor(image, model.artifact.handle.device())?;
            self.run_tensor(model, &input)
        }))
    }

    /// Classify an already preprocessed `[1, 224, 224, 3]` batch
    pub fn classify_tensor(&self, input: &Tensor) -> Result<ClassificationResult> {
        record(self.loaded().and_then(|model| self.run_tensor(model, input)))
    }

    /// Classify on the blocking pool with a caller-side deadline.
    ///
    /// On timeout the forward pass is abandoned, not cancelled: it finishes
    /// in the background and its result is dropped.
    pub async fn classify_with_timeout(
        self: &Arc<Self>,
        bytes: Vec<u8>,
        timeout: Duration,
    ) -> Result<ClassificationResult> {
        if !self.is_enabled() {
            return record(Err(Error::ModelUnavailable));
        }

        let engine = Arc::clone(self);
        let task = tokio::task::spawn_blocking(move || engine.run_bytes(&bytes));

        let result = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::internal(format!("Classification task failed: {}", e))),
            Err(_) => {
                warn!("Classification exceeded {:?}; abandoning", timeout);
                Err(Error::Timeout)
            }
        };
        record(result)
    }

    fn loaded(&self) -> Result<&LoadedModel> {
        self.model.as_ref().ok_or(Error::ModelUnavailable)
    }

    fn run_bytes(&self, bytes: &[u8]) -> Result<ClassificationResult> {
        let model = self.loaded()?;
        let input = preprocess::preprocess_bytes(bytes, model.artifact.handle.device())?;
        self.run_tensor(model, &input)
    }

    fn run_tensor(&self, model: &LoadedModel, input: &Tensor) -> Result<ClassificationResult> {
        let backend: &dyn ModelBackend = model.artifact.handle.as_ref();

        let start = Instant::now();
        let output = backend.forward(input)?;
        metrics::histogram!("agrovision_inference_latency_us")
            .record(start.elapsed().as_micros() as f64);

        let raw = RawOutput::from_tensor(output.as_ref())?;
        let mut result = normalize(model.head, &raw, &self.vocabulary, self.top_k);

        if let Verdict::Ambiguous(reason) = &result.verdict {
            warn!("Model output could not be classified: {}", reason);
        }

        result.metadata.model = Some(backend.name().to_string());
        Ok(result)
    }
}

/// Count the outcome of one request
fn record(result: Result<ClassificationResult>) -> Result<ClassificationResult> {
    match &result {
        Ok(r) => {
            let verdict = match r.verdict {
                Verdict::Confident => "confident",
                Verdict::LowConfidence => "low_confidence",
                Verdict::Ambiguous(_) => "ambiguous",
            };
            metrics::counter!("agrovision_classifications_total", "verdict" => verdict).increment(1);
        }
        Err(e) => {
            metrics::counter!("agrovision_classification_errors_total", "kind" => e.kind()).increment(1);
        }
    }
    result
}
