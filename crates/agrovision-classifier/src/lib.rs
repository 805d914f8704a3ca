//! AgroVision Classifier
//!
//! Model resolution and inference normalization for leaf disease images.
//!
//! Startup and request paths are split:
//! - Startup: [`ArtifactResolver`] walks the candidate directories, loads the
//!   first usable model and label file, and the result is frozen into a
//!   [`ClassifierEngine`].
//! - Request: the engine decodes and preprocesses the image, runs one forward
//!   pass, and normalizes binary or multi-class output into a
//!   [`ClassificationResult`](agrovision_core::ClassificationResult).
//!
//! Missing artifacts never crash the process; the engine simply reports
//! `ModelUnavailable` per request.

pub mod backend;
pub mod config;
pub mod engine;
pub mod normalizer;
pub mod preprocess;
pub mod resolver;
pub mod vocabulary;

pub use backend::{create_device, DeviceType, ModelBackend};
#[cfg(feature = "onnx")]
pub use backend::OnnxBackend;
pub use config::{DeviceSpec, EngineConfig};
pub use engine::ClassifierEngine;
pub use normalizer::{OutputHead, RawOutput};
pub use resolver::{ArtifactLoader, ArtifactResolver, AttemptOutcome, LoadAttempt, ModelArtifact, Resolution};
#[cfg(feature = "onnx")]
pub use resolver::OnnxLoader;
pub use vocabulary::{LabelVocabulary, VocabularyFit, VocabularySource, DEFAULT_CLASS_NAMES};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::engine::ClassifierEngine;
    pub use crate::vocabulary::LabelVocabulary;
    pub use agrovision_core::{ClassificationResult, Error, Result, Verdict};
}
