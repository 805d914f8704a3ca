//! Startup configuration for artifact resolution

use crate::backend::DeviceType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where to look for the trained classifier and its labels.
///
/// Read once at startup; the engine never consults it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Candidate directories, highest priority first
    #[serde(default = "default_model_dirs")]
    pub model_dirs: Vec<PathBuf>,

    /// Candidate model filenames, tried in every directory in this order
    #[serde(default = "default_model_filenames")]
    pub model_filenames: Vec<String>,

    /// Name of the sidecar label file
    #[serde(default = "default_vocabulary_filename")]
    pub vocabulary_filename: String,

    /// Device to run inference on
    #[serde(default)]
    pub device: DeviceSpec,

    /// Number of ranked scores kept in result metadata
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// Device specification (for config files)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSpec {
    #[default]
    Cpu,
    Cuda { index: Option<usize> },
    Metal { index: Option<usize> },
}

impl DeviceSpec {
    /// Convert to DeviceType
    pub fn to_device_type(&self) -> DeviceType {
        match self {
            DeviceSpec::Cpu => DeviceType::Cpu,
            DeviceSpec::Cuda { index } => DeviceType::Cuda(index.unwrap_or(0)),
            DeviceSpec::Metal { index } => DeviceType::Metal(index.unwrap_or(0)),
        }
    }
}

fn default_model_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("model"), PathBuf::from("models")]
}

fn default_model_filenames() -> Vec<String> {
    vec![
        "agrovision_final.onnx".to_string(),
        "agrovision_best.onnx".to_string(),
        "agrovision.onnx".to_string(),
    ]
}

fn default_vocabulary_filename() -> String {
    "class_names.json".to_string()
}

fn default_top_k() -> usize {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_dirs: default_model_dirs(),
            model_filenames: default_model_filenames(),
            vocabulary_filename: default_vocabulary_filename(),
            device: DeviceSpec::default(),
            top_k: default_top_k(),
        }
    }
}

impl EngineConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> agrovision_core::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| {
            agrovision_core::Error::config(format!("Invalid config {}: {}", path.display(), e))
        })
    }

    /// Put a directory ahead of all configured candidates
    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dirs.insert(0, dir.into());
        self
    }

    /// Set device
    pub fn with_device(mut self, device: DeviceSpec) -> Self {
        self.device = device;
        self
    }

    /// Model paths in resolution order: directories outer, filenames inner
    pub fn model_candidates(&self) -> Vec<PathBuf> {
        self.model_dirs
            .iter()
            .flat_map(|dir| self.model_filenames.iter().map(move |name| dir.join(name)))
            .collect()
    }

    /// Label file paths in resolution order: the model's own directory, then
    /// every candidate directory. Duplicates are dropped.
    pub fn vocabulary_candidates(&self, model_path: Option<&Path>) -> Vec<PathBuf> {
        let model_dir = model_path.and_then(Path::parent);

        let mut candidates: Vec<PathBuf> = Vec::new();
        for dir in model_dir.into_iter().chain(self.model_dirs.iter().map(PathBuf::as_path)) {
            let path = dir.join(&self.vocabulary_filename);
            if !candidates.contains(&path) {
                candidates.push(path);
            }
        }
        candidates
    }
}
