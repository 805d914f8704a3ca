//! Engine scenario tests
//!
//! Drives the full request path (decode, preprocess, forward, normalize)
//! against mock backends with scripted outputs.

use agrovision_classifier::normalizer::{argmax, normalize, OutputHead, RawOutput};
use agrovision_classifier::{
    ClassifierEngine, LabelVocabulary, ModelArtifact, ModelBackend, VocabularySource,
};
use agrovision_core::{Error, Result, Verdict, UNKNOWN_LABEL};
use candle_core::{Device, Tensor};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use proptest::prelude::*;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Mock backend returning a fixed output row
struct MockBackend {
    output: Vec<f32>,
    call_count: AtomicU32,
    device: Device,
}

impl MockBackend {
    fn new(output: &[f32]) -> Self {
        Self {
            output: output.to_vec(),
            call_count: AtomicU32::new(0),
            device: Device::Cpu,
        }
    }

    fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

impl ModelBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn output_dim(&self) -> Option<usize> {
        Some(self.output.len())
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn forward(&self, _input: &Tensor) -> Result<Option<Tensor>> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        Tensor::new(self.output.as_slice(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map(Some)
            .map_err(|e| Error::inference(e.to_string()))
    }
}

/// Mock backend whose forward pass always fails
struct FailingBackend {
    device: Device,
}

impl ModelBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    fn output_dim(&self) -> Option<usize> {
        Some(4)
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn forward(&self, _input: &Tensor) -> Result<Option<Tensor>> {
        Err(Error::inference("numeric backend error"))
    }
}

/// Mock backend that declares one width but returns another
struct ShapeShiftingBackend {
    device: Device,
}

impl ModelBackend for ShapeShiftingBackend {
    fn name(&self) -> &str {
        "shape-shifting"
    }

    fn output_dim(&self) -> Option<usize> {
        Some(4)
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn forward(&self, _input: &Tensor) -> Result<Option<Tensor>> {
        Tensor::new(&[[0.2f32, 0.8]], &self.device)
            .map(Some)
            .map_err(|e| Error::inference(e.to_string()))
    }
}

fn engine_with(backend: Arc<dyn ModelBackend>, labels: &[&str]) -> ClassifierEngine {
    let artifact = ModelArtifact {
        path: PathBuf::from("models/agrovision_final.onnx"),
        handle: backend,
    };
    ClassifierEngine::new(Some(artifact), vocab(labels), 3)
}

fn vocab(labels: &[&str]) -> LabelVocabulary {
    LabelVocabulary::new(
        labels.iter().map(|s| s.to_string()).collect(),
        VocabularySource::BuiltinDefault,
    )
}

fn leaf_png() -> Vec<u8> {
    let img = RgbImage::from_fn(320, 240, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 64]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

#[test]
fn test_scenario_binary_blighted() {
    let engine = engine_with(Arc::new(MockBackend::new(&[0.82])), &["Healthy", "Blighted"]);

    let result = engine.classify_bytes(&leaf_png()).unwrap();
    assert_eq!(result.label, "Blighted");
    assert_eq!(result.confidence, 0.82);
    assert_eq!(result.verdict, Verdict::Confident);
}

#[test]
fn test_scenario_binary_healthy() {
    let engine = engine_with(Arc::new(MockBackend::new(&[0.40])), &["Healthy", "Blighted"]);

    let result = engine.classify_bytes(&leaf_png()).unwrap();
    assert_eq!(result.label, "Healthy");
    assert!((result.confidence - 0.6).abs() < 1e-6);
}

#[test]
fn test_scenario_binary_threshold_boundary() {
    let engine = engine_with(Arc::new(MockBackend::new(&[0.49])), &["Healthy", "Blighted"]);

    let result = engine.classify_bytes(&leaf_png()).unwrap();
    assert_eq!(result.label, "Healthy");
    assert!((result.confidence - 0.51).abs() < 1e-6);
    assert_eq!(result.verdict, Verdict::Confident);
}

#[test]
fn test_scenario_multiclass_low_confidence() {
    let engine = engine_with(
        Arc::new(MockBackend::new(&[0.1, 0.3, 0.2, 0.4])),
        &["Corn_Blight", "Corn_Common_Rust", "Corn_Gray_Leaf_Spot", "Corn_Healthy"],
    );

    let result = engine.classify_bytes(&leaf_png()).unwrap();
    assert_eq!(result.label, UNKNOWN_LABEL);
    assert_eq!(result.confidence, 0.4);
    assert_eq!(result.class_index, Some(3));
    assert_eq!(result.verdict, Verdict::LowConfidence);
}

#[cfg(feature = "onnx")]
#[test]
fn test_scenario_no_model_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = agrovision_classifier::EngineConfig {
        model_dirs: vec![dir.path().join("model"), dir.path().join("models")],
        ..Default::default()
    };

    let engine = ClassifierEngine::from_config(&config);
    assert!(!engine.is_enabled());
    assert_eq!(engine.vocabulary().source(), &VocabularySource::BuiltinDefault);

    let result = engine.classify_bytes(&leaf_png());
    assert!(matches!(result, Err(Error::ModelUnavailable)));
}

#[test]
fn test_inference_failure_is_returned() {
    let engine = engine_with(Arc::new(FailingBackend { device: Device::Cpu }), &["a", "b", "c", "d"]);

    let err = engine.classify_bytes(&leaf_png()).unwrap_err();
    assert!(matches!(err, Error::Inference(_)));
    assert!(!err.is_user_correctable());
}

#[test]
fn test_shape_mismatch_is_ambiguous() {
    let engine = engine_with(Arc::new(ShapeShiftingBackend { device: Device::Cpu }), &["a", "b", "c", "d"]);

    let result = engine.classify_bytes(&leaf_png()).unwrap();
    assert_eq!(result.label, UNKNOWN_LABEL);
    assert_eq!(result.confidence, 0.0);
    assert!(matches!(result.verdict, Verdict::Ambiguous(_)));
}

#[test]
fn test_same_image_same_result() {
    let backend = Arc::new(MockBackend::new(&[0.05, 0.7, 0.25]));
    let engine = engine_with(backend.clone(), &["Wheat_Healthy", "Wheat_diseased", "Corn_Healthy"]);
    let bytes = leaf_png();

    let first = engine.classify_bytes(&bytes).unwrap();
    let second = engine.classify_bytes(&bytes).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.confidence.to_bits(), second.confidence.to_bits());
    assert_eq!(backend.call_count(), 2);
}

#[test]
fn test_concurrent_requests_share_engine() {
    let backend = Arc::new(MockBackend::new(&[0.9]));
    let engine = Arc::new(engine_with(backend.clone(), &["Healthy", "Blighted"]));
    let bytes = Arc::new(leaf_png());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let bytes = Arc::clone(&bytes);
            std::thread::spawn(move || engine.classify_bytes(&bytes).unwrap())
        })
        .collect();

    for handle in handles {
        let result = handle.join().unwrap();
        assert_eq!(result.label, "Blighted");
    }
    assert_eq!(backend.call_count(), 8);
}

#[test]
fn test_label_file_shapes_classify_identically() {
    let dir = tempfile::tempdir().unwrap();
    let shapes = [
        r#"["Healthy", "Rust", "Blight"]"#,
        r#"{"Blight": 2, "Healthy": 0, "Rust": 1}"#,
        r#"{"2": "Blight", "0": "Healthy", "1": "Rust"}"#,
    ];

    let results: Vec<_> = shapes
        .iter()
        .enumerate()
        .map(|(i, json)| {
            let path = dir.path().join(format!("class_names_{}.json", i));
            std::fs::write(&path, json).unwrap();
            let vocabulary = LabelVocabulary::from_file(&path).unwrap();

            let artifact = ModelArtifact {
                path: PathBuf::from("models/agrovision_final.onnx"),
                handle: Arc::new(MockBackend::new(&[0.1, 0.15, 0.75])),
            };
            let engine = ClassifierEngine::new(Some(artifact), vocabulary, 3);
            engine.classify_bytes(&leaf_png()).unwrap()
        })
        .collect();

    assert_eq!(results[0].label, "Blight");
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], results[2]);
}

proptest! {
    #[test]
    fn prop_binary_decision(score in 0.0f32..=1.0) {
        let labels = vocab(&["Healthy", "Blighted"]);
        let result = normalize(OutputHead::Binary, &RawOutput::Row(vec![score]), &labels, 3);

        let (expected_label, expected_confidence) = if score > 0.5 {
            ("Blighted", score)
        } else {
            ("Healthy", 1.0 - score)
        };

        prop_assert_eq!(result.confidence, expected_confidence);
        if expected_confidence < 0.5 {
            prop_assert_eq!(result.label.as_str(), UNKNOWN_LABEL);
        } else {
            prop_assert_eq!(result.label.as_str(), expected_label);
        }
    }

    #[test]
    fn prop_multiclass_picks_first_maximum(probs in prop::collection::vec(0.0f32..=1.0, 2..24)) {
        let labels = LabelVocabulary::placeholders(probs.len());
        let result = normalize(OutputHead::MultiClass(probs.len()), &RawOutput::Row(probs.clone()), &labels, 3);

        let max = probs.iter().copied().fold(f32::MIN, f32::max);
        let first_max = probs.iter().position(|&p| p == max).unwrap();

        prop_assert_eq!(result.confidence, max);
        prop_assert_eq!(result.class_index, Some(first_max));
        prop_assert_eq!(argmax(&probs), Some((first_max, max)));
    }

    #[test]
    fn prop_low_confidence_is_unknown(probs in prop::collection::vec(0.0f32..=1.0, 2..24)) {
        let labels = LabelVocabulary::placeholders(probs.len());
        let result = normalize(OutputHead::MultiClass(probs.len()), &RawOutput::Row(probs.clone()), &labels, 3);

        if result.confidence < 0.5 {
            prop_assert_eq!(result.label.as_str(), UNKNOWN_LABEL);
            prop_assert_eq!(result.verdict, Verdict::LowConfidence);
        } else {
            prop_assert_ne!(result.label.as_str(), UNKNOWN_LABEL);
        }
    }
}
