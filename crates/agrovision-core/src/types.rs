//! Classification result types

use serde::Serialize;
use std::fmt;

/// Reserved label for inputs that could not be confidently classified
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Results below this confidence are reported with [`UNKNOWN_LABEL`]
pub const UNKNOWN_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Result of classifying one image
///
/// Confidence is always on the 0.0–1.0 scale. Percentage rendering belongs
/// to the presentation layer, see [`ClassificationResult::confidence_percent`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    /// Vocabulary label, or [`UNKNOWN_LABEL`]
    pub label: String,

    /// Probability mass of the winning class (0.0-1.0)
    pub confidence: f32,

    /// Winning output index, when the output could be decided at all
    pub class_index: Option<usize>,

    /// How the label was reached
    pub verdict: Verdict,

    /// Additional metadata
    pub metadata: ClassificationMetadata,
}

impl ClassificationResult {
    /// Create a confident result for the given label
    pub fn new(label: impl Into<String>, confidence: f32, class_index: usize) -> Self {
        Self {
            label: label.into(),
            confidence,
            class_index: Some(class_index),
            verdict: Verdict::Confident,
            metadata: ClassificationMetadata::default(),
        }
    }

    /// Result for output that could not be mapped onto the vocabulary
    pub fn ambiguous(reason: AmbiguityReason) -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            confidence: 0.0,
            class_index: None,
            verdict: Verdict::Ambiguous(reason),
            metadata: ClassificationMetadata::default(),
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: ClassificationMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// True when the label is the `Unknown` sentinel
    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }

    /// Confidence as a percentage rounded to two decimals
    pub fn confidence_percent(&self) -> f32 {
        (self.confidence * 100.0 * 100.0).round() / 100.0
    }
}

impl fmt::Display for ClassificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2}%)", self.label, self.confidence_percent())
    }
}

/// Outcome state behind a [`ClassificationResult`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Label is a vocabulary entry at or above the confidence threshold
    Confident,
    /// A class won but below the threshold; label replaced with `Unknown`
    LowConfidence,
    /// Output could not be interpreted against the vocabulary
    Ambiguous(AmbiguityReason),
}

/// Why a model output could not be decided
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityReason {
    /// Backend produced no output tensor
    MissingOutput,
    /// Output tensor rank was not 1 or 2
    UnexpectedRank { rank: usize },
    /// Output had zero rows or zero columns
    EmptyOutput,
    /// Output width does not match the model's declared head
    HeadMismatch { expected: usize, found: usize },
    /// Output contained NaN or infinite values
    NonFinite,
    /// Binary head needs two labels
    InsufficientLabels { found: usize },
    /// Winning index has no vocabulary entry
    IndexOutOfVocabulary { index: usize, len: usize },
}

impl fmt::Display for AmbiguityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingOutput => write!(f, "model returned no output"),
            Self::UnexpectedRank { rank } => write!(f, "unexpected output rank {}", rank),
            Self::EmptyOutput => write!(f, "model output is empty"),
            Self::HeadMismatch { expected, found } => {
                write!(f, "expected {} outputs, got {}", expected, found)
            }
            Self::NonFinite => write!(f, "model output is not finite"),
            Self::InsufficientLabels { found } => {
                write!(f, "binary head needs 2 labels, vocabulary has {}", found)
            }
            Self::IndexOutOfVocabulary { index, len } => {
                write!(f, "class index {} outside vocabulary of {}", index, len)
            }
        }
    }
}

/// Metadata about classification
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassificationMetadata {
    /// Model name or artifact file stem
    pub model: Option<String>,

    /// Highest-scoring classes, best first
    pub top_scores: Vec<(String, f32)>,
}
