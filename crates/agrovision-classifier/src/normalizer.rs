//! Output normalization
//!
//! Turns raw model output into a [`ClassificationResult`]. The model head
//! shape is fixed when the engine is built ([`OutputHead`]); each head has its
//! own decision function, and the low-confidence policy runs last.

use crate::vocabulary::{placeholder_label, LabelVocabulary, VocabularyFit};
use agrovision_core::{
    AmbiguityReason, ClassificationMetadata, ClassificationResult, Error, Result, Verdict,
    UNKNOWN_CONFIDENCE_THRESHOLD, UNKNOWN_LABEL,
};
use candle_core::{DType, Tensor};

/// Shape of the model's final layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputHead {
    /// One sigmoid unit: probability of the second label
    Binary,
    /// Softmax over `n` classes
    MultiClass(usize),
}

impl OutputHead {
    /// Head for a declared output width. Zero has no head.
    pub fn from_output_dim(dim: usize) -> Option<Self> {
        match dim {
            0 => None,
            1 => Some(Self::Binary),
            n => Some(Self::MultiClass(n)),
        }
    }

    /// Expected output vector length
    pub fn width(&self) -> usize {
        match self {
            Self::Binary => 1,
            Self::MultiClass(n) => *n,
        }
    }

    /// Fit a vocabulary to this head
    pub fn fit_vocabulary(&self, vocabulary: LabelVocabulary) -> (LabelVocabulary, VocabularyFit) {
        match self {
            Self::Binary => vocabulary.reconcile_binary(),
            Self::MultiClass(n) => vocabulary.reconcile(*n),
        }
    }
}

impl std::fmt::Display for OutputHead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binary => write!(f, "binary (sigmoid)"),
            Self::MultiClass(n) => write!(f, "multi-class ({} classes)", n),
        }
    }
}

/// First row of a model output, or why there is none
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    Row(Vec<f32>),
    Malformed(AmbiguityReason),
}

impl RawOutput {
    /// Read the first batch row.
    ///
    /// Rank 1 is taken as a single row. Shape problems are reported as
    /// [`RawOutput::Malformed`]; only tensor conversion failures are errors.
    pub fn from_tensor(output: Option<&Tensor>) -> Result<Self> {
        let Some(output) = output else {
            return Ok(Self::Malformed(AmbiguityReason::MissingOutput));
        };

        let row = match output.dims() {
            [_] => output.clone(),
            [0, _] => return Ok(Self::Malformed(AmbiguityReason::EmptyOutput)),
            [_, _] => output
                .get(0)
                .map_err(|e| Error::inference(format!("Failed to read output row: {}", e)))?,
            dims => {
                return Ok(Self::Malformed(AmbiguityReason::UnexpectedRank { rank: dims.len() }))
            }
        };

        let values = row
            .to_dtype(DType::F32)
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| Error::inference(format!("Failed to convert output: {}", e)))?;

        if values.is_empty() {
            return Ok(Self::Malformed(AmbiguityReason::EmptyOutput));
        }

        Ok(Self::Row(values))
    }
}

/// Normalize one output row into a final result
pub fn normalize(
    head: OutputHead,
    output: &RawOutput,
    vocabulary: &LabelVocabulary,
    top_k: usize,
) -> ClassificationResult {
    let row = match output {
        RawOutput::Row(row) => row,
        RawOutput::Malformed(reason) => return ClassificationResult::ambiguous(reason.clone()),
    };

    if row.len() != head.width() {
        return ClassificationResult::ambiguous(AmbiguityReason::HeadMismatch {
            expected: head.width(),
            found: row.len(),
        });
    }

    if row.iter().any(|v| !v.is_finite()) {
        return ClassificationResult::ambiguous(AmbiguityReason::NonFinite);
    }

    let candidate = match head {
        OutputHead::Binary => decide_binary(row[0], vocabulary, top_k),
        OutputHead::MultiClass(_) => decide_multiclass(row, vocabulary, top_k),
    };

    apply_confidence_threshold(candidate)
}

/// Decide a sigmoid score: `s > 0.5` picks the second label with confidence
/// `s`, otherwise the first label with confidence `1 - s`.
pub fn decide_binary(score: f32, vocabulary: &LabelVocabulary, top_k: usize) -> ClassificationResult {
    if vocabulary.len() < 2 {
        return ClassificationResult::ambiguous(AmbiguityReason::InsufficientLabels {
            found: vocabulary.len(),
        });
    }

    let score = score.clamp(0.0, 1.0);
    let (index, confidence) = if score > 0.5 { (1, score) } else { (0, 1.0 - score) };

    let other = if index == 1 { 0 } else { 1 };
    let mut ranked = vec![(index, confidence), (other, 1.0 - confidence)];
    ranked.truncate(top_k);

    ClassificationResult::new(vocabulary.labels()[index].clone(), confidence, index)
        .with_metadata(ClassificationMetadata {
            model: None,
            top_scores: label_scores(&ranked, vocabulary),
        })
}

/// Decide a probability vector by argmax (lowest index wins ties)
pub fn decide_multiclass(
    probabilities: &[f32],
    vocabulary: &LabelVocabulary,
    top_k: usize,
) -> ClassificationResult {
    let Some((index, confidence)) = argmax(probabilities) else {
        return ClassificationResult::ambiguous(AmbiguityReason::EmptyOutput);
    };
    let confidence = confidence.clamp(0.0, 1.0);

    let metadata = ClassificationMetadata {
        model: None,
        top_scores: label_scores(&top_indices(probabilities, top_k), vocabulary),
    };

    match vocabulary.get(index) {
        Some(label) => ClassificationResult::new(label, confidence, index).with_metadata(metadata),
        None => ClassificationResult {
            label: UNKNOWN_LABEL.to_string(),
            confidence,
            class_index: Some(index),
            verdict: Verdict::Ambiguous(AmbiguityReason::IndexOutOfVocabulary {
                index,
                len: vocabulary.len(),
            }),
            metadata,
        },
    }
}

/// Replace the label of a confident-looking but weak result with `Unknown`.
/// The confidence value is kept.
pub fn apply_confidence_threshold(mut result: ClassificationResult) -> ClassificationResult {
    if result.verdict == Verdict::Confident && result.confidence < UNKNOWN_CONFIDENCE_THRESHOLD {
        result.label = UNKNOWN_LABEL.to_string();
        result.verdict = Verdict::LowConfidence;
    }
    result
}

/// Index and value of the maximum; the first maximum wins ties
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in values.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((index, value)),
        }
    }
    best
}

/// The `k` highest values, best first, ties in index order
fn top_indices(values: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.truncate(k);
    indexed
}

fn label_scores(ranked: &[(usize, f32)], vocabulary: &LabelVocabulary) -> Vec<(String, f32)> {
    ranked
        .iter()
        .map(|&(index, score)| {
            let label = vocabulary
                .get(index)
                .map(str::to_string)
                .unwrap_or_else(|| placeholder_label(index));
            (label, score)
        })
        .collect()
}
