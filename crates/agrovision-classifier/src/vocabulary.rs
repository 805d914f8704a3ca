//! Label vocabulary loading and reconciliation
//!
//! A label file is JSON in one of three shapes:
//! - a list: `["Healthy", "Blighted"]`
//! - label to index: `{"Healthy": 0, "Blighted": 1}`
//! - string index to label: `{"0": "Healthy", "1": "Blighted"}`
//!
//! All three resolve to the same ordered list.

use agrovision_core::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Labels used when no label file is found
pub const DEFAULT_CLASS_NAMES: [&str; 22] = [
    "Corn_Blight",
    "Corn_Common_Rust",
    "Corn_Gray_Leaf_Spot",
    "Corn_Healthy",
    "Cucumber_Downy_mildew",
    "Cucumber_Healthy_leaves",
    "Cucumber_Powdery_mildew",
    "Potato___Early_blight",
    "Potato___Late_blight",
    "Potato___healthy",
    "Tomato_Bacterial_spot",
    "Tomato_Early_blight",
    "Tomato_Late_blight",
    "Tomato_Leaf_Mold",
    "Tomato_Septoria_leaf_spot",
    "Tomato_Spider_mites_Two_spotted_spider_mite",
    "Tomato__Target_Spot",
    "Tomato__Tomato_YellowLeaf__Curl_Virus",
    "Tomato__Tomato_mosaic_virus",
    "Tomato_healthy",
    "Wheat_Healthy",
    "Wheat_diseased",
];

/// Positional stand-in for output index `i`
pub fn placeholder_label(index: usize) -> String {
    format!("Class_{}", index)
}

/// Where a vocabulary came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VocabularySource {
    /// Parsed from a label file
    File(PathBuf),
    /// Compiled-in default list
    BuiltinDefault,
    /// Generated `Class_<i>` labels
    Placeholder,
}

/// How well the vocabulary matched the model head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VocabularyFit {
    /// Label count equals what the head needs
    Matched,
    /// Labels did not fit; placeholders are in use
    Placeholder { expected: usize, found: usize },
    /// Count differs but the labels are kept as-is
    Mismatched { expected: usize, found: usize },
}

/// Ordered class labels; position `i` names model output `i`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVocabulary {
    labels: Vec<String>,
    source: VocabularySource,
}

/// Accepted JSON shapes. Variant order matters for untagged matching.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawVocabulary {
    List(Vec<String>),
    IndexToLabel(BTreeMap<String, String>),
    LabelToIndex(BTreeMap<String, i64>),
}

impl LabelVocabulary {
    /// Create a vocabulary from labels
    pub fn new(labels: Vec<String>, source: VocabularySource) -> Self {
        Self { labels, source }
    }

    /// The compiled-in crop disease list
    pub fn builtin_default() -> Self {
        Self::new(
            DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            VocabularySource::BuiltinDefault,
        )
    }

    /// `Class_0 .. Class_{n-1}`
    pub fn placeholders(n: usize) -> Self {
        Self::new((0..n).map(placeholder_label).collect(), VocabularySource::Placeholder)
    }

    /// Parse a JSON label document in any accepted shape
    pub fn from_json(json: &str, source: VocabularySource) -> Result<Self> {
        let raw: RawVocabulary = serde_json::from_str(json).map_err(|e| {
            Error::vocabulary(format!("not a label list or label/index mapping: {}", e))
        })?;

        let labels = match raw {
            RawVocabulary::List(labels) => labels,
            RawVocabulary::IndexToLabel(map) => index_to_label(map)?,
            RawVocabulary::LabelToIndex(map) => label_to_index(map)?,
        };

        if labels.is_empty() {
            return Err(Error::vocabulary("label file is empty"));
        }

        Ok(Self::new(labels, source))
    }

    /// Read and parse a label file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content, VocabularySource::File(path.to_path_buf()))
    }

    /// Fit the vocabulary to a model that needs `expected` labels.
    ///
    /// A mismatch is not an error: the labels are replaced with placeholders
    /// so every output index still has a name.
    pub fn reconcile(self, expected: usize) -> (Self, VocabularyFit) {
        if self.labels.len() == expected {
            return (self, VocabularyFit::Matched);
        }

        warn!(
            "Vocabulary length ({}) does not match model outputs ({}); using placeholder labels",
            self.labels.len(),
            expected
        );
        let found = self.labels.len();
        (Self::placeholders(expected), VocabularyFit::Placeholder { expected, found })
    }

    /// Fit the vocabulary to a binary head.
    ///
    /// The head only ever addresses indices 0 and 1, so any vocabulary is
    /// kept. Extra labels are ignored; fewer than two leave the head unable
    /// to decide, which normalization reports as ambiguous.
    pub fn reconcile_binary(self) -> (Self, VocabularyFit) {
        let found = self.labels.len();
        if found == 2 {
            return (self, VocabularyFit::Matched);
        }

        if found > 2 {
            warn!(
                "Binary model but vocabulary has {} labels; using the first two ({:?}, {:?})",
                found, self.labels[0], self.labels[1]
            );
        } else {
            warn!(
                "Binary model needs 2 labels but vocabulary has {}; predictions will be Unknown",
                found
            );
        }
        (self, VocabularyFit::Mismatched { expected: 2, found })
    }

    /// Label at an output index
    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// All labels in index order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True if there are no labels
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Where the labels came from
    pub fn source(&self) -> &VocabularySource {
        &self.source
    }
}

fn index_to_label(map: BTreeMap<String, String>) -> Result<Vec<String>> {
    let mut entries = map
        .into_iter()
        .map(|(key, label)| {
            key.trim()
                .parse::<u64>()
                .map(|index| (index, label))
                .map_err(|_| Error::vocabulary(format!("label key '{}' is not an integer index", key)))
        })
        .collect::<Result<Vec<_>>>()?;

    // BTreeMap order is lexicographic ("10" < "2"); re-sort numerically.
    entries.sort_by_key(|(index, _)| *index);
    check_duplicates(entries.iter().map(|(index, _)| *index))?;
    warn_on_gaps(entries.iter().map(|(index, _)| *index));

    Ok(entries.into_iter().map(|(_, label)| label).collect())
}

fn label_to_index(map: BTreeMap<String, i64>) -> Result<Vec<String>> {
    let mut entries = map
        .into_iter()
        .map(|(label, index)| {
            u64::try_from(index)
                .map(|index| (index, label))
                .map_err(|_| Error::vocabulary(format!("negative index {} for label", index)))
        })
        .collect::<Result<Vec<_>>>()?;

    entries.sort_by_key(|(index, _)| *index);
    check_duplicates(entries.iter().map(|(index, _)| *index))?;
    warn_on_gaps(entries.iter().map(|(index, _)| *index));

    Ok(entries.into_iter().map(|(_, label)| label).collect())
}

fn check_duplicates(sorted: impl Iterator<Item = u64>) -> Result<()> {
    let mut previous = None;
    for index in sorted {
        if previous == Some(index) {
            return Err(Error::vocabulary(format!("index {} assigned to more than one label", index)));
        }
        previous = Some(index);
    }
    Ok(())
}

fn warn_on_gaps(sorted: impl Iterator<Item = u64>) {
    if sorted.enumerate().any(|(pos, index)| pos as u64 != index) {
        warn!("Label indices are not contiguous from 0; labels are ordered by index only");
    }
}
