//! AgroVision Core
//!
//! Types shared by the AgroVision classifier engine and its front ends.
//!
//! This crate provides:
//! - The classification result value and its verdict states
//! - Error types and result handling

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    AmbiguityReason, ClassificationMetadata, ClassificationResult, Verdict,
    UNKNOWN_CONFIDENCE_THRESHOLD, UNKNOWN_LABEL,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{ClassificationResult, Verdict, UNKNOWN_LABEL};
}
