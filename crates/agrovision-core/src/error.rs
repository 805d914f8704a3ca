//! Error types for AgroVision

/// Result type alias using AgroVision's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for AgroVision operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No model artifact was resolved at startup
    #[error("model unavailable: no trained classifier was resolved")]
    ModelUnavailable,

    /// Image could not be decoded or resized
    #[error("preprocessing error: {0}")]
    Preprocessing(String),

    /// The forward pass failed inside the numeric backend
    #[error("inference error: {0}")]
    Inference(String),

    /// Label vocabulary file could not be used
    #[error("vocabulary error: {0}")]
    Vocabulary(String),

    /// Model artifact could not be loaded
    #[error("model load error: {0}")]
    ModelLoad(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller-side deadline expired before the forward pass finished
    #[error("operation timed out")]
    Timeout,

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new preprocessing error
    pub fn preprocessing(msg: impl Into<String>) -> Self {
        Self::Preprocessing(msg.into())
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new vocabulary error
    pub fn vocabulary(msg: impl Into<String>) -> Self {
        Self::Vocabulary(msg.into())
    }

    /// Create a new model load error
    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short, stable name of the error kind (used as a metrics label)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModelUnavailable => "model_unavailable",
            Self::Preprocessing(_) => "preprocessing",
            Self::Inference(_) => "inference",
            Self::Vocabulary(_) => "vocabulary",
            Self::ModelLoad(_) => "model_load",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Timeout => "timeout",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the caller can fix the failure by supplying a different image
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::Preprocessing(_))
    }
}
