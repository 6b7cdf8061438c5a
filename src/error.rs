//! Error types for photo operations

use thiserror::Error;

/// Result type alias for photo operations
pub type Result<T> = std::result::Result<T, PhotoOpsError>;

/// Error taxonomy shared by every pipeline component.
///
/// Component failures bubble up as these typed values; the dispatcher and the
/// channel boundary map them to `(code, message)` pairs via [`PhotoOpsError::code`].
#[derive(Error, Debug)]
pub enum PhotoOpsError {
    /// Bad or missing request fields, rejected before any I/O
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation name the dispatcher does not know
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Model asset missing, never loaded, or already released
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Model asset present but malformed or incompatible with the interpreter
    #[error("Model load failed: {0}")]
    ModelLoadFailed(String),

    /// Source image unreadable
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// Destination write failure
    #[error("Save failed: {0}")]
    SaveFailed(String),

    /// Interpreter invocation errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Tensor layout, mask, or buffer shape errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors outside of decode/save
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PhotoOpsError {
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn unknown_operation<S: Into<String>>(name: S) -> Self {
        Self::UnknownOperation(name.into())
    }

    pub fn model_not_found<S: Into<String>>(msg: S) -> Self {
        Self::ModelNotFound(msg.into())
    }

    pub fn model_load_failed<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoadFailed(msg.into())
    }

    pub fn decode_failed<S: Into<String>>(msg: S) -> Self {
        Self::DecodeFailed(msg.into())
    }

    pub fn save_failed<S: Into<String>>(msg: S) -> Self {
        Self::SaveFailed(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Boundary code reported alongside the message
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::UnknownOperation(_) => "NOT_IMPLEMENTED",
            Self::ModelNotFound(_) => "MODEL_NOT_FOUND",
            Self::ModelLoadFailed(_) => "MODEL_LOAD_FAILED",
            Self::DecodeFailed(_) => "DECODE_FAILED",
            Self::SaveFailed(_) => "SAVE_FAILED",
            Self::Inference(_) => "INFERENCE_FAILED",
            Self::Processing(_) => "PROCESSING_FAILED",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Message without the variant prefix, for `(code, message)` pairs
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::InvalidArgument(msg)
            | Self::UnknownOperation(msg)
            | Self::ModelNotFound(msg)
            | Self::ModelLoadFailed(msg)
            | Self::DecodeFailed(msg)
            | Self::SaveFailed(msg)
            | Self::Inference(msg)
            | Self::Processing(msg)
            | Self::InvalidConfig(msg)
            | Self::Internal(msg) => msg.clone(),
            Self::Io(err) => err.to_string(),
        }
    }

    // Enhanced contextual error creators

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create model load error with troubleshooting context
    pub fn model_error_with_context(
        operation: &str,
        model_name: &str,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::ModelLoadFailed(format!(
            "Failed to {} model '{}': {}.{}",
            operation, model_name, error, suggestion_text
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }
}
