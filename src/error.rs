use thiserror::Error;

/// Failures a single submission can end in.
///
/// Every variant is recoverable from the caller's point of view: the record
/// can be corrected, the artifact replaced, and the submission repeated.
#[derive(Debug, Error)]
pub enum PredictError {
    /// A form field is missing, malformed, or outside its domain.
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    /// The model artifact is missing or could not be deserialized.
    #[error("Failed to load model {path}: {reason}")]
    ArtifactLoad { path: String, reason: String },

    /// The classifier or explainer could not run on the prepared features.
    #[error("Prediction error: {0}")]
    Prediction(String),
}

impl PredictError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PredictError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn prediction(message: impl Into<String>) -> Self {
        PredictError::Prediction(message.into())
    }

    /// Name of the offending field, for input errors.
    pub fn field(&self) -> Option<&str> {
        match self {
            PredictError::InvalidInput { field, .. } => Some(field),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PredictError>;
