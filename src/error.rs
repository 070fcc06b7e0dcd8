//! Error taxonomy for the recognition pipeline.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognitionError {
    /// A platform capture primitive failed. `step` names the primitive.
    #[error("screen capture failed at {step}: {detail}")]
    CaptureFailed { step: &'static str, detail: String },

    #[error("template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("failed to decode template {}: {source}", path.display())]
    TemplateDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("match threshold {0} is outside (0.0, 1.0]")]
    InvalidThreshold(f64),

    #[error("input injection failed: {0}")]
    InputFailed(String),
}

impl RecognitionError {
    pub fn capture(step: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::CaptureFailed {
            step,
            detail: detail.to_string(),
        }
    }

    /// Template errors degrade to a matching miss instead of failing the attempt.
    pub fn is_template_error(&self) -> bool {
        matches!(
            self,
            Self::TemplateNotFound(_) | Self::TemplateDecode { .. }
        )
    }
}

pub type RecognitionResult<T> = Result<T, RecognitionError>;
