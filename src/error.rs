use std::time::Duration;

use thiserror::Error;

/// Failures a single analysis stage can run into.
///
/// Only [`AnalysisError::Validation`] ever reaches the caller; the other variants are
/// caught at the stage boundary and folded into the report as warnings.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("invalid request: {message}")]
    Validation { message: String },

    #[error("image decode failed: {message}")]
    Decode { message: String },

    #[error("{stage} timed out after {}ms", .elapsed.as_millis())]
    EngineTimeout { stage: &'static str, elapsed: Duration },

    #[error("{stage} failed: {source}")]
    EngineFailure {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl AnalysisError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub(crate) fn engine(stage: &'static str, source: anyhow::Error) -> Self {
        Self::EngineFailure { stage, source }
    }
}

impl From<image::ImageError> for AnalysisError {
    fn from(err: image::ImageError) -> Self {
        Self::decode(err.to_string())
    }
}
