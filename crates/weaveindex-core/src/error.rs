//! Error types for the weaveindex pipeline.

use thiserror::Error;

/// Errors that can occur while ingesting, promoting, or reading indexed data.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// A caller-supplied value failed validation (e.g. a malformed cursor).
    ///
    /// The message is surfaced verbatim.
    #[error("{0}")]
    Validation(String),

    /// A wire-format value could not be converted to its storage form.
    #[error("Transcoding error in '{field}': {reason}")]
    Transcode { field: &'static str, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IndexerError {
    pub(crate) fn transcode(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Transcode {
            field,
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error came from validating caller input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns `true` if a wire record was malformed.
    ///
    /// Retrying the same record will fail the same way.
    pub fn is_transcode(&self) -> bool {
        matches!(self, Self::Transcode { .. })
    }
}
