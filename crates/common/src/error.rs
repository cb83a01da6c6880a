//! Error types shared across Chromix crates.

use std::path::PathBuf;

/// Top-level error type for Chromix operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A job parameter failed validation. Always raised before any frame
    /// is processed; `field` names the offending parameter.
    #[error("Invalid parameter `{field}`: {message}")]
    InvalidParameter { field: String, message: String },

    /// An input file could not be probed or is not a usable media stream.
    #[error("Unsupported media `{path}`: {message}")]
    UnsupportedMedia { path: PathBuf, message: String },

    /// Decoding an input stream failed mid-run.
    #[error("Decode failure at frame {frame_index}: {message}")]
    Decode { frame_index: u64, message: String },

    /// Encoding or muxing the output failed mid-run.
    #[error("Encode failure at frame {frame_index}: {message}")]
    Encode { frame_index: u64, message: String },

    /// A buffer allocation failed mid-run.
    #[error("Resource exhausted: {message}")]
    ResourceExhausted { message: String },

    /// The caller requested cancellation. Not a failure: partial output
    /// is discarded and the job stops promptly.
    #[error("Job cancelled")]
    Cancelled,

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// A required external tool (ffmpeg/ffprobe) is missing or broken.
    #[error("Tooling error: {message}")]
    Tooling { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn invalid_parameter(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            message: msg.into(),
        }
    }

    pub fn unsupported_media(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::UnsupportedMedia {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn decode(frame_index: u64, msg: impl Into<String>) -> Self {
        Self::Decode {
            frame_index,
            message: msg.into(),
        }
    }

    pub fn encode(frame_index: u64, msg: impl Into<String>) -> Self {
        Self::Encode {
            frame_index,
            message: msg.into(),
        }
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            message: msg.into(),
        }
    }

    pub fn tooling(msg: impl Into<String>) -> Self {
        Self::Tooling {
            message: msg.into(),
        }
    }

    /// Whether this error is terminal for the job (everything except
    /// caller-requested cancellation).
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameter_names_field() {
        let err = EngineError::invalid_parameter("scale", "must be greater than zero");
        assert_eq!(
            err.to_string(),
            "Invalid parameter `scale`: must be greater than zero"
        );
    }

    #[test]
    fn test_cancelled_is_not_a_failure() {
        assert!(!EngineError::Cancelled.is_failure());
        assert!(EngineError::decode(12, "pipe closed").is_failure());
    }
}
