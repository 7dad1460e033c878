//! Error types for the transform module.

use lopdf::ObjectId;
use thiserror::Error;

/// Errors that can occur while rewriting a document's images.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The input could not be parsed as a PDF.
    #[error("Invalid PDF document: {reason}")]
    InvalidDocument { reason: String },

    /// The document requires a password.
    #[error("Document is encrypted")]
    Encrypted,

    /// An image uses an encoding or color space this transformer cannot read.
    #[error("Unsupported image {object}: {reason}")]
    UnsupportedImage { object: String, reason: String },

    /// An image's data is corrupt or truncated.
    #[error("Failed to decode image {object}: {reason}")]
    DecodeFailed { object: String, reason: String },

    /// Re-encoding an image failed.
    #[error("Failed to encode image {object}: {reason}")]
    EncodeFailed { object: String, reason: String },

    /// Reading the input or writing the output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The job was cancelled between images.
    #[error("Transform cancelled")]
    Cancelled,
}

impl TransformError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            reason: reason.into(),
        }
    }

    pub fn unsupported(id: ObjectId, reason: impl Into<String>) -> Self {
        Self::UnsupportedImage {
            object: object_label(id),
            reason: reason.into(),
        }
    }

    pub fn decode(id: ObjectId, reason: impl Into<String>) -> Self {
        Self::DecodeFailed {
            object: object_label(id),
            reason: reason.into(),
        }
    }

    pub fn encode(id: ObjectId, reason: impl Into<String>) -> Self {
        Self::EncodeFailed {
            object: object_label(id),
            reason: reason.into(),
        }
    }
}

/// PDF reference notation, e.g. `12 0 R`.
pub fn object_label(id: ObjectId) -> String {
    format!("{} {} R", id.0, id.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_object() {
        let err = TransformError::decode((12, 0), "truncated data");
        assert_eq!(err.to_string(), "Failed to decode image 12 0 R: truncated data");

        let err = TransformError::unsupported((3, 1), "JPXDecode");
        assert!(err.to_string().contains("3 1 R"));
    }
}
