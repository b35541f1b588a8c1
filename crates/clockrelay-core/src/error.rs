//! Normalization error taxonomy.
//!
//! Every variant maps to a stable reason token that is returned to the
//! device in the `error` field of a `400` response, so misconfigured
//! terminals show the cause in their own logs.

use thiserror::Error;

/// Result type alias using [`NormalizationError`].
pub type Result<T> = std::result::Result<T, NormalizationError>;

/// Reasons a device payload cannot become an [`crate::AttendanceEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    /// Payload carries no employee identifier.
    #[error("payload has no employee identifier")]
    MissingEmployee,

    /// Status token is absent or not part of the status vocabulary.
    #[error("unknown attendance status {status:?}")]
    UnknownStatus {
        /// The raw token as sent by the device
        status: String,
    },

    /// Timestamp is present but cannot be parsed.
    #[error("invalid timestamp {value:?}")]
    InvalidTimestamp {
        /// The raw timestamp as sent by the device
        value: String,
    },

    /// Body is not a recognizable XML, JSON or multipart payload.
    #[error("malformed payload: {message}")]
    MalformedPayload {
        /// What made the payload unreadable
        message: String,
    },
}

impl NormalizationError {
    /// Creates a malformed payload error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload { message: message.into() }
    }

    /// Creates an unknown status error.
    pub fn unknown_status(status: impl Into<String>) -> Self {
        Self::UnknownStatus { status: status.into() }
    }

    /// Returns the wire token reported to devices.
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::MissingEmployee => "missing_employee",
            Self::UnknownStatus { .. } => "unknown_status",
            Self::InvalidTimestamp { .. } => "invalid_timestamp",
            Self::MalformedPayload { .. } => "malformed_payload",
        }
    }
}
