//! Error types for rally-export
//!
//! Two layers of errors live here:
//! - [`Error`] is the crate-wide error for operations that can fail as a whole
//!   (loading configuration, a top-level query, draining attachments).
//! - [`FieldError`] describes why a single configured field could not be
//!   resolved. Field errors never abort the surrounding record; they are turned
//!   into a placeholder value in the exported JSON.

use thiserror::Error;

/// Result type alias for rally-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rally-export
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "processing_dir")
        key: Option<String>,
    },

    /// Network error talking to the remote API
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote API answered, but with an error
    #[error("API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code of the response
        status: u16,
        /// Error text reported by the API
        message: String,
    },

    /// Invalid URL for a type or reference
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attachment content could not be decoded
    #[error("invalid attachment content: {0}")]
    Decode(#[from] base64::DecodeError),

    /// One or more attachments of a type could not be saved
    #[error("{failed} of {total} attachments could not be saved")]
    Attachments {
        /// Number of entries that failed
        failed: usize,
        /// Number of entries in the queue
        total: usize,
        /// Number of files written despite the failures
        written: usize,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a config key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Why a single field could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// The field config has no `type`
    #[error("Type was not supplied for config: {field}.")]
    MissingType {
        /// Key of the offending field config
        field: String,
    },

    /// The field config has a `type` this exporter does not know
    #[error("Unknown Type of {type_name} supplied")]
    UnsupportedType {
        /// Key of the offending field config
        field: String,
        /// The type tag as written in the configuration
        type_name: String,
    },

    /// The record holds no usable reference at the configured path
    #[error("no reference found at '{path}' for field {field}")]
    MissingReference {
        /// Key of the field being resolved
        field: String,
        /// Path that was looked up in the record
        path: String,
    },

    /// The nested fetch for the field failed
    #[error("fetch failed for field {field}: {message}")]
    Transport {
        /// Key of the field being resolved
        field: String,
        /// Rendered transport error
        message: String,
    },
}

impl FieldError {
    /// Configuration problems are soft errors: their message is exported in
    /// place of the value.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            FieldError::MissingType { .. } | FieldError::UnsupportedType { .. }
        )
    }

    /// Value exported in place of the field
    ///
    /// Soft errors become their diagnostic string; fetch failures become `null`
    /// so the key is still present in the record.
    pub fn placeholder(&self) -> serde_json::Value {
        if self.is_soft() {
            serde_json::Value::String(self.to_string())
        } else {
            serde_json::Value::Null
        }
    }
}
