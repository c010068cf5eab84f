//! Error types for examforge.
//!
//! All fallible operations in the library return [`Result`]. Two kinds of
//! failure exist and must not be conflated:
//!
//! - **Structural failures** (missing phase prerequisites, bad configuration,
//!   IO problems) are `ExamforgeError` values and bubble up with `?`.
//! - **Per-item remote failures** (a page the OCR provider could not read)
//!   are recorded as data — `success: false` plus an `error` string on the
//!   item's result type — so one bad page never aborts a run.
//!
//! IO errors convert via `#[from]` and bubble unchanged; application errors
//! are wrapped with context through the constructor helpers.
use thiserror::Error;

/// Result type alias using `ExamforgeError`.
pub type Result<T> = std::result::Result<T, ExamforgeError>;

/// Main error type for all examforge operations.
#[derive(Debug, Error)]
pub enum ExamforgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed cached artifacts, unparseable provider payloads.
    #[error("Parsing error: {message}")]
    Parsing {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// OCR transport/protocol failures that are not attributable to a
    /// single page (for example, a client that cannot be constructed).
    #[error("OCR error: {message}")]
    Ocr {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid configuration or missing phase prerequisites.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Cache file problems below the per-page artifact level.
    #[error("Cache error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ExamforgeError {
    fn from(err: serde_json::Error) -> Self {
        ExamforgeError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<toml::de::Error> for ExamforgeError {
    fn from(err: toml::de::Error) -> Self {
        ExamforgeError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

macro_rules! error_constructor {
    ($name:ident, $variant:ident, $with_source:ident) => {
        #[doc = concat!("Create a `", stringify!($variant), "` error.")]
        pub fn $name<S: Into<String>>(message: S) -> Self {
            Self::$variant {
                message: message.into(),
                source: None,
            }
        }

        #[doc = concat!("Create a `", stringify!($variant), "` error with source.")]
        pub fn $with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
            message: S,
            source: E,
        ) -> Self {
            Self::$variant {
                message: message.into(),
                source: Some(Box::new(source)),
            }
        }
    };
}

impl ExamforgeError {
    error_constructor!(parsing, Parsing, parsing_with_source);
    error_constructor!(ocr, Ocr, ocr_with_source);
    error_constructor!(validation, Validation, validation_with_source);
    error_constructor!(cache, Cache, cache_with_source);
    error_constructor!(serialization, Serialization, serialization_with_source);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ExamforgeError = io_err.into();
        assert!(matches!(err, ExamforgeError::Io(_)));
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_validation_error() {
        let err = ExamforgeError::validation("missing table_detection.json");
        assert_eq!(err.to_string(), "Validation error: missing table_detection.json");
    }

    #[test]
    fn test_ocr_error_with_source() {
        let source = std::io::Error::other("connection reset");
        let err = ExamforgeError::ocr_with_source("request failed", source);
        assert_eq!(err.to_string(), "OCR error: request failed");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: ExamforgeError = json_err.into();
        assert!(matches!(err, ExamforgeError::Serialization { .. }));
    }

    #[test]
    fn test_io_error_bubbles_unchanged() {
        fn read() -> Result<String> {
            Ok(std::fs::read_to_string("/nonexistent/examforge.txt")?)
        }
        assert!(matches!(read().unwrap_err(), ExamforgeError::Io(_)));
    }
}
