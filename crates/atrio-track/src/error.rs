//! Error types for the tracking pipeline.
//!
//! Pipeline stages are split into two failure domains. Business stages
//! (workflow, segmentation, merge, eager profile update) degrade to console
//! log entries and never surface here. Durability stages (source
//! authorization, schema validation, final persistence) return these errors
//! and abort the request.

use atrio_core::error::Error as CoreError;

/// Result alias for tracking operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the tracking pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request could not be attributed to a valid, enabled source or
    /// carried no session id.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// What was missing or rejected.
        message: String,
    },

    /// An event payload failed JSON Schema validation.
    #[error("schema validation failed for event type `{event_type}`: {message}")]
    SchemaValidation {
        /// Event type whose schema rejected the payload.
        event_type: String,
        /// Joined violation details.
        message: String,
    },

    /// A durable save rejected the data it was given.
    #[error("field type conflict: {message}")]
    FieldTypeConflict {
        /// Description of the failed save.
        message: String,
        /// Offending row details reported by the storage layer.
        rows: Vec<String>,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
        /// Row-level details, when the backend reports them.
        details: Vec<String>,
        /// Underlying error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid pipeline configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// Error propagated from the core crate.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl Error {
    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a schema validation error for the given event type.
    #[must_use]
    pub fn schema_validation(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaValidation {
            event_type: event_type.into(),
            message: message.into(),
        }
    }

    /// Creates a field type conflict error.
    #[must_use]
    pub fn field_type_conflict(message: impl Into<String>, rows: Vec<String>) -> Self {
        Self::FieldTypeConflict {
            message: message.into(),
            rows,
        }
    }

    /// Creates a storage error without row details.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            details: Vec::new(),
            source: None,
        }
    }

    /// Creates a storage error carrying row-level details.
    #[must_use]
    pub fn storage_with_details(message: impl Into<String>, details: Vec<String>) -> Self {
        Self::Storage {
            message: message.into(),
            details,
            source: None,
        }
    }

    /// Creates a storage error wrapping an underlying cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            details: Vec::new(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_formats_message() {
        let err = Error::unauthorized("source `abc` is not registered");
        assert_eq!(
            err.to_string(),
            "unauthorized: source `abc` is not registered"
        );
    }

    #[test]
    fn schema_validation_names_event_type() {
        let err = Error::schema_validation("page-view", "properties.url is not a string");
        assert!(err.to_string().contains("page-view"));
        assert!(err.to_string().contains("properties.url"));
    }

    #[test]
    fn field_type_conflict_keeps_rows() {
        let err = Error::field_type_conflict(
            "could not save events",
            vec!["row 0: price must be numeric".into()],
        );
        match err {
            Error::FieldTypeConflict { rows, .. } => assert_eq!(rows.len(), 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn storage_with_source_preserves_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "index missing");
        let err = Error::storage_with_source("event index lookup failed", io);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn core_errors_convert() {
        let core = CoreError::serialization("bad payload");
        let err = Error::from(core);
        assert!(matches!(err, Error::Core(_)));
    }
}
