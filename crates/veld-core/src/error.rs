//! Error types and result aliases for Veld.
//!
//! This module defines the shared error taxonomy used across all Veld
//! components. Errors are split into two tiers: entry-scoped errors, which
//! a reconciliation pass records and continues past, and fatal errors, which
//! abort the pass and propagate to the caller.

use std::fmt;

/// The result type used throughout Veld.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Veld operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested artifact, entry, or table was not found.
    #[error("not found: {resource} '{name}'")]
    NotFound {
        /// The type of resource that was not found.
        resource: &'static str,
        /// The identifier that was looked up.
        name: String,
    },

    /// A duplicate path or name, or an existing object where none was expected.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflicting state.
        message: String,
    },

    /// Input failed validation (unknown measure, missing time dimension,
    /// cyclic dependency, unparsable artifact).
    #[error("validation failed: {message}")]
    Validation {
        /// Description of what failed to validate.
        message: String,
    },

    /// The query engine rejected a statement.
    #[error("engine error: {message}")]
    Engine {
        /// Description of the engine failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A bounded resource could not be acquired in time.
    #[error("resource exhausted: {message}")]
    ResourceExhausted {
        /// Description of the exhausted resource.
        message: String,
    },

    /// The pool or store has been shut down.
    #[error("closed: {message}")]
    Closed {
        /// Description of what was closed.
        message: String,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An unrecoverable failure that aborts the current pass.
    #[error("fatal: {message}")]
    Fatal {
        /// Description of the fatal condition.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new not-found error.
    #[must_use]
    pub fn not_found(resource: &'static str, name: impl fmt::Display) -> Self {
        Self::NotFound {
            resource,
            name: name.to_string(),
        }
    }

    /// Creates a new conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new engine error with the given message.
    #[must_use]
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new resource-exhausted error.
    #[must_use]
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            message: message.into(),
        }
    }

    /// Creates a new closed error.
    #[must_use]
    pub fn closed(message: impl Into<String>) -> Self {
        Self::Closed {
            message: message.into(),
        }
    }

    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new serialization error.
    #[must_use]
    pub fn serialization(message: impl fmt::Display) -> Self {
        Self::Serialization {
            message: message.to_string(),
        }
    }

    /// Creates a new fatal error with the given message.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps any error as fatal, preserving it as the source cause.
    #[must_use]
    pub fn fatal_from(message: impl Into<String>, source: Self) -> Self {
        Self::Fatal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if this error must abort the current reconciliation pass.
    ///
    /// Fatal and closed conditions indicate that subsequent bookkeeping would
    /// be unreliable; everything else is entry-scoped.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. } | Self::Closed { .. })
    }

    /// Returns true if this error is a not-found condition.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn not_found_display_includes_resource_and_name() {
        let err = Error::not_found("entry", "orders");
        assert_eq!(err.to_string(), "not found: entry 'orders'");
        assert!(err.is_not_found());
    }

    #[test]
    fn fatal_classification() {
        assert!(Error::fatal("catalog store unreachable").is_fatal());
        assert!(Error::closed("pool closed").is_fatal());
        assert!(!Error::validation("unknown measure").is_fatal());
        assert!(!Error::engine("syntax error").is_fatal());
        assert!(!Error::resource_exhausted("acquire timed out").is_fatal());
    }

    #[test]
    fn fatal_from_preserves_source() {
        let inner = Error::storage("disk gone");
        let err = Error::fatal_from("catalog unavailable", inner);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("catalog unavailable"));
    }

    #[test]
    fn storage_with_source_chains() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = Error::storage_with_source("write failed", io);
        assert!(err.source().is_some());
    }
}
