//! Error types for RecordGate

/// Result type alias using RecordGate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for RecordGate operations
///
/// The first four variants are the ones a caller of the reader contract is
/// expected to tell apart: a refusal for lack of capacity, a resource that
/// could not be read, a writer that was invoked twice, and a deployment
/// defect such as an unregistered data flavour.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The reader has no free slot for this request; nothing was opened
    #[error("reader '{reader}' has no capacity ({in_flight} reads in flight)")]
    NoCapacity {
        /// Identifier of the refusing reader
        reader: String,

        /// Reads in flight at the time of refusal
        in_flight: usize,
    },

    /// The resource could not be opened or failed during transfer
    #[error("unable to read resource: {resource}")]
    Read {
        /// The resource identifier exactly as supplied
        resource: String,

        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// The response writer has already been invoked
    #[error("response already written")]
    AlreadyWritten,

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Record encoding or decoding failures
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// A rule failed while transforming a record
    #[error("rule '{rule}' failed: {message}")]
    Rule {
        /// Name of the failing rule
        rule: String,

        /// Failure description
        message: String,
    },

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new read error for a resource identifier
    pub fn read(resource: impl Into<String>, source: std::io::Error) -> Self {
        Self::Read {
            resource: resource.into(),
            source,
        }
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new serialisation error
    pub fn serialisation(msg: impl Into<String>) -> Self {
        Self::Serialisation(msg.into())
    }

    /// Create a new rule error
    pub fn rule(rule: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Rule {
            rule: rule.into(),
            message: msg.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the caller may retry the same request elsewhere or later.
    ///
    /// Only capacity refusals qualify; every other kind describes the
    /// resource, the rules, the deployment, or a caller bug.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NoCapacity { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialisation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_only_capacity_is_retryable() {
        let capacity = Error::NoCapacity {
            reader: "r1".to_string(),
            in_flight: 4,
        };
        assert!(capacity.is_retryable());

        let read = Error::read("/data/x", std::io::Error::other("boom"));
        assert!(!read.is_retryable());
        assert!(!Error::AlreadyWritten.is_retryable());
        assert!(!Error::config("missing").is_retryable());
    }

    #[test]
    fn test_read_error_keeps_identifier_and_cause() {
        let err = Error::read(
            "hdfs://host/path",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("hdfs://host/path"));
        assert_eq!(err.source().map(|s| s.to_string()), Some("gone".to_string()));
    }
}
