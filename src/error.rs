//! Build Errors
//!
//! Every failure the build core can raise. Limit checks, nesting checks and
//! write failures all surface here; nothing is swallowed inside the builder.

use std::fmt;

/// Capacity limit that a build ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// Distinct element names
    ElementNames,
    /// Distinct attribute names
    AttributeNames,
    /// Distinct namespace URIs
    Namespaces,
    /// Total number of nodes (signed 32-bit range)
    Nodes,
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Limit::ElementNames => "element names",
            Limit::AttributeNames => "attribute names",
            Limit::Namespaces => "namespaces",
            Limit::Nodes => "nodes",
        };
        f.write_str(name)
    }
}

/// Errors raised while building or reading a database
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("too many {limit}: at most {max} are supported")]
    LimitExceeded { limit: Limit, max: usize },

    #[error("malformed event stream: {0}")]
    Malformed(String),

    #[error("build was interrupted")]
    Interrupted,

    #[error("corrupt database: {0}")]
    Corrupt(String),

    #[error("invalid build options: {0}")]
    Options(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("catalog encoding failed: {0}")]
    Catalog(#[from] serde_json::Error),
}

impl BuildError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        BuildError::Malformed(msg.into())
    }
}

pub type Result<T, E = BuildError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_message_names_limit() {
        let err = BuildError::LimitExceeded {
            limit: Limit::ElementNames,
            max: 0x8000,
        };
        assert_eq!(
            err.to_string(),
            "too many element names: at most 32768 are supported"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: BuildError = io.into();
        assert!(matches!(err, BuildError::Io(_)));
        assert_eq!(err.to_string(), "disk full");
    }
}
