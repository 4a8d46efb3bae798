//! Error types for polydex-core.
//!
//! Every Polydex crate reports failures through [`Error`]. Absence of search
//! results is never an error; variants here describe configuration problems,
//! transport failures and malformed artifacts.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for Polydex operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while planning indexes or coordinating queries.
///
/// All variants are marked `#[non_exhaustive]` at the enum level so new
/// failure classes can be added without breaking callers.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O failure, optionally tied to a path.
    #[error("I/O error{}: {source}", at_path(.path))]
    Io {
        /// Path involved in the failed operation, if known
        path: Option<PathBuf>,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Malformed input (TOML, artifact text, JSON).
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid configuration or type registry.
    #[error("Configuration error: {message}")]
    Config {
        /// What configuration is problematic
        message: String,
    },

    /// A named thing could not be found.
    #[error("{kind} not found: {what}")]
    NotFound {
        /// Name or path of the missing thing
        what: String,
        /// What kind of thing was being looked up
        kind: String,
    },

    /// A generic operation failure.
    #[error("Operation failed: {0}")]
    Operation(String),

    /// The search engine reported a failure or could not be reached.
    #[error("Engine error: {message}")]
    Engine {
        /// Engine-reported message
        message: String,
    },

    /// The record store or row source failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable error message
        message: String,
        /// Source error if available
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Two unrelated types produced the same signature.
    #[error("Planning inconsistency: {message}")]
    PlanningInconsistency {
        /// Description of the conflict
        message: String,
    },
}

fn at_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" at {}", p.display()))
        .unwrap_or_default()
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io { path: None, source }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(format!("Invalid JSON: {e}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Parse(format!("Invalid TOML: {e}"))
    }
}

impl Error {
    /// Returns whether this error is retryable.
    ///
    /// Transport-class failures (I/O, engine, storage) may succeed on a
    /// later attempt; everything else is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Io { .. } => true,
            Error::Engine { .. } => true,
            Error::Storage { .. } => true,
            Error::Parse(_) => false,
            Error::Config { .. } => false,
            Error::NotFound { .. } => false,
            Error::Operation(_) => false,
            Error::PlanningInconsistency { .. } => false,
        }
    }

    /// Creates an I/O error tied to a path.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Error::Io {
            path: Some(path.as_ref().to_path_buf()),
            source,
        }
    }

    /// Creates a parse error.
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Error::Parse(message.into())
    }

    /// Creates a configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Creates a not-found error, e.g. `Error::not_found("Article", "type")`.
    pub fn not_found(what: impl Into<String>, kind: impl Into<String>) -> Self {
        Error::NotFound {
            what: what.into(),
            kind: kind.into(),
        }
    }

    /// Creates a generic operation error.
    pub fn operation<S: Into<String>>(message: S) -> Self {
        Error::Operation(message.into())
    }

    /// Creates an engine error.
    pub fn engine<S: Into<String>>(message: S) -> Self {
        Error::Engine {
            message: message.into(),
        }
    }

    /// Creates a storage error without a source.
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Error::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a storage error with a source error.
    pub fn storage_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a planning inconsistency error.
    pub fn planning_inconsistency<S: Into<String>>(message: S) -> Self {
        Error::PlanningInconsistency {
            message: message.into(),
        }
    }
}
