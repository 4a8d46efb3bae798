//! Error types for polydex-search.

use thiserror::Error;

use crate::types::SearchResult;

/// Result type alias for search operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the coordinator and the maintenance surface.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Planning, configuration or transport failure.
    #[error(transparent)]
    Core(#[from] polydex_core::Error),

    /// The engine reported a warning or error and escalation is enabled.
    /// The result was fully assembled before escalating.
    #[error("Engine {severity}: {message}")]
    Escalated {
        /// `warning` or `error`.
        severity: &'static str,
        /// Engine-reported text.
        message: String,
        /// The result as recorded.
        result: Box<SearchResult>,
    },
}

impl Error {
    /// Whether retrying the operation might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Core(err) => err.is_retryable(),
            Error::Escalated { .. } => false,
        }
    }

    /// The recorded result of an escalated search.
    pub fn result(&self) -> Option<&SearchResult> {
        match self {
            Error::Escalated { result, .. } => Some(result),
            Error::Core(_) => None,
        }
    }
}
