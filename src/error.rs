//! Error types for wxs
//!
//! Operational failures (I/O, malformed XML, unresolvable locations) and the
//! schema-level "invalid schema" outcome are `Error` values. Individual schema
//! and instance defects are not errors in this sense: they are reported as
//! [`Diagnostic`]s and counted, see [`crate::validators::exceptions`].

use std::fmt;
use thiserror::Error;

use crate::validators::exceptions::Diagnostic;

/// Result type alias using wxs Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for wxs operations
#[derive(Error, Debug)]
pub enum Error {
    /// Schema construction finished but recorded component errors
    #[error("invalid schema: {error_count} error(s)")]
    InvalidSchema {
        /// Number of errors reported while building the schema
        error_count: usize,
        /// Every diagnostic emitted while building the schema
        diagnostics: Vec<Diagnostic>,
    },

    /// XML document could not be parsed
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Value error (invalid value for a type)
    #[error("value error: {0}")]
    Value(String),

    /// Resource loading error
    #[error("resource error: {0}")]
    Resource(String),

    /// Namespace error
    #[error("namespace error: {0}")]
    Namespace(String),

    /// Name error (invalid XML name)
    #[error("name error: {0}")]
    Name(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML parsing error reported by the streaming reader
    #[error("XML error: {0}")]
    Xml(String),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Invariant violation or API misuse; aborts the running operation
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Negative outcome code used by the integer reporting convention.
    ///
    /// Internal failures are `-1`, everything else that aborted an operation
    /// before a verdict could be produced is `-2`.
    pub fn outcome_code(&self) -> i32 {
        match self {
            Error::Internal(_) => -1,
            _ => -2,
        }
    }

    /// Whether this is an internal (invariant) failure
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Internal(_))
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

impl From<roxmltree::Error> for Error {
    fn from(err: roxmltree::Error) -> Self {
        let pos = err.pos();
        Error::Parse(
            ParseError::new(err.to_string()).with_position(pos.row, pos.col),
        )
    }
}

/// XML document parsing error
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Location (file or URI) of the document
    pub location: Option<String>,
    /// 1-based line and column
    pub position: Option<(u32, u32)>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            position: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the line and column
    pub fn with_position(mut self, line: u32, column: u32) -> Self {
        self.position = Some((line, column));
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref loc) = self.location {
            write!(f, "{}:", loc)?;
            if let Some((line, col)) = self.position {
                write!(f, "{}:{}:", line, col)?;
            }
            write!(f, " ")?;
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}
