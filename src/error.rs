use thiserror::Error;

pub type ReweaveResult<T> = std::result::Result<T, ReweaveError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum ParseErrorKind {
    #[error("Expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },
    #[error("Unexpected end of expression{expected_what}")]
    UnexpectedEOF {
        /// Describes what was expected, e.g., " (expected ')')"
        expected_what: String,
    },
    #[error("Unterminated string literal")]
    UnterminatedString,
    #[error("Invalid number literal '{literal}'")]
    InvalidNumber { literal: String },
    #[error("Trailing input '{remaining}'")]
    TrailingInput { remaining: String },
}

impl ParseErrorKind {
    pub fn unexpected_eof(expected: Option<&str>) -> Self {
        Self::UnexpectedEOF {
            expected_what: expected.map_or_else(String::new, |e| format!(" (expected '{}')", e)),
        }
    }
}

/// A condition failed to parse. Conditions are single-line, so only the
/// column is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[error("Parse error at column {column}: {kind}")]
pub struct ParseError {
    pub column: usize,
    #[source]
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum EvalError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("'{name}' is not defined")]
    UndefinedIdentifier { name: String },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Template not found: {locator}")]
    NotFound { locator: String },
    #[error("Template locator escapes the source root: {locator}")]
    InvalidLocator { locator: String },
    #[error("Failed to read template {locator}")]
    Io {
        locator: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Template source failed: {message}")]
    Source { message: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O failed for key {key}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Stored value for key {key} is not valid JSON")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ReweaveError {
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Invalid engine configuration")]
    Config(#[source] serde_json::Error),
}

impl From<ParseError> for ReweaveError {
    fn from(error: ParseError) -> Self {
        Self::Eval(EvalError::Parse(error))
    }
}
