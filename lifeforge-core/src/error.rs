//! Error types for lifeforge-core

use thiserror::Error;

/// Main error type for the lifeforge-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Request carried no usable message text
    #[error("no message provided")]
    EmptyInput,

    /// Request used an unsupported method
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Request body could not be decoded
    #[error("bad request: {0}")]
    BadRequest(String),

    /// LLM call failed or timed out
    #[error("LLM error: {0}")]
    Llm(String),

    /// Calendar call failed or timed out
    #[error("calendar error: {0}")]
    Calendar(String),

    /// Structured segment of a reply had the wrong shape
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Timestamp matched none of the accepted layouts
    #[error("unsupported timestamp format: {value}")]
    TimestampFormat { value: String },
}

impl Error {
    /// True for failures of an external collaborator (LLM or calendar).
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::Llm(_) | Error::Calendar(_))
    }

    /// HTTP-style status code for surfacing this error to a caller.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::EmptyInput | Error::BadRequest(_) => 400,
            Error::MethodNotAllowed(_) => 405,
            _ => 500,
        }
    }
}

/// Result type alias for lifeforge-core
pub type Result<T> = std::result::Result<T, Error>;
