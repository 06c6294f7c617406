//! Error types for relay-message

use thiserror::Error;

/// Result type alias for message operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad failure class of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input that could not be parsed
    Parse,
    /// Well-formed input carrying an unacceptable value
    Validation,
    /// Stream or file state prevented the operation
    Io,
}

/// Error types for HTTP message values
#[derive(Debug, Error)]
pub enum Error {
    /// URI string could not be parsed
    #[error("Unable to parse URI: {0}")]
    Parse(String),

    /// Unsupported HTTP method
    #[error("Unsupported HTTP method: {0}")]
    InvalidMethod(String),

    /// Invalid header name or value
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Port outside of 1-65535
    #[error("Invalid port: {0}. Must be between 1 and 65535")]
    InvalidPort(u32),

    /// Status code not in the status table
    #[error("Invalid HTTP status: {0}")]
    InvalidStatus(u16),

    /// Invalid cookie attribute
    #[error("Invalid cookie: {0}")]
    InvalidCookie(String),

    /// Upload error code outside the known set
    #[error("Invalid upload error code: {0}")]
    InvalidUploadError(i64),

    /// Any other rejected value (request target, parsed body, file tree)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Stream was opened without read capability
    #[error("Stream is not readable")]
    NotReadable,

    /// Stream was opened without write capability
    #[error("Stream is not writable")]
    NotWritable,

    /// Stream does not support seeking
    #[error("Stream is not seekable")]
    NotSeekable,

    /// Stream resource has been detached or closed
    #[error("Stream is detached")]
    Detached,

    /// Uploaded file was already moved
    #[error("Uploaded file has already been moved")]
    AlreadyMoved,

    /// Underlying IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parse(_) => ErrorKind::Parse,
            Error::InvalidMethod(_)
            | Error::InvalidHeader(_)
            | Error::InvalidPort(_)
            | Error::InvalidStatus(_)
            | Error::InvalidCookie(_)
            | Error::InvalidUploadError(_)
            | Error::Validation(_) => ErrorKind::Validation,
            Error::NotReadable
            | Error::NotWritable
            | Error::NotSeekable
            | Error::Detached
            | Error::AlreadyMoved
            | Error::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_parse(&self) -> bool {
        self.kind() == ErrorKind::Parse
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub fn is_io(&self) -> bool {
        self.kind() == ErrorKind::Io
    }
}
