//! Error types for relay-core

use crate::client::TransportError;
use relay_message::Status;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for dispatch and server adapters
#[derive(Debug, Error)]
pub enum Error {
    /// Message value error (parse, validation, stream IO)
    #[error(transparent)]
    Message(#[from] relay_message::Error),

    /// Failure raised by a middleware entry
    #[error("Middleware error: {0}")]
    Middleware(String),

    /// Failure raised by a before/error/after hook
    #[error("Hook error: {0}")]
    Hook(String),

    /// Malformed multipart body
    #[error("Multipart error: {0}")]
    Multipart(String),

    /// Failure no error hook handled; carries the original error
    #[error("Unhandled error: {0}")]
    Unhandled(Box<Error>),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    /// Server-error status a host should answer with
    pub fn status(&self) -> Status {
        match self {
            Error::Unhandled(inner) => inner.status(),
            Error::Transport(TransportError::Network { .. }) => Status::BadGateway,
            _ => Status::InternalServerError,
        }
    }

    pub fn is_unhandled(&self) -> bool {
        matches!(self, Error::Unhandled(_))
    }

    /// The error as originally raised, without the `Unhandled` wrapper
    pub fn root(&self) -> &Error {
        match self {
            Error::Unhandled(inner) => inner.root(),
            other => other,
        }
    }
}
