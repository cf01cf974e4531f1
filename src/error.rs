//! Crate-wide error type.
//!
//! A single flat enum stands in for the `ConfigurationException`/stream
//! `IOException` family of the original design — every `kind` named in the
//! specification is a variant here.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// A failure raised by the configuration tree, the persistence layer, or the
/// memory-block stream.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Null/negative inputs, empty or syntactically invalid paths.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Seeking an unseekable stream, a comment on a strategy without comment
    /// support, a persistence call on a non-root node, attaching a block
    /// that already has a predecessor.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Adding an item at a path that already holds one.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Reading a missing item with inheritance disabled.
    #[error("not found: {0}")]
    NotFound(String),

    /// Reading an item with a type other than the one it was created with.
    #[error("type mismatch at '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Unsupported type for the persistence strategy, a value not assignable
    /// to an item's type, or an XML load/save/parse failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Use of a stream (or synchronized wrapper) after it was disposed.
    #[error("object disposed")]
    ObjectDisposed,

    /// An asynchronous operation was cancelled before, or while, acquiring
    /// the stream's lock.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn invalid_argument(msg: impl fmt::Display) -> Self {
        Error::InvalidArgument(msg.to_string())
    }

    pub fn not_supported(msg: impl fmt::Display) -> Self {
        Error::NotSupported(msg.to_string())
    }

    pub fn already_exists(path: impl fmt::Display) -> Self {
        Error::AlreadyExists(path.to_string())
    }

    pub fn not_found(path: impl fmt::Display) -> Self {
        Error::NotFound(path.to_string())
    }

    pub fn persistence(msg: impl fmt::Display) -> Self {
        Error::Persistence(msg.to_string())
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::InvalidArgument(_) => std::io::ErrorKind::InvalidInput,
            Error::NotSupported(_) => std::io::ErrorKind::Unsupported,
            Error::AlreadyExists(_) => std::io::ErrorKind::AlreadyExists,
            Error::NotFound(_) => std::io::ErrorKind::NotFound,
            Error::TypeMismatch { .. } => std::io::ErrorKind::InvalidData,
            Error::Persistence(_) => std::io::ErrorKind::Other,
            Error::ObjectDisposed => std::io::ErrorKind::Other,
            Error::Cancelled => std::io::ErrorKind::Interrupted,
        };
        std::io::Error::new(kind, err)
    }
}
