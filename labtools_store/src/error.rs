//! Store error types.
//!
//! Every failure the store can report is a `StoreError`. The variants are
//! grouped into coarse [`ErrorKind`]s so callers can branch on the category
//! (bad bytes, wrong container, wrong record kind, missing file) without
//! matching every variant.

use std::path::PathBuf;

use thiserror::Error;

/// All possible store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A fixed-width field had the wrong length, a length prefix was
    /// malformed, or decoded bytes do not form a valid value.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// No bytes were supplied where a value was required.
    #[error("missing input: {0}")]
    MissingInput(String),

    /// An identity belongs to a different origin than the one addressed.
    #[error("identity mismatch: {0}")]
    IdentityMismatch(String),

    /// A durable reference names an origin path no handler entry exists for.
    #[error("origin {origin:?} is not managed by this handler")]
    UnmanagedOrigin {
        /// Path-string of the unregistered origin.
        origin: String,
    },

    /// A resolved resource is not of the kind the caller asked for.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Kind requested by the caller.
        expected: String,
        /// Kind of the resource actually resolved.
        found: String,
    },

    /// The backing file of an origin does not exist.
    #[error("file {} does not exist", .0.display())]
    NotFound(PathBuf),

    /// The origin has no usable backing path.
    #[error("origin has no usable backing path")]
    MissingPath,

    /// The origin cannot be read because it has no decoder.
    #[error("origin {} needs a decoder in order to be read", .0.display())]
    MissingDecoder(PathBuf),

    /// File I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidEncoding,
    MissingInput,
    IdentityMismatch,
    TypeMismatch,
    NotFound,
    Io,
}

impl StoreError {
    /// The category this error belongs to.
    ///
    /// An unmanaged origin is an identity mismatch: the reference points at a
    /// container the handler does not own.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidEncoding(_) => ErrorKind::InvalidEncoding,
            StoreError::MissingInput(_) | StoreError::MissingDecoder(_) => ErrorKind::MissingInput,
            StoreError::IdentityMismatch(_) | StoreError::UnmanagedOrigin { .. } => {
                ErrorKind::IdentityMismatch
            }
            StoreError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            StoreError::NotFound(_) | StoreError::MissingPath => ErrorKind::NotFound,
            StoreError::Io(_) => ErrorKind::Io,
        }
    }
}
