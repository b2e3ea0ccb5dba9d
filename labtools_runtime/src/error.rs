//! Runtime error type.

use std::io;
use std::path::PathBuf;

use labtools_store::StoreError;
use thiserror::Error;

/// All possible runtime failures.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Failure inside the resource store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration file could not be parsed or written.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    /// File I/O error outside the store.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A project name is empty or not a single path component.
    #[error("invalid project name {0:?}")]
    InvalidProjectName(String),

    /// The project folder is already present on disk.
    #[error("project {} already exists", .0.display())]
    ProjectExists(PathBuf),

    /// No project file at the expected location.
    #[error("no project file at {}", .0.display())]
    ProjectNotFound(PathBuf),

    /// A record field is out of range.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// No initializer is registered under the requested name.
    #[error("unknown initializer {0:?}")]
    UnknownInitializer(String),
}
