#![forbid(unsafe_code)]

//! Lab Tools runtime.
//!
//! Wraps the resource store with configuration, logging, projects and the
//! initializers that set them up. Ships the cell-count record set.
//!
//! No storage logic lives here. Identity, references and file I/O of origins
//! are delegated to `labtools_store`.

pub mod config;
pub mod error;
pub mod initializer;
pub mod project;
pub mod records;
pub mod telemetry;

pub use config::RuntimeConfig;
pub use error::RuntimeError;
pub use initializer::{CellCountInitializer, Initializer, InitializerDescriptor, InitializerRegistry};
pub use project::{Project, SharedProject};
pub use records::{CellCountCodec, CellCountRecord, RecordKind};
