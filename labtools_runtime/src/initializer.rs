//! Initializers: named setup steps that prepare a project for one tool.
//!
//! Initializers are registered explicitly with an [`InitializerRegistry`].
//! Each one receives the project it prepares, so there is no global handler
//! or origin to reach for.
//!
//! Rules:
//!   - Names are unique; registering a taken name replaces the old entry
//!   - `initialize_all` runs in name order and stops at the first failure

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use labtools_store::{Origin, Resource};
use tracing::{info, warn};

use crate::error::RuntimeError;
use crate::project::Project;
use crate::records::{CellCountCodec, CellCountRecord};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InitializerDescriptor {
    pub name: String,
    pub description: String,
    pub version: String,
}

impl InitializerDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for InitializerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{}: {}]", self.name, self.version, self.description)
    }
}

pub trait Initializer<R: Resource> {
    fn descriptor(&self) -> InitializerDescriptor;

    fn initialize(&self, project: &mut Project<R>) -> Result<(), RuntimeError>;
}

pub struct InitializerRegistry<R: Resource> {
    initializers: BTreeMap<String, Box<dyn Initializer<R>>>,
}

impl<R: Resource> Default for InitializerRegistry<R> {
    fn default() -> Self {
        Self {
            initializers: BTreeMap::new(),
        }
    }
}

impl<R: Resource> InitializerRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an initializer under its descriptor name. Returns the one it replaced.
    pub fn register(
        &mut self,
        initializer: Box<dyn Initializer<R>>,
    ) -> Option<Box<dyn Initializer<R>>> {
        let descriptor = initializer.descriptor();
        let replaced = self.initializers.insert(descriptor.name.clone(), initializer);
        if replaced.is_some() {
            warn!(initializer = %descriptor, "initializer replaced");
        }
        replaced
    }

    pub fn get(&self, name: &str) -> Option<&dyn Initializer<R>> {
        self.initializers.get(name).map(|initializer| &**initializer)
    }

    /// Descriptors of all registered initializers, sorted by name.
    pub fn descriptors(&self) -> Vec<InitializerDescriptor> {
        self.initializers
            .values()
            .map(|initializer| initializer.descriptor())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.initializers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.initializers.is_empty()
    }

    /// Run every initializer against `project`, in name order.
    pub fn initialize_all(&self, project: &mut Project<R>) -> Result<(), RuntimeError> {
        for initializer in self.initializers.values() {
            run(&**initializer, project)?;
        }
        Ok(())
    }

    /// Run the initializer registered under `name`.
    pub fn initialize(&self, name: &str, project: &mut Project<R>) -> Result<(), RuntimeError> {
        let Some(initializer) = self.get(name) else {
            warn!(initializer = name, "no such initializer");
            return Err(RuntimeError::UnknownInitializer(name.to_string()));
        };
        run(initializer, project)
    }
}

fn run<R: Resource>(
    initializer: &dyn Initializer<R>,
    project: &mut Project<R>,
) -> Result<(), RuntimeError> {
    let descriptor = initializer.descriptor();
    initializer.initialize(project)?;
    info!(initializer = %descriptor, project = project.name(), "initializer ran");
    Ok(())
}

// ---------------------------------------------------------------------------
// Cell counter
// ---------------------------------------------------------------------------

/// Registers the project's cell-count origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellCountInitializer;

impl CellCountInitializer {
    pub const NAME: &'static str = "cell-counter";
    pub const ORIGIN_STEM: &'static str = "CellCount";

    /// A cell-count origin at `path`, wired to the record codec.
    pub fn origin(path: impl Into<std::path::PathBuf>) -> Origin<CellCountRecord> {
        Origin::new(path)
            .with_decoder(Arc::new(CellCountCodec))
            .with_encoder(Arc::new(CellCountCodec))
    }
}

impl Initializer<CellCountRecord> for CellCountInitializer {
    fn descriptor(&self) -> InitializerDescriptor {
        InitializerDescriptor::new(
            Self::NAME,
            "cell counts, dilutions and counting series",
            env!("CARGO_PKG_VERSION"),
        )
    }

    fn initialize(&self, project: &mut Project<CellCountRecord>) -> Result<(), RuntimeError> {
        let origin = Self::origin(project.origin_path(Self::ORIGIN_STEM));
        project.handler_mut().register(origin)?;
        Ok(())
    }
}
