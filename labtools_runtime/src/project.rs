//! Project: a named working context owning the origins of one lab project.
//!
//! Layout on disk:
//!   <projects_dir>/<name>/<name>.<project_extension>   manifest
//!   <projects_dir>/<name>/<stem>.<origin_extension>    project origins
//!
//! Manifest layout: i32 origin count, then one codec text per origin path,
//! in path order.
//!
//! Concurrency: a `Project` is not synchronized. `SharedProject` puts the
//! whole project, handler and origins included, behind one `Mutex`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use labtools_store::codec::{ByteReader, ByteWriter, I32_BYTES};
use labtools_store::{Origin, OriginHandler, Resource, StoreError};
use tracing::{debug, info, info_span};

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;

pub struct Project<R: Resource> {
    name: String,
    folder: PathBuf,
    file: PathBuf,
    origin_extension: String,
    manifest: Vec<PathBuf>,
    handler: OriginHandler<R>,
}

impl<R: Resource> Project<R> {
    /// Start a new project. Nothing touches the disk until [`write`](Self::write).
    ///
    /// Fails if `name` is not a single plain path component or the project
    /// folder already exists.
    pub fn create(config: &RuntimeConfig, name: &str) -> Result<Self, RuntimeError> {
        let project = Self::layout(config, name)?;
        if project.folder.exists() {
            return Err(RuntimeError::ProjectExists(project.folder));
        }
        debug!(project = name, folder = %project.folder.display(), "project created");
        Ok(project)
    }

    /// Open an existing project and read its manifest.
    ///
    /// Origins are not registered here: their decoders come from the
    /// initializers. See [`unclaimed_origins`](Self::unclaimed_origins).
    pub fn open(config: &RuntimeConfig, name: &str) -> Result<Self, RuntimeError> {
        let mut project = Self::layout(config, name)?;
        project.manifest = project.read_manifest()?;
        info!(project = name, origins = project.manifest.len(), "project opened");
        Ok(project)
    }

    /// Open the project if its manifest exists, otherwise create it.
    pub fn open_or_create(config: &RuntimeConfig, name: &str) -> Result<Self, RuntimeError> {
        let project = Self::layout(config, name)?;
        if project.file.is_file() {
            Self::open(config, name)
        } else {
            Self::create(config, name)
        }
    }

    fn layout(config: &RuntimeConfig, name: &str) -> Result<Self, RuntimeError> {
        validate_name(name)?;
        let folder = config.projects_dir.join(name);
        let file = folder.join(format!("{name}.{}", config.project_extension));
        Ok(Self {
            name: name.to_string(),
            folder,
            file,
            origin_extension: config.origin_extension.clone(),
            manifest: Vec::new(),
            handler: OriginHandler::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn handler(&self) -> &OriginHandler<R> {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut OriginHandler<R> {
        &mut self.handler
    }

    /// Where an origin called `stem` lives inside this project.
    pub fn origin_path(&self, stem: &str) -> PathBuf {
        self.folder
            .join(format!("{stem}.{}", self.origin_extension))
    }

    /// Whether `origin` is stored inside the project folder.
    ///
    /// Both sides are made absolute against the working directory first.
    pub fn is_internal_origin(&self, origin: &Origin<R>) -> bool {
        let Some(path) = origin.path() else {
            return false;
        };
        match (std::path::absolute(path), std::path::absolute(&self.folder)) {
            (Ok(path), Ok(folder)) => path.starts_with(folder),
            _ => false,
        }
    }

    /// Origin paths recorded in the manifest when the project was opened.
    pub fn manifest(&self) -> &[PathBuf] {
        &self.manifest
    }

    /// Manifest entries no registered origin has claimed.
    pub fn unclaimed_origins(&self) -> Vec<&Path> {
        self.manifest
            .iter()
            .filter(|path| {
                path.to_str()
                    .map_or(true, |key| !self.handler.contains(key))
            })
            .map(PathBuf::as_path)
            .collect()
    }

    // -- Persistence --------------------------------------------------------

    /// Write every registered origin, then the manifest.
    ///
    /// Origins and manifest are all encoded before any file is opened.
    pub fn write(&self) -> Result<(), RuntimeError> {
        let _span = info_span!("project_write", project = %self.name).entered();

        let paths = self.handler.paths();
        let count = i32::try_from(paths.len()).map_err(|_| {
            StoreError::InvalidEncoding(format!("{} origins exceed the manifest count", paths.len()))
        })?;
        let mut manifest = ByteWriter::new();
        manifest.put_i32(count);
        for path in paths.iter().copied() {
            manifest.put_text(Some(path))?;
        }

        self.handler.write_all()?;

        fs::create_dir_all(&self.folder)?;
        let mut writer = BufWriter::new(File::create(&self.file)?);
        writer.write_all(manifest.as_slice())?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        info!(origins = paths.len(), "project written");
        Ok(())
    }

    /// Read the origin paths recorded in the manifest file.
    pub fn read_manifest(&self) -> Result<Vec<PathBuf>, RuntimeError> {
        if !self.file.is_file() {
            return Err(RuntimeError::ProjectNotFound(self.file.clone()));
        }
        let data = fs::read(&self.file)?;
        let mut reader = ByteReader::new(&data);
        let count = reader.read_i32()?;
        let count = usize::try_from(count).map_err(|_| {
            StoreError::InvalidEncoding(format!("negative origin count {count} in manifest"))
        })?;

        // Every entry carries at least an i32 length prefix.
        if count > reader.remaining() / I32_BYTES {
            return Err(StoreError::InvalidEncoding(format!(
                "manifest claims {count} origins but only {} bytes follow",
                reader.remaining()
            ))
            .into());
        }

        let mut paths = Vec::with_capacity(count);
        for _ in 0..count {
            if let Some(path) = reader.read_text()? {
                paths.push(PathBuf::from(path));
            }
        }
        reader.finish()?;
        Ok(paths)
    }

    /// Read every registered origin whose backing file exists.
    ///
    /// Returns how many origins were loaded.
    pub fn load_origins(&mut self) -> Result<usize, RuntimeError> {
        let mut loaded = 0;
        for origin in self.handler.origins_mut() {
            if origin.path().is_some_and(Path::is_file) {
                origin.read()?;
                loaded += 1;
            }
        }
        info!(project = %self.name, loaded, "origins loaded");
        Ok(loaded)
    }
}

impl<R: Resource> std::fmt::Debug for Project<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("folder", &self.folder)
            .field("origins", &self.handler.len())
            .finish()
    }
}

fn validate_name(name: &str) -> Result<(), RuntimeError> {
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single || name.contains(['/', '\\']) {
        return Err(RuntimeError::InvalidProjectName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Thread-safe project handle using Mutex. A poisoned lock is recovered.
pub struct SharedProject<R: Resource> {
    inner: Mutex<Project<R>>,
}

impl<R: Resource> SharedProject<R> {
    pub fn new(project: Project<R>) -> Self {
        Self {
            inner: Mutex::new(project),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Project<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the project.
    pub fn with<T>(&self, f: impl FnOnce(&mut Project<R>) -> T) -> T {
        let mut project = self.lock();
        f(&mut *project)
    }

    /// Write the project under lock.
    pub fn write(&self) -> Result<(), RuntimeError> {
        self.lock().write()
    }

    pub fn into_inner(self) -> Project<R> {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
