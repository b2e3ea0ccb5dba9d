//! Origin: a file-backed container of identity-scoped resources.
//!
//! An origin owns its resources, hands out numeric ids from a watermark
//! that only ever moves forward, and drives reading and writing its backing
//! file through pluggable strategies.
//!
//! Add rules:
//!   1. A resource without identity gets `(this origin, watermark)`; the
//!      watermark advances by one
//!   2. A resource whose identity names this origin is stored under that id,
//!      overwriting any previous occupant; the watermark moves past the id
//!   3. Anything else is rejected and handed back untouched
//!
//! Not internally synchronized. Share an origin across threads only behind a
//! single lock covering the whole value.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::error::StoreError;
use crate::identity::{OriginKey, ResourceId, ResourceReference};
use crate::resource::Resource;

/// Rebuilds an origin's contents from the raw bytes of its backing file.
///
/// The target has already been cleared when `decode` is called.
pub trait OriginDecoder<R: Resource>: Send + Sync {
    fn decode(&self, data: &[u8], target: &mut Origin<R>) -> Result<(), StoreError>;
}

/// Writes an origin to its backing file. Free to choose framing and to skip
/// resources.
pub trait OriginEncoder<R: Resource>: Send + Sync {
    fn encode(&self, origin: &Origin<R>, sink: &mut dyn Write) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Rejection
// ---------------------------------------------------------------------------

/// Why an origin refused a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// The resource's identity names another origin.
    #[error("its identity belongs to {0}")]
    ForeignOrigin(OriginKey),
    /// Every id up to `i64::MAX` has been handed out.
    #[error("the origin has no identifiers left")]
    IdsExhausted,
}

/// A refused add. Carries the resource back to the caller unchanged.
#[derive(Debug, Error)]
#[error("{origin} rejected the resource: {reason}")]
pub struct Rejected<R> {
    pub resource: R,
    pub origin: OriginKey,
    pub reason: RejectReason,
}

impl<R> Rejected<R> {
    pub fn into_resource(self) -> R {
        self.resource
    }
}

// ---------------------------------------------------------------------------
// Origin
// ---------------------------------------------------------------------------

pub struct Origin<R: Resource> {
    key: OriginKey,
    path: Option<PathBuf>,
    decoder: Option<Arc<dyn OriginDecoder<R>>>,
    encoder: Option<Arc<dyn OriginEncoder<R>>>,
    resources: HashMap<i64, R>,
    /// Next id to hand out; `None` once `i64::MAX` has been issued.
    next_id: Option<i64>,
}

impl<R: Resource> Origin<R> {
    /// Create an empty origin stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let mut origin = Self::detached();
        origin.path = Some(path.into());
        origin
    }

    /// Create an empty origin with no backing file. It can hold resources but
    /// cannot be read, written, registered, or referenced durably.
    pub fn detached() -> Self {
        Self {
            key: OriginKey::generate(),
            path: None,
            decoder: None,
            encoder: None,
            resources: HashMap::new(),
            next_id: Some(i64::MIN),
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn OriginDecoder<R>>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn OriginEncoder<R>>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn key(&self) -> OriginKey {
        self.key
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The backing path as a registry key: present, non-empty, valid UTF-8.
    pub fn path_string(&self) -> Option<&str> {
        self.path
            .as_deref()
            .and_then(Path::to_str)
            .filter(|s| !s.is_empty())
    }

    /// Point the origin at a new backing file.
    ///
    /// References produced earlier keep the old path. A handler keyed on the
    /// old path is not updated; re-register the origin to re-key it.
    pub fn relocate(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!(origin = %self.key, path = %path.display(), "origin relocated");
        self.path = Some(path);
    }

    pub fn decoder(&self) -> Option<&Arc<dyn OriginDecoder<R>>> {
        self.decoder.as_ref()
    }

    pub fn encoder(&self) -> Option<&Arc<dyn OriginEncoder<R>>> {
        self.encoder.as_ref()
    }

    /// The id the next fresh resource will receive, or `None` when exhausted.
    pub fn next_id(&self) -> Option<i64> {
        self.next_id
    }

    // -- Mutation -----------------------------------------------------------

    /// Add a resource, assigning an identity if it has none.
    pub fn add(&mut self, mut resource: R) -> Result<ResourceId, Rejected<R>> {
        match resource.id() {
            None => {
                let Some(next) = self.next_id else {
                    warn!(origin = %self.key, "add rejected: identifiers exhausted");
                    return Err(self.reject(resource, RejectReason::IdsExhausted));
                };
                let id = ResourceId::new(self.key, next);
                self.next_id = next.checked_add(1);
                resource.assign_id(id);
                self.resources.insert(next, resource);
                debug!(origin = %self.key, id = next, "resource added");
                Ok(id)
            }
            Some(id) if id.origin() == self.key => {
                self.advance_past(id.id());
                let replaced = self.resources.insert(id.id(), resource).is_some();
                debug!(origin = %self.key, id = id.id(), replaced, "resource stored");
                Ok(id)
            }
            Some(id) => {
                warn!(origin = %self.key, foreign = %id, "add rejected: foreign identity");
                Err(self.reject(resource, RejectReason::ForeignOrigin(id.origin())))
            }
        }
    }

    fn reject(&self, resource: R, reason: RejectReason) -> Rejected<R> {
        Rejected {
            resource,
            origin: self.key,
            reason,
        }
    }

    fn advance_past(&mut self, id: i64) {
        if let Some(next) = self.next_id {
            if id >= next {
                self.next_id = id.checked_add(1);
            }
        }
    }

    /// Remove the resource stored under `id`. Absence is not an error.
    pub fn remove(&mut self, id: i64) -> Option<R> {
        let removed = self.resources.remove(&id);
        if removed.is_some() {
            debug!(origin = %self.key, id, "resource removed");
        }
        removed
    }

    /// Remove by typed identity; an identity of another origin is an error.
    pub fn remove_id(&mut self, id: &ResourceId) -> Result<Option<R>, StoreError> {
        self.check_owner(id, "removed from")?;
        Ok(self.remove(id.id()))
    }

    /// Drop every resource. The watermark is kept.
    pub fn clear(&mut self) {
        self.resources.clear();
    }

    // -- Lookup -------------------------------------------------------------

    pub fn retrieve(&self, id: i64) -> Option<&R> {
        self.resources.get(&id)
    }

    pub fn retrieve_mut(&mut self, id: i64) -> Option<&mut R> {
        self.resources.get_mut(&id)
    }

    /// Look up by typed identity; an identity of another origin is an error.
    pub fn retrieve_id(&self, id: &ResourceId) -> Result<Option<&R>, StoreError> {
        self.check_owner(id, "retrieved from")?;
        Ok(self.retrieve(id.id()))
    }

    pub fn contains(&self, id: i64) -> bool {
        self.resources.contains_key(&id)
    }

    /// Snapshot of all stored resources, in no particular order.
    pub fn list(&self) -> Vec<&R> {
        self.resources.values().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    fn check_owner(&self, id: &ResourceId, verb: &str) -> Result<(), StoreError> {
        if id.origin() != self.key {
            return Err(StoreError::IdentityMismatch(format!(
                "the id {id} belongs to another origin and cannot be {verb} {}",
                self.key
            )));
        }
        Ok(())
    }

    // -- Durable references -------------------------------------------------

    /// Durable form of `id`, using the backing path as it is *now*.
    pub fn reference_to(&self, id: &ResourceId) -> Result<ResourceReference, StoreError> {
        self.check_owner(id, "referenced through")?;
        let path = self.path_string().ok_or(StoreError::MissingPath)?;
        ResourceReference::new(path, id.id())
    }

    // -- File I/O -----------------------------------------------------------

    /// Serialize all resources into one buffer.
    ///
    /// With an encoder configured the encoder decides everything; otherwise
    /// each resource's own encoding is concatenated without framing.
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        let mut data = Vec::new();
        match &self.encoder {
            Some(encoder) => encoder.encode(self, &mut data)?,
            None => {
                for resource in self.resources.values() {
                    data.extend_from_slice(&resource.serialize()?);
                }
            }
        }
        Ok(data)
    }

    /// Serialize all resources to the backing file, replacing its contents.
    ///
    /// Everything is encoded before the file is opened, so a failing
    /// resource leaves the previous file intact. Parent directories are
    /// created as needed.
    pub fn write(&self) -> Result<(), StoreError> {
        let path = self.path.as_deref().ok_or(StoreError::MissingPath)?;
        let _span = info_span!("origin_write", path = %path.display()).entered();

        let data = self.encode()?;
        write_file(path, &data)?;

        info!(resources = self.len(), bytes = data.len(), "origin written");
        Ok(())
    }

    /// Replace the contents with what the decoder reads from the backing file.
    ///
    /// The file must exist and a decoder must be configured; both are checked
    /// before anything is cleared.
    pub fn read(&mut self) -> Result<(), StoreError> {
        let path = self.path.clone().ok_or(StoreError::MissingPath)?;
        let _span = info_span!("origin_read", path = %path.display()).entered();

        if !path.is_file() {
            return Err(StoreError::NotFound(path));
        }
        let decoder = self
            .decoder
            .clone()
            .ok_or_else(|| StoreError::MissingDecoder(path.clone()))?;

        let data = fs::read(&path)?;
        self.clear();
        decoder.decode(&data, self)?;

        info!(bytes = data.len(), resources = self.len(), "origin read");
        Ok(())
    }
}

/// Replace the file at `path` with `data`, creating parent directories.
pub(crate) fn write_file(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

impl<R: Resource> fmt::Debug for Origin<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Origin")
            .field("key", &self.key)
            .field("path", &self.path)
            .field("resources", &self.resources.len())
            .field("next_id", &self.next_id)
            .field("has_decoder", &self.decoder.is_some())
            .field("has_encoder", &self.encoder.is_some())
            .finish()
    }
}

impl<R: Resource> fmt::Display for Origin<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "Origin: {}", path.display()),
            None => write!(f, "Origin: <detached {}>", self.key),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
