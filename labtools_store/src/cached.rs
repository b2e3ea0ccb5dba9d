//! CachedReference: a durable reference with a lazily filled local copy.
//!
//! The cache is a snapshot. It is filled only by an explicit refresh or by a
//! `get_or_refresh` on an empty cache, and it never tracks later changes in
//! the origin. Equality and hashing look at the reference alone.
//!
//! The copy is boxed, so a record type may hold cached references to its
//! own variants.

use std::hash::{Hash, Hasher};

use crate::error::StoreError;
use crate::handler::OriginHandler;
use crate::identity::ResourceReference;
use crate::resource::{ensure_kind, Resource};

#[derive(Debug, Clone)]
pub struct CachedReference<R> {
    reference: ResourceReference,
    cached: Option<Box<R>>,
    is_cached: bool,
}

impl<R: Resource + Clone> CachedReference<R> {
    pub fn new(reference: ResourceReference) -> Self {
        Self {
            reference,
            cached: None,
            is_cached: false,
        }
    }

    pub fn reference(&self) -> &ResourceReference {
        &self.reference
    }

    /// Whether a refresh has happened since construction or the last
    /// invalidation. A cached absence counts.
    pub fn is_cached(&self) -> bool {
        self.is_cached
    }

    /// Re-resolve through `handler` and store the result, absence included.
    pub fn refresh(&mut self, handler: &OriginHandler<R>) -> Result<Option<&R>, StoreError> {
        let resolved = handler.dereference(&self.reference)?.cloned();
        Ok(self.store(resolved))
    }

    /// Like [`refresh`](Self::refresh), but a kind mismatch fails and leaves
    /// the previous cache untouched.
    pub fn refresh_as(
        &mut self,
        handler: &OriginHandler<R>,
        kind: R::Kind,
    ) -> Result<Option<&R>, StoreError> {
        let resolved = handler.dereference_as(&self.reference, kind)?.cloned();
        Ok(self.store(resolved))
    }

    fn store(&mut self, resolved: Option<R>) -> Option<&R> {
        self.cached = resolved.map(Box::new);
        self.is_cached = true;
        self.cached.as_deref()
    }

    /// Cached copy, without touching any origin.
    pub fn get(&self) -> Option<&R> {
        self.cached.as_deref()
    }

    /// Cached copy, checked against `kind`.
    pub fn get_as(&self, kind: R::Kind) -> Result<Option<&R>, StoreError> {
        match self.cached.as_deref() {
            Some(resource) => {
                ensure_kind(resource, kind)?;
                Ok(Some(resource))
            }
            None => Ok(None),
        }
    }

    /// Cached copy, refreshing first only if nothing is cached yet.
    pub fn get_or_refresh(&mut self, handler: &OriginHandler<R>) -> Result<Option<&R>, StoreError> {
        if !self.is_cached {
            return self.refresh(handler);
        }
        Ok(self.cached.as_deref())
    }

    pub fn get_or_refresh_as(
        &mut self,
        handler: &OriginHandler<R>,
        kind: R::Kind,
    ) -> Result<Option<&R>, StoreError> {
        if !self.is_cached {
            return self.refresh_as(handler, kind);
        }
        self.get_as(kind)
    }

    /// Drop the cached copy; the next `get_or_refresh` resolves again.
    pub fn invalidate(&mut self) {
        self.cached = None;
        self.is_cached = false;
    }
}

impl<R: Resource + Clone> From<ResourceReference> for CachedReference<R> {
    fn from(reference: ResourceReference) -> Self {
        Self::new(reference)
    }
}

impl<R> PartialEq for CachedReference<R> {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}

impl<R> Eq for CachedReference<R> {}

impl<R> Hash for CachedReference<R> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reference.hash(state);
    }
}
