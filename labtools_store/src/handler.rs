//! OriginHandler: registry of origins keyed by backing path.
//!
//! The handler owns every origin it manages and is the only way to turn a
//! [`ResourceReference`] back into a live resource.
//!
//! Rules:
//!   - Only origins with a usable path (present, non-empty, UTF-8) register
//!   - Registering a path that is already taken replaces the previous origin,
//!     which is handed back to the caller
//!   - Dereferencing through an unregistered path is an error; a registered
//!     path with no resource at that id is `Ok(None)`

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::identity::ResourceReference;
use crate::origin::{write_file, Origin};
use crate::resource::{ensure_kind, Resource};

pub struct OriginHandler<R: Resource> {
    origins: HashMap<String, Origin<R>>,
}

impl<R: Resource> Default for OriginHandler<R> {
    fn default() -> Self {
        Self {
            origins: HashMap::new(),
        }
    }
}

impl<R: Resource> OriginHandler<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `origin`, keyed by its current path.
    ///
    /// Returns the origin previously registered under the same path, if any.
    pub fn register(&mut self, origin: Origin<R>) -> Result<Option<Origin<R>>, StoreError> {
        let Some(path) = origin.path_string().map(str::to_owned) else {
            warn!(origin = %origin.key(), "register refused: origin has no usable path");
            return Err(StoreError::MissingPath);
        };
        let previous = self.origins.insert(path.clone(), origin);
        debug!(path = %path, replaced = previous.is_some(), "origin registered");
        Ok(previous)
    }

    /// Release the origin registered under `path`.
    pub fn unregister(&mut self, path: &str) -> Option<Origin<R>> {
        let removed = self.origins.remove(path);
        if removed.is_some() {
            debug!(path, "origin unregistered");
        }
        removed
    }

    /// Resolve a reference to the live resource it names.
    pub fn dereference(&self, reference: &ResourceReference) -> Result<Option<&R>, StoreError> {
        let origin = self
            .origins
            .get(reference.origin())
            .ok_or_else(|| StoreError::UnmanagedOrigin {
                origin: reference.origin().to_string(),
            })?;
        Ok(origin.retrieve(reference.id()))
    }

    /// Resolve a reference and require the resource to be of `kind`.
    pub fn dereference_as(
        &self,
        reference: &ResourceReference,
        kind: R::Kind,
    ) -> Result<Option<&R>, StoreError> {
        match self.dereference(reference)? {
            Some(resource) => {
                ensure_kind(resource, kind)?;
                Ok(Some(resource))
            }
            None => Ok(None),
        }
    }

    pub fn origin(&self, path: &str) -> Option<&Origin<R>> {
        self.origins.get(path)
    }

    pub fn origin_mut(&mut self, path: &str) -> Option<&mut Origin<R>> {
        self.origins.get_mut(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.origins.contains_key(path)
    }

    pub fn origins(&self) -> impl Iterator<Item = &Origin<R>> {
        self.origins.values()
    }

    pub fn origins_mut(&mut self) -> impl Iterator<Item = &mut Origin<R>> {
        self.origins.values_mut()
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.origins.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Write every registered origin, in path order.
    ///
    /// All origins are encoded first; no file is touched unless every one
    /// of them encodes. I/O stops at the first failure.
    pub fn write_all(&self) -> Result<(), StoreError> {
        let mut encoded = Vec::with_capacity(self.origins.len());
        for path in self.paths() {
            if let Some(origin) = self.origins.get(path) {
                let target = origin.path().ok_or(StoreError::MissingPath)?;
                encoded.push((target, origin.encode()?));
            }
        }
        for (path, data) in &encoded {
            write_file(path, data)?;
        }
        debug!(origins = encoded.len(), "origins written");
        Ok(())
    }
}

impl<R: Resource> std::fmt::Debug for OriginHandler<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginHandler")
            .field("paths", &self.paths())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::identity::ResourceId;
    use crate::testing::{Sample, SampleKind};

    fn registered(handler: &mut OriginHandler<Sample>, path: &str) {
        assert!(handler.register(Origin::new(path)).unwrap().is_none());
    }

    // ── Registration ────────────────────────────────────────────────

    #[test]
    fn register_requires_a_path() {
        let mut handler = OriginHandler::<Sample>::new();
        assert!(matches!(
            handler.register(Origin::detached()),
            Err(StoreError::MissingPath)
        ));
        assert!(matches!(
            handler.register(Origin::new("")),
            Err(StoreError::MissingPath)
        ));
        assert!(handler.is_empty());
    }

    #[test]
    fn last_registration_wins() {
        let mut handler = OriginHandler::<Sample>::new();
        let mut first = Origin::new("dup.ori");
        first.add(Sample::note("first")).unwrap();
        let first_key = first.key();
        handler.register(first).unwrap();

        let second = Origin::new("dup.ori");
        let second_key = second.key();
        let replaced = handler.register(second).unwrap().unwrap();

        assert_eq!(replaced.key(), first_key);
        assert_eq!(handler.len(), 1);
        assert_eq!(handler.origin("dup.ori").unwrap().key(), second_key);
    }

    #[test]
    fn unregister_releases_the_origin() {
        let mut handler = OriginHandler::<Sample>::new();
        registered(&mut handler, "gone.ori");
        assert!(handler.unregister("gone.ori").is_some());
        assert!(handler.unregister("gone.ori").is_none());
        assert!(!handler.contains("gone.ori"));
    }

    #[test]
    fn paths_are_sorted() {
        let mut handler = OriginHandler::<Sample>::new();
        for path in ["c.ori", "a.ori", "b.ori"] {
            registered(&mut handler, path);
        }
        assert_eq!(handler.paths(), vec!["a.ori", "b.ori", "c.ori"]);
        assert_eq!(handler.origins().count(), 3);
    }

    // ── Dereference ─────────────────────────────────────────────────

    #[test]
    fn dereference_resolves_registered_resources() {
        let mut handler = OriginHandler::<Sample>::new();
        registered(&mut handler, "live.ori");
        let origin = handler.origin_mut("live.ori").unwrap();
        let id = origin.add(Sample::note("hello")).unwrap();
        let reference = origin.reference_to(&id).unwrap();

        let resolved = handler.dereference(&reference).unwrap().unwrap();
        assert_eq!(resolved.label, "hello");
        assert_eq!(resolved.id, Some(id));

        let missing = ResourceReference::new("live.ori", id.id() + 1).unwrap();
        assert!(handler.dereference(&missing).unwrap().is_none());
    }

    #[test]
    fn dereference_through_unknown_origin_fails() {
        let handler = OriginHandler::<Sample>::new();
        let reference = ResourceReference::new("nowhere.ori", 0).unwrap();
        let err = handler.dereference(&reference).unwrap_err();
        assert!(matches!(err, StoreError::UnmanagedOrigin { ref origin } if origin == "nowhere.ori"));
        assert_eq!(err.kind(), ErrorKind::IdentityMismatch);
    }

    #[test]
    fn typed_dereference_checks_kind() {
        let mut handler = OriginHandler::<Sample>::new();
        registered(&mut handler, "typed.ori");
        let origin = handler.origin_mut("typed.ori").unwrap();
        let id = ResourceId::new(origin.key(), 7);
        origin.add(Sample::tally("seven").with_id(id)).unwrap();
        let reference = ResourceReference::new("typed.ori", 7).unwrap();

        let tally = handler
            .dereference_as(&reference, SampleKind::Tally)
            .unwrap()
            .unwrap();
        assert_eq!(tally.label, "seven");

        let err = handler
            .dereference_as(&reference, SampleKind::Note)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);

        let absent = ResourceReference::new("typed.ori", 8).unwrap();
        assert!(handler
            .dereference_as(&absent, SampleKind::Note)
            .unwrap()
            .is_none());
    }

    #[test]
    fn relocated_origin_keeps_its_registry_key() {
        let mut handler = OriginHandler::<Sample>::new();
        registered(&mut handler, "old.ori");
        let origin = handler.origin_mut("old.ori").unwrap();
        let id = origin.add(Sample::note("moved")).unwrap();
        origin.relocate("new.ori");

        let old = ResourceReference::new("old.ori", id.id()).unwrap();
        assert!(handler.dereference(&old).unwrap().is_some());

        let origin = handler.unregister("old.ori").unwrap();
        handler.register(origin).unwrap();
        let new = ResourceReference::new("new.ori", id.id()).unwrap();
        assert!(handler.dereference(&new).unwrap().is_some());
        assert!(handler.dereference(&old).is_err());
    }
}
