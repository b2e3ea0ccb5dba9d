//! Resource identities.
//!
//! Two flavours exist as separate types:
//!
//! - [`ResourceId`]: in-process identity, the opaque [`OriginKey`] of the
//!   owning origin plus a numeric id. Only meaningful while that origin lives.
//! - [`ResourceReference`]: durable identity, the origin's path-string plus
//!   the numeric id. Survives serialization and process restarts, and is the
//!   only form stored inside other resources.

use std::fmt;

use uuid::Uuid;

use crate::codec;
use crate::error::StoreError;
use crate::origin::Origin;
use crate::resource::Resource;

/// Opaque handle minted once per [`Origin`].
///
/// Identity checks compare handles, never live objects, so moving or
/// relocating an origin keeps every `ResourceId` it issued valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OriginKey(Uuid);

impl OriginKey {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for OriginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "origin:{}", self.0)
    }
}

/// In-process identity of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId {
    origin: OriginKey,
    id: i64,
}

impl ResourceId {
    pub fn new(origin: OriginKey, id: i64) -> Self {
        Self { origin, id }
    }

    /// Handle of the origin this identity belongs to.
    pub fn origin(&self) -> OriginKey {
        self.origin
    }

    /// Origin-unique numeric id.
    pub fn id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.id)
    }
}

/// Durable reference: origin path-string + numeric id.
///
/// Equality is structural. The path is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceReference {
    origin: String,
    id: i64,
}

impl ResourceReference {
    /// Build a reference from an origin path-string and an id.
    ///
    /// Fails with `MissingPath` if the path is empty: an origin without a
    /// physical representation cannot be referenced.
    pub fn new(origin: impl Into<String>, id: i64) -> Result<Self, StoreError> {
        let origin = origin.into();
        if origin.is_empty() {
            return Err(StoreError::MissingPath);
        }
        Ok(Self { origin, id })
    }

    /// Snapshot the durable form of `id` using `owner`'s current backing
    /// path. See [`Origin::reference_to`].
    pub fn from_id<R: Resource>(id: &ResourceId, owner: &Origin<R>) -> Result<Self, StoreError> {
        owner.reference_to(id)
    }

    /// Path-string of the origin holding the referenced resource.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        codec::encode_reference(Some(self))
    }

    /// Decode a present reference; the absent marker is an error here.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        codec::decode_reference(bytes)?.ok_or_else(|| {
            StoreError::MissingInput("encoded reference is the absent marker".to_string())
        })
    }
}

impl fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.origin, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_compare_structurally() {
        let a = ResourceReference::new("counts.ori", 3).unwrap();
        let b = ResourceReference::new(String::from("counts.ori"), 3).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, ResourceReference::new("counts.ori", 4).unwrap());
        assert_ne!(a, ResourceReference::new("other.ori", 3).unwrap());
    }

    #[test]
    fn empty_origin_path_is_rejected() {
        assert!(matches!(
            ResourceReference::new("", 1),
            Err(StoreError::MissingPath)
        ));
    }

    #[test]
    fn display_forms() {
        let reference = ResourceReference::new("a/b.ori", -2).unwrap();
        assert_eq!(reference.to_string(), "[a/b.ori:-2]");

        let key = OriginKey::generate();
        let id = ResourceId::new(key, 5);
        assert_eq!(id.to_string(), format!("origin:{}:5", key.as_uuid()));
    }

    #[test]
    fn identities_from_different_origins_differ() {
        let first = ResourceId::new(OriginKey::generate(), 1);
        let second = ResourceId::new(OriginKey::generate(), 1);
        assert_ne!(first, second);
        assert_eq!(first, ResourceId::new(first.origin(), 1));
    }

    #[test]
    fn byte_form_round_trips() {
        let reference = ResourceReference::new("x.ori", i64::MAX).unwrap();
        let bytes = reference.to_bytes().unwrap();
        assert_eq!(ResourceReference::from_bytes(&bytes).unwrap(), reference);

        let absent = codec::encode_reference(None).unwrap();
        assert!(matches!(
            ResourceReference::from_bytes(&absent),
            Err(StoreError::MissingInput(_))
        ));
    }
}
