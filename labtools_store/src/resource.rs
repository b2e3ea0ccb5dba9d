//! The `Resource` capability.
//!
//! A resource is any record an [`Origin`](crate::origin::Origin) can hold:
//! it knows its own kind, carries at most one identity, and can encode
//! itself. Concrete record sets are closed enums implementing this trait;
//! the store never needs to know their layout.

use std::fmt::{Debug, Display};

use crate::error::StoreError;
use crate::identity::ResourceId;

pub trait Resource: Debug {
    /// Closed discriminator over the record variants of an implementation.
    type Kind: Copy + Eq + Debug + Display;

    fn kind(&self) -> Self::Kind;

    /// Identity currently held, if any.
    fn id(&self) -> Option<ResourceId>;

    /// Attach an identity.
    ///
    /// Called by the origin that accepts the resource, and by decoders that
    /// restore a previously assigned identity before handing the record back
    /// to its origin. Resources never mint identities themselves.
    fn assign_id(&mut self, id: ResourceId);

    /// Encode the resource into its self-describing byte form.
    fn serialize(&self) -> Result<Vec<u8>, StoreError>;
}

/// Fail with `TypeMismatch` unless `resource` is of the `expected` kind.
pub fn ensure_kind<R: Resource>(resource: &R, expected: R::Kind) -> Result<(), StoreError> {
    let found = resource.kind();
    if found != expected {
        return Err(StoreError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        });
    }
    Ok(())
}
