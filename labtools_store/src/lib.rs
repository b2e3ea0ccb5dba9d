#![forbid(unsafe_code)]

//! Lab Tools resource store.
//!
//! File-backed origins holding identity-scoped resources, durable
//! references between them, a registry that resolves those references,
//! and the binary codec every record payload is built from.
//!
//! The store knows nothing about concrete record layouts. Record sets plug
//! in through the [`Resource`] trait and the origin decode/encode strategies.

pub mod cached;
pub mod codec;
pub mod error;
pub mod handler;
pub mod identity;
pub mod origin;
pub mod resource;

#[cfg(test)]
mod testing;

pub use cached::CachedReference;
pub use error::{ErrorKind, StoreError};
pub use handler::OriginHandler;
pub use identity::{OriginKey, ResourceId, ResourceReference};
pub use origin::{Origin, OriginDecoder, OriginEncoder, RejectReason, Rejected};
pub use resource::{ensure_kind, Resource};
