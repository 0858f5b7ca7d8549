//! Purpose: Client surface for the hosted Datastore service.
//! Exports: `DatastoreClient`, `ApiResult`, wire decoding in `wire`.
//! Role: Stable boundary between the pure core pipeline and the network.
//! Invariants: The client implements the core collaborator traits; the core
//! never references transport types.
pub mod client;
pub mod wire;

pub use client::DatastoreClient;

pub type ApiResult<T> = Result<T, crate::core::error::Error>;
