//! Azure Blob storage-object abstractions.
//!
//! The crate is split into two halves:
//!
//! * The [`BlobStore`] trait, a backend abstraction over an Azure storage
//!   account (containers holding blobs), with implementations living in
//!   sibling crates.
//! * The query model: parsing and validating `az://` storage queries
//!   ([`BlobQuery`]), classifying service endpoints ([`Endpoint`]), and
//!   resolving a query against a store into a [`StorageObject`] with
//!   single-blob or directory-prefix semantics.

mod builder;
mod endpoint;
mod error;
mod inventory;
mod object;
mod provider;
mod query;
mod store;
mod types;
pub mod wrapper;

pub use self::{
    builder::BlobStoreBuilder,
    endpoint::{Endpoint, EndpointKind},
    error::{AddressError, EndpointError, QueryParseError, StoreError},
    inventory::{InventoryCache, InventoryEntry, MemoryInventoryCache},
    object::{ObjectOpts, StorageObject},
    provider::BlobStoreProvider,
    query::{
        BlobQuery, QUERY_SCHEME, QueryGrammar, QueryValidation, container_name_is_valid,
        validate_query,
    },
    store::{BlobStore, BlobStoreExt, DynBlobStore, PutBuilder},
    types::*,
};
