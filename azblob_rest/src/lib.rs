//! Blob storage backend for [`azblob`] speaking the service REST API.
//!
//! Supports production endpoints (`https://<account>.blob.core.windows.net`)
//! and the local Azurite emulator (`http://127.0.0.1:10000/<account>`), with
//! Shared Key, SAS token, or anonymous authorization.
//!
//! Stores are configured through [`RestConfig`], either directly or from a
//! URI:
//!
//! ```
//! use azblob_rest::RestConfig;
//!
//! let config =
//!     RestConfig::from_uri("az://myaccount.blob.core.windows.net/?sas_token=sv%3D2021").unwrap();
//! assert_eq!(config.endpoint.account(), "myaccount");
//! ```

mod auth;
mod config;
mod provider;
mod store;
mod xml;

pub use self::{config::RestConfig, provider::RestProvider, store::RestBlobStore};
