use crate::store::DynBlobStore;

/// A provider/builder for a blob store backend.
///
/// Can construct a store from a generic configuration URI.
/// See [`crate::BlobStoreBuilder`] for usage.
pub trait BlobStoreProvider {
    /// Get a descriptive name for backend implementation.
    ///
    /// eg: "memory", "az", ...
    ///
    /// Equates to [`crate::BlobStore::kind`].
    ///
    /// The returned value must also be the scheme used by `Self::build`.
    fn kind(&self) -> &str;

    /// Build a new [`crate::BlobStore`] from a generic configuration URI.
    ///
    /// Used by the [`crate::BlobStoreBuilder`] to allow for dynamic
    /// construction.
    ///
    /// [`Self::kind`] must match the scheme of the provided URL.
    ///
    /// Use query parameters to pass additional configuration options.
    ///
    /// eg:
    /// * `memory://devstoreaccount1`
    /// * `az://<account>.blob.core.windows.net/?sas_token=...`
    fn build(&self, url: &url::Url) -> Result<DynBlobStore, anyhow::Error>;
}
