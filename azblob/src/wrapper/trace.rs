use bytes::Bytes;

use crate::{
    BlobMeta, BlobMetaPage, BlobStore, KeyPage, ListArgs, Put, StoreError, ValueStream,
};

/// Wrapper for a blob store that logs operations with the `tracing` crate.
///
/// * All read operations will be logged at the `TRACE` level
///   (metadata, existence checks, listing)
/// * All put/delete operations will be logged at the `TRACE` level on start
///   of the operation and at the `DEBUG` level on completion.
/// * All errors will be logged at the `ERROR` level
#[derive(Debug)]
pub struct TracedBlobStore<S> {
    name: String,
    inner: S,
}

impl<S> TracedBlobStore<S> {
    /// Creates a new `TracedBlobStore` with the given name and inner store.
    ///
    /// All logs will contain the name of the store.
    pub fn new(name: impl Into<String>, inner: S) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }
}

#[async_trait::async_trait]
impl<S> BlobStore for TracedBlobStore<S>
where
    S: BlobStore + Send + Sync,
{
    fn kind(&self) -> &str {
        self.inner.kind()
    }

    fn account(&self) -> &str {
        self.inner.account()
    }

    fn safe_uri(&self) -> &url::Url {
        self.inner.safe_uri()
    }

    async fn healthcheck(&self) -> Result<(), StoreError> {
        tracing::debug!("Performing healthcheck on blob store: {}", self.kind());
        match self.inner.healthcheck().await {
            Ok(_) => {
                tracing::debug!(store = &self.name, "healthcheck::ok");
                Ok(())
            }
            Err(e) => {
                tracing::error!(store=&self.name, error=%e, "healthcheck::failed");
                Err(e)
            }
        }
    }

    async fn container_exists(&self, container: &str) -> Result<bool, StoreError> {
        match self.inner.container_exists(container).await {
            Ok(exists) => {
                tracing::trace!(store = &self.name, container, exists, "container_exists");
                Ok(exists)
            }
            Err(e) => {
                tracing::error!(store = &self.name, container, error=%e, "container_exists::failed");
                Err(e)
            }
        }
    }

    async fn create_container(&self, container: &str) -> Result<(), StoreError> {
        tracing::trace!(store = &self.name, container, "create_container::start");
        match self.inner.create_container(container).await {
            Ok(()) => {
                tracing::debug!(store = &self.name, container, "create_container::ok");
                Ok(())
            }
            Err(e) => {
                tracing::error!(store = &self.name, container, error=%e, "create_container::failed");
                Err(e)
            }
        }
    }

    async fn meta(&self, container: &str, key: &str) -> Result<Option<BlobMeta>, StoreError> {
        match self.inner.meta(container, key).await {
            Ok(meta) => {
                tracing::trace!(store = &self.name, container, key, ?meta, "meta");
                Ok(meta)
            }
            Err(e) => {
                tracing::error!(store = &self.name, container, key, error=%e, "meta::failed");
                Err(e)
            }
        }
    }

    async fn get(&self, container: &str, key: &str) -> Result<Option<Bytes>, StoreError> {
        match self.inner.get(container, key).await {
            Ok(Some(value)) => {
                tracing::trace!(store = &self.name, container, key, "get::ok");
                Ok(Some(value))
            }
            Ok(None) => {
                tracing::trace!(store = &self.name, container, key, "get::not_found");
                Ok(None)
            }
            Err(e) => {
                tracing::error!(store = &self.name, container, key, error=%e, "get::failed");
                Err(e)
            }
        }
    }

    async fn get_stream(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<ValueStream>, StoreError> {
        match self.inner.get_stream(container, key).await {
            Ok(Some(value)) => {
                tracing::trace!(store = &self.name, container, key, "get_stream::ok");
                Ok(Some(value))
            }
            Ok(None) => {
                tracing::trace!(store = &self.name, container, key, "get_stream::not_found");
                Ok(None)
            }
            Err(e) => {
                tracing::error!(store = &self.name, container, key, error=%e, "get_stream::failed");
                Err(e)
            }
        }
    }

    async fn put(&self, container: &str, put: Put) -> Result<BlobMeta, StoreError> {
        let key = put.key.clone();
        tracing::trace!(store = &self.name, container, key, "put::start");
        match self.inner.put(container, put).await {
            Ok(out) => {
                tracing::debug!(store = &self.name, container, key, "put::ok");
                Ok(out)
            }
            Err(e) => {
                tracing::error!(store = &self.name, container, key, error=%e, "put::failed");
                Err(e)
            }
        }
    }

    async fn delete(&self, container: &str, key: &str) -> Result<(), StoreError> {
        tracing::trace!(store = &self.name, container, key, "delete::start");
        match self.inner.delete(container, key).await {
            Ok(_) => {
                tracing::debug!(store = &self.name, container, key, "delete::ok");
                Ok(())
            }
            Err(e) => {
                tracing::error!(store = &self.name, container, key, error=%e, "delete::failed");
                Err(e)
            }
        }
    }

    async fn delete_prefix(&self, container: &str, prefix: &str) -> Result<(), StoreError> {
        tracing::trace!(store = &self.name, container, prefix, "delete_prefix::start");
        match self.inner.delete_prefix(container, prefix).await {
            Ok(_) => {
                tracing::debug!(store = &self.name, container, prefix, "delete_prefix::ok");
                Ok(())
            }
            Err(e) => {
                tracing::error!(store = &self.name, container, prefix, error=%e, "delete_prefix::failed");
                Err(e)
            }
        }
    }

    async fn list(&self, container: &str, args: ListArgs) -> Result<BlobMetaPage, StoreError> {
        match self.inner.list(container, args).await {
            Ok(page) => {
                tracing::trace!(store = &self.name, container, ?page, "list::ok");
                Ok(page)
            }
            Err(e) => {
                tracing::error!(store = &self.name, container, error=%e, "list::failed");
                Err(e)
            }
        }
    }

    async fn list_keys(&self, container: &str, args: ListArgs) -> Result<KeyPage, StoreError> {
        match self.inner.list_keys(container, args).await {
            Ok(page) => {
                tracing::trace!(store = &self.name, container, ?page, "list_keys::ok");
                Ok(page)
            }
            Err(e) => {
                tracing::error!(store = &self.name, container, error=%e, "list_keys::failed");
                Err(e)
            }
        }
    }
}
