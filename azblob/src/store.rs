use std::sync::Arc;

use bytes::Bytes;
use futures::{StreamExt as _, TryStreamExt as _, stream};

use crate::{BlobMeta, BlobMetaPage, DataSource, KeyPage, KeyStream, ListArgs, Put, StoreError, ValueStream};

/// Abstraction over one blob storage account: named containers holding
/// keyed blobs.
///
/// Every operation is safe to re-invoke; a host-supplied retry wrapper may
/// call any of them more than once. Implementations add no atomicity
/// guarantees beyond what the backing service provides.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    /// Get a descriptive name for the backend implementation.
    ///
    /// eg: "memory", "az-rest", ...
    fn kind(&self) -> &str;

    /// The storage account this store is bound to.
    fn account(&self) -> &str;

    /// Get a "safe" URI for the store, which does not include any sensitive
    /// information like access keys or SAS tokens.
    fn safe_uri(&self) -> &url::Url;

    /// Checks if the store is usable.
    ///
    /// May perform upstream service requests to validate connectivity and
    /// credentials.
    async fn healthcheck(&self) -> Result<(), StoreError>;

    /// Whether the container exists.
    async fn container_exists(&self, container: &str) -> Result<bool, StoreError>;

    /// Create the container. Creating an existing container is a no-op.
    async fn create_container(&self, container: &str) -> Result<(), StoreError>;

    /// Get metadata for a given key. `None` if the blob does not exist.
    async fn meta(&self, container: &str, key: &str) -> Result<Option<BlobMeta>, StoreError>;

    /// Get the value for a given key. `None` if the blob does not exist.
    async fn get(&self, container: &str, key: &str) -> Result<Option<Bytes>, StoreError>;

    async fn get_stream(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<ValueStream>, StoreError>;

    /// Store a value under a given key, overwriting any existing blob.
    async fn put(&self, container: &str, put: Put) -> Result<BlobMeta, StoreError>;

    /// Delete a key. Deleting an absent key is a no-op.
    async fn delete(&self, container: &str, key: &str) -> Result<(), StoreError>;

    /// Delete all keys with a given prefix.
    async fn delete_prefix(&self, container: &str, prefix: &str) -> Result<(), StoreError>;

    /// List blob metadata in a container.
    ///
    /// The arguments allow for prefix filtering, pagination, and limiting
    /// the number of results.
    async fn list(&self, container: &str, args: ListArgs) -> Result<BlobMetaPage, StoreError>;

    /// List keys in a container.
    ///
    /// In contrast to [`Self::list`], this returns only the keys, not
    /// their metadata.
    async fn list_keys(&self, container: &str, args: ListArgs) -> Result<KeyPage, StoreError> {
        let page = self.list(container, args).await?;
        Ok(KeyPage {
            items: page.items.into_iter().map(|meta| meta.key).collect(),
            next_cursor: page.next_cursor,
        })
    }

    fn list_keys_stream<'a>(&'a self, container: &'a str, args: ListArgs) -> KeyStream<'a> {
        let init = Some(args.clone());
        let page_stream = stream::try_unfold(init, move |state| async move {
            if let Some(args) = state {
                let page = self.list_keys(container, args.clone()).await?;
                let next = page
                    .next_cursor
                    .as_ref()
                    .map(|c| args.clone().with_cursor(c.clone()));
                Ok(Some((page, next)))
            } else {
                Ok(None)
            }
        });
        Box::pin(page_stream)
    }

    /// List all the keys, optionally filtered by a prefix.
    ///
    /// NOTE: this method will paginate through all keys, and accumulates
    /// the results in memory.
    ///
    /// Use with caution.
    async fn list_all_keys(&self, container: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let args = ListArgs::new().with_prefix(prefix);
        self.list_keys_stream(container, args)
            .map_ok(|v| v.items)
            .try_concat()
            .await
    }

    /// List metadata for all keys sharing a prefix.
    ///
    /// Paginates through the whole match set and accumulates it in memory.
    async fn list_all(&self, container: &str, prefix: &str) -> Result<Vec<BlobMeta>, StoreError> {
        let mut out = Vec::new();
        let mut cursor = None;
        loop {
            let args = ListArgs::new()
                .with_prefix(prefix)
                .with_cursor_opt(cursor);
            let page = self.list(container, args).await?;
            out.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl<K: BlobStore> BlobStore for Arc<K> {
    fn kind(&self) -> &str {
        self.as_ref().kind()
    }

    fn account(&self) -> &str {
        self.as_ref().account()
    }

    fn safe_uri(&self) -> &url::Url {
        self.as_ref().safe_uri()
    }

    async fn healthcheck(&self) -> Result<(), StoreError> {
        self.as_ref().healthcheck().await
    }

    async fn container_exists(&self, container: &str) -> Result<bool, StoreError> {
        self.as_ref().container_exists(container).await
    }

    async fn create_container(&self, container: &str) -> Result<(), StoreError> {
        self.as_ref().create_container(container).await
    }

    async fn meta(&self, container: &str, key: &str) -> Result<Option<BlobMeta>, StoreError> {
        self.as_ref().meta(container, key).await
    }

    async fn get(&self, container: &str, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.as_ref().get(container, key).await
    }

    async fn get_stream(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<ValueStream>, StoreError> {
        self.as_ref().get_stream(container, key).await
    }

    async fn put(&self, container: &str, put: Put) -> Result<BlobMeta, StoreError> {
        self.as_ref().put(container, put).await
    }

    async fn delete(&self, container: &str, key: &str) -> Result<(), StoreError> {
        self.as_ref().delete(container, key).await
    }

    async fn delete_prefix(&self, container: &str, prefix: &str) -> Result<(), StoreError> {
        self.as_ref().delete_prefix(container, prefix).await
    }

    async fn list(&self, container: &str, args: ListArgs) -> Result<BlobMetaPage, StoreError> {
        self.as_ref().list(container, args).await
    }

    async fn list_keys(&self, container: &str, args: ListArgs) -> Result<KeyPage, StoreError> {
        self.as_ref().list_keys(container, args).await
    }
}

pub type DynBlobStore = Arc<dyn BlobStore>;

#[async_trait::async_trait]
impl BlobStore for DynBlobStore {
    fn kind(&self) -> &str {
        self.as_ref().kind()
    }

    fn account(&self) -> &str {
        self.as_ref().account()
    }

    fn safe_uri(&self) -> &url::Url {
        self.as_ref().safe_uri()
    }

    async fn healthcheck(&self) -> Result<(), StoreError> {
        self.as_ref().healthcheck().await
    }

    async fn container_exists(&self, container: &str) -> Result<bool, StoreError> {
        self.as_ref().container_exists(container).await
    }

    async fn create_container(&self, container: &str) -> Result<(), StoreError> {
        self.as_ref().create_container(container).await
    }

    async fn meta(&self, container: &str, key: &str) -> Result<Option<BlobMeta>, StoreError> {
        self.as_ref().meta(container, key).await
    }

    async fn get(&self, container: &str, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.as_ref().get(container, key).await
    }

    async fn get_stream(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<ValueStream>, StoreError> {
        self.as_ref().get_stream(container, key).await
    }

    async fn put(&self, container: &str, put: Put) -> Result<BlobMeta, StoreError> {
        self.as_ref().put(container, put).await
    }

    async fn delete(&self, container: &str, key: &str) -> Result<(), StoreError> {
        self.as_ref().delete(container, key).await
    }

    async fn delete_prefix(&self, container: &str, prefix: &str) -> Result<(), StoreError> {
        self.as_ref().delete_prefix(container, prefix).await
    }

    async fn list(&self, container: &str, args: ListArgs) -> Result<BlobMetaPage, StoreError> {
        self.as_ref().list(container, args).await
    }

    async fn list_keys(&self, container: &str, args: ListArgs) -> Result<KeyPage, StoreError> {
        self.as_ref().list_keys(container, args).await
    }
}

pub struct PutBuilder<'a, S> {
    store: &'a S,
    container: String,
    key: String,
    content_type: Option<String>,
}

impl<'a, S> PutBuilder<'a, S>
where
    S: BlobStore,
{
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn build(self, data: impl Into<DataSource>) -> (String, Put) {
        let mut put = Put::new(self.key, data.into());
        put.content_type = self.content_type;
        (self.container, put)
    }

    pub async fn send(self, data: impl Into<DataSource>) -> Result<BlobMeta, StoreError> {
        let store = self.store;
        let (container, put) = self.build(data);
        store.put(&container, put).await
    }

    pub async fn text(self, text: impl Into<String>) -> Result<BlobMeta, StoreError> {
        let data = Bytes::from(text.into());
        self.send(DataSource::Data(data)).await
    }

    pub async fn bytes(self, data: impl Into<Bytes>) -> Result<BlobMeta, StoreError> {
        self.send(DataSource::Data(data.into())).await
    }

    pub async fn stream<D, E>(
        self,
        stream: impl futures::Stream<Item = Result<D, E>> + Send + 'static,
    ) -> Result<BlobMeta, StoreError>
    where
        Bytes: From<D>,
        anyhow::Error: From<E>,
        E: Send + 'static,
    {
        let stream: ValueStream = stream
            .map_ok(|item: D| Bytes::from(item))
            .map_err(anyhow::Error::from)
            .boxed();

        self.send(DataSource::Stream(stream)).await
    }
}

pub trait BlobStoreExt: BlobStore
where
    Self: Sized,
{
    fn put_blob(&self, container: &str, key: &str) -> PutBuilder<'_, Self> {
        PutBuilder {
            store: self,
            container: container.to_string(),
            key: key.to_string(),
            content_type: None,
        }
    }
}

impl<S: BlobStore> BlobStoreExt for S {}
