mod provider;

pub use self::provider::MemoryProvider;

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use bytes::{Bytes, BytesMut};
use futures::TryStreamExt as _;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use azblob::{
    BlobMeta, BlobMetaPage, BlobStore, DataSource, ListArgs, Put, StoreError, ValueStream,
};
use url::Url;

/// In-memory [`BlobStore`] implementation.
///
/// Stands in for the blob service (or the local emulator) in tests.
/// Supports concurrent access.
#[derive(Clone)]
pub struct MemoryBlobStore {
    state: State,
    account: String,
    safe_uri: Url,
}

impl std::fmt::Debug for MemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlobStore")
            .field("account", &self.account)
            .finish()
    }
}

#[derive(Clone)]
struct Item {
    data: Bytes,
    meta: BlobMeta,
}

#[derive(Clone)]
struct State {
    // Containers exist independently of their blobs, so a freshly created
    // container is present with an empty map.
    containers: Arc<RwLock<HashMap<String, BTreeMap<String, Item>>>>,
}

impl MemoryBlobStore {
    /// The kind of this blob store (see [`BlobStore::kind`]).
    pub const KIND: &'static str = "memory";

    /// Default account name, matching the local emulator convention.
    pub const DEFAULT_ACCOUNT: &'static str = "devstoreaccount1";

    pub fn new() -> Self {
        Self::with_account(Self::DEFAULT_ACCOUNT)
    }

    pub fn with_account(account: impl Into<String>) -> Self {
        let account = account.into();
        let safe_uri = format!("memory://{account}")
            .parse()
            .expect("invalid URL for MemoryBlobStore");
        Self {
            state: State {
                containers: Arc::new(RwLock::new(HashMap::new())),
            },
            account,
            safe_uri,
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn account(&self) -> &str {
        &self.account
    }

    fn safe_uri(&self) -> &Url {
        &self.safe_uri
    }

    async fn healthcheck(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn container_exists(&self, container: &str) -> Result<bool, StoreError> {
        Ok(self.state.containers.read().await.contains_key(container))
    }

    async fn create_container(&self, container: &str) -> Result<(), StoreError> {
        self.state
            .containers
            .write()
            .await
            .entry(container.to_string())
            .or_default();
        Ok(())
    }

    async fn meta(&self, container: &str, key: &str) -> Result<Option<BlobMeta>, StoreError> {
        let meta = self
            .state
            .containers
            .read()
            .await
            .get(container)
            .and_then(|blobs| blobs.get(key))
            .map(|item| item.meta.clone());
        Ok(meta)
    }

    async fn get(&self, container: &str, key: &str) -> Result<Option<Bytes>, StoreError> {
        let bytes = self
            .state
            .containers
            .read()
            .await
            .get(container)
            .and_then(|blobs| blobs.get(key))
            .map(|item| item.data.clone());
        Ok(bytes)
    }

    async fn get_stream(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<ValueStream>, StoreError> {
        if let Some(value) = self.get(container, key).await? {
            let stream = futures::stream::once(async move { Ok(value) });
            Ok(Some(Box::pin(stream)))
        } else {
            Ok(None)
        }
    }

    async fn put(&self, container: &str, put: Put) -> Result<BlobMeta, StoreError> {
        use sha2::Digest;

        let value = match put.data {
            DataSource::Data(bytes) => bytes,
            DataSource::Stream(stream) => {
                let data = stream
                    .try_collect::<BytesMut>()
                    .await
                    .map_err(StoreError::Backend)?;
                data.freeze()
            }
        };

        let digest = sha2::Sha256::digest(&value);

        // Use the sha256 hash as the etag.
        let etag = format!("sha256:{digest:x}");

        let mut meta = BlobMeta::new(put.key.clone());
        meta.size = Some(value.len() as u64);
        meta.etag = Some(etag);
        meta.updated_at = Some(OffsetDateTime::now_utc());
        meta.content_type = put.content_type;

        self.state
            .containers
            .write()
            .await
            .entry(container.to_string())
            .or_default()
            .insert(
                put.key,
                Item {
                    data: value,
                    meta: meta.clone(),
                },
            );
        Ok(meta)
    }

    async fn delete(&self, container: &str, key: &str) -> Result<(), StoreError> {
        if let Some(blobs) = self.state.containers.write().await.get_mut(container) {
            blobs.remove(key);
        }
        Ok(())
    }

    async fn delete_prefix(&self, container: &str, prefix: &str) -> Result<(), StoreError> {
        if let Some(blobs) = self.state.containers.write().await.get_mut(container) {
            blobs.retain(|key, _value| !key.starts_with(prefix));
        }
        Ok(())
    }

    async fn list(&self, container: &str, args: ListArgs) -> Result<BlobMetaPage, StoreError> {
        let containers = self.state.containers.read().await;
        let Some(blobs) = containers.get(container) else {
            return Ok(BlobMetaPage {
                items: Vec::new(),
                next_cursor: None,
            });
        };

        let limit = args.limit().unwrap_or(1_000) as usize;
        let prefix = args.prefix().unwrap_or_default().to_owned();

        let items: Vec<BlobMeta> = {
            let iter = blobs
                .range(prefix.clone()..)
                .take_while(|(key, _value)| key.starts_with(&prefix));

            if let Some(cursor) = args.cursor() {
                let cursor = cursor.to_owned();
                iter.skip_while(|(key, _value)| key <= &&cursor)
                    .take(limit)
                    .map(|(_key, item)| item.meta.clone())
                    .collect()
            } else {
                iter.take(limit)
                    .map(|(_key, item)| item.meta.clone())
                    .collect()
            }
        };

        let next_cursor = if items.len() >= limit {
            items.last().map(|item| item.key().to_owned())
        } else {
            None
        };

        Ok(BlobMetaPage { items, next_cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_conformance() {
        azblob_test::test_blob_store(&MemoryBlobStore::new()).await;
    }

    #[tokio::test]
    async fn test_memory_storage_objects() {
        azblob_test::test_storage_object(Arc::new(MemoryBlobStore::new())).await;
    }
}
