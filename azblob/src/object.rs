use std::path::{Path, PathBuf};

use anyhow::Context as _;
use bytes::Bytes;
use futures::TryStreamExt as _;
use time::OffsetDateTime;
use tokio::{io::AsyncWriteExt as _, sync::OnceCell};

use crate::{
    AddressError, BlobMeta, BlobQuery, BlobStore, DynBlobStore, InventoryCache, InventoryEntry,
    Put, StoreError,
};

/// Behavior switches for a [`StorageObject`].
#[derive(Clone, Copy, Debug)]
pub struct ObjectOpts {
    /// Whether a path with descendant keys (`path/...`) is treated as a
    /// directory tree. When disabled, every query addresses exactly one
    /// blob.
    pub directory_semantics: bool,
}

impl Default for ObjectOpts {
    fn default() -> Self {
        Self {
            directory_semantics: true,
        }
    }
}

/// A query bound to a concrete store: one blob, or a directory-like prefix.
///
/// The directory flag is computed lazily, at most once, and cached for the
/// lifetime of this instance only; backend contents are assumed not to
/// change concurrently with a single host run using the object. Distinct
/// objects never share that state, so the host may operate on different
/// objects from parallel tasks.
#[derive(Debug)]
pub struct StorageObject {
    store: DynBlobStore,
    query: BlobQuery,
    opts: ObjectOpts,
    is_prefix: OnceCell<bool>,
}

impl StorageObject {
    /// Bind a parsed query to a store.
    ///
    /// Fails when the query names an account other than the one the store
    /// was configured for. A query must never silently address a different
    /// account.
    pub fn new(
        store: DynBlobStore,
        query: BlobQuery,
        opts: ObjectOpts,
    ) -> Result<Self, AddressError> {
        if let Some(account) = query.account() {
            if account != store.account() {
                return Err(AddressError::AccountMismatch {
                    query_account: account.to_string(),
                    store_account: store.account().to_string(),
                });
            }
        }

        Ok(Self {
            store,
            query,
            opts,
            is_prefix: OnceCell::new(),
        })
    }

    pub fn query(&self) -> &BlobQuery {
        &self.query
    }

    fn container(&self) -> &str {
        self.query.container()
    }

    fn path(&self) -> &str {
        self.query.path()
    }

    /// The trailing-slash-delimited prefix under which descendants live.
    fn descendant_prefix(&self) -> String {
        let path = self.path();
        if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        }
    }

    /// A unique suffix for the local staging path of this object.
    pub fn local_suffix(&self) -> String {
        format!("{}/{}", self.container(), self.path())
    }

    fn local_suffix_for(&self, key: &str) -> String {
        format!("{}/{}", self.container(), key)
    }

    /// The cache key of the container this object lives in.
    pub fn inventory_parent(&self) -> String {
        self.container().to_string()
    }

    /// Whether the address denotes a directory-like prefix: at least one
    /// stored key starts with `path + "/"`, not counting a marker key
    /// exactly equal to the prefix itself.
    ///
    /// Computed once and memoized for this instance.
    pub async fn is_prefix(&self) -> Result<bool, StoreError> {
        if !self.opts.directory_semantics {
            return Ok(false);
        }

        let flag = self
            .is_prefix
            .get_or_try_init(|| async {
                let prefix = self.descendant_prefix();
                let mut cursor = None;
                loop {
                    let args = crate::ListArgs::new()
                        .with_prefix(&prefix)
                        .with_cursor_opt(cursor);
                    let page = self.store.list_keys(self.container(), args).await?;
                    if page.items.iter().any(|key| key != &prefix) {
                        return Ok::<_, StoreError>(true);
                    }
                    match page.next_cursor {
                        Some(next) => cursor = Some(next),
                        None => return Ok(false),
                    }
                }
            })
            .await?;
        Ok(*flag)
    }

    /// Metadata of every descendant entry, excluding a bare marker key.
    async fn descendant_metas(&self) -> Result<Vec<BlobMeta>, StoreError> {
        let prefix = self.descendant_prefix();
        let mut metas = self.store.list_all(self.container(), &prefix).await?;
        metas.retain(|meta| meta.key != prefix);
        Ok(metas)
    }

    /// Whether the object exists: the exact blob, or, with directory
    /// semantics, a prefix with at least one descendant.
    ///
    /// Absence is a normal negative result, not an error.
    pub async fn exists(&self) -> Result<bool, StoreError> {
        if !self.store.container_exists(self.container()).await? {
            return Ok(false);
        }
        if self.store.meta(self.container(), self.path()).await?.is_some() {
            return Ok(true);
        }
        self.is_prefix().await
    }

    /// Modification time: the blob's Last-Modified, or, for a prefix, the
    /// maximum across matched entries.
    pub async fn mtime(&self) -> Result<OffsetDateTime, StoreError> {
        if self.is_prefix().await? {
            let max = self
                .descendant_metas()
                .await?
                .into_iter()
                .filter_map(|meta| meta.updated_at)
                .max();
            return max.ok_or_else(|| StoreError::NotFound(self.query.to_string()));
        }

        let meta = self.exact_meta().await?;
        meta.updated_at
            .ok_or_else(|| anyhow::anyhow!("backend reported no modification time for '{}'", self.query).into())
    }

    /// Size in bytes: the blob's size, or, for a prefix, the sum across
    /// matched entries.
    pub async fn size(&self) -> Result<u64, StoreError> {
        if self.is_prefix().await? {
            let metas = self.descendant_metas().await?;
            if metas.is_empty() {
                return Err(StoreError::NotFound(self.query.to_string()));
            }
            return Ok(metas.iter().map(|meta| meta.size.unwrap_or(0)).sum());
        }

        let meta = self.exact_meta().await?;
        Ok(meta.size.unwrap_or(0))
    }

    async fn exact_meta(&self) -> Result<BlobMeta, StoreError> {
        self.store
            .meta(self.container(), self.path())
            .await?
            .ok_or_else(|| StoreError::NotFound(self.query.to_string()))
    }

    /// Download the object to `dest`.
    ///
    /// A single blob is written to the `dest` file; a prefix is mirrored
    /// below `dest`, one file per descendant key, relative to `path`.
    pub async fn retrieve(&self, dest: &Path) -> Result<(), StoreError> {
        if self.is_prefix().await? {
            let prefix = self.descendant_prefix();
            for meta in self.descendant_metas().await? {
                let rel = meta
                    .key
                    .strip_prefix(&prefix)
                    .unwrap_or(meta.key.as_str())
                    .to_string();
                let target = dest.join(&rel);
                self.download_blob(&meta.key, &target).await?;
            }
            tracing::debug!(query = %self.query, dest = %dest.display(), "retrieved prefix");
            return Ok(());
        }

        self.download_blob(self.path(), dest).await?;
        tracing::debug!(query = %self.query, dest = %dest.display(), "retrieved blob");
        Ok(())
    }

    async fn download_blob(&self, key: &str, target: &Path) -> Result<(), StoreError> {
        let stream = self
            .store
            .get_stream(self.container(), key)
            .await?
            .ok_or_else(|| StoreError::NotFound(self.local_suffix_for(key)))?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(target).await?;
        let mut stream = stream;
        while let Some(chunk) = stream.try_next().await.map_err(StoreError::Backend)? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    /// Upload the local file or directory at `src`.
    ///
    /// The container is created when missing. A permission-denied on the
    /// create is tolerated so that pre-created containers usable with a
    /// narrowly scoped credential keep working.
    pub async fn store(&self, src: &Path) -> Result<(), StoreError> {
        if !self.store.container_exists(self.container()).await? {
            match self.store.create_container(self.container()).await {
                Ok(()) => {}
                Err(StoreError::PermissionDenied(reason)) => {
                    tracing::warn!(
                        container = self.container(),
                        %reason,
                        "no permission to create container, assuming it exists"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        let fs_meta = tokio::fs::metadata(src)
            .await
            .with_context(|| format!("local path '{}' is not accessible", src.display()))?;

        if fs_meta.is_dir() {
            let files = collect_files(src.to_path_buf()).await?;
            for file in files {
                let rel = file
                    .strip_prefix(src)
                    .expect("walked file is below the walk root")
                    .to_string_lossy()
                    .replace('\\', "/");
                let key = if self.path().is_empty() {
                    rel
                } else {
                    format!("{}/{}", self.path(), rel)
                };
                self.upload_file(&key, &file).await?;
            }
            tracing::debug!(query = %self.query, src = %src.display(), "stored directory");
            return Ok(());
        }

        self.upload_file(self.path(), src).await?;
        tracing::debug!(query = %self.query, src = %src.display(), "stored blob");
        Ok(())
    }

    async fn upload_file(&self, key: &str, file: &Path) -> Result<(), StoreError> {
        let data = tokio::fs::read(file)
            .await
            .with_context(|| format!("failed to read local file '{}'", file.display()))?;
        let put = Put::new(key, Bytes::from(data));
        self.store.put(self.container(), put).await?;
        Ok(())
    }

    /// Delete the exact blob. Removing an absent blob is a no-op, so the
    /// operation is safe to repeat.
    pub async fn remove(&self) -> Result<(), StoreError> {
        self.store.delete(self.container(), self.path()).await?;
        tracing::debug!(query = %self.query, "removed blob");
        Ok(())
    }

    /// All keys of the container, re-formed as normalized queries.
    ///
    /// Input for wildcard/glob resolution: the host matches its pattern
    /// against these concrete queries.
    pub async fn list_candidate_matches(&self) -> Result<Vec<String>, StoreError> {
        let keys = self.store.list_all_keys(self.container(), "").await?;
        let queries = keys
            .into_iter()
            .map(|key| match self.query.account() {
                Some(account) => format!("az://{}/{}/{}", account, self.container(), key),
                None => format!("az://{}/{}", self.container(), key),
            })
            .collect();
        Ok(queries)
    }

    /// Opportunistically record existence, size, and modification time for
    /// everything in this object's container.
    ///
    /// Best-effort: listing failures are logged and swallowed, the host
    /// falls back to per-object requests.
    pub async fn inventory(&self, cache: &dyn InventoryCache) -> Result<(), StoreError> {
        let container_present = self.store.container_exists(self.container()).await?;
        cache
            .record(
                &self.inventory_parent(),
                if container_present {
                    InventoryEntry::present(None, None)
                } else {
                    InventoryEntry::absent()
                },
            )
            .await;
        if !container_present {
            return Ok(());
        }

        match self.store.list_all(self.container(), "").await {
            Ok(metas) => {
                for meta in metas {
                    let key = self.local_suffix_for(&meta.key);
                    cache
                        .record(&key, InventoryEntry::present(meta.size, meta.updated_at))
                        .await;
                }
            }
            Err(err) => {
                tracing::warn!(
                    container = self.container(),
                    error = %err,
                    "inventory listing failed, skipping cache population"
                );
            }
        }
        Ok(())
    }
}

/// Recursively collect regular files below `root`, in directory order.
async fn collect_files(root: PathBuf) -> Result<Vec<PathBuf>, StoreError> {
    let mut out = Vec::new();
    let mut pending = vec![root];
    while let Some(dir) = pending.pop() {
        let mut iter = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = iter.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                pending.push(entry.path());
            } else if meta.is_file() {
                out.push(entry.path());
            }
        }
    }
    out.sort();
    Ok(out)
}
