use std::collections::HashMap;

use time::OffsetDateTime;
use tokio::sync::RwLock;

/// One inventory record: what is known about a storage location without
/// having to ask the backend again.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InventoryEntry {
    pub exists: bool,
    pub size: Option<u64>,
    pub mtime: Option<OffsetDateTime>,
}

impl InventoryEntry {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn present(size: Option<u64>, mtime: Option<OffsetDateTime>) -> Self {
        Self {
            exists: true,
            size,
            mtime,
        }
    }
}

/// A host-owned cache of inventory records, keyed by local suffix
/// (`<container>/<path>`).
///
/// The storage layer populates it opportunistically so the host can skip
/// redundant network calls; population is best-effort and the cache format
/// beyond this interface is the host's concern.
#[async_trait::async_trait]
pub trait InventoryCache: Send + Sync {
    async fn record(&self, key: &str, entry: InventoryEntry);
}

/// Simple in-memory [`InventoryCache`], mainly useful in tests.
#[derive(Debug, Default)]
pub struct MemoryInventoryCache {
    entries: RwLock<HashMap<String, InventoryEntry>>,
}

impl MemoryInventoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<InventoryEntry> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl InventoryCache for MemoryInventoryCache {
    async fn record(&self, key: &str, entry: InventoryEntry) {
        self.entries.write().await.insert(key.to_string(), entry);
    }
}
