use std::sync::Arc;

use azblob::BlobStoreProvider;

pub struct MemoryProvider;

impl BlobStoreProvider for MemoryProvider {
    fn kind(&self) -> &str {
        "memory"
    }

    fn build(&self, url: &url::Url) -> Result<azblob::DynBlobStore, anyhow::Error> {
        if url.scheme() != self.kind() {
            return Err(anyhow::anyhow!(
                "Invalid scheme: expected '{}', got '{}'",
                self.kind(),
                url.scheme()
            ));
        }

        // `memory://<account>` - the host names the simulated account.
        let store = match url.host_str() {
            Some(account) if !account.is_empty() => {
                crate::MemoryBlobStore::with_account(account)
            }
            _ => crate::MemoryBlobStore::new(),
        };
        Ok(Arc::new(store) as azblob::DynBlobStore)
    }
}
