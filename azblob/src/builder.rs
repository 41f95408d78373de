use crate::{BlobStoreProvider, store::DynBlobStore};

/// Registry of [`BlobStoreProvider`]s, dispatching on the URI scheme.
pub struct BlobStoreBuilder {
    providers: Vec<Box<dyn BlobStoreProvider>>,
}

impl Default for BlobStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStoreBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    pub fn register_provider<P: BlobStoreProvider + 'static>(&mut self, provider: P) {
        self.providers.push(Box::new(provider));
    }

    pub fn with_provider(mut self, provider: Box<dyn BlobStoreProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn build(&self, uri: &str) -> Result<DynBlobStore, anyhow::Error> {
        let url = url::Url::parse(uri).map_err(|e| anyhow::anyhow!("Invalid URL: {}", e))?;

        for provider in &self.providers {
            if provider.kind() == url.scheme() {
                return provider.build(&url);
            }
        }
        Err(anyhow::anyhow!(
            "No suitable provider found for URI: {}",
            url
        ))
    }
}
