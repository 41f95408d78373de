use std::sync::Arc;

use azblob::{BlobStoreProvider, DynBlobStore};

use crate::{RestBlobStore, RestConfig};

/// [`BlobStoreProvider`] for the REST backend, handling `az://` URIs.
#[derive(Clone, Debug, Default)]
pub struct RestProvider;

impl RestProvider {
    pub fn new() -> Self {
        Self
    }
}

impl BlobStoreProvider for RestProvider {
    fn kind(&self) -> &str {
        RestBlobStore::KIND
    }

    fn build(&self, url: &url::Url) -> Result<DynBlobStore, anyhow::Error> {
        let config = RestConfig::from_uri(url.as_str())?;
        let store = RestBlobStore::new(config)?;
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use azblob::{BlobStore as _, BlobStoreBuilder};

    use super::*;

    #[test]
    fn test_provider_dispatch() {
        let mut builder = BlobStoreBuilder::new();
        builder.register_provider(RestProvider::new());

        let store = builder
            .build("az://myaccount.blob.core.windows.net/")
            .unwrap();
        assert_eq!(store.kind(), "az");
        assert_eq!(store.account(), "myaccount");

        assert!(builder.build("s3://bucket").is_err());
    }
}
