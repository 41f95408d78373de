//! Conformance tests against a live endpoint.
//!
//! Gated on the `AZBLOB_TEST_URI` environment variable, e.g. for a local
//! Azurite emulator:
//!
//! ```text
//! AZBLOB_TEST_URI='az://127.0.0.1:10000/devstoreaccount1?insecure&access_key=<key>'
//! ```
//!
//! With `TEST_STRICT` set, a missing URI fails the test instead of
//! skipping it.

use std::sync::Arc;

use azblob_rest::{RestBlobStore, RestConfig};

fn live_store() -> Option<RestBlobStore> {
    let uri = match std::env::var("AZBLOB_TEST_URI") {
        Ok(uri) => uri,
        Err(_) => {
            if std::env::var("TEST_STRICT").is_ok() {
                panic!("TEST_STRICT is set, but AZBLOB_TEST_URI is not");
            }
            eprintln!("skipping live test: AZBLOB_TEST_URI is not set");
            return None;
        }
    };
    let config = RestConfig::from_uri(&uri).expect("invalid AZBLOB_TEST_URI");
    Some(RestBlobStore::new(config).expect("could not construct store"))
}

#[tokio::test]
async fn test_live_store_conformance() {
    let Some(store) = live_store() else {
        return;
    };
    azblob_test::test_blob_store(&store).await;
}

#[tokio::test]
async fn test_live_storage_objects() {
    let Some(store) = live_store() else {
        return;
    };
    azblob_test::test_storage_object(Arc::new(store)).await;
}
