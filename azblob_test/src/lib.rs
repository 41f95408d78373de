//! Test helpers for testing blob store backends.
//!
//! Allows for unified testing to make sure all implementations conform to
//! the same behavior.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::{StreamExt as _, TryStreamExt as _};
use pretty_assertions::assert_eq;
use time::OffsetDateTime;
use uuid::Uuid;

use azblob::{
    BlobQuery, BlobStore, BlobStoreExt as _, DynBlobStore, ListArgs, MemoryInventoryCache,
    ObjectOpts, QueryGrammar, StorageObject, ValueStream,
};

fn test_container() -> String {
    format!("test-{}", Uuid::new_v4())
}

/// Ensures that a blob exists with the given value and plausible metadata.
///
/// Exercises all the different ways to retrieve the blob.
async fn expect_blob(store: &impl BlobStore, container: &str, key: &str, value: &Bytes) {
    eprintln!("Expecting blob: {container}/{key} with value {value:?}");

    let meta = store
        .meta(container, key)
        .await
        .expect("meta should be retrievable")
        .expect("meta should exist");
    assert_eq!(meta.key(), key);
    assert_eq!(meta.size, Some(value.len() as u64));

    let updated_at = meta.updated_at.expect("backend should report Last-Modified");
    let age = OffsetDateTime::now_utc() - updated_at;
    assert!(
        age.whole_seconds().abs() < 60,
        "Last-Modified should be recent, got {updated_at}"
    );

    let v0 = store
        .get(container, key)
        .await
        .expect("get should succeed")
        .expect("value should exist");
    assert_eq!(&v0, value, "value should match");

    let v1 = store
        .get_stream(container, key)
        .await
        .expect("get_stream should succeed")
        .expect("value should exist in stream")
        .try_collect::<BytesMut>()
        .await
        .expect("stream should collect successfully")
        .freeze();
    assert_eq!(&v1, value, "value should match in get_stream");
}

async fn test_single_blob_flow(store: &impl BlobStore, container: &str) {
    let prefix = Uuid::new_v4().to_string();
    let key = format!("{prefix}/{}", Uuid::new_v4());

    // Blob does not exist.
    {
        let keys = store.list_all_keys(container, &prefix).await.unwrap();
        assert!(keys.is_empty(), "list with prefix should be empty");

        let v0 = store.get(container, &key).await.unwrap();
        assert!(v0.is_none(), "blob should not exist before put");

        let m0 = store.meta(container, &key).await.unwrap();
        assert!(m0.is_none(), "meta should not exist before put");
    }

    // Put a value and retrieve it.
    {
        let value: Bytes = Uuid::new_v4().to_string().into();
        store.put_blob(container, &key).bytes(value.clone()).await.unwrap();

        let keys = store.list_all_keys(container, &prefix).await.unwrap();
        assert_eq!(
            keys,
            vec![key.clone()],
            "list with prefix should contain just the expected key"
        );

        expect_blob(store, container, &key, &value).await;
    }

    // Overwrite with a new value.
    {
        let value: Bytes = format!("{}_overwritten", Uuid::new_v4()).into();
        store.put_blob(container, &key).bytes(value.clone()).await.unwrap();
        expect_blob(store, container, &key, &value).await;
    }

    // Delete the blob and check it no longer exists. Deleting again must
    // be a no-op.
    {
        store.delete(container, &key).await.unwrap();
        store.delete(container, &key).await.unwrap();

        let keys = store.list_all_keys(container, &prefix).await.unwrap();
        assert_eq!(keys, Vec::<String>::new(), "list should be empty after delete");

        let v = store.get(container, &key).await.unwrap();
        assert!(v.is_none(), "blob should not exist after delete");

        let m = store.meta(container, &key).await.unwrap();
        assert!(m.is_none(), "meta should not exist after delete");
    }

    // Do the same again with a stream put.
    {
        let value: Bytes = format!("{}_streamed", Uuid::new_v4()).into();
        let chunks: Vec<Result<Bytes, anyhow::Error>> = value
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let stream: ValueStream = futures::stream::iter(chunks).boxed();
        store.put_blob(container, &key).stream(stream).await.unwrap();

        expect_blob(store, container, &key, &value).await;

        store.delete(container, &key).await.unwrap();
    }
}

async fn test_listing(store: &impl BlobStore, container: &str) {
    let prefix = Uuid::new_v4().to_string();

    let keys: Vec<String> = (0..5).map(|i| format!("{prefix}/key{i}")).collect();
    for key in &keys {
        store.put_blob(container, key).text(format!("value for {key}")).await.unwrap();
    }
    // An unrelated key outside the prefix.
    let outsider = format!("other-{prefix}");
    store.put_blob(container, &outsider).text("outside").await.unwrap();

    // Prefix filtering.
    let mut listed = store.list_all_keys(container, &prefix).await.unwrap();
    listed.sort();
    assert_eq!(listed, keys);

    // Pagination: small pages must cover the same set.
    let mut paged = Vec::new();
    let mut cursor = None;
    loop {
        let args = ListArgs::new()
            .with_prefix(&prefix)
            .with_limit(2)
            .with_cursor_opt(cursor);
        let page = store.list_keys(container, args).await.unwrap();
        assert!(page.items.len() <= 2, "page must respect the limit");
        paged.extend(page.items);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    paged.sort();
    paged.dedup();
    assert_eq!(paged, keys);

    // Metadata listing carries sizes.
    let metas = store.list_all(container, &prefix).await.unwrap();
    assert_eq!(metas.len(), keys.len());
    for meta in &metas {
        assert!(meta.size.is_some(), "listing should report sizes");
    }

    // delete_prefix removes the group but not the outsider.
    store.delete_prefix(container, &prefix).await.unwrap();
    let listed = store.list_all_keys(container, &prefix).await.unwrap();
    assert!(listed.is_empty());
    let v = store.get(container, &outsider).await.unwrap();
    assert!(v.is_some(), "unrelated key must survive delete_prefix");

    store.delete(container, &outsider).await.unwrap();
}

/// Test a [`BlobStore`] implementation.
///
/// Creates a uniquely named container and exercises the full operation
/// surface against it.
pub async fn test_blob_store(store: &impl BlobStore) {
    store.healthcheck().await.expect("health check");

    let container = test_container();

    assert!(
        !store.container_exists(&container).await.unwrap(),
        "fresh container name should not exist yet"
    );

    store.create_container(&container).await.unwrap();
    assert!(store.container_exists(&container).await.unwrap());

    // Creating an existing container is a no-op.
    store.create_container(&container).await.unwrap();

    // A fresh container lists as empty.
    let page = store
        .list(&container, ListArgs::new())
        .await
        .unwrap();
    assert_eq!(page.items, vec![]);
    assert_eq!(page.next_cursor, None);

    test_single_blob_flow(store, &container).await;
    test_listing(store, &container).await;

    // Keys with nested slashes and spaces round-trip.
    let key = "nested/dir/file with space.txt";
    let value: Bytes = "odd keys are fine".into();
    store.put_blob(&container, key).bytes(value.clone()).await.unwrap();
    expect_blob(store, &container, key, &value).await;
    store.delete(&container, key).await.unwrap();
}

fn object(
    store: &DynBlobStore,
    query: &str,
    opts: ObjectOpts,
) -> StorageObject {
    let query = BlobQuery::parse(query, QueryGrammar::AccountInQuery).expect("query should parse");
    StorageObject::new(store.clone(), query, opts).expect("accounts should match")
}

/// Test the [`StorageObject`] layer on top of a [`BlobStore`]
/// implementation.
pub async fn test_storage_object<S: BlobStore + 'static>(store: Arc<S>) {
    let store: DynBlobStore = store;
    let account = store.account().to_string();
    let container = test_container();
    store.create_container(&container).await.unwrap();

    // Seed a small tree. Sizes are fixed so the aggregates are exact.
    store
        .put_blob(&container, "dir/a.txt")
        .bytes(Bytes::from(vec![b'a'; 10]))
        .await
        .unwrap();
    store
        .put_blob(&container, "dir/sub/b.txt")
        .bytes(Bytes::from(vec![b'b'; 20]))
        .await
        .unwrap();
    store
        .put_blob(&container, "file.txt")
        .text("hello world")
        .await
        .unwrap();

    let opts = ObjectOpts::default();

    // A query naming a different account must not bind.
    {
        let query = BlobQuery::parse(
            &format!("az://not-{account}/{container}/file.txt"),
            QueryGrammar::AccountInQuery,
        )
        .unwrap();
        let err = StorageObject::new(store.clone(), query, opts).unwrap_err();
        assert!(err.to_string().contains("account mismatch"), "got: {err}");
    }

    // Exact blob.
    {
        let obj = object(&store, &format!("az://{account}/{container}/file.txt"), opts);
        assert!(!obj.is_prefix().await.unwrap());
        assert!(obj.exists().await.unwrap());
        assert_eq!(obj.size().await.unwrap(), "hello world".len() as u64);
        obj.mtime().await.expect("mtime should be reported");
        assert_eq!(obj.local_suffix(), format!("{container}/file.txt"));
    }

    // Directory-like prefix: aggregates over descendants.
    {
        let obj = object(&store, &format!("az://{account}/{container}/dir"), opts);
        assert!(obj.is_prefix().await.unwrap());
        // Memoized: asking again must agree.
        assert!(obj.is_prefix().await.unwrap());
        assert!(obj.exists().await.unwrap());
        assert_eq!(obj.size().await.unwrap(), 30, "size must sum over descendants");

        let mtime = obj.mtime().await.unwrap();
        let age = OffsetDateTime::now_utc() - mtime;
        assert!(age.whole_seconds().abs() < 60);
    }

    // Absent object.
    {
        let obj = object(&store, &format!("az://{account}/{container}/no-such"), opts);
        assert!(!obj.exists().await.unwrap());
        assert!(obj.size().await.unwrap_err().is_not_found());
        assert!(obj.mtime().await.unwrap_err().is_not_found());
        // Removing an absent blob is a no-op.
        obj.remove().await.unwrap();
    }

    // An absent container means an absent object, not an error.
    {
        let obj = object(
            &store,
            &format!("az://{account}/no-such-container-{}/x", Uuid::new_v4()),
            opts,
        );
        assert!(!obj.exists().await.unwrap());
    }

    // Retrieve a single blob to a local file.
    let tmp = tempfile::tempdir().expect("tempdir");
    {
        let obj = object(&store, &format!("az://{account}/{container}/file.txt"), opts);
        let dest = tmp.path().join("downloaded.txt");
        obj.retrieve(&dest).await.unwrap();
        let data = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(data, b"hello world");
    }

    // Retrieve a prefix: the tree is mirrored below dest.
    {
        let obj = object(&store, &format!("az://{account}/{container}/dir"), opts);
        let dest = tmp.path().join("mirror");
        obj.retrieve(&dest).await.unwrap();
        let a = tokio::fs::read(dest.join("a.txt")).await.unwrap();
        assert_eq!(a.len(), 10);
        let b = tokio::fs::read(dest.join("sub/b.txt")).await.unwrap();
        assert_eq!(b.len(), 20);
    }

    // Store a single local file, then remove it.
    {
        let src = tmp.path().join("upload.txt");
        tokio::fs::write(&src, b"uploaded").await.unwrap();

        let obj = object(&store, &format!("az://{account}/{container}/up/loaded.txt"), opts);
        obj.store(&src).await.unwrap();
        assert!(obj.exists().await.unwrap());
        assert_eq!(obj.size().await.unwrap(), 8);

        obj.remove().await.unwrap();
        obj.remove().await.unwrap();
        let fresh = object(&store, &format!("az://{account}/{container}/up/loaded.txt"), opts);
        assert!(!fresh.exists().await.unwrap());
    }

    // Store a local directory tree.
    {
        let src = tmp.path().join("tree");
        tokio::fs::create_dir_all(src.join("inner")).await.unwrap();
        tokio::fs::write(src.join("one.txt"), b"1").await.unwrap();
        tokio::fs::write(src.join("inner/two.txt"), b"22").await.unwrap();

        let obj = object(&store, &format!("az://{account}/{container}/uptree"), opts);
        obj.store(&src).await.unwrap();

        let mut keys = store
            .list_all_keys(&container, "uptree/")
            .await
            .unwrap();
        keys.sort();
        assert_eq!(keys, vec![
            "uptree/inner/two.txt".to_string(),
            "uptree/one.txt".to_string(),
        ]);

        let fresh = object(&store, &format!("az://{account}/{container}/uptree"), opts);
        assert_eq!(fresh.size().await.unwrap(), 3);

        store.delete_prefix(&container, "uptree/").await.unwrap();
    }

    // Candidate matches cover every key, as normalized queries.
    {
        let obj = object(&store, &format!("az://{account}/{container}/file.txt"), opts);
        let candidates = obj.list_candidate_matches().await.unwrap();
        assert!(candidates.contains(&format!("az://{account}/{container}/file.txt")));
        assert!(candidates.contains(&format!("az://{account}/{container}/dir/a.txt")));
    }

    // Inventory records the container and every blob in it.
    {
        let cache = MemoryInventoryCache::new();
        let obj = object(&store, &format!("az://{account}/{container}/dir"), opts);
        obj.inventory(&cache).await.unwrap();

        let entry = cache.get(&container).await.expect("container entry");
        assert!(entry.exists);

        let entry = cache
            .get(&format!("{container}/dir/a.txt"))
            .await
            .expect("blob entry");
        assert!(entry.exists);
        assert_eq!(entry.size, Some(10));
        assert!(entry.mtime.is_some());
    }

    // With directory semantics off, a prefix is not an object.
    {
        let opts = ObjectOpts {
            directory_semantics: false,
        };
        let obj = object(&store, &format!("az://{account}/{container}/dir"), opts);
        assert!(!obj.is_prefix().await.unwrap());
        assert!(!obj.exists().await.unwrap());
    }

    // Cleanup.
    store.delete_prefix(&container, "").await.unwrap();
    let keys = store.list_all_keys(&container, "").await.unwrap();
    assert!(keys.is_empty());
}
