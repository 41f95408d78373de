use std::sync::Arc;

use anyhow::anyhow;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt as _;
use http::{Method, StatusCode, header};
use url::Url;

use azblob::{
    BlobMeta, BlobMetaPage, BlobStore, DataSource, ListArgs, Put, StoreError, ValueStream,
};

use crate::{
    RestConfig,
    auth::{API_VERSION, Credential, rfc1123_date},
    xml,
};

/// Streamed uploads are committed as a block list; each block carries at
/// most this many bytes.
const BLOCK_SIZE: usize = 8 * 1024 * 1024;

/// Blob storage backend speaking the service REST API over HTTP.
///
/// Works against both production endpoints and a local Azurite emulator,
/// authorized with Shared Key, a SAS token, or anonymously.
#[derive(Clone, Debug)]
pub struct RestBlobStore {
    state: Arc<State>,
}

struct State {
    account: String,
    base_url: Url,
    safe_uri: Url,
    credential: Credential,
    directory_semantics: bool,
    client: reqwest::Client,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("account", &self.account)
            .field("base_url", &self.base_url.as_str())
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

impl RestBlobStore {
    /// The kind of this blob store (see [`BlobStore::kind`]).
    ///
    /// Doubles as the configuration URI scheme.
    pub const KIND: &'static str = "az";

    pub fn new(config: RestConfig) -> Result<Self, anyhow::Error> {
        let credential = Credential::from_config(&config)?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow!("could not build HTTP client: {e}"))?;

        let base_url = config.endpoint.base_url().clone();
        // The endpoint base URL carries no credentials, so it can serve as
        // the redacted identity of the store.
        let safe_uri = base_url.clone();

        tracing::debug!(
            endpoint = %base_url,
            account = config.endpoint.account(),
            credential = ?credential,
            "constructed REST blob store",
        );

        Ok(Self {
            state: Arc::new(State {
                account: config.endpoint.account().to_string(),
                base_url,
                safe_uri,
                credential,
                directory_semantics: config.directory_semantics,
                client,
            }),
        })
    }

    /// Whether queries against this store may address a whole directory
    /// tree of blobs (see [`azblob::ObjectOpts`]).
    pub fn directory_semantics(&self) -> bool {
        self.state.directory_semantics
    }

    fn container_url(&self, container: &str) -> Result<Url, StoreError> {
        let mut url = self.state.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Backend(anyhow!("endpoint URL cannot be a base")))?
            .pop_if_empty()
            .push(container);
        Ok(url)
    }

    fn blob_url(&self, container: &str, key: &str) -> Result<Url, StoreError> {
        let mut url = self.container_url(container)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::Backend(anyhow!("endpoint URL cannot be a base")))?;
            // Push per path segment so slashes stay literal while each
            // segment is percent-encoded.
            for segment in key.split('/') {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    /// Build, sign, and send one request.
    ///
    /// The status code is not inspected here; callers interpret it per
    /// operation (404 means "absent" for some, an error for others).
    #[allow(clippy::too_many_arguments)]
    async fn send_request(
        &self,
        method: Method,
        mut url: Url,
        query_params: &[(&str, &str)],
        extra_ms_headers: &[(&str, &str)],
        content_type: &str,
        content_length: Option<usize>,
        body: Option<reqwest::Body>,
    ) -> Result<reqwest::Response, StoreError> {
        for (k, v) in query_params {
            url.query_pairs_mut().append_pair(k, v);
        }

        let date = rfc1123_date();
        let authorization = self.state.credential.authorization(
            method.as_str(),
            url.path(),
            content_length,
            content_type,
            &date,
            extra_ms_headers,
            query_params,
        )?;
        self.state.credential.append_sas(&mut url);

        let mut req = self
            .state
            .client
            .request(method, url)
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION);
        for (k, v) in extra_ms_headers {
            req = req.header(*k, *v);
        }
        if !content_type.is_empty() {
            req = req.header(header::CONTENT_TYPE, content_type);
        }
        if let Some(value) = authorization {
            req = req.header(header::AUTHORIZATION, value);
        }
        if let Some(body) = body {
            req = req.body(body);
        }

        let res = req
            .send()
            .await
            .map_err(|e| StoreError::Backend(anyhow!("request failed: {e}")))?;
        Ok(res)
    }

    /// Turn a non-success response into the matching [`StoreError`].
    async fn response_error(res: reqwest::Response, what: String) -> StoreError {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => StoreError::NotFound(what),
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => StoreError::PermissionDenied(what),
            _ => StoreError::Backend(anyhow!("{what}: status {status}: {body}")),
        }
    }

    async fn put_data(
        &self,
        container: &str,
        key: &str,
        content_type: Option<String>,
        data: Bytes,
    ) -> Result<BlobMeta, StoreError> {
        let url = self.blob_url(container, key)?;
        let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());
        let size = data.len();

        let res = self
            .send_request(
                Method::PUT,
                url,
                &[],
                &[("x-ms-blob-type", "BlockBlob")],
                &content_type,
                Some(size),
                Some(data.into()),
            )
            .await?;
        if !res.status().is_success() {
            return Err(Self::response_error(res, format!("put '{container}/{key}'")).await);
        }

        let mut meta = meta_from_headers(key, res.headers())?;
        meta.size = Some(size as u64);
        meta.content_type = Some(content_type);
        Ok(meta)
    }

    async fn put_stream(
        &self,
        container: &str,
        key: &str,
        content_type: Option<String>,
        stream: ValueStream,
    ) -> Result<BlobMeta, StoreError> {
        let mut stream = stream;
        let mut buf = BytesMut::new();
        let mut block_ids: Vec<String> = Vec::new();
        let mut total: u64 = 0;

        while let Some(chunk) = stream.try_next().await.map_err(StoreError::Backend)? {
            buf.extend_from_slice(&chunk);
            while buf.len() >= BLOCK_SIZE {
                let block = buf.split_to(BLOCK_SIZE).freeze();
                total += block.len() as u64;
                let id = block_id(block_ids.len());
                self.put_block(container, key, &id, block).await?;
                block_ids.push(id);
            }
        }
        if !buf.is_empty() {
            let block = buf.freeze();
            total += block.len() as u64;
            let id = block_id(block_ids.len());
            self.put_block(container, key, &id, block).await?;
            block_ids.push(id);
        }

        let mut meta = self
            .commit_block_list(container, key, content_type.as_deref(), &block_ids)
            .await?;
        meta.size = Some(total);
        meta.content_type = content_type;
        Ok(meta)
    }

    async fn put_block(
        &self,
        container: &str,
        key: &str,
        block_id: &str,
        data: Bytes,
    ) -> Result<(), StoreError> {
        let url = self.blob_url(container, key)?;
        let size = data.len();
        let res = self
            .send_request(
                Method::PUT,
                url,
                &[("comp", "block"), ("blockid", block_id)],
                &[],
                "",
                Some(size),
                Some(data.into()),
            )
            .await?;
        if !res.status().is_success() {
            return Err(Self::response_error(res, format!("put block for '{container}/{key}'")).await);
        }
        Ok(())
    }

    async fn commit_block_list(
        &self,
        container: &str,
        key: &str,
        content_type: Option<&str>,
        block_ids: &[String],
    ) -> Result<BlobMeta, StoreError> {
        let mut body = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><BlockList>");
        for id in block_ids {
            body.push_str("<Latest>");
            body.push_str(id);
            body.push_str("</Latest>");
        }
        body.push_str("</BlockList>");

        let content_type = content_type.unwrap_or("application/octet-stream");
        let url = self.blob_url(container, key)?;
        let res = self
            .send_request(
                Method::PUT,
                url,
                &[("comp", "blocklist")],
                &[("x-ms-blob-content-type", content_type)],
                "application/xml",
                Some(body.len()),
                Some(body.into()),
            )
            .await?;
        if !res.status().is_success() {
            return Err(
                Self::response_error(res, format!("commit block list for '{container}/{key}'"))
                    .await,
            );
        }
        meta_from_headers(key, res.headers()).map_err(StoreError::Backend)
    }
}

#[async_trait::async_trait]
impl BlobStore for RestBlobStore {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn account(&self) -> &str {
        &self.state.account
    }

    fn safe_uri(&self) -> &Url {
        &self.state.safe_uri
    }

    async fn healthcheck(&self) -> Result<(), StoreError> {
        // An existence probe reaches the service and exercises the
        // credential; the probe container itself need not exist.
        self.container_exists("azblob-healthcheck-probe").await?;
        Ok(())
    }

    async fn container_exists(&self, container: &str) -> Result<bool, StoreError> {
        let url = self.container_url(container)?;
        let res = self
            .send_request(
                Method::GET,
                url,
                &[("restype", "container")],
                &[],
                "",
                None,
                None,
            )
            .await?;
        match res.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::response_error(res, format!("container '{container}'")).await),
        }
    }

    async fn create_container(&self, container: &str) -> Result<(), StoreError> {
        let url = self.container_url(container)?;
        let res = self
            .send_request(
                Method::PUT,
                url,
                &[("restype", "container")],
                &[],
                "",
                None,
                None,
            )
            .await?;
        match res.status() {
            status if status.is_success() => Ok(()),
            // Already present.
            StatusCode::CONFLICT => Ok(()),
            _ => Err(Self::response_error(res, format!("create container '{container}'")).await),
        }
    }

    async fn meta(&self, container: &str, key: &str) -> Result<Option<BlobMeta>, StoreError> {
        let url = self.blob_url(container, key)?;
        let res = self
            .send_request(Method::HEAD, url, &[], &[], "", None, None)
            .await?;
        match res.status() {
            status if status.is_success() => {
                let meta = meta_from_headers(key, res.headers()).map_err(StoreError::Backend)?;
                Ok(Some(meta))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::response_error(res, format!("blob '{container}/{key}'")).await),
        }
    }

    async fn get(&self, container: &str, key: &str) -> Result<Option<Bytes>, StoreError> {
        let url = self.blob_url(container, key)?;
        let res = self
            .send_request(Method::GET, url, &[], &[], "", None, None)
            .await?;
        match res.status() {
            status if status.is_success() => {
                let data = res
                    .bytes()
                    .await
                    .map_err(|e| StoreError::Backend(anyhow!("could not read body: {e}")))?;
                Ok(Some(data))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::response_error(res, format!("blob '{container}/{key}'")).await),
        }
    }

    async fn get_stream(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<ValueStream>, StoreError> {
        let url = self.blob_url(container, key)?;
        let res = self
            .send_request(Method::GET, url, &[], &[], "", None, None)
            .await?;
        match res.status() {
            status if status.is_success() => {
                let stream = res
                    .bytes_stream()
                    .map_err(|e| anyhow!("could not read body: {e}"));
                Ok(Some(Box::pin(stream)))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::response_error(res, format!("blob '{container}/{key}'")).await),
        }
    }

    async fn put(&self, container: &str, put: Put) -> Result<BlobMeta, StoreError> {
        let Put {
            key,
            data,
            content_type,
            ..
        } = put;
        match data {
            DataSource::Data(bytes) => {
                self.put_data(container, &key, content_type, bytes).await
            }
            DataSource::Stream(stream) => {
                self.put_stream(container, &key, content_type, stream).await
            }
        }
    }

    async fn delete(&self, container: &str, key: &str) -> Result<(), StoreError> {
        let url = self.blob_url(container, key)?;
        let res = self
            .send_request(Method::DELETE, url, &[], &[], "", None, None)
            .await?;
        match res.status() {
            status if status.is_success() => Ok(()),
            // Deleting an absent blob is a no-op.
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(Self::response_error(res, format!("delete '{container}/{key}'")).await),
        }
    }

    async fn delete_prefix(&self, container: &str, prefix: &str) -> Result<(), StoreError> {
        let keys = self.list_all_keys(container, prefix).await?;
        for key in keys {
            self.delete(container, &key).await?;
        }
        Ok(())
    }

    async fn list(&self, container: &str, args: ListArgs) -> Result<BlobMetaPage, StoreError> {
        let url = self.container_url(container)?;

        let mut params: Vec<(&str, String)> = vec![
            ("restype", "container".to_string()),
            ("comp", "list".to_string()),
        ];
        if let Some(prefix) = args.prefix() {
            params.push(("prefix", prefix.to_string()));
        }
        if let Some(cursor) = args.cursor() {
            params.push(("marker", cursor.to_string()));
        }
        if let Some(limit) = args.limit() {
            params.push(("maxresults", limit.to_string()));
        }
        let params: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let res = self
            .send_request(Method::GET, url, &params, &[], "", None, None)
            .await?;
        match res.status() {
            status if status.is_success() => {
                let body = res
                    .text()
                    .await
                    .map_err(|e| StoreError::Backend(anyhow!("could not read body: {e}")))?;
                let parsed = xml::parse_list_blobs(&body).map_err(StoreError::Backend)?;
                Ok(BlobMetaPage {
                    items: parsed.items,
                    next_cursor: parsed.next_marker,
                })
            }
            // An absent container holds no blobs.
            StatusCode::NOT_FOUND => Ok(BlobMetaPage {
                items: Vec::new(),
                next_cursor: None,
            }),
            _ => Err(Self::response_error(res, format!("list '{container}'")).await),
        }
    }
}

fn block_id(index: usize) -> String {
    // Fixed-width ids: the service requires all ids of a blob to have the
    // same encoded length.
    BASE64_STANDARD.encode(format!("{index:032}"))
}

fn meta_from_headers(key: &str, headers: &header::HeaderMap) -> Result<BlobMeta, anyhow::Error> {
    let mut meta = BlobMeta::new(key.to_string());

    if let Some(value) = headers.get(header::ETAG).and_then(|v| v.to_str().ok()) {
        meta.etag = Some(value.trim_matches('"').to_string());
    }
    if let Some(value) = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
    {
        meta.size = Some(value.parse::<u64>().map_err(|_| {
            anyhow!("invalid Content-Length header '{value}'")
        })?);
    }
    if let Some(value) = headers
        .get(header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
    {
        let systime = httpdate::parse_http_date(value)
            .map_err(|_| anyhow!("invalid Last-Modified header '{value}'"))?;
        meta.updated_at = Some(systime.into());
    }
    if let Some(value) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        if !value.is_empty() {
            meta.content_type = Some(value.to_string());
        }
    }
    if let Some(value) = headers.get("content-md5").and_then(|v| v.to_str().ok()) {
        let raw = BASE64_STANDARD
            .decode(value)
            .map_err(|_| anyhow!("invalid Content-MD5 header '{value}'"))?;
        meta.content_md5 = raw.as_slice().try_into().ok();
    }

    Ok(meta)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn store(uri: &str) -> RestBlobStore {
        let config = RestConfig::from_uri(uri).unwrap();
        RestBlobStore::new(config).unwrap()
    }

    #[test]
    fn test_url_building_production() {
        let store = store("az://myaccount.blob.core.windows.net/");
        assert_eq!(store.account(), "myaccount");
        assert_eq!(
            store.container_url("test-container").unwrap().as_str(),
            "https://myaccount.blob.core.windows.net/test-container"
        );
        assert_eq!(
            store.blob_url("c", "dir/file with space.txt").unwrap().as_str(),
            "https://myaccount.blob.core.windows.net/c/dir/file%20with%20space.txt"
        );
    }

    #[test]
    fn test_url_building_emulator() {
        let store = store("az://127.0.0.1:10000/devstoreaccount1?insecure");
        assert_eq!(store.account(), "devstoreaccount1");
        assert_eq!(
            store.blob_url("c", "a/b").unwrap().as_str(),
            "http://127.0.0.1:10000/devstoreaccount1/c/a/b"
        );
    }

    #[test]
    fn test_safe_uri_has_no_credentials() {
        let store = store(
            "az://myaccount.blob.core.windows.net/?access_key=c2VjcmV0&sas_token=sig%3Dabc",
        );
        let uri = store.safe_uri().to_string();
        assert!(!uri.contains("c2VjcmV0"));
        assert!(!uri.contains("sig"));
    }

    #[test]
    fn test_block_ids_have_uniform_length() {
        let a = block_id(0);
        let b = block_id(123_456);
        assert_eq!(a.len(), b.len());
        assert_ne!(a, b);
    }

    #[test]
    fn test_meta_from_headers() {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ETAG, "\"0xABC\"".parse().unwrap());
        headers.insert(header::CONTENT_LENGTH, "42".parse().unwrap());
        headers.insert(
            header::LAST_MODIFIED,
            "Tue, 15 Nov 1994 12:45:26 GMT".parse().unwrap(),
        );
        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());

        let meta = meta_from_headers("dir/a.txt", &headers).unwrap();
        assert_eq!(meta.key(), "dir/a.txt");
        assert_eq!(meta.etag.as_deref(), Some("0xABC"));
        assert_eq!(meta.size, Some(42));
        assert_eq!(meta.content_type.as_deref(), Some("text/plain"));
        assert!(meta.updated_at.is_some());
    }
}
