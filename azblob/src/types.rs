use bytes::Bytes;
use time::OffsetDateTime;

/// Byte stream.
pub type ValueStream = futures::stream::BoxStream<'static, Result<Bytes, anyhow::Error>>;

/// Stream of key-name pages (as returned by `list_keys_stream`).
pub type KeyStream<'a> = futures::stream::BoxStream<'a, Result<KeyPage, crate::StoreError>>;

/// Metadata for a single blob.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct BlobMeta {
    pub key: String,
    pub etag: Option<String>,
    pub size: Option<u64>,
    /// Last-Modified of the blob.
    pub updated_at: Option<OffsetDateTime>,
    /// MIME content type of the blob.
    pub content_type: Option<String>,
    /// Content-MD5 reported by the service.
    pub content_md5: Option<[u8; 16]>,
}

impl BlobMeta {
    pub fn new(key: String) -> Self {
        Self {
            key,
            etag: None,
            size: None,
            updated_at: None,
            content_type: None,
            content_md5: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Round the timestamp to the nearest second.
    ///
    /// Useful for normalizing timestamps due to differing precisions in the backend.
    pub fn round_timestamps_second(&mut self) {
        if let Some(ts) = self.updated_at.as_mut() {
            if let Ok(new) = ts.replace_millisecond(0) {
                *ts = new;
            }
        }
    }

    pub fn with_rounded_timestamps_second(mut self) -> Self {
        self.round_timestamps_second();
        self
    }
}

/// One page of blob metadata (as returned by `list`).
#[derive(Clone, Debug)]
pub struct BlobMetaPage {
    pub items: Vec<BlobMeta>,
    pub next_cursor: Option<String>,
}

/// One page of blob key names.
#[derive(Clone, Debug)]
pub struct KeyPage {
    pub items: Vec<String>,
    pub next_cursor: Option<String>,
}

/// Arguments for listing blobs in a container.
#[derive(Clone, Debug, Default)]
pub struct ListArgs {
    prefix: Option<String>,
    limit: Option<u64>,
    cursor: Option<String>,
}

impl ListArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        if !prefix.is_empty() {
            self.prefix = Some(prefix);
        } else {
            self.prefix = None;
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.set_prefix(prefix);
        self
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn set_limit(&mut self, limit: u64) {
        if limit > 0 {
            self.limit = Some(limit);
        } else {
            self.limit = None;
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.set_limit(limit);
        self
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn with_cursor_opt(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }
}

/// Payload for an upload: either buffered bytes or a byte stream.
pub enum DataSource {
    Data(Bytes),
    Stream(ValueStream),
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data(_) => f.write_str("DataSource::Data(...)"),
            Self::Stream(_) => f.write_str("DataSource::Stream(...)"),
        }
    }
}

impl From<Bytes> for DataSource {
    fn from(data: Bytes) -> Self {
        Self::Data(data)
    }
}

impl From<ValueStream> for DataSource {
    fn from(stream: ValueStream) -> Self {
        Self::Stream(stream)
    }
}

/// Request to store a blob under a key.
///
/// Uploads either complete or fail as a whole from the caller's viewpoint;
/// re-sending the same put is always safe.
#[derive(Debug)]
#[non_exhaustive]
pub struct Put {
    pub key: String,
    pub data: DataSource,
    /// Optional MIME type to associate with the blob.
    pub content_type: Option<String>,
}

impl Put {
    pub fn new(key: impl Into<String>, data: impl Into<DataSource>) -> Self {
        Self {
            key: key.into(),
            data: data.into(),
            content_type: None,
        }
    }
}
