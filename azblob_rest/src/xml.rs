//! Minimal decoding of the List Blobs `<EnumerationResults>` response.
//!
//! The listing body is a small, flat, service-controlled document; the
//! fields needed here (blob name, size, modification time, etag, content
//! type, continuation marker) are extracted directly rather than through a
//! full XML data model.

use anyhow::{Context as _, bail};
use azblob::BlobMeta;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc2822;

#[derive(Debug, Default, PartialEq)]
pub(crate) struct ListBlobsResponse {
    pub items: Vec<BlobMeta>,
    pub next_marker: Option<String>,
}

/// Decode the body of a `restype=container&comp=list` response.
pub(crate) fn parse_list_blobs(body: &str) -> Result<ListBlobsResponse, anyhow::Error> {
    if !body.contains("<EnumerationResults") {
        bail!("unexpected list response: missing <EnumerationResults>");
    }

    let mut items = Vec::new();
    let mut rest = body;
    while let Some(block) = next_element(&mut rest, "Blob") {
        items.push(parse_blob_entry(block)?);
    }

    // NextMarker trails the <Blobs> element; an empty element means the
    // listing is complete.
    let next_marker = element_text(body, "NextMarker")
        .map(unescape)
        .filter(|marker| !marker.is_empty());

    Ok(ListBlobsResponse { items, next_marker })
}

fn parse_blob_entry(block: &str) -> Result<BlobMeta, anyhow::Error> {
    let name = element_text(block, "Name")
        .map(unescape)
        .context("blob entry is missing <Name>")?;

    let mut meta = BlobMeta::new(name);

    if let Some(raw) = element_text(block, "Last-Modified") {
        let ts = OffsetDateTime::parse(raw, &Rfc2822)
            .with_context(|| format!("invalid Last-Modified value '{raw}'"))?;
        meta.updated_at = Some(ts);
    }
    if let Some(raw) = element_text(block, "Content-Length") {
        let size = raw
            .parse::<u64>()
            .with_context(|| format!("invalid Content-Length value '{raw}'"))?;
        meta.size = Some(size);
    }
    if let Some(raw) = element_text(block, "Etag") {
        meta.etag = Some(raw.trim_matches('"').to_string());
    }
    if let Some(raw) = element_text(block, "Content-Type") {
        if !raw.is_empty() {
            meta.content_type = Some(unescape(raw));
        }
    }

    Ok(meta)
}

/// Advance `rest` past the next `<tag>...</tag>` element and return its
/// inner text.
fn next_element<'a>(rest: &mut &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let start = rest.find(&open)? + open.len();
    let len = rest[start..].find(&close)?;
    let inner = &rest[start..start + len];
    *rest = &rest[start + len + close.len()..];
    Some(inner)
}

fn element_text<'a>(block: &'a str, tag: &str) -> Option<&'a str> {
    let mut rest = block;
    next_element(&mut rest, tag)
}

/// Undo the XML character escapes the service applies to text content.
fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="http://127.0.0.1:10000/devstoreaccount1" ContainerName="test-container">
  <Prefix>dir/</Prefix>
  <MaxResults>2</MaxResults>
  <Blobs>
    <Blob>
      <Name>dir/a.txt</Name>
      <Properties>
        <Last-Modified>Tue, 15 Nov 1994 12:45:26 GMT</Last-Modified>
        <Etag>"0x8DBC12345"</Etag>
        <Content-Length>10</Content-Length>
        <Content-Type>text/plain</Content-Type>
      </Properties>
    </Blob>
    <Blob>
      <Name>dir/b &amp; c.txt</Name>
      <Properties>
        <Last-Modified>Wed, 16 Nov 1994 12:45:26 GMT</Last-Modified>
        <Content-Length>20</Content-Length>
        <Content-Type></Content-Type>
      </Properties>
    </Blob>
  </Blobs>
  <NextMarker>marker-token</NextMarker>
</EnumerationResults>"#;

    #[test]
    fn test_parse_list_blobs() {
        let parsed = parse_list_blobs(SAMPLE).unwrap();
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.next_marker.as_deref(), Some("marker-token"));

        let a = &parsed.items[0];
        assert_eq!(a.key(), "dir/a.txt");
        assert_eq!(a.size, Some(10));
        assert_eq!(a.etag.as_deref(), Some("0x8DBC12345"));
        assert_eq!(a.content_type.as_deref(), Some("text/plain"));
        assert!(a.updated_at.is_some());

        let b = &parsed.items[1];
        assert_eq!(b.key(), "dir/b & c.txt");
        assert_eq!(b.size, Some(20));
        assert_eq!(b.etag, None);
        assert_eq!(b.content_type, None);
    }

    #[test]
    fn test_parse_empty_listing() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults><Blobs></Blobs><NextMarker /></EnumerationResults>"#;
        let parsed = parse_list_blobs(body).unwrap();
        assert!(parsed.items.is_empty());
        assert_eq!(parsed.next_marker, None);
    }

    #[test]
    fn test_parse_rejects_non_listing_body() {
        assert!(parse_list_blobs("<Error><Code>oops</Code></Error>").is_err());
    }
}
