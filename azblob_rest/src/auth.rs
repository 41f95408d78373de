use anyhow::Context as _;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use crate::RestConfig;

/// Service API version pinned for every request.
pub(crate) const API_VERSION: &str = "2021-08-06";

/// How requests are authorized against the service.
#[derive(Clone)]
pub(crate) enum Credential {
    /// Shared Key authorization with the decoded account key.
    SharedKey { account: String, key: Vec<u8> },
    /// Pre-signed SAS token, appended as query parameters.
    Sas(String),
    /// No credential: public containers or a permissive emulator.
    Anonymous,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SharedKey { account, .. } => {
                f.debug_struct("SharedKey").field("account", account).finish_non_exhaustive()
            }
            Self::Sas(_) => f.write_str("Sas(...)"),
            Self::Anonymous => f.write_str("Anonymous"),
        }
    }
}

impl Credential {
    /// Access key takes precedence over a SAS token when both are set.
    pub(crate) fn from_config(config: &RestConfig) -> Result<Self, anyhow::Error> {
        if let Some(key) = &config.access_key {
            let key = BASE64_STANDARD
                .decode(key)
                .context("access key is not valid base64")?;
            return Ok(Self::SharedKey {
                account: config.endpoint.account().to_string(),
                key,
            });
        }
        if let Some(token) = &config.sas_token {
            return Ok(Self::Sas(token.trim_start_matches('?').to_string()));
        }
        Ok(Self::Anonymous)
    }

    /// Append SAS query parameters to the request URL, when applicable.
    pub(crate) fn append_sas(&self, url: &mut Url) {
        if let Self::Sas(token) = self {
            let existing = url.query().map(|q| q.to_string());
            let query = match existing {
                Some(q) if !q.is_empty() => format!("{q}&{token}"),
                _ => token.clone(),
            };
            url.set_query(Some(&query));
        }
    }

    /// Compute the `Authorization` header value for a request, `None` for
    /// SAS and anonymous auth.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn authorization(
        &self,
        method: &str,
        resource_path: &str,
        content_length: Option<usize>,
        content_type: &str,
        date: &str,
        extra_ms_headers: &[(&str, &str)],
        query_params: &[(&str, &str)],
    ) -> Result<Option<String>, anyhow::Error> {
        let Self::SharedKey { account, key } = self else {
            return Ok(None);
        };

        let string_to_sign = string_to_sign(
            account,
            method,
            resource_path,
            content_length,
            content_type,
            date,
            extra_ms_headers,
            query_params,
        );

        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| anyhow::anyhow!("invalid HMAC key: {e}"))?;
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        Ok(Some(format!("SharedKey {account}:{signature}")))
    }
}

/// The current UTC date in RFC 1123 format, for the `x-ms-date` header.
pub(crate) fn rfc1123_date() -> String {
    httpdate::fmt_http_date(std::time::SystemTime::now())
}

/// Build the Shared Key string-to-sign.
///
/// Format (one line per interposed header):
///
/// ```text
/// VERB\n
/// Content-Encoding\n Content-Language\n Content-Length\n Content-MD5\n
/// Content-Type\n Date\n If-Modified-Since\n If-Match\n If-None-Match\n
/// If-Unmodified-Since\n Range\n
/// CanonicalizedHeaders\n CanonicalizedResource
/// ```
///
/// Only Content-Length, Content-Type, and the `x-ms-*` headers are ever
/// populated by this backend; the remaining slots stay empty.
#[allow(clippy::too_many_arguments)]
fn string_to_sign(
    account: &str,
    method: &str,
    resource_path: &str,
    content_length: Option<usize>,
    content_type: &str,
    date: &str,
    extra_ms_headers: &[(&str, &str)],
    query_params: &[(&str, &str)],
) -> String {
    // Content-Length: empty for 0 or if not provided (GET/DELETE/HEAD).
    let content_length = match content_length {
        Some(0) | None => String::new(),
        Some(len) => len.to_string(),
    };

    // Canonicalized x-ms-* headers, lowercased and sorted.
    let mut ms_headers: Vec<(String, String)> = vec![
        ("x-ms-date".to_string(), date.to_string()),
        ("x-ms-version".to_string(), API_VERSION.to_string()),
    ];
    for (k, v) in extra_ms_headers {
        let lk = k.to_lowercase();
        if lk.starts_with("x-ms-") && lk != "x-ms-date" && lk != "x-ms-version" {
            ms_headers.push((lk, v.to_string()));
        }
    }
    ms_headers.sort_by(|a, b| a.0.cmp(&b.0));
    let canonicalized_headers = ms_headers
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join("\n");

    // Canonicalized resource: account, un-encoded resource path, then the
    // query parameters sorted by key.
    let mut canonicalized_resource = format!("/{account}{resource_path}");
    if !query_params.is_empty() {
        let mut sorted = query_params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        for (k, v) in sorted {
            canonicalized_resource.push_str(&format!("\n{}:{}", k.to_lowercase(), v));
        }
    }

    format!(
        "{}\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}\n{}",
        method, content_length, content_type, canonicalized_headers, canonicalized_resource
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_string_to_sign_layout() {
        let sts = string_to_sign(
            "acct",
            "PUT",
            "/container/dir/file.txt",
            Some(11),
            "application/octet-stream",
            "Tue, 15 Nov 1994 12:45:26 GMT",
            &[("x-ms-blob-type", "BlockBlob")],
            &[("restype", "container"), ("comp", "list")],
        );

        let expected = "PUT\n\n\n11\n\napplication/octet-stream\n\n\n\n\n\n\n\
            x-ms-blob-type:BlockBlob\n\
            x-ms-date:Tue, 15 Nov 1994 12:45:26 GMT\n\
            x-ms-version:2021-08-06\n\
            /acct/container/dir/file.txt\n\
            comp:list\n\
            restype:container";
        assert_eq!(sts, expected);
    }

    #[test]
    fn test_zero_content_length_stays_empty() {
        let sts = string_to_sign("a", "GET", "/c/k", Some(0), "", "d", &[], &[]);
        assert!(sts.starts_with("GET\n\n\n\n\n"));
    }

    #[test]
    fn test_shared_key_authorization_shape() {
        let cred = Credential::SharedKey {
            account: "devstoreaccount1".to_string(),
            key: b"0123456789abcdef".to_vec(),
        };
        let auth = cred
            .authorization(
                "GET",
                "/devstoreaccount1/container/blob",
                None,
                "",
                "Tue, 15 Nov 1994 12:45:26 GMT",
                &[],
                &[],
            )
            .unwrap()
            .unwrap();
        let sig = auth.strip_prefix("SharedKey devstoreaccount1:").unwrap();
        let raw = BASE64_STANDARD.decode(sig).unwrap();
        assert_eq!(raw.len(), 32);
    }

    #[test]
    fn test_sas_and_anonymous_produce_no_header() {
        let sas = Credential::Sas("sv=2021&sig=abc".to_string());
        assert!(sas.authorization("GET", "/c/k", None, "", "d", &[], &[]).unwrap().is_none());

        let anon = Credential::Anonymous;
        assert!(anon.authorization("GET", "/c/k", None, "", "d", &[], &[]).unwrap().is_none());
    }

    #[test]
    fn test_append_sas() {
        let cred = Credential::Sas("sv=2021&sig=abc".to_string());
        let mut url = Url::parse("http://127.0.0.1:10000/devstoreaccount1/c/k").unwrap();
        cred.append_sas(&mut url);
        assert_eq!(url.query(), Some("sv=2021&sig=abc"));

        let mut url =
            Url::parse("http://127.0.0.1:10000/devstoreaccount1/c?restype=container").unwrap();
        cred.append_sas(&mut url);
        assert_eq!(url.query(), Some("restype=container&sv=2021&sig=abc"));
    }
}
