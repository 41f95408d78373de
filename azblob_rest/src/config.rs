use anyhow::{Context as _, bail};
use azblob::Endpoint;
use url::Url;

/// Configuration for the REST blob store.
///
/// Carried as an explicit, immutable value; there is no process-wide
/// settings singleton. At most one credential is set: the access key takes
/// precedence over a SAS token, and with neither set requests are sent
/// unauthenticated (public containers, permissive emulator setups).
///
/// Credential *selection* (environment chains, managed identities) is the
/// host's concern and not handled here.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RestConfig {
    pub endpoint: Endpoint,

    /// Base64-encoded storage account access key (Shared Key auth).
    pub access_key: Option<String>,
    /// Pre-signed SAS token, appended to every request URL.
    pub sas_token: Option<String>,

    /// Whether a path with descendant blobs is treated as a directory
    /// tree. Off means every query addresses exactly one blob.
    pub directory_semantics: bool,
}

impl RestConfig {
    pub(crate) const URI_SCHEME: &'static str = "az";

    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            access_key: None,
            sas_token: None,
            directory_semantics: true,
        }
    }

    /// Parse a configuration URI of the form:
    ///
    /// * `az://<account>.blob.core.windows.net/?access_key=...`
    /// * `az://127.0.0.1:10000/<account>?insecure&sas_token=...`
    ///
    /// The `insecure` flag selects the plain-HTTP emulator endpoint form;
    /// `no_dir` disables directory semantics.
    pub fn from_uri(uri: &str) -> Result<Self, anyhow::Error> {
        let url = uri
            .parse::<Url>()
            .map_err(|e| anyhow::anyhow!("Invalid URL '{}': {}", uri, e))?;
        if url.scheme() != Self::URI_SCHEME {
            bail!(
                "Invalid scheme: expected '{}', got '{}'",
                Self::URI_SCHEME,
                url.scheme()
            );
        }

        let query_pairs = url.query_pairs().collect::<Vec<_>>();
        let insecure = query_pairs.iter().any(|(k, _)| k == "insecure");
        let no_dir = query_pairs.iter().any(|(k, _)| k == "no_dir");

        let scheme = if insecure { "http" } else { "https" };
        let host = url.host_str().context("Invalid URL: missing host")?;
        let port = if let Some(port) = url.port() {
            format!(":{port}")
        } else {
            String::new()
        };

        let endpoint_url = format!("{}://{}{}{}", scheme, host, port, url.path());
        let endpoint = Endpoint::classify(&endpoint_url)
            .with_context(|| format!("URI '{uri}' does not describe a valid blob endpoint"))?;

        let access_key = query_pairs
            .iter()
            .find(|(k, _)| k == "access_key")
            .map(|(_, v)| v.to_string());
        let sas_token = query_pairs
            .iter()
            .find(|(k, _)| k == "sas_token")
            .map(|(_, v)| v.trim_start_matches('?').to_string());

        Ok(Self {
            endpoint,
            access_key,
            sas_token,
            directory_semantics: !no_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use azblob::EndpointKind;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_production_uri() {
        let config = RestConfig::from_uri("az://mystorageaccount.blob.core.windows.net/").unwrap();
        assert_eq!(config.endpoint.kind(), EndpointKind::Production);
        assert_eq!(config.endpoint.account(), "mystorageaccount");
        assert_eq!(config.access_key, None);
        assert_eq!(config.sas_token, None);
        assert!(config.directory_semantics);
    }

    #[test]
    fn test_parse_emulator_uri() {
        let config = RestConfig::from_uri(
            "az://127.0.0.1:10000/devstoreaccount1?insecure&access_key=c2VjcmV0&no_dir",
        )
        .unwrap();
        assert_eq!(config.endpoint.kind(), EndpointKind::Emulator);
        assert_eq!(config.endpoint.account(), "devstoreaccount1");
        assert_eq!(config.access_key.as_deref(), Some("c2VjcmV0"));
        assert!(!config.directory_semantics);
    }

    #[test]
    fn test_parse_uri_rejects_bad_input() {
        assert!(RestConfig::from_uri("s3://bucket/key").is_err());
        // https production endpoint must carry the well-known suffix
        assert!(RestConfig::from_uri("az://example.com/").is_err());
        // emulator form requires the insecure flag
        assert!(RestConfig::from_uri("az://127.0.0.1:10000/devstoreaccount1").is_err());
    }

    #[test]
    fn test_sas_token_leading_question_mark_is_stripped() {
        let config = RestConfig::from_uri(
            "az://acct.blob.core.windows.net/?sas_token=%3Fsv%3D2021%26sig%3Dabc",
        )
        .unwrap();
        assert_eq!(config.sas_token.as_deref(), Some("sv=2021&sig=abc"));
    }
}
