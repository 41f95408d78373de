use url::Url;

use crate::EndpointError;

/// Which flavor of blob service an endpoint URL points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EndpointKind {
    /// A production endpoint, `https://<account>.blob.core.windows.net`.
    Production,
    /// A local test emulator (Azurite), `http://127.0.0.1:<port>/<account>`.
    Emulator,
}

/// A classified blob service endpoint.
///
/// The account name is extracted differently per kind: the first subdomain
/// label for production endpoints, the final path segment for emulator
/// endpoints.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Endpoint {
    kind: EndpointKind,
    account: String,
    base_url: Url,
}

const PRODUCTION_SUFFIX: &str = ".blob.core.windows.net";

fn is_label(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

impl Endpoint {
    /// Classify an endpoint URL string.
    ///
    /// Pure function: no I/O, no global state.
    pub fn classify(endpoint: &str) -> Result<Self, EndpointError> {
        let url = Url::parse(endpoint).map_err(|_| EndpointError(endpoint.to_string()))?;

        match url.scheme() {
            "https" => Self::classify_production(endpoint, &url),
            "http" => Self::classify_emulator(endpoint, &url),
            _ => Err(EndpointError(endpoint.to_string())),
        }
    }

    fn classify_production(raw: &str, url: &Url) -> Result<Self, EndpointError> {
        let host = url.host_str().ok_or_else(|| EndpointError(raw.to_string()))?;
        let subdomain = host
            .strip_suffix(PRODUCTION_SUFFIX)
            .ok_or_else(|| EndpointError(raw.to_string()))?;

        if subdomain.is_empty() || !subdomain.split('.').all(is_label) {
            return Err(EndpointError(raw.to_string()));
        }

        // Account name is the first subdomain label.
        let account = subdomain
            .split('.')
            .next()
            .expect("split yields at least one item")
            .to_string();

        let base_url = format!("https://{host}")
            .parse::<Url>()
            .map_err(|_| EndpointError(raw.to_string()))?;

        Ok(Self {
            kind: EndpointKind::Production,
            account,
            base_url,
        })
    }

    fn classify_emulator(raw: &str, url: &Url) -> Result<Self, EndpointError> {
        let host = url.host_str().ok_or_else(|| EndpointError(raw.to_string()))?;
        if host != "127.0.0.1" && host != "localhost" {
            return Err(EndpointError(raw.to_string()));
        }
        let port = url.port().ok_or_else(|| EndpointError(raw.to_string()))?;

        // Account name is the final non-empty path segment.
        let account = url
            .path_segments()
            .and_then(|mut segs| segs.next_back())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EndpointError(raw.to_string()))?
            .to_string();

        let base_url = format!("http://{host}:{port}/{account}")
            .parse::<Url>()
            .map_err(|_| EndpointError(raw.to_string()))?;

        Ok(Self {
            kind: EndpointKind::Emulator,
            account,
            base_url,
        })
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// The storage account name extracted from the endpoint.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// The service base URL.
    ///
    /// For emulator endpoints this includes the account path segment, so
    /// container URLs can be formed by joining the container name in both
    /// cases.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.base_url.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_classify_production_endpoint() {
        let ep = Endpoint::classify("https://mystorageaccount.blob.core.windows.net").unwrap();
        assert_eq!(ep.kind(), EndpointKind::Production);
        assert_eq!(ep.account(), "mystorageaccount");
        assert_eq!(
            ep.base_url().as_str(),
            "https://mystorageaccount.blob.core.windows.net/"
        );

        // Trailing path is tolerated.
        let ep = Endpoint::classify("https://acct1.blob.core.windows.net/some/path").unwrap();
        assert_eq!(ep.account(), "acct1");

        // Multiple subdomain labels: account is the first label.
        let ep = Endpoint::classify("https://acct.z13.blob.core.windows.net").unwrap();
        assert_eq!(ep.account(), "acct");
    }

    #[test]
    fn test_classify_emulator_endpoint() {
        let ep = Endpoint::classify("http://127.0.0.1:10000/devstoreaccount1").unwrap();
        assert_eq!(ep.kind(), EndpointKind::Emulator);
        assert_eq!(ep.account(), "devstoreaccount1");
        assert_eq!(ep.base_url().as_str(), "http://127.0.0.1:10000/devstoreaccount1");

        let ep = Endpoint::classify("http://localhost:10000/devstoreaccount1").unwrap();
        assert_eq!(ep.account(), "devstoreaccount1");
    }

    #[test]
    fn test_classify_invalid_endpoints() {
        for raw in [
            "",
            "not a url",
            "ftp://example.com",
            // Wrong suffix.
            "https://acct.blob.example.com",
            // Uppercase label.
            "https://Acct.blob.core.windows.net",
            // Empty subdomain.
            "https://.blob.core.windows.net",
            // Production endpoints must use https.
            "http://acct.blob.core.windows.net",
            // Emulator must be loopback.
            "http://example.com:10000/devstoreaccount1",
            // Emulator needs an explicit port.
            "http://127.0.0.1/devstoreaccount1",
            // Emulator needs an account path segment.
            "http://127.0.0.1:10000",
        ] {
            assert!(Endpoint::classify(raw).is_err(), "expected error for {raw:?}");
        }
    }
}
