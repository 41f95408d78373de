/// Failure to parse an `az://` storage query.
///
/// Parse errors never touch the network and are never retried.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum QueryParseError {
    #[error("unsupported scheme in query '{query}': must start with az://")]
    UnsupportedScheme { query: String },

    #[error("missing container in query '{query}'")]
    MissingContainer { query: String },

    #[error("invalid path in query '{query}': {reason}")]
    InvalidPath { query: String, reason: String },
}

/// A configured service endpoint URL that is neither a valid blob endpoint
/// nor a valid local emulator endpoint.
///
/// Fatal at configuration time.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid endpoint '{0}'")]
pub struct EndpointError(pub String);

/// Failure to bind a parsed query to a configured store.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// The query names a different storage account than the one the store
    /// was configured for. Indicates a configuration mistake, not a
    /// transient condition.
    #[error("account mismatch: query addresses account '{query_account}', store is configured for '{store_account}'")]
    AccountMismatch {
        query_account: String,
        store_account: String,
    },
}

/// Errors surfaced by [`crate::BlobStore`] operations.
///
/// `NotFound` and `PermissionDenied` are kept distinct so callers can give
/// actionable messages instead of conflating a missing credential scope
/// with a missing blob. `Backend` covers transport and service failures
/// and is the variant an outer retry wrapper should treat as retryable.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Backend(err.into())
    }
}
