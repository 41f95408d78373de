use percent_encoding::percent_decode_str;

use crate::QueryParseError;

/// The scheme every storage query must carry.
pub const QUERY_SCHEME: &str = "az";

const SCHEME_PREFIX: &str = "az://";

/// Which `az://` query grammar is in effect.
///
/// Historically both forms were in circulation, so the choice is an
/// explicit, versioned configuration value instead of being guessed from
/// the query itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryGrammar {
    /// Three-part form, `az://<account>/<container>/<path...>`.
    ///
    /// The canonical grammar. The account named in the query must match
    /// the account the store was configured for.
    #[default]
    AccountInQuery,
    /// Two-part legacy form, `az://<container>/<path...>`.
    ///
    /// The account is supplied out-of-band by the endpoint configuration.
    AccountInConfig,
}

/// A parsed, immutable `az://` storage address.
///
/// * `container` is never empty.
/// * `path` never begins with `/` and is stored percent-decoded.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct BlobQuery {
    account: Option<String>,
    container: String,
    path: String,
}

impl BlobQuery {
    /// Parse a query string under the given grammar.
    ///
    /// Unresolved template placeholders (e.g. `{sample}`) are accepted:
    /// placeholder resolution happens upstream, before a query is bound to
    /// a storage object.
    pub fn parse(query: &str, grammar: QueryGrammar) -> Result<Self, QueryParseError> {
        let rest = query
            .strip_prefix(SCHEME_PREFIX)
            .ok_or_else(|| QueryParseError::UnsupportedScheme {
                query: query.to_string(),
            })?;

        let mut parts = rest.splitn(if grammar == QueryGrammar::AccountInQuery { 3 } else { 2 }, '/');

        let account = match grammar {
            QueryGrammar::AccountInQuery => {
                let account = parts.next().unwrap_or_default();
                if account.is_empty() {
                    return Err(QueryParseError::MissingContainer {
                        query: query.to_string(),
                    });
                }
                Some(account.to_string())
            }
            QueryGrammar::AccountInConfig => None,
        };

        let container = parts.next().unwrap_or_default();
        if container.is_empty() {
            return Err(QueryParseError::MissingContainer {
                query: query.to_string(),
            });
        }

        let raw_path = parts.next().unwrap_or_default().trim_start_matches('/');
        let path = percent_decode_str(raw_path)
            .decode_utf8()
            .map_err(|e| QueryParseError::InvalidPath {
                query: query.to_string(),
                reason: e.to_string(),
            })?
            .into_owned();

        Ok(Self {
            account,
            container: container.to_string(),
            path,
        })
    }

    /// The storage account, when the grammar carries one in the query.
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Display for BlobQuery {
    /// Re-forms the normalized query.
    ///
    /// Callers must round-trip encode themselves when a path contains
    /// characters reserved by the query grammar.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{SCHEME_PREFIX}")?;
        if let Some(account) = &self.account {
            write!(f, "{account}/")?;
        }
        write!(f, "{}", self.container)?;
        if !self.path.is_empty() {
            write!(f, "/{}", self.path)?;
        }
        Ok(())
    }
}

/// Whether a container name satisfies the legal-character policy.
///
/// The relaxed alphanumeric-plus-dash class is used, with no leading or
/// trailing dash. (One plugin generation attempted a strictly-alphanumeric
/// check that never actually rejected anything; the dash-allowing policy
/// is the one the upstream service accepts and the one tested here.)
pub fn container_name_is_valid(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// The outcome of validating a query string.
///
/// Validation never fails with an error: malformed queries are reported
/// with `valid = false` and a human-readable reason.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct QueryValidation {
    pub query: String,
    pub valid: bool,
    pub reason: Option<String>,
}

impl QueryValidation {
    fn ok(query: &str) -> Self {
        Self {
            query: query.to_string(),
            valid: true,
            reason: None,
        }
    }

    fn fail(query: &str, reason: impl Into<String>) -> Self {
        Self {
            query: query.to_string(),
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Decide whether a query string is acceptable input, independent of
/// whether the referenced blob exists.
pub fn validate_query(query: &str, grammar: QueryGrammar) -> QueryValidation {
    let parsed = match BlobQuery::parse(query, grammar) {
        Ok(parsed) => parsed,
        Err(err) => return QueryValidation::fail(query, err.to_string()),
    };

    // A container that is itself an unresolved placeholder is accepted;
    // it is concretized upstream before the query is used.
    let container = parsed.container();
    let is_placeholder = container.contains('{') && container.contains('}');
    if !is_placeholder && !container_name_is_valid(container) {
        return QueryValidation::fail(
            query,
            format!(
                "container name '{container}' must consist of alphanumerics and dashes"
            ),
        );
    }

    QueryValidation::ok(query)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_three_part_query() {
        let q = BlobQuery::parse(
            "az://acct/container/path/example/file.txt",
            QueryGrammar::AccountInQuery,
        )
        .unwrap();
        assert_eq!(q.account(), Some("acct"));
        assert_eq!(q.container(), "container");
        assert_eq!(q.path(), "path/example/file.txt");
        assert_eq!(q.to_string(), "az://acct/container/path/example/file.txt");
    }

    #[test]
    fn test_parse_two_part_query() {
        let q = BlobQuery::parse("az://container/file.txt", QueryGrammar::AccountInConfig).unwrap();
        assert_eq!(q.account(), None);
        assert_eq!(q.container(), "container");
        assert_eq!(q.path(), "file.txt");
        assert_eq!(q.to_string(), "az://container/file.txt");

        let q = BlobQuery::parse(
            "az://container/path/example/file.txt",
            QueryGrammar::AccountInConfig,
        )
        .unwrap();
        assert_eq!(q.container(), "container");
        assert_eq!(q.path(), "path/example/file.txt");
    }

    #[test]
    fn test_parse_percent_decodes_path() {
        let q = BlobQuery::parse(
            "az://acct/container/dir/with%20space.txt",
            QueryGrammar::AccountInQuery,
        )
        .unwrap();
        assert_eq!(q.path(), "dir/with space.txt");
    }

    #[test]
    fn test_parse_empty_path() {
        let q = BlobQuery::parse("az://acct/container", QueryGrammar::AccountInQuery).unwrap();
        assert_eq!(q.container(), "container");
        assert_eq!(q.path(), "");
        assert_eq!(q.to_string(), "az://acct/container");
    }

    #[test]
    fn test_parse_rejects_wrong_scheme() {
        let err = BlobQuery::parse("s3://bucket/key", QueryGrammar::AccountInQuery).unwrap_err();
        assert!(matches!(err, QueryParseError::UnsupportedScheme { .. }));

        let err = BlobQuery::parse("az:/container/key", QueryGrammar::AccountInConfig).unwrap_err();
        assert!(matches!(err, QueryParseError::UnsupportedScheme { .. }));
    }

    #[test]
    fn test_parse_rejects_missing_container() {
        let err = BlobQuery::parse("az://acct", QueryGrammar::AccountInQuery).unwrap_err();
        assert!(matches!(err, QueryParseError::MissingContainer { .. }));

        let err = BlobQuery::parse("az://", QueryGrammar::AccountInConfig).unwrap_err();
        assert!(matches!(err, QueryParseError::MissingContainer { .. }));
    }

    #[test]
    fn test_placeholders_are_syntactically_valid() {
        let q = BlobQuery::parse(
            "az://acct/container/results/{sample}.bam",
            QueryGrammar::AccountInQuery,
        )
        .unwrap();
        assert_eq!(q.path(), "results/{sample}.bam");

        let v = validate_query(
            "az://acct/container/results/{sample}.bam",
            QueryGrammar::AccountInQuery,
        );
        assert!(v.valid);

        let v = validate_query("az://{container}/file.txt", QueryGrammar::AccountInConfig);
        assert!(v.valid);
    }

    #[test]
    fn test_container_name_charset() {
        assert!(container_name_is_valid("container"));
        assert!(container_name_is_valid("container-test"));
        assert!(container_name_is_valid("c1"));
        assert!(!container_name_is_valid("container**notvalid"));
        assert!(!container_name_is_valid("-leading"));
        assert!(!container_name_is_valid("trailing-"));
        assert!(!container_name_is_valid(""));
    }

    #[test]
    fn test_validate_query() {
        let v = validate_query("az://acct/container/path", QueryGrammar::AccountInQuery);
        assert!(v.valid);
        assert_eq!(v.reason, None);

        let v = validate_query(
            "az://container**notvalid/path",
            QueryGrammar::AccountInConfig,
        );
        assert!(!v.valid);
        assert!(v.reason.as_deref().unwrap().contains("container"));

        let v = validate_query("gs://bucket/path", QueryGrammar::AccountInQuery);
        assert!(!v.valid);
        assert!(!v.reason.as_deref().unwrap().is_empty());
    }
}
