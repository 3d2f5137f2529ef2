//! Catalog source strings.

use serde::{Deserialize, Serialize};

/// Prefix routing a source through the content-addressed engine.
pub const CAS_PREFIX: &str = "cas://";

/// Forced-getter prefix accepted in module sources.
const GIT_PREFIX: &str = "git::";

/// Where a catalog comes from and how to fetch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSource {
    /// Clone URL or local path, with prefixes and `ref` removed
    pub url: String,
    /// Branch, tag or commit from a `?ref=` query
    pub reference: Option<String>,
    /// Fetch through the CAS engine
    pub use_cas: bool,
}

impl CatalogSource {
    /// Parse a source string.
    ///
    /// Supports formats:
    /// - `/path/to/catalog` or `./catalog`
    /// - `https://github.com/org/repo.git`
    /// - `git::https://github.com/org/repo.git?ref=v1.2.0`
    /// - `git@github.com:org/repo.git?ref=main`
    /// - `github.com/org/repo`
    /// - any of the remote forms behind `cas://`
    pub fn parse(source: &str, allow_cas: bool) -> anyhow::Result<Self> {
        let (raw, use_cas) = match source.strip_prefix(CAS_PREFIX) {
            Some(rest) if allow_cas => (rest, true),
            Some(_) => anyhow::bail!(
                "{} sources are not allowed unless the CAS engine is enabled",
                CAS_PREFIX
            ),
            None => (source, false),
        };
        let raw = raw.strip_prefix(GIT_PREFIX).unwrap_or(raw);

        let (url, reference) = split_ref_query(raw);
        Ok(Self {
            url: expand_shorthand(&url),
            reference,
            use_cas,
        })
    }
}

/// Remove the `ref` parameter from a query string, keeping the others.
fn split_ref_query(raw: &str) -> (String, Option<String>) {
    let Some((base, query)) = raw.split_once('?') else {
        return (raw.to_string(), None);
    };

    let mut reference = None;
    let mut rest = url::form_urlencoded::Serializer::new(String::new());
    let mut kept = 0;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if key == "ref" {
            reference = Some(value.into_owned()).filter(|r| !r.is_empty());
        } else {
            rest.append_pair(&key, &value);
            kept += 1;
        }
    }

    if kept == 0 {
        (base.to_string(), reference)
    } else {
        (format!("{}?{}", base, rest.finish()), reference)
    }
}

/// Expand host shorthands like `github.com/org/repo` to an https URL.
fn expand_shorthand(raw: &str) -> String {
    for host in ["github.com/", "gitlab.com/", "bitbucket.org/"] {
        if raw.starts_with(host) {
            return format!("https://{}", raw);
        }
    }
    raw.to_string()
}
