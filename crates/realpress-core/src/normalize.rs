//! URL normalization and dedup-key hashing.
//!
//! Every URL entering the pipeline is reduced to a canonical form before it is
//! hashed. The hash, not the URL string, is the dedup key for both the job
//! table and the ingested-content index.

use sha2::{Digest, Sha256};
use thiserror::Error;
use url::{form_urlencoded, Url};

/// Query parameters that only carry campaign attribution.
const TRACKING_PARAMS: [&str; 5] = ["fbclid", "gclid", "mc_cid", "mc_eid", "ref_src"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("invalid URL \"{url}\": {reason}")]
    Invalid { url: String, reason: String },
}

/// A URL in canonical form together with its origin domain and dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    pub url: String,
    /// Lowercased hostname with any leading `www.` removed.
    pub domain: String,
    /// Lowercase hex SHA-256 of `url`.
    pub hash: String,
}

/// Normalize a raw URL for deduplication.
///
/// - scheme and host are lowercased, default ports dropped (via [`Url`])
/// - the fragment is removed
/// - `utm_*` and other tracking parameters are removed, the rest sorted
/// - a trailing slash on a non-root path is removed
///
/// # Errors
///
/// Returns [`UrlError::Invalid`] for unparseable input, non-http(s) schemes,
/// or URLs without a host.
pub fn normalize_url(raw: &str) -> Result<NormalizedUrl, UrlError> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| UrlError::Invalid {
        url: trimmed.to_string(),
        reason: reason.to_string(),
    };

    if trimmed.is_empty() {
        return Err(invalid("empty URL"));
    }

    let mut parsed = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }

    let domain = match parsed.host_str() {
        Some(host) if !host.is_empty() => domain_from_host(host),
        _ => return Err(invalid("URL has no host")),
    };

    parsed.set_fragment(None);

    let query = parsed.query().map(canonical_query).filter(|q| !q.is_empty());
    parsed.set_query(query.as_deref());

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }

    let url = parsed.to_string();
    let hash = url_hash(&url);

    Ok(NormalizedUrl { url, domain, hash })
}

/// Hash an already-normalized URL into its dedup key.
#[must_use]
pub fn url_hash(normalized: &str) -> String {
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

/// Lowercase a hostname and strip a leading `www.`.
#[must_use]
pub fn domain_from_host(host: &str) -> String {
    let lower = host.trim().trim_end_matches('.').to_lowercase();
    lower
        .strip_prefix("www.")
        .map_or_else(|| lower.clone(), ToOwned::to_owned)
}

/// Drop tracking parameters and sort the rest. A bare `key` stays bare and
/// `key=` keeps its `=`, so the two never collapse into one dedup key.
fn canonical_query(query: &str) -> String {
    let mut params: Vec<(String, Option<String>)> = query
        .split('&')
        .filter_map(|segment| {
            let (key, value) = form_urlencoded::parse(segment.as_bytes()).next()?;
            let value = segment.contains('=').then(|| value.into_owned());
            Some((key.into_owned(), value))
        })
        .filter(|(key, _)| !is_tracking_param(key))
        .collect();
    params.sort();

    params
        .iter()
        .map(|(key, value)| {
            let key: String = form_urlencoded::byte_serialize(key.as_bytes()).collect();
            match value {
                Some(value) => {
                    let value: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
                    format!("{key}={value}")
                }
                None => key,
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn is_tracking_param(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.starts_with("utm_") || TRACKING_PARAMS.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_host_and_drops_fragment_and_default_port() {
        let n = normalize_url("HTTPS://WWW.Example.COM:443/Story#comments").unwrap();
        assert_eq!(n.url, "https://www.example.com/Story");
        assert_eq!(n.domain, "example.com");
    }

    #[test]
    fn strips_tracking_params_and_sorts_the_rest() {
        let n = normalize_url("https://example.com/a?utm_source=x&b=2&fbclid=abc&a=1").unwrap();
        assert_eq!(n.url, "https://example.com/a?a=1&b=2");
    }

    #[test]
    fn bare_query_keys_stay_bare() {
        let n = normalize_url("https://example.com/a?amp&b=2").unwrap();
        assert_eq!(n.url, "https://example.com/a?amp&b=2");
    }

    #[test]
    fn bare_and_empty_valued_keys_are_distinct() {
        let n = normalize_url("https://example.com/a?b=&a").unwrap();
        assert_eq!(n.url, "https://example.com/a?a&b=");

        let bare = normalize_url("https://example.com/a?flag").unwrap();
        let empty = normalize_url("https://example.com/a?flag=").unwrap();
        assert_ne!(bare.hash, empty.hash);
    }

    #[test]
    fn encoded_query_values_survive_normalization() {
        let n = normalize_url("https://example.com/search?q=a%26b&utm_source=x").unwrap();
        assert_eq!(n.url, "https://example.com/search?q=a%26b");
    }

    #[test]
    fn removes_query_entirely_when_only_tracking_params() {
        let n = normalize_url("https://example.com/a?utm_medium=email").unwrap();
        assert_eq!(n.url, "https://example.com/a");
    }

    #[test]
    fn trailing_slash_variants_share_a_hash() {
        let a = normalize_url("https://example.com/news/story/").unwrap();
        let b = normalize_url("https://EXAMPLE.com/news/story").unwrap();
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn root_path_keeps_its_slash() {
        let n = normalize_url("https://example.com").unwrap();
        assert_eq!(n.url, "https://example.com/");
    }

    #[test]
    fn path_case_is_significant() {
        let a = normalize_url("https://example.com/Story").unwrap();
        let b = normalize_url("https://example.com/story").unwrap();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn rejects_non_http_schemes() {
        let err = normalize_url("ftp://example.com/file").unwrap_err();
        assert!(err.to_string().contains("scheme"));
    }

    #[test]
    fn rejects_garbage_and_empty_input() {
        assert!(normalize_url("not a url").is_err());
        assert!(normalize_url("   ").is_err());
    }

    #[test]
    fn hash_is_fixed_width_hex() {
        let n = normalize_url("https://example.com/a").unwrap();
        assert_eq!(n.hash.len(), 64);
        assert!(n.hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn domain_from_host_strips_www_and_trailing_dot() {
        assert_eq!(domain_from_host("WWW.News.Example.org."), "news.example.org");
        assert_eq!(domain_from_host("example.org"), "example.org");
    }
}
