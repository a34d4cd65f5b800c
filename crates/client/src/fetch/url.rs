//! Capture target normalization and the rendering access policy.

use url::Url;

/// Error type for target normalization failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL has no host")]
    MissingHost,
}

/// Normalize a user-supplied capture target.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// unless an http(s) scheme is given
/// 3. Parse, lowercasing the host
/// 4. Keep query and fragment exactly as the parser serializes them
///
/// The serialized result is the canonical string used in cache keys.
pub fn normalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let lower = trimmed.to_ascii_lowercase();
    let url_str = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else if let Some((scheme, _)) = trimmed.split_once("://") {
        return Err(UrlError::UnsupportedScheme(scheme.to_ascii_lowercase()));
    } else {
        format!("https://{trimmed}")
    };

    let parsed = Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    Ok(parsed)
}

/// Whether `url` may be rendered: its host is `root_domain` or a subdomain of it.
///
/// Only the rendering tier is gated; social-image proxying works for any host.
pub fn is_render_eligible(url: &Url, root_domain: &str) -> bool {
    let root = root_domain.trim().trim_end_matches('.').to_ascii_lowercase();
    if root.is_empty() || !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    host == root || host.strip_suffix(&root).is_some_and(|rest| rest.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_default_scheme() {
        let url = normalize("root.dev/a").unwrap();
        assert_eq!(url.as_str(), "https://root.dev/a");
    }

    #[test]
    fn test_normalize_scheme_case_insensitive() {
        let url = normalize("HTTP://Root.Dev").unwrap();
        assert_eq!(url.as_str(), "http://root.dev/");
    }

    #[test]
    fn test_normalize_trim_whitespace() {
        let url = normalize("  https://example.com  ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn test_normalize_preserves_query_and_fragment() {
        let url = normalize("https://example.com/p?b=2&a=1#top").unwrap();
        assert_eq!(url.query(), Some("b=2&a=1"));
        assert_eq!(url.fragment(), Some("top"));
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize(""), Err(UrlError::Empty));
        assert_eq!(normalize("   "), Err(UrlError::Empty));
    }

    #[test]
    fn test_normalize_unsupported_scheme() {
        assert!(matches!(normalize("ftp://example.com"), Err(UrlError::UnsupportedScheme(s)) if s == "ftp"));
        assert!(matches!(normalize("file:///etc/passwd"), Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_normalize_unparseable() {
        assert!(matches!(normalize("http://exa mple.com"), Err(UrlError::InvalidUrl(_))));
        assert!(matches!(normalize("not a url!!!"), Err(UrlError::InvalidUrl(_))));
    }

    #[test]
    fn test_render_eligibility() {
        let eligible = |raw: &str| is_render_eligible(&normalize(raw).unwrap(), "root.dev");
        assert!(eligible("root.dev"));
        assert!(eligible("https://docs.root.dev/page"));
        assert!(eligible("http://a.b.root.dev"));
        assert!(!eligible("notroot.dev"));
        assert!(!eligible("root.dev.evil.com"));
        assert!(!eligible("example.com"));
    }
}
