//! Tolerant scanning of `<meta>` and `<link>` tags.
//!
//! Markup is never parsed into a tree and scripts are never run; tags are
//! matched with regular expressions and malformed input simply yields fewer
//! tags.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static META_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<meta\s[^>]*>").expect("invalid regex"));
static LINK_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<link\s[^>]*>").expect("invalid regex"));
static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z][a-z0-9_:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("invalid regex")
});

/// Quoted attributes of one tag. Names are lowercased; the first occurrence
/// of a name wins and empty values are dropped.
#[derive(Debug, Default)]
pub struct Attrs(HashMap<String, String>);

impl Attrs {
    pub fn parse(tag: &str) -> Self {
        let mut map = HashMap::new();
        for caps in ATTR.captures_iter(tag) {
            let Some(name) = caps.get(1) else { continue };
            let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
            if value.is_empty() {
                continue;
            }
            map.entry(name.as_str().to_ascii_lowercase()).or_insert_with(|| decode_entities(value));
        }
        Self(map)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Trimmed, lowercased value; empty when absent.
    pub fn key(&self, name: &str) -> String {
        self.get(name).map(|v| v.trim().to_lowercase()).unwrap_or_default()
    }
}

pub fn meta_tags(html: &str) -> impl Iterator<Item = Attrs> + '_ {
    META_TAG.find_iter(html).map(|m| Attrs::parse(m.as_str()))
}

pub fn link_tags(html: &str) -> impl Iterator<Item = Attrs> + '_ {
    LINK_TAG.find_iter(html).map(|m| Attrs::parse(m.as_str()))
}

fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&amp;", "&")
        .replace("&#38;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attrs_mixed_quotes_and_case() {
        let attrs = Attrs::parse(r#"<meta PROPERTY='og:image' Content="https://a.dev/x.png?a=1&amp;b=2">"#);
        assert_eq!(attrs.get("property"), Some("og:image"));
        assert_eq!(attrs.get("content"), Some("https://a.dev/x.png?a=1&b=2"));
    }

    #[test]
    fn test_attrs_first_occurrence_wins() {
        let attrs = Attrs::parse(r#"<meta name="first" name="second" content="">"#);
        assert_eq!(attrs.get("name"), Some("first"));
        assert_eq!(attrs.get("content"), None);
    }

    #[test]
    fn test_key_is_trimmed_lowercase() {
        let attrs = Attrs::parse(r#"<meta property=" OG:Image " content="x">"#);
        assert_eq!(attrs.key("property"), "og:image");
        assert_eq!(attrs.key("name"), "");
    }

    #[test]
    fn test_scan_ignores_garbage() {
        let html = r#"<html><meta charset=utf-8><META property="og:image" content="/a.png"
            ><link rel="image_src" href="/b.png"><metadata foo="bar"><link"#;
        let metas: Vec<_> = meta_tags(html).collect();
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[1].get("content"), Some("/a.png"));
        let links: Vec<_> = link_tags(html).collect();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].get("href"), Some("/b.png"));
    }
}
