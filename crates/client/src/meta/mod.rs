//! Social preview image discovery.
//!
//! Pages advertise preview images through Open Graph, Twitter card,
//! `link rel="image_src"` and schema.org-style tags. Every mention of a URL
//! adds to that URL's weight; the heaviest candidate wins, with declared
//! area and then document order breaking ties.

pub mod score;
pub mod tags;

use std::collections::HashMap;
use std::fmt;

use url::Url;

use score::{
    ITEM_WEIGHT, LARGE_CARD_BONUS, LINK_WEIGHT, OG_WEIGHT, SECURE_BONUS, SVG_TYPE_PENALTY, TWITTER_WEIGHT,
    mention_weight, parse_dimension, size_bonus,
};
use tags::{link_tags, meta_tags};

const OG_URL_KEYS: &[&str] = &["og:image", "og:image:url", "og:image:secure_url"];
const TWITTER_URL_KEYS: &[&str] =
    &["twitter:image", "twitter:image:src", "twitter:image:url", "twitter:image:secure_url"];
const ITEM_KEYS: &[&str] = &["image", "thumbnailurl", "thumbnail"];

/// Which kind of tag first declared a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Og,
    Twitter,
    Link,
    Itemprop,
    Name,
}

impl ImageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSource::Og => "og",
            ImageSource::Twitter => "twitter",
            ImageSource::Link => "link",
            ImageSource::Itemprop => "itemprop",
            ImageSource::Name => "name",
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate preview image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCandidate {
    pub url: Url,
    pub source: ImageSource,
    pub weight: i32,
    /// Declared width, 0 when unknown.
    pub width: u32,
    /// Declared height, 0 when unknown.
    pub height: u32,
}

impl ImageCandidate {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// `WxH` when both dimensions were declared.
    pub fn size_label(&self) -> Option<String> {
        (self.width > 0 && self.height > 0).then(|| format!("{}x{}", self.width, self.height))
    }
}

/// Candidates in first-seen order, keyed by absolute URL.
#[derive(Default)]
struct Candidates {
    items: Vec<ImageCandidate>,
    index: HashMap<String, usize>,
}

impl Candidates {
    /// Record one mention of `raw`. Returns the candidate's index, or `None`
    /// when the URL cannot be resolved to http(s).
    fn mention(&mut self, raw: Option<&str>, page: &Url, source: ImageSource, base: i32) -> Option<usize> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }
        let url = page.join(raw).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }

        let added = mention_weight(base, &url);
        let key = url.as_str().to_string();
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.items.push(ImageCandidate { url, source, weight: 0, width: 0, height: 0 });
                self.index.insert(key, self.items.len() - 1);
                self.items.len() - 1
            }
        };
        self.items[idx].weight += added;
        Some(idx)
    }

    fn get_mut(&mut self, idx: Option<usize>) -> Option<&mut ImageCandidate> {
        idx.and_then(|i| self.items.get_mut(i))
    }

    /// Apply size bonuses and pick the winner.
    fn into_best(mut self) -> Option<ImageCandidate> {
        for c in &mut self.items {
            c.weight += size_bonus(c.width, c.height);
        }
        let mut best: Option<ImageCandidate> = None;
        for c in self.items {
            let better = match &best {
                None => true,
                Some(b) => (c.weight, c.area()) > (b.weight, b.area()),
            };
            if better {
                best = Some(c);
            }
        }
        best
    }
}

/// Choose the best social preview image declared by `html`, resolving
/// relative URLs against `page`.
pub fn find_social_image(html: &str, page: &Url) -> Option<ImageCandidate> {
    let mut candidates = Candidates::default();
    let mut last_og: Option<usize> = None;
    let mut last_twitter: Option<usize> = None;

    for attrs in meta_tags(html) {
        let property = attrs.key("property");
        let name = attrs.key("name");
        let itemprop = attrs.key("itemprop");
        let key = [&property, &name, &itemprop].into_iter().find(|k| !k.is_empty()).cloned().unwrap_or_default();
        if key.is_empty() {
            continue;
        }
        let content = attrs.get("content");
        let secure = if key.contains("secure") { SECURE_BONUS } else { 0 };

        if OG_URL_KEYS.contains(&key.as_str()) {
            if let Some(idx) = candidates.mention(content, page, ImageSource::Og, OG_WEIGHT + secure) {
                last_og = Some(idx);
            }
            continue;
        }

        if TWITTER_URL_KEYS.contains(&key.as_str()) {
            if let Some(idx) = candidates.mention(content, page, ImageSource::Twitter, TWITTER_WEIGHT + secure) {
                last_twitter = Some(idx);
            }
            continue;
        }

        match key.as_str() {
            "og:image:width" => {
                if let (Some(c), Some(v)) = (candidates.get_mut(last_og), content.and_then(parse_dimension)) {
                    c.width = v;
                }
            }
            "og:image:height" => {
                if let (Some(c), Some(v)) = (candidates.get_mut(last_og), content.and_then(parse_dimension)) {
                    c.height = v;
                }
            }
            "og:image:type" => {
                if let Some(c) = candidates.get_mut(last_og)
                    && content.is_some_and(|t| t.to_ascii_lowercase().contains("svg"))
                {
                    c.weight -= SVG_TYPE_PENALTY;
                }
            }
            "twitter:card" => {
                if let Some(c) = candidates.get_mut(last_twitter)
                    && content.is_some_and(|t| t.trim().to_ascii_lowercase().contains("summary_large_image"))
                {
                    c.weight += LARGE_CARD_BONUS;
                }
            }
            k if ITEM_KEYS.contains(&k) => {
                let source = if itemprop.is_empty() { ImageSource::Name } else { ImageSource::Itemprop };
                candidates.mention(content, page, source, ITEM_WEIGHT);
            }
            _ => {}
        }
    }

    for attrs in link_tags(html) {
        if attrs.key("rel").contains("image_src") {
            candidates.mention(attrs.get("href"), page, ImageSource::Link, LINK_WEIGHT);
        }
    }

    candidates.into_best()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://site.dev/posts/1").unwrap()
    }

    fn best(html: &str) -> ImageCandidate {
        find_social_image(html, &page()).unwrap()
    }

    #[test]
    fn test_no_candidates() {
        assert_eq!(find_social_image("<html><head><title>x</title></head></html>", &page()), None);
        assert_eq!(find_social_image(r#"<meta property="og:image" content="data:image/png;base64,AA">"#, &page()), None);
    }

    #[test]
    fn test_og_beats_twitter_at_equal_area() {
        let html = r#"
            <meta name="twitter:image" content="https://cdn.site.dev/tw.png">
            <meta property="og:image" content="https://cdn.site.dev/og.png">
        "#;
        let c = best(html);
        assert_eq!(c.url.as_str(), "https://cdn.site.dev/og.png");
        assert_eq!(c.source, ImageSource::Og);
        assert_eq!(c.weight, 105);
    }

    #[test]
    fn test_equal_weight_keeps_first_seen() {
        let og = r#"<meta property="og:image" content="https://cdn.site.dev/logo.svg">"#;
        let twitter = r#"<meta name="twitter:image" content="https://cdn.site.dev/card.jpg">"#;

        let c = best(&format!("{og}{twitter}"));
        assert_eq!(c.url.as_str(), "https://cdn.site.dev/logo.svg");
        assert_eq!(c.source, ImageSource::Og);
        assert_eq!(c.weight, 95);

        let c = best(&format!("{twitter}{og}"));
        assert_eq!(c.url.as_str(), "https://cdn.site.dev/card.jpg");
        assert_eq!(c.source, ImageSource::Twitter);
        assert_eq!(c.weight, 95);
    }

    #[test]
    fn test_svg_og_loses_to_twitter_jpg() {
        let html = r#"
            <meta property="og:image" content="https://cdn.site.dev/logo.svg">
            <meta property="og:image:type" content="image/svg+xml">
            <meta name="twitter:image" content="https://cdn.site.dev/card.jpg">
        "#;
        let c = best(html);
        assert_eq!(c.url.as_str(), "https://cdn.site.dev/card.jpg");
        assert_eq!(c.source, ImageSource::Twitter);
    }

    #[test]
    fn test_relative_url_and_declared_size() {
        let html = r#"
            <meta property="og:image" content="/img/cover.png">
            <meta property="og:image:width" content="1200">
            <meta property="og:image:height" content="630">
        "#;
        let c = best(html);
        assert_eq!(c.url.as_str(), "https://site.dev/img/cover.png");
        assert_eq!((c.width, c.height), (1200, 630));
        assert_eq!(c.size_label().as_deref(), Some("1200x630"));
        assert_eq!(c.weight, 105 + 10);
    }

    #[test]
    fn test_repeated_mentions_accumulate() {
        let html = r#"
            <meta property="og:image" content="https://cdn.site.dev/a.png">
            <meta name="twitter:image" content="https://cdn.site.dev/b.png">
            <meta name="twitter:image:src" content="https://cdn.site.dev/b.png">
        "#;
        let c = best(html);
        assert_eq!(c.url.as_str(), "https://cdn.site.dev/b.png");
        assert_eq!(c.source, ImageSource::Twitter);
        assert_eq!(c.weight, 2 * 95);
    }

    #[test]
    fn test_secure_url_bonus() {
        let html = r#"
            <meta property="og:image" content="https://cdn.site.dev/a.png">
            <meta property="og:image:secure_url" content="https://cdn.site.dev/b.png">
        "#;
        assert_eq!(best(html).url.as_str(), "https://cdn.site.dev/b.png");
    }

    #[test]
    fn test_large_card_bonus_applies_to_last_twitter() {
        let html = r#"
            <meta property="og:image" content="http://cdn.site.dev/a">
            <meta name="twitter:image" content="https://cdn.site.dev/b.png">
            <meta name="twitter:card" content="summary_large_image">
        "#;
        let c = best(html);
        assert_eq!(c.url.as_str(), "https://cdn.site.dev/b.png");
        assert_eq!(c.weight, 95 + 6);
    }

    #[test]
    fn test_area_breaks_weight_tie() {
        let html = r#"
            <meta property="og:image" content="https://cdn.site.dev/y">
            <meta property="og:image" content="http://cdn.site.dev/x">
            <meta property="og:image:width" content="600">
            <meta property="og:image:height" content="315">
        "#;
        // y: 100 + 1 (https); x: 100 + 1 (size). Equal weight, x declares an area.
        let c = best(html);
        assert_eq!(c.url.as_str(), "http://cdn.site.dev/x");
        assert_eq!(c.weight, 101);
    }

    #[test]
    fn test_first_seen_breaks_full_tie() {
        let html = r#"
            <meta property="og:image" content="https://cdn.site.dev/first.png">
            <meta property="og:image" content="https://cdn.site.dev/second.png">
        "#;
        assert_eq!(best(html).url.as_str(), "https://cdn.site.dev/first.png");
    }

    #[test]
    fn test_link_and_item_sources() {
        let html = r#"
            <link rel="image_src" href="https://cdn.site.dev/link.png">
            <meta itemprop="image" content="https://cdn.site.dev/item.png">
        "#;
        let c = best(html);
        assert_eq!(c.source, ImageSource::Link);
        assert_eq!(c.weight, 85);

        let c = best(r#"<meta name="thumbnail" content="https://cdn.site.dev/t.png">"#);
        assert_eq!(c.source, ImageSource::Name);
        let c = best(r#"<meta itemprop="thumbnailUrl" content="https://cdn.site.dev/t.png">"#);
        assert_eq!(c.source, ImageSource::Itemprop);
    }

    #[test]
    fn test_source_is_first_mention() {
        let html = r#"
            <meta name="twitter:image" content="https://cdn.site.dev/x.png">
            <meta property="og:image" content="https://cdn.site.dev/x.png">
        "#;
        assert_eq!(best(html).source, ImageSource::Twitter);
    }
}
