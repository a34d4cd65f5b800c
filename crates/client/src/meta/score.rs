//! Candidate weights.

use url::Url;

pub const OG_WEIGHT: i32 = 100;
pub const TWITTER_WEIGHT: i32 = 90;
pub const LINK_WEIGHT: i32 = 80;
pub const ITEM_WEIGHT: i32 = 70;
pub const SECURE_BONUS: i32 = 2;
pub const SVG_TYPE_PENALTY: i32 = 6;
pub const LARGE_CARD_BONUS: i32 = 6;

/// Area of the standard 600x315 social card.
const BASE_AREA: f64 = 600.0 * 315.0;

/// Preference by file extension of the URL path.
pub fn ext_score(url: &Url) -> i32 {
    let path = url.path();
    let last = path.rsplit('/').next().unwrap_or("");
    let Some((_, ext)) = last.rsplit_once('.') else {
        return 0;
    };
    match ext.to_ascii_lowercase().as_str() {
        "svg" => -6,
        "gif" => -2,
        "jpg" | "jpeg" | "png" | "webp" => 4,
        _ => 0,
    }
}

/// Weight added by a single mention of `url`.
pub fn mention_weight(base: i32, url: &Url) -> i32 {
    let https = i32::from(url.scheme() == "https");
    base + https + ext_score(url)
}

/// Bonus for the declared image size, applied once per candidate.
pub fn size_bonus(width: u32, height: u32) -> i32 {
    if width == 0 || height == 0 {
        return 0;
    }
    let area = f64::from(width) * f64::from(height);
    if area <= BASE_AREA {
        return 1;
    }
    let bonus = ((area / BASE_AREA).log2() * 5.0).floor();
    bonus.min(20.0) as i32
}

/// Leading integer of a dimension value such as `"1200"` or `"1200px"`.
pub fn parse_dimension(value: &str) -> Option<u32> {
    let digits: String = value.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}
