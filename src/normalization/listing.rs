use chrono::{DateTime, SecondsFormat};
use indexmap::IndexSet;
use serde_json::Value;

use crate::normalization::slug::game_slug;
use crate::storefront::ListingRecord;

const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".webp", ".gif"];

/// Listing record mapped onto the game entity's shape, relations still by name.
#[derive(Debug, Clone, PartialEq)]
pub struct GameDraft {
    pub name: String,
    /// Slug used for the CMS record and upload filenames.
    pub slug: String,
    /// Storefront slug, used for the detail page URL.
    pub source_slug: String,
    pub price: Option<f64>,
    pub release_date: Option<String>,
    pub categories: Vec<String>,
    pub platforms: Vec<String>,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub cover: Option<String>,
    pub gallery: Vec<String>,
}

impl GameDraft {
    pub fn from_listing(rec: &ListingRecord) -> Self {
        Self {
            name: rec.title.clone(),
            slug: game_slug(&rec.slug),
            source_slug: rec.slug.clone(),
            price: rec.price.amount.as_ref().and_then(value_as_f64),
            release_date: rec.global_release_date.as_ref().and_then(release_date_iso),
            categories: distinct_names(&rec.genres),
            platforms: distinct_names(&rec.supported_operating_systems),
            developer: non_blank(rec.developer.as_deref()),
            publisher: non_blank(rec.publisher.as_deref()),
            cover: rec.image.clone().filter(|s| !s.trim().is_empty()),
            gallery: rec
                .gallery
                .iter()
                .filter(|s| !s.trim().is_empty())
                .cloned()
                .collect(),
        }
    }
}

fn value_as_f64(v: &Value) -> Option<f64> {
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    v.as_str().and_then(|s| s.trim().parse::<f64>().ok())
}

/// Unix seconds (number or numeric string) as an ISO-8601 UTC timestamp with
/// millisecond precision. Zero maps to the epoch; non-numeric input yields None.
pub fn release_date_iso(v: &Value) -> Option<String> {
    let secs = value_as_f64(v)?;
    if !secs.is_finite() {
        return None;
    }
    let millis = (secs * 1000.0).round() as i64;
    DateTime::from_timestamp_millis(millis).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Absolute URL for a storefront image id.
///
/// The listing sends protocol-relative ids without an extension
/// (`//images-1.gog-statics.com/abc`); the CDN serves them as `.jpg`.
pub fn image_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let mut url = if raw.starts_with("//") {
        format!("https:{raw}")
    } else if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{}", raw.trim_start_matches('/'))
    };
    let path = url.split(['?', '#']).next().unwrap_or_default().to_ascii_lowercase();
    if !IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        url.push_str(".jpg");
    }
    Some(url)
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Exact-name dedup preserving first-seen order. Case variants stay distinct.
fn distinct_names(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}
