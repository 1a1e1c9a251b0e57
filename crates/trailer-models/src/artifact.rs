//! The resolved artifact: the cache value produced by a successful resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provenance family of a resolved artifact's URL.
///
/// Drives the cache TTL (see [`SourceType::cache_ttl_hours`]) and the
/// human-facing `name`/`title` fields in the stream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Itunes,
    Youtube,
    Archive,
    Apple,
    Vimeo,
    Dailymotion,
}

impl SourceType {
    /// Cache TTL per §3: proxied video-CDN URLs are short-lived, catalog
    /// preview URLs are stable, archive object URLs are effectively immutable.
    /// Anything not explicitly listed falls back to the YouTube TTL, the
    /// shortest, as the conservative default.
    pub fn cache_ttl_hours(self) -> i64 {
        match self {
            SourceType::Youtube => 2,
            SourceType::Itunes => 168,
            SourceType::Archive => 720,
            SourceType::Apple | SourceType::Vimeo | SourceType::Dailymotion => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Itunes => "itunes",
            SourceType::Youtube => "youtube",
            SourceType::Archive => "archive",
            SourceType::Apple => "apple",
            SourceType::Vimeo => "vimeo",
            SourceType::Dailymotion => "dailymotion",
        }
    }

    /// Infer a source type from a URL host when the caller didn't supply one
    /// explicitly. Used by `Cache::set` per §4.2.
    pub fn infer_from_url(url: &str) -> SourceType {
        let lower = url.to_ascii_lowercase();
        if lower.contains("googlevideo.com") || lower.contains("youtube.com") || lower.contains("youtu.be") {
            SourceType::Youtube
        } else if lower.contains("archive.org") {
            SourceType::Archive
        } else if lower.contains("apple.com") {
            SourceType::Apple
        } else if lower.contains("vimeo.com") {
            SourceType::Vimeo
        } else if lower.contains("dailymotion.com") {
            SourceType::Dailymotion
        } else {
            SourceType::Itunes
        }
    }
}

/// A single resolved, streamable trailer/teaser URL for one IMDb id.
///
/// Invariant: if an artifact exists in the cache, `preview_url` is non-empty.
/// Negative results are never represented by this type being present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedArtifact {
    pub imdb_id: String,
    pub preview_url: String,
    pub track_id: Option<String>,
    pub country: Option<String>,
    pub youtube_key: Option<String>,
    pub source_type: SourceType,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl ResolvedArtifact {
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.timestamp)
    }

    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.source_type.cache_ttl_hours())
    }

    pub fn is_expired(&self) -> bool {
        self.age() >= self.ttl()
    }

    /// True once the entry is old enough and close enough to expiry that a
    /// revalidation HEAD-probe is worthwhile (§4.2: age > 12h AND age > 0.8*TTL).
    pub fn needs_revalidation(&self) -> bool {
        let age = self.age();
        age > chrono::Duration::hours(12) && age.num_milliseconds() as f64 > 0.8 * self.ttl().num_milliseconds() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_source_type_from_host() {
        assert_eq!(SourceType::infer_from_url("https://r1---sn-abc.googlevideo.com/videoplayback?x"), SourceType::Youtube);
        assert_eq!(SourceType::infer_from_url("https://archive.org/download/foo/bar.mp4"), SourceType::Archive);
        assert_eq!(SourceType::infer_from_url("https://example.com/preview.m4v"), SourceType::Itunes);
    }

    #[test]
    fn ttl_hours_match_spec_table() {
        assert_eq!(SourceType::Youtube.cache_ttl_hours(), 2);
        assert_eq!(SourceType::Itunes.cache_ttl_hours(), 168);
        assert_eq!(SourceType::Archive.cache_ttl_hours(), 720);
    }

    #[test]
    fn expiry_respects_ttl() {
        let fresh = ResolvedArtifact {
            imdb_id: "tt0111161".into(),
            preview_url: "https://example.com/a.mp4".into(),
            track_id: None,
            country: None,
            youtube_key: None,
            source_type: SourceType::Itunes,
            source: "itunes".into(),
            timestamp: Utc::now(),
        };
        assert!(!fresh.is_expired());

        let stale = ResolvedArtifact {
            timestamp: Utc::now() - chrono::Duration::hours(200),
            ..fresh.clone()
        };
        assert!(stale.is_expired()); // itunes TTL is 168h
    }
}
