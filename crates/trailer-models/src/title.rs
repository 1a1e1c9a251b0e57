//! The transient canonical-title record produced by the metadata resolver (C5).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

/// Video hosting site a non-YouTube trailer may live on (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoSite {
    YouTube,
    Vimeo,
    Dailymotion,
    Apple,
    Facebook,
    Twitter,
    Instagram,
}

impl VideoSite {
    /// All sites C5 recognizes as carrying a trailer candidate, in no
    /// particular priority order (priority is about video *type*, not site).
    pub const SUPPORTED: &'static [VideoSite] = &[
        VideoSite::YouTube,
        VideoSite::Vimeo,
        VideoSite::Dailymotion,
        VideoSite::Apple,
        VideoSite::Facebook,
        VideoSite::Twitter,
        VideoSite::Instagram,
    ];
}

/// Canonical title metadata derived from the metadata DB, transient (never
/// persisted — only the resolved artifact and stats survive a request).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalTitle {
    pub media_type: MediaType,
    pub title: String,
    pub original_title: String,
    pub year: Option<i32>,
    pub runtime_minutes: Option<i32>,
    pub alt_titles: BTreeSet<String>,
    pub youtube_key: Option<String>,
    pub youtube_trailer_title: Option<String>,
    pub trailer_url: Option<String>,
    pub trailer_site: Option<VideoSite>,
}

impl CanonicalTitle {
    /// English-locale alt-title country codes kept by the filter in §4.5.
    pub const ALT_TITLE_COUNTRIES: &'static [&'static str] = &["US", "GB", "CA", "AU"];

    /// All title strings worth trying against a search API: main, original
    /// (if distinct), then alt titles in insertion order — matches the
    /// "titles tried per country" cascade used by C6.
    pub fn candidate_titles(&self) -> Vec<&str> {
        let mut out = vec![self.title.as_str()];
        if self.original_title != self.title {
            out.push(self.original_title.as_str());
        }
        for alt in &self.alt_titles {
            if !out.contains(&alt.as_str()) {
                out.push(alt.as_str());
            }
        }
        out
    }
}
