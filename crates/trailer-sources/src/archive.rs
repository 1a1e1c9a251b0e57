//! Internet Archive strategy (C8): last-resort, broadest-coverage trailer
//! search against archive.org's advanced search and metadata endpoints.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use trailer_models::{retry_async, ArchiveCookie, QualityTier, RetryConfig, RetryResult, StatType};
use trailer_store::{CookieJar, Tracker};

use crate::error::{SourceError, SourceResult};
use crate::fuzzy::{fuzzy_match, normalize};

const SEARCH_BASE: &str = "https://archive.org/advancedsearch.php";
const STRATEGY_TIMEOUT: Duration = Duration::from_secs(8);
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
const METADATA_CAP_BYTES: usize = 10 * 1024 * 1024;
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(3);

const STRATEGIES_TRIED: usize = 3;
const ACCEPT_THRESHOLD_DEFAULT: f64 = 0.85;
const ACCEPT_THRESHOLD_STRICT: f64 = 1.0;

const STOPWORDS: &[&str] = &["the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "avi", "mkv", "m4v"];
const REJECT_FILENAME_MARKERS: &[&str] = &["thumb", "sample", ".jpg", ".jpeg", ".png", ".json", ".xml", ".txt"];

pub struct ArchiveInput<'a> {
    pub imdb_id: &'a str,
    pub title: &'a str,
    pub original_title: Option<&'a str>,
    pub year: Option<i32>,
    pub trailer_title: Option<&'a str>,
    pub released_recently: bool,
}

#[derive(Debug, Clone)]
pub struct ArchiveCandidate {
    pub download_url: String,
    pub quality: QualityTier,
}

#[derive(Clone, Copy)]
struct Strategy {
    id: &'static str,
}

const ALL_STRATEGIES: &[Strategy] = &[
    Strategy { id: "imdb_exact" },
    Strategy { id: "collection_title_year" },
    Strategy { id: "collection_title" },
    Strategy { id: "title_trailer_year" },
    Strategy { id: "title_trailer" },
    Strategy { id: "collection_original_year" },
    Strategy { id: "trailer_title" },
    Strategy { id: "trailer_title_year" },
];

pub struct ArchiveClient {
    http: reqwest::Client,
    cookies: Option<std::sync::Arc<CookieJar>>,
}

impl ArchiveClient {
    pub fn new(cookies: Option<std::sync::Arc<CookieJar>>) -> Self {
        Self {
            http: reqwest::Client::builder().build().expect("failed to build archive http client"),
            cookies,
        }
    }

    pub async fn search(&self, input: &ArchiveInput<'_>, tracker: &Tracker) -> SourceResult<Option<ArchiveCandidate>> {
        let applicable = applicable_strategies(input);
        let ranked = tracker
            .sort_by_success_rate(StatType::Archive, applicable.iter().map(|s| s.id.to_string()).collect())
            .await;

        let mut cookie: Option<ArchiveCookie> = None;
        if let Some(jar) = &self.cookies {
            cookie = jar.checkout().await;
        }
        let cookie_header = cookie.as_ref().map(|c| c.cookies.as_str());

        for strategy_id in ranked.into_iter().take(STRATEGIES_TRIED) {
            let Some(strategy) = applicable.iter().find(|s| s.id == strategy_id) else { continue };
            match self.run_strategy(*strategy, input, cookie_header).await {
                Ok(Some(doc)) => {
                    tracker.record_success(StatType::Archive, strategy.id).await;
                    if let Some(candidate) = self.resolve_object(&doc.identifier).await? {
                        return Ok(Some(candidate));
                    }
                    debug!(identifier = %doc.identifier, "archive winner had no valid object, continuing");
                }
                Ok(None) => {
                    tracker.record_failure(StatType::Archive, strategy.id).await;
                }
                Err(SourceError::AuthRejected(status)) => {
                    warn!(strategy = strategy.id, status, "archive cookie rejected, invalidating");
                    if let (Some(jar), Some(cookie)) = (&self.cookies, &cookie) {
                        jar.invalidate(cookie.id).await;
                    }
                    tracker.record_failure(StatType::Archive, strategy.id).await;
                }
                Err(e) => {
                    warn!(strategy = strategy.id, error = %e, "archive strategy failed");
                    tracker.record_failure(StatType::Archive, strategy.id).await;
                }
            }
        }

        Ok(None)
    }

    async fn run_strategy(
        &self,
        strategy: Strategy,
        input: &ArchiveInput<'_>,
        cookie_header: Option<&str>,
    ) -> SourceResult<Option<ArchiveDoc>> {
        let query = build_query(strategy, input);
        let config = RetryConfig::two_attempts(format!("archive-{}", strategy.id));

        let fut = retry_async(&config, || self.fetch_query(&query, cookie_header));
        let response = match tokio::time::timeout(STRATEGY_TIMEOUT, fut).await {
            Ok(RetryResult::Success(docs)) => docs,
            Ok(RetryResult::Failed(e)) => return Err(e),
            Err(_) => return Err(SourceError::Timeout(STRATEGY_TIMEOUT)),
        };

        Ok(best_candidate(&response, input))
    }

    async fn fetch_query(&self, query: &str, cookie_header: Option<&str>) -> SourceResult<Vec<ArchiveDoc>> {
        let mut req = self.http.get(SEARCH_BASE).query(&[
            ("q", query),
            ("fl[]", "identifier"),
            ("fl[]", "title"),
            ("fl[]", "year"),
            ("fl[]", "external-identifier"),
            ("fl[]", "downloads"),
            ("sort[]", "downloads desc"),
            ("rows", "20"),
            ("output", "json"),
        ]);
        if let Some(cookie) = cookie_header {
            req = req.header("Cookie", cookie);
        }
        let response = req.send().await?;
        let status = response.status().as_u16();
        if matches!(status, 502 | 503 | 504) {
            return Err(SourceError::Shape(format!("retryable status {status}")));
        }
        if cookie_header.is_some() && matches!(status, 401 | 403) {
            return Err(SourceError::AuthRejected(status));
        }
        let response = response.error_for_status()?;
        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.response.docs)
    }

    /// Fetch the winning identifier's metadata, pick the best video file,
    /// and validate the resulting download URL with a ranged HEAD.
    async fn resolve_object(&self, identifier: &str) -> SourceResult<Option<ArchiveCandidate>> {
        let url = format!("https://archive.org/metadata/{identifier}");
        let response = tokio::time::timeout(METADATA_TIMEOUT, self.http.get(&url).send()).await;
        let response = match response {
            Ok(Ok(r)) => r,
            _ => return Ok(None),
        };
        let Ok(response) = response.error_for_status() else { return Ok(None) };

        let content_length = response.content_length().unwrap_or(0);
        if content_length as usize > METADATA_CAP_BYTES {
            warn!(identifier, "archive metadata response too large, skipping");
            return Ok(None);
        }
        let Ok(metadata) = response.json::<MetadataResponse>().await else { return Ok(None) };

        let mut candidates: Vec<&ArchiveFile> = metadata
            .files
            .iter()
            .filter(|f| is_video_file(&f.name))
            .filter(|f| !is_rejected_filename(&f.name))
            .collect();

        let duration_filtered: Vec<&&ArchiveFile> = candidates
            .iter()
            .filter(|f| f.length.as_deref().and_then(|l| l.parse::<f64>().ok()).map(|d| (20.0..=300.0).contains(&d)).unwrap_or(true))
            .collect();
        if !duration_filtered.is_empty() {
            candidates = duration_filtered.into_iter().copied().collect();
        }

        candidates.sort_by(|a, b| {
            let a_mp4 = a.name.ends_with(".mp4");
            let b_mp4 = b.name.ends_with(".mp4");
            b_mp4.cmp(&a_mp4).then_with(|| {
                let a_size = a.size.as_deref().and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);
                let b_size = b.size.as_deref().and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);
                b_size.cmp(&a_size)
            })
        });

        let Some(winner) = candidates.first() else { return Ok(None) };
        let size_bytes = winner.size.as_deref().and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);
        let quality = quality_from_size(size_bytes);

        let encoded_name = percent_encode_preserving_slashes(&winner.name);
        let download_url = format!("https://archive.org/download/{identifier}/{encoded_name}");

        if !self.validate(&download_url).await {
            return Ok(None);
        }

        Ok(Some(ArchiveCandidate { download_url, quality }))
    }

    async fn validate(&self, url: &str) -> bool {
        let request = self.http.get(url).header("Range", "bytes=0-1");
        match tokio::time::timeout(VALIDATE_TIMEOUT, request.send()).await {
            Ok(Ok(response)) => {
                let status = response.status().as_u16();
                !(status == 401 || status == 403 || status >= 400)
            }
            _ => false,
        }
    }
}

fn quality_from_size(bytes: u64) -> QualityTier {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    if mb > 100.0 {
        QualityTier::P1080
    } else if mb > 50.0 {
        QualityTier::P720
    } else if mb > 20.0 {
        QualityTier::P480
    } else {
        QualityTier::P360
    }
}

fn is_video_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| lower.ends_with(&format!(".{ext}")))
}

fn is_rejected_filename(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    REJECT_FILENAME_MARKERS.iter().any(|m| lower.contains(m))
}

fn percent_encode_preserving_slashes(name: &str) -> String {
    name.split('/').map(urlencoding::encode).collect::<Vec<_>>().join("/")
}

fn applicable_strategies(input: &ArchiveInput<'_>) -> Vec<Strategy> {
    ALL_STRATEGIES
        .iter()
        .copied()
        .filter(|s| match s.id {
            "collection_original_year" => input.original_title.is_some() && input.year.is_some(),
            "trailer_title" | "trailer_title_year" => input.trailer_title.is_some(),
            "collection_title_year" | "title_trailer_year" => input.year.is_some(),
            _ => true,
        })
        .collect()
}

fn build_query(strategy: Strategy, input: &ArchiveInput<'_>) -> String {
    let t = input.title;
    let y = input.year.map(|y| y.to_string()).unwrap_or_default();
    match strategy.id {
        "imdb_exact" => format!(r#"collection:movie_trailers AND external-identifier:("urn:imdb:{}")"#, input.imdb_id),
        "collection_title_year" => format!("collection:movie_trailers AND title:{t} AND year:{y}"),
        "collection_title" => format!("collection:movie_trailers AND title:{t}"),
        "title_trailer_year" => format!("title:{t} trailer AND year:{y}"),
        "title_trailer" => format!("title:{t} trailer"),
        "collection_original_year" => {
            let ot = input.original_title.unwrap_or(t);
            format!("collection:movie_trailers AND title:{ot} AND year:{y}")
        }
        "trailer_title" => format!("title:{}", input.trailer_title.unwrap_or(t)),
        "trailer_title_year" => format!("title:{} AND year:{}", input.trailer_title.unwrap_or(t), y),
        _ => format!("title:{t}"),
    }
}

/// §4.8 candidate ranking for one document in the search results.
fn score_doc(doc: &ArchiveDoc, input: &ArchiveInput<'_>, search_title: &str) -> Option<f64> {
    let doc_title_lower = doc.title.to_ascii_lowercase();
    if doc_title_lower.contains("#shorts") || doc_title_lower.contains("shorts") {
        return None;
    }
    if doc_title_lower.contains("behind the scenes") || doc_title_lower.contains("featurette") {
        return None;
    }
    if doc_title_lower.contains("clip") && !doc_title_lower.contains("trailer") {
        return None;
    }

    let target = strip_tt(input.imdb_id);
    let doc_imdb_ids: Vec<&str> = doc.external_identifier.iter().flatten().filter_map(|id| id.split("imdb:").nth(1)).collect();
    let imdb_matches = doc_imdb_ids.iter().any(|id| *id == target);
    let imdb_conflicts = doc_imdb_ids.iter().any(|id| *id != target);

    if imdb_matches {
        return Some(1.0);
    }
    if imdb_conflicts {
        return None;
    }

    let fuzzy_main = fuzzy_match(search_title, &doc.title);
    let fuzzy_original = input.original_title.map(|o| fuzzy_match(o, &doc.title)).unwrap_or(0.0);
    let fuzzy = fuzzy_main.max(fuzzy_original);
    if fuzzy < 0.5 {
        return None;
    }

    let search_words: Vec<&str> = normalize(search_title).split_whitespace().collect();
    let short_title = search_words.len() <= 2 && search_words.iter().all(|w| w.len() >= 3);

    if search_words.len() == 1 {
        let doc_norm = normalize(&doc.title);
        if !doc_norm.starts_with(search_words[0]) {
            return None;
        }
    }

    let doc_words: Vec<&str> = normalize(&doc.title).split_whitespace().collect();
    let matched = search_words.iter().filter(|w| doc_words.contains(w)).count();
    let word_ratio = if search_words.is_empty() { 0.0 } else { matched as f64 / search_words.len() as f64 };

    if short_title && word_ratio < 0.9 {
        return None;
    }

    let mut score = 0.0;
    let normalized_doc = normalize(&doc.title);
    if normalized_doc == normalize(search_title) {
        score += 1.0;
    } else if input.original_title.map(|o| normalize(o) == normalized_doc).unwrap_or(false) {
        score += 0.9;
    } else if word_ratio >= 0.8 {
        score += 0.7;
    } else if word_ratio >= 0.5 {
        score += 0.4;
    }

    if fuzzy > 0.85 && word_ratio > 0.3 {
        score += 0.3;
    }
    if fuzzy > 0.9 && word_ratio > 0.5 {
        score += 0.4;
    }

    if doc_norm_contains_substring(&normalized_doc, &normalize(search_title)) {
        score += 0.2;
    }

    if doc_title_lower.contains("trailer") {
        score += 0.2;
    } else if doc_title_lower.contains("preview") || doc_title_lower.contains("teaser") {
        score += 0.15;
    }

    if let (Some(y), Some(dy)) = (input.year, doc.year.as_deref().and_then(|y| y.parse::<i32>().ok())) {
        let diff = (y - dy).abs();
        if diff == 0 {
            score += 0.3;
        } else if diff == 1 {
            score += 0.2;
        } else if diff <= 3 {
            score += 0.1;
        } else if diff > 5 {
            score -= 0.3;
        }
        if short_title && diff > 10 {
            return None;
        }
    }

    if doc.external_identifier.iter().flatten().next().is_none() && short_title {
        score -= 0.1;
    }

    if let Some(downloads) = doc.downloads {
        if downloads > 1_000 {
            score += 0.1;
        }
        if downloads > 10_000 {
            score += 0.1;
        }
    }

    Some(score)
}

fn doc_norm_contains_substring(doc: &str, search: &str) -> bool {
    search.len() >= 5 && doc.contains(search)
}

fn strip_tt(imdb_id: &str) -> &str {
    imdb_id.strip_prefix("tt").unwrap_or(imdb_id)
}

fn best_candidate(docs: &[ArchiveDoc], input: &ArchiveInput<'_>) -> Option<ArchiveDoc> {
    let search_title = input.title;
    let short_title = normalize(search_title).split_whitespace().count() <= 2;

    let threshold = if short_title || input.released_recently { ACCEPT_THRESHOLD_STRICT } else { ACCEPT_THRESHOLD_DEFAULT };

    let mut best: Option<(f64, &ArchiveDoc)> = None;
    for doc in docs {
        let Some(score) = score_doc(doc, input, search_title) else { continue };
        if score < threshold {
            continue;
        }
        if !structural_filter_passes(doc, input, search_title, score) {
            continue;
        }
        if best.map(|(b, _)| score > b).unwrap_or(true) {
            best = Some((score, doc));
        }
    }
    best.map(|(_, d)| d.clone())
}

fn structural_filter_passes(doc: &ArchiveDoc, input: &ArchiveInput<'_>, search_title: &str, score: f64) -> bool {
    if score >= 1.0 {
        return true;
    }
    let lower = doc.title.to_ascii_lowercase();
    let has_keyword = lower.contains("trailer") || lower.contains("teaser") || lower.contains("tv spot") || lower.contains("preview");
    if !has_keyword {
        return false;
    }
    let doc_norm = normalize(&doc.title);
    let _ = input;
    normalize(search_title)
        .split_whitespace()
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(w))
        .all(|w| doc_norm.contains(w))
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: SearchResults,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    docs: Vec<ArchiveDoc>,
}

#[derive(Debug, Deserialize, Clone)]
struct ArchiveDoc {
    identifier: String,
    #[serde(default)]
    title: String,
    /// archive.org returns this as either a JSON string or a bare number
    /// depending on the document; normalized to a string at parse time.
    #[serde(default, deserialize_with = "deserialize_loose_string")]
    year: Option<String>,
    #[serde(default, rename = "external-identifier")]
    external_identifier: Option<Vec<String>>,
    #[serde(default)]
    downloads: Option<u64>,
}

fn deserialize_loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }))
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    files: Vec<ArchiveFile>,
}

#[derive(Debug, Deserialize)]
struct ArchiveFile {
    name: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    length: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(identifier: &str, title: &str, year: Option<&str>, downloads: Option<u64>) -> ArchiveDoc {
        ArchiveDoc {
            identifier: identifier.into(),
            title: title.into(),
            year: year.map(|y| y.to_string()),
            external_identifier: None,
            downloads,
        }
    }

    #[test]
    fn rejects_shorts_and_featurettes() {
        let d = doc("x", "Movie Title #shorts", Some("2020"), None);
        let input = ArchiveInput { imdb_id: "tt1", title: "Movie Title", original_title: None, year: Some(2020), trailer_title: None, released_recently: false };
        assert!(score_doc(&d, &input, "Movie Title").is_none());
    }

    #[test]
    fn imdb_exact_match_short_circuits() {
        let mut d = doc("x", "Some Unrelated Title", Some("1999"), None);
        d.external_identifier = Some(vec!["urn:imdb:1234567".to_string()]);
        let input = ArchiveInput { imdb_id: "tt1234567", title: "Movie Title", original_title: None, year: Some(2020), trailer_title: None, released_recently: false };
        assert_eq!(score_doc(&d, &input, "Movie Title"), Some(1.0));
    }

    #[test]
    fn imdb_id_match_is_exact_not_substring() {
        // "1234567" is a substring of "11234567" but must not match.
        let mut d = doc("x", "Some Unrelated Title", Some("1999"), None);
        d.external_identifier = Some(vec!["urn:imdb:11234567".to_string()]);
        let input = ArchiveInput { imdb_id: "tt1234567", title: "Totally Different Name", original_title: None, year: None, trailer_title: None, released_recently: false };
        assert_eq!(score_doc(&d, &input, "Totally Different Name"), None);
    }

    #[test]
    fn quality_tier_from_file_size() {
        assert_eq!(quality_from_size(150 * 1024 * 1024), QualityTier::P1080);
        assert_eq!(quality_from_size(60 * 1024 * 1024), QualityTier::P720);
        assert_eq!(quality_from_size(5 * 1024 * 1024), QualityTier::P360);
    }

    #[test]
    fn rejects_sample_and_thumbnail_files() {
        assert!(is_rejected_filename("movie_thumb.jpg"));
        assert!(!is_rejected_filename("movie.mp4"));
    }
}
