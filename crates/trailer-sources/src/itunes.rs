//! iTunes Search strategy (C6).

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use trailer_models::MediaType;

use crate::error::{SourceError, SourceResult};
use crate::fuzzy::fuzzy_match;

const SEARCH_URL: &str = "https://itunes.apple.com/search";
const COUNTRY_PACING: Duration = Duration::from_millis(200);
const MATCH_THRESHOLD: f64 = 0.6;
const GOOD_ENOUGH_MARGIN: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct ItunesCandidate {
    pub preview_url: String,
    pub track_id: Option<i64>,
    pub country: String,
    pub score: f64,
}

/// One `(media, entity, attribute, kind)` search-parameter variant tried in
/// sequence per country, per §4.6.
struct SearchVariant {
    media: &'static str,
    entity: &'static str,
    attribute: Option<&'static str>,
    kind: Option<&'static str>,
}

fn variants_for(media_type: MediaType) -> &'static [SearchVariant] {
    match media_type {
        MediaType::Movie => &[
            SearchVariant { media: "movie", entity: "movie", attribute: Some("movieTerm"), kind: None },
            SearchVariant { media: "movie", entity: "movie", attribute: None, kind: None },
            SearchVariant { media: "video", entity: "movie", attribute: None, kind: Some("feature-movie") },
        ],
        MediaType::Tv => &[
            SearchVariant { media: "tvShow", entity: "tvSeason", attribute: Some("showTerm"), kind: None },
            SearchVariant { media: "tvShow", entity: "tvEpisode", attribute: None, kind: None },
        ],
    }
}

#[derive(Clone)]
pub struct ItunesClient {
    http: reqwest::Client,
}

impl ItunesClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("failed to build itunes http client"),
        }
    }

    /// Search `countries`, in the order given (already ranked by learned
    /// success rate by the caller), trying each title candidate through the
    /// parameter-variant cascade until a match at or above [`MATCH_THRESHOLD`]
    /// is found. A result scoring `threshold + 0.2` or better short-circuits
    /// the remaining countries.
    pub async fn search(
        &self,
        name_to_match: &str,
        title_candidates: &[&str],
        countries: &[String],
        media_type: MediaType,
        year: Option<i32>,
        runtime_minutes: Option<i32>,
    ) -> SourceResult<Option<ItunesCandidate>> {
        let mut best: Option<ItunesCandidate> = None;

        for (i, country) in countries.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(COUNTRY_PACING).await;
            }

            if let Some(found) =
                self.search_country(name_to_match, title_candidates, country, media_type, year, runtime_minutes).await?
            {
                let good_enough = found.score >= MATCH_THRESHOLD + GOOD_ENOUGH_MARGIN;
                let replace = best.as_ref().map(|b| found.score > b.score).unwrap_or(true);
                if replace {
                    best = Some(found);
                }
                if good_enough {
                    info!(country, "itunes match good enough, short-circuiting remaining countries");
                    break;
                }
            }
        }

        Ok(best)
    }

    async fn search_country(
        &self,
        name_to_match: &str,
        title_candidates: &[&str],
        country: &str,
        media_type: MediaType,
        year: Option<i32>,
        runtime_minutes: Option<i32>,
    ) -> SourceResult<Option<ItunesCandidate>> {
        for title in title_candidates {
            for variant in variants_for(media_type) {
                match self.try_variant(title, country, variant).await {
                    Ok(results) => {
                        if let Some(best) = best_scoring(&results, name_to_match, media_type, year, runtime_minutes) {
                            if best.score >= MATCH_THRESHOLD {
                                return Ok(Some(best));
                            }
                        }
                    }
                    Err(SourceError::Shape(ref msg)) if msg == "400" => {
                        debug!(country, title, "itunes variant returned 400, permanent failure for this variant");
                        continue;
                    }
                    Err(e) => {
                        warn!(country, title, error = %e, "itunes search variant failed");
                        continue;
                    }
                }
            }
        }
        Ok(None)
    }

    async fn try_variant(&self, title: &str, country: &str, variant: &SearchVariant) -> SourceResult<Vec<ItunesResult>> {
        let mut query = vec![
            ("term", title),
            ("country", country),
            ("media", variant.media),
            ("entity", variant.entity),
            ("limit", "50"),
            ("lang", "en_us"),
        ];
        if let Some(attr) = variant.attribute {
            query.push(("attribute", attr));
        }
        if let Some(kind) = variant.kind {
            query.push(("kind", kind));
        }

        let response = self.http.get(SEARCH_URL).query(&query).send().await?;
        if response.status().as_u16() == 400 {
            return Err(SourceError::Shape("400".to_string()));
        }
        let response = response.error_for_status()?;
        let parsed: ItunesResponse = response.json().await?;
        Ok(parsed.results.into_iter().filter(|r| r.preview_url.as_deref().is_some_and(|u| !u.is_empty())).collect())
    }
}

impl Default for ItunesClient {
    fn default() -> Self {
        Self::new()
    }
}

/// §4.6 scoring: name + year + runtime + preview-length bonuses, summed.
fn best_scoring(
    results: &[ItunesResult],
    name_to_match: &str,
    media_type: MediaType,
    year: Option<i32>,
    runtime_minutes: Option<i32>,
) -> Option<ItunesCandidate> {
    results
        .iter()
        .map(|r| (r, score_candidate(r, name_to_match, media_type, year, runtime_minutes)))
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
        .map(|(r, score)| ItunesCandidate {
            preview_url: r.preview_url.clone().unwrap_or_default(),
            track_id: r.track_id,
            country: r.country.clone().unwrap_or_default(),
            score,
        })
}

fn score_candidate(
    r: &ItunesResult,
    name_to_match: &str,
    media_type: MediaType,
    year: Option<i32>,
    runtime_minutes: Option<i32>,
) -> f64 {
    let Some(preview_url) = r.preview_url.as_deref().filter(|u| !u.is_empty()) else {
        return -1.0;
    };
    let _ = preview_url;

    let candidate_name = match media_type {
        MediaType::Movie => r.track_name.clone().or_else(|| r.collection_name.clone()),
        MediaType::Tv => r.artist_name.clone(),
    }
    .unwrap_or_default();

    let mut score = name_bonus(name_to_match, &candidate_name, r.collection_name.as_deref());

    if let (Some(y), Some(cy)) = (year, r.release_year()) {
        let diff = (y - cy).abs();
        score += match media_type {
            MediaType::Movie => match diff {
                0 => 0.35,
                1 => 0.2,
                d if d > 2 => -0.5,
                _ => 0.0,
            },
            MediaType::Tv => match diff {
                0 => 0.35,
                d if d <= 2 => 0.25,
                d if d <= 5 => 0.15,
                d if d <= 10 => 0.05,
                _ => 0.0,
            },
        };
    }

    if media_type == MediaType::Movie {
        if let (Some(want), Some(got)) = (runtime_minutes, r.track_time_millis.map(|ms| ms / 60_000)) {
            let diff = (want - got as i32).abs();
            if diff <= 5 {
                score += 0.15;
            } else if diff > 15 {
                score -= 0.2;
            }
        }
    }

    if let Some(preview_seconds) = r.preview_duration_seconds() {
        if preview_seconds >= 60.0 {
            score += 0.1;
        } else if preview_seconds < 30.0 {
            score -= 0.1;
        }
    }

    score
}

fn name_bonus(name_to_match: &str, main: &str, original_or_alt: Option<&str>) -> f64 {
    let normalized_target = crate::fuzzy::normalize(name_to_match);
    if crate::fuzzy::normalize(main) == normalized_target {
        return 0.5;
    }
    if let Some(other) = original_or_alt {
        if crate::fuzzy::normalize(other) == normalized_target {
            return 0.4;
        }
    }
    let sim = fuzzy_match(name_to_match, main);
    if sim > 0.8 {
        0.3
    } else if sim > 0.6 {
        0.15
    } else {
        0.0
    }
}

#[derive(Debug, Deserialize, Default)]
struct ItunesResponse {
    #[serde(default)]
    results: Vec<ItunesResult>,
}

#[derive(Debug, Deserialize, Clone)]
struct ItunesResult {
    #[serde(rename = "previewUrl")]
    preview_url: Option<String>,
    #[serde(rename = "trackId")]
    track_id: Option<i64>,
    #[serde(rename = "trackName")]
    track_name: Option<String>,
    #[serde(rename = "collectionName")]
    collection_name: Option<String>,
    #[serde(rename = "artistName")]
    artist_name: Option<String>,
    #[serde(rename = "releaseDate")]
    release_date: Option<String>,
    #[serde(rename = "trackTimeMillis")]
    track_time_millis: Option<i64>,
    country: Option<String>,
}

impl ItunesResult {
    fn release_year(&self) -> Option<i32> {
        self.release_date.as_deref()?.get(0..4)?.parse().ok()
    }

    /// iTunes doesn't expose preview duration directly; estimated from the
    /// `trackTimeMillis` field when present (trailers report this as the
    /// clip length, unlike full tracks).
    fn preview_duration_seconds(&self) -> Option<f64> {
        self.track_time_millis.map(|ms| ms as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_name_match_scores_high() {
        let result = ItunesResult {
            preview_url: Some("https://example.com/a.m4v".into()),
            track_id: Some(1),
            track_name: Some("Inception".into()),
            collection_name: None,
            artist_name: None,
            release_date: Some("2010-07-16".into()),
            track_time_millis: Some(90_000),
            country: Some("us".into()),
        };
        let score = score_candidate(&result, "Inception", MediaType::Movie, Some(2010), Some(148));
        assert!(score > 0.8, "expected strong match, got {score}");
    }

    #[test]
    fn missing_preview_url_is_rejected() {
        let result = ItunesResult {
            preview_url: None,
            track_id: Some(1),
            track_name: Some("Inception".into()),
            collection_name: None,
            artist_name: None,
            release_date: None,
            track_time_millis: None,
            country: None,
        };
        let score = score_candidate(&result, "Inception", MediaType::Movie, None, None);
        assert_eq!(score, -1.0);
    }

    #[test]
    fn year_mismatch_penalized_for_movies() {
        let result = ItunesResult {
            preview_url: Some("https://example.com/a.m4v".into()),
            track_id: Some(1),
            track_name: Some("Inception".into()),
            collection_name: None,
            artist_name: None,
            release_date: Some("1995-01-01".into()),
            track_time_millis: Some(90_000),
            country: Some("us".into()),
        };
        let score = score_candidate(&result, "Inception", MediaType::Movie, Some(2010), None);
        assert!(score < 0.5);
    }
}
