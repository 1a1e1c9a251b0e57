//! Metadata Resolver (C5): external identifier -> canonical title record.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use trailer_models::{retry_async, CanonicalTitle, MediaType, RetryConfig, RetryResult, VideoSite};

use crate::error::{MetadataError, MetadataResult};

const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(6);

const EXCLUDED_VIDEO_TYPES: &[&str] = &["Behind the Scenes", "Featurette", "Bloopers", "Opening Credits"];
const EXCLUDED_NAME_SUBSTRINGS: &[&str] =
    &["behind", "featurette", "bloopers", "opening", "credits", "making of"];

#[derive(Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MetadataClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build metadata http client"),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// §4.5: resolve `(imdb_id, type_hint)` into a [`CanonicalTitle`], or
    /// `None` if the metadata DB has no record (upstream translates this to
    /// "not found", never an error).
    pub async fn resolve(&self, imdb_id: &str, type_hint: Option<MediaType>) -> MetadataResult<Option<CanonicalTitle>> {
        let Some((media_type, internal_id)) = self.find_by_external_id(imdb_id).await? else {
            return Ok(None);
        };
        let media_type = type_hint.unwrap_or(media_type);

        let Some(detail) = self.fetch_detail(media_type, internal_id).await? else {
            return Ok(None);
        };

        let alt_titles = self.fetch_alt_titles(media_type, internal_id).await.unwrap_or_default();

        let trailer = pick_trailer(&detail.videos.results);

        let (youtube_key, youtube_trailer_title, trailer_url, trailer_site) = match &trailer {
            Some(video) if video.site.eq_ignore_ascii_case("youtube") => {
                (Some(video.key.clone()), Some(video.name.clone()), None, None)
            }
            Some(video) => {
                let site = video_site(&video.site);
                (None, None, site.map(|s| trailer_page_url(s, &video.key)), site)
            }
            None => (None, None, None, None),
        };

        Ok(Some(CanonicalTitle {
            media_type,
            title: detail.title(),
            original_title: detail.original_title(),
            year: detail.year(),
            runtime_minutes: detail.runtime,
            alt_titles,
            youtube_key,
            youtube_trailer_title,
            trailer_url,
            trailer_site,
        }))
    }

    async fn find_by_external_id(&self, imdb_id: &str) -> MetadataResult<Option<(MediaType, i64)>> {
        let url = format!("{}/find/{}", self.base_url, imdb_id);
        let response: FindResponse = self
            .get_json(&url, &[("external_source", "imdb_id")])
            .await?;

        if let Some(movie) = response.movie_results.into_iter().next() {
            return Ok(Some((MediaType::Movie, movie.id)));
        }
        if let Some(tv) = response.tv_results.into_iter().next() {
            return Ok(Some((MediaType::Tv, tv.id)));
        }
        Ok(None)
    }

    async fn fetch_detail(&self, media_type: MediaType, internal_id: i64) -> MetadataResult<Option<DetailResponse>> {
        let path = media_path(media_type);
        let url = format!("{}/{}/{}", self.base_url, path, internal_id);
        let config = RetryConfig::two_attempts("metadata-detail");

        let result = retry_async(&config, || async {
            let resp: DetailResponse = self.get_json(&url, &[("append_to_response", "videos")]).await?;
            Ok::<_, MetadataError>(resp)
        })
        .await;

        match result {
            RetryResult::Success(detail) => Ok(Some(detail)),
            RetryResult::Failed(e) => {
                warn!(internal_id, error = %e, "metadata detail lookup failed");
                Ok(None)
            }
        }
    }

    async fn fetch_alt_titles(&self, media_type: MediaType, internal_id: i64) -> MetadataResult<BTreeSet<String>> {
        let path = media_path(media_type);
        let url = format!("{}/{}/{}/alternative_titles", self.base_url, path, internal_id);
        let response: AltTitlesResponse = self.get_json(&url, &[]).await?;

        let entries = match media_type {
            MediaType::Movie => response.titles,
            MediaType::Tv => response.results,
        };

        Ok(entries
            .into_iter()
            .filter(|t| CanonicalTitle::ALT_TITLE_COUNTRIES.contains(&t.iso_3166_1.as_str()))
            .map(|t| t.title)
            .collect())
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str, extra_params: &[(&str, &str)]) -> MetadataResult<T> {
        let mut query = vec![("api_key", self.api_key.as_str())];
        query.extend_from_slice(extra_params);

        let response = self.http.get(url).query(&query).send().await?;
        let response = response.error_for_status()?;
        let body = response.json::<T>().await?;
        Ok(body)
    }
}

fn media_path(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Movie => "movie",
        MediaType::Tv => "tv",
    }
}

fn video_site(site: &str) -> Option<VideoSite> {
    let lower = site.to_ascii_lowercase();
    match lower.as_str() {
        "youtube" => Some(VideoSite::YouTube),
        "vimeo" => Some(VideoSite::Vimeo),
        "dailymotion" => Some(VideoSite::Dailymotion),
        "apple" => Some(VideoSite::Apple),
        "facebook" => Some(VideoSite::Facebook),
        "twitter" => Some(VideoSite::Twitter),
        "instagram" => Some(VideoSite::Instagram),
        _ => None,
    }
}

fn trailer_page_url(site: VideoSite, key: &str) -> String {
    match site {
        VideoSite::YouTube => format!("https://www.youtube.com/watch?v={key}"),
        VideoSite::Vimeo => format!("https://vimeo.com/{key}"),
        VideoSite::Dailymotion => format!("https://www.dailymotion.com/video/{key}"),
        VideoSite::Apple => format!("https://trailers.apple.com/{key}"),
        VideoSite::Facebook => format!("https://www.facebook.com/{key}"),
        VideoSite::Twitter => format!("https://twitter.com/i/status/{key}"),
        VideoSite::Instagram => format!("https://www.instagram.com/p/{key}"),
    }
}

/// §4.5 ranked predicate for choosing a trailer candidate from the videos
/// array: official trailer > official teaser > any trailer > official clip
/// > any official video > first remaining candidate.
fn pick_trailer(videos: &[VideoItem]) -> Option<VideoItem> {
    let eligible: Vec<&VideoItem> = videos
        .iter()
        .filter(|v| video_site(&v.site).is_some())
        .filter(|v| !is_excluded(v))
        .collect();

    if eligible.is_empty() {
        return None;
    }

    let rank = |v: &&VideoItem| -> u8 {
        let vtype = v.video_type.as_str();
        if v.official && vtype == "Trailer" {
            0
        } else if v.official && vtype == "Teaser" {
            1
        } else if vtype == "Trailer" {
            2
        } else if v.official && vtype == "Clip" {
            3
        } else if v.official {
            4
        } else {
            5
        }
    };

    eligible
        .into_iter()
        .min_by_key(|v| rank(v))
        .cloned()
        .or_else(|| videos.first().cloned())
}

fn is_excluded(video: &VideoItem) -> bool {
    if EXCLUDED_VIDEO_TYPES.iter().any(|t| t.eq_ignore_ascii_case(&video.video_type)) {
        return true;
    }
    let lower_name = video.name.to_ascii_lowercase();
    EXCLUDED_NAME_SUBSTRINGS.iter().any(|s| lower_name.contains(s))
}

#[derive(Debug, Deserialize, Default)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<IdOnly>,
    #[serde(default)]
    tv_results: Vec<IdOnly>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    original_title: Option<String>,
    #[serde(default)]
    original_name: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
    #[serde(default)]
    runtime: Option<i32>,
    #[serde(default)]
    videos: VideosWrapper,
}

impl DetailResponse {
    fn title(&self) -> String {
        self.title.clone().or_else(|| self.name.clone()).unwrap_or_default()
    }

    fn original_title(&self) -> String {
        self.original_title
            .clone()
            .or_else(|| self.original_name.clone())
            .unwrap_or_else(|| self.title())
    }

    fn year(&self) -> Option<i32> {
        let date = self.release_date.as_deref().or(self.first_air_date.as_deref())?;
        date.get(0..4)?.parse().ok()
    }
}

#[derive(Debug, Deserialize, Default)]
struct VideosWrapper {
    #[serde(default)]
    results: Vec<VideoItem>,
}

#[derive(Debug, Deserialize, Clone)]
struct VideoItem {
    key: String,
    site: String,
    #[serde(rename = "type")]
    video_type: String,
    name: String,
    #[serde(default)]
    official: bool,
}

#[derive(Debug, Deserialize, Default)]
struct AltTitlesResponse {
    #[serde(default)]
    titles: Vec<AltTitle>,
    #[serde(default)]
    results: Vec<AltTitle>,
}

#[derive(Debug, Deserialize)]
struct AltTitle {
    iso_3166_1: String,
    title: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn resolves_movie_with_youtube_trailer() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/find/tt0111161"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "movie_results": [{"id": 278}],
                "tv_results": []
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/movie/278"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": "The Shawshank Redemption",
                "original_title": "The Shawshank Redemption",
                "release_date": "1994-09-23",
                "runtime": 142,
                "videos": {"results": [
                    {"key": "6hB3S9bIaco", "site": "YouTube", "type": "Trailer", "name": "Official Trailer", "official": true}
                ]}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/movie/278/alternative_titles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"titles": []})))
            .mount(&server)
            .await;

        let client = MetadataClient::with_base_url("key", server.uri());
        let resolved = client.resolve("tt0111161", None).await.unwrap().unwrap();

        assert_eq!(resolved.media_type, MediaType::Movie);
        assert_eq!(resolved.youtube_key.as_deref(), Some("6hB3S9bIaco"));
        assert_eq!(resolved.year, Some(1994));
    }

    #[tokio::test]
    async fn returns_none_when_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/find/tt9999999"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "movie_results": [],
                "tv_results": []
            })))
            .mount(&server)
            .await;

        let client = MetadataClient::with_base_url("key", server.uri());
        let resolved = client.resolve("tt9999999", None).await.unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn excludes_featurettes_and_behind_the_scenes() {
        let videos = vec![
            VideoItem { key: "a".into(), site: "YouTube".into(), video_type: "Featurette".into(), name: "Making of".into(), official: true },
            VideoItem { key: "b".into(), site: "YouTube".into(), video_type: "Trailer".into(), name: "Official Trailer".into(), official: true },
        ];
        let picked = pick_trailer(&videos).unwrap();
        assert_eq!(picked.key, "b");
    }
}
