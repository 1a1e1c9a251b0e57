//! YouTube / generic extractor strategy (C7): a yt-dlp subprocess fronted
//! by a rotating pool of WireGuard-backed forward proxies.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use trailer_models::QualityTier;
use trailer_store::{CircuitRegistry, Tracker};

use crate::error::{SourceError, SourceResult};

const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(18);
const STDOUT_CAP_BYTES: usize = 10 * 1024 * 1024;
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

const FORMAT_PREFERENCE: &str = "best[height<=1080][ext=mp4][protocol=https]/best[height<=1080][ext=mp4]/best";
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

const BOT_DETECTION_MARKERS: &[&str] = &["sign in to confirm", "not a bot", "bot detection"];
const AGE_RESTRICTED_MARKERS: &[&str] = &["confirm your age", "age-restricted", "sign in to confirm your age"];

/// One forward-proxy endpoint, identified by its URL for stats/circuit
/// purposes and health-checked by HEAD-ing its own base URL.
#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    pub url: String,
}

pub struct ProxyPool {
    http: reqwest::Client,
    proxies: Vec<ProxyEndpoint>,
}

impl ProxyPool {
    pub fn new(proxy_urls: Vec<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(HEALTH_CHECK_TIMEOUT)
                .build()
                .expect("failed to build proxy health-check client"),
            proxies: proxy_urls.into_iter().map(|url| ProxyEndpoint { url }).collect(),
        }
    }

    /// Advisory health check only — a proxy that fails the HEAD probe is
    /// still attempted in order, per §4.7.
    async fn health_check(&self, proxy: &ProxyEndpoint) -> bool {
        self.http.head(&proxy.url).send().await.map(|r| r.status().is_success()).unwrap_or(false)
    }

    /// Order by learned success rate (C3, type `proxy`), filtering out any
    /// proxy whose circuit is currently open.
    async fn ranked(&self, tracker: &Tracker) -> Vec<ProxyEndpoint> {
        let ids: Vec<String> = self.proxies.iter().map(|p| p.url.clone()).collect();
        let sorted_ids = tracker.sort_by_success_rate(trailer_models::StatType::Proxy, ids).await;
        sorted_ids
            .into_iter()
            .filter_map(|id| self.proxies.iter().find(|p| p.url == id).cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

pub struct YtDlpExtractor {
    binary_present: bool,
}

impl YtDlpExtractor {
    /// Verified once at startup, not per-call, mirroring this codebase's
    /// existing `which`-backed FFmpeg presence check.
    pub fn new() -> Self {
        let binary_present = which::which("yt-dlp").is_ok();
        if !binary_present {
            warn!("yt-dlp not found on PATH; ytdlp source will be unavailable");
        }
        Self { binary_present }
    }

    /// Resolve a YouTube video key to a direct-streamable URL, racing the
    /// proxy pool (ranked by learned success rate) and falling back to one
    /// direct attempt, per §4.7.
    pub async fn resolve(
        &self,
        youtube_key: &str,
        pool: &ProxyPool,
        tracker: &Tracker,
        circuits: &CircuitRegistry,
    ) -> SourceResult<Option<(String, QualityTier)>> {
        if !self.binary_present {
            return Err(SourceError::BinaryNotFound { binary: "yt-dlp" });
        }

        let page_url = format!("https://www.youtube.com/watch?v={youtube_key}");

        for proxy in pool.ranked(tracker).await {
            if !circuits.is_available(&proxy.url).await {
                continue;
            }
            let _ = pool.health_check(&proxy).await;

            match self.invoke(&page_url, Some(&proxy.url)).await {
                Ok(Outcome::Resolved(url)) => {
                    tracker.record_success(trailer_models::StatType::Proxy, &proxy.url).await;
                    return Ok(Some((url.clone(), estimate_quality_tier(&url))));
                }
                Ok(Outcome::AgeRestricted) => {
                    info!(youtube_key, "age-restricted content, extractor cannot resolve");
                    return Ok(None);
                }
                Ok(Outcome::BotDetected) | Err(_) => {
                    tracker.record_failure(trailer_models::StatType::Proxy, &proxy.url).await;
                    debug!(proxy = %proxy.url, "proxy attempt failed, advancing");
                    continue;
                }
            }
        }

        info!(youtube_key, "all proxies exhausted, attempting direct");
        match self.invoke(&page_url, None).await {
            Ok(Outcome::Resolved(url)) => Ok(Some((url.clone(), estimate_quality_tier(&url)))),
            Ok(Outcome::AgeRestricted) => Ok(None),
            Ok(Outcome::BotDetected) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn invoke(&self, page_url: &str, proxy: Option<&str>) -> SourceResult<Outcome> {
        let mut args: Vec<String> = vec![
            "--get-url".into(),
            "-f".into(),
            FORMAT_PREFERENCE.into(),
            "--user-agent".into(),
            USER_AGENT.into(),
            "--referer".into(),
            "https://www.youtube.com/".into(),
            "--extractor-args".into(),
            "youtube:player_client=android,web".into(),
            "--socket-timeout".into(),
            "20".into(),
        ];
        if let Some(proxy_url) = proxy {
            args.push("--proxy".into());
            args.push(proxy_url.to_string());
        }
        args.push(page_url.to_string());

        let mut child = Command::new("yt-dlp")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SourceError::Subprocess(e.to_string()))?;

        let mut stdout = child.stdout.take().expect("stdout not captured");
        let mut stderr_reader = BufReader::new(child.stderr.take().expect("stderr not captured"));

        let run = async {
            let mut first_line = String::new();
            let mut limited = (&mut stdout).take(STDOUT_CAP_BYTES as u64);
            let mut reader = BufReader::new(&mut limited);
            let _ = reader.read_line(&mut first_line).await;

            let mut stderr_buf = String::new();
            let _ = stderr_reader.read_to_string(&mut stderr_buf).await;

            (first_line, stderr_buf)
        };

        let (first_line, stderr_buf) = match tokio::time::timeout(SUBPROCESS_TIMEOUT, run).await {
            Ok(pair) => pair,
            Err(_) => {
                let _ = child.kill().await;
                return Err(SourceError::Timeout(SUBPROCESS_TIMEOUT));
            }
        };

        let _ = child.wait().await;

        let stderr_lower = stderr_buf.to_ascii_lowercase();
        if AGE_RESTRICTED_MARKERS.iter().any(|m| stderr_lower.contains(m)) {
            return Ok(Outcome::AgeRestricted);
        }
        if BOT_DETECTION_MARKERS.iter().any(|m| stderr_lower.contains(m)) {
            return Ok(Outcome::BotDetected);
        }

        let url = first_line.trim();
        if url.is_empty() {
            debug!(stderr = %stderr_buf.lines().last().unwrap_or(""), "yt-dlp produced no url");
            return Err(SourceError::Subprocess("empty stdout".to_string()));
        }

        if !is_streamable(url) {
            warn!(url, "yt-dlp resolved url does not match known streamable patterns, returning anyway");
        }

        Ok(Outcome::Resolved(url.to_string()))
    }
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

enum Outcome {
    Resolved(String),
    BotDetected,
    AgeRestricted,
}

/// §4.7 output interpretation: a short-circuit set of URL shapes known to be
/// directly streamable. Anything else is still returned, log-warned.
fn is_streamable(url: &str) -> bool {
    url.contains(".m3u8")
        || url.contains("manifest")
        || url.contains("googlevideo.com/videoplayback")
        || url.ends_with(".mp4")
        || url.ends_with(".m4v")
        || url.ends_with(".webm")
        || url.contains("googlevideo.com")
}

/// Best-effort quality estimate from the resolved URL's `itag` query
/// parameter, falling back to `Unknown` when absent or unrecognized.
fn estimate_quality_tier(url: &str) -> QualityTier {
    let Ok(parsed) = url::Url::parse(url) else {
        return QualityTier::Unknown;
    };
    let itag = parsed.query_pairs().find(|(k, _)| k == "itag").map(|(_, v)| v.to_string());
    match itag.as_deref() {
        Some("137") | Some("299") | Some("399") => QualityTier::P1080,
        Some("136") | Some("298") | Some("398") => QualityTier::P720,
        Some("135") | Some("397") => QualityTier::P480,
        Some("134") | Some("396") => QualityTier::P360,
        _ => QualityTier::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streamable_patterns_recognized() {
        assert!(is_streamable("https://r1---sn-abc.googlevideo.com/videoplayback?itag=137"));
        assert!(is_streamable("https://example.com/master.m3u8"));
        assert!(is_streamable("https://example.com/video.webm"));
        assert!(!is_streamable("https://example.com/index.html"));
    }

    #[test]
    fn quality_estimated_from_itag() {
        assert_eq!(estimate_quality_tier("https://x.googlevideo.com/videoplayback?itag=137"), QualityTier::P1080);
        assert_eq!(estimate_quality_tier("https://x.googlevideo.com/videoplayback?itag=999"), QualityTier::Unknown);
    }

    #[test]
    fn extractor_reports_absence_when_binary_missing() {
        let extractor = YtDlpExtractor { binary_present: false };
        assert!(!extractor.binary_present);
    }
}
