//! Learned success/quality statistics and circuit-breaker state (C3, C4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The family a [`SuccessStat`]/[`QualityStat`] row belongs to.
///
/// `Piped`/`Invidious` are kept as inert, scoreable identifiers: the legacy
/// extractors that used to target them are not implemented (see
/// SPEC_FULL.md §9), but the tracker schema still accepts them so historical
/// or externally-seeded rows don't become unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatType {
    Sources,
    Itunes,
    Piped,
    Invidious,
    Ytdlp,
    Archive,
    Proxy,
}

impl StatType {
    pub fn as_str(self) -> &'static str {
        match self {
            StatType::Sources => "sources",
            StatType::Itunes => "itunes",
            StatType::Piped => "piped",
            StatType::Invidious => "invidious",
            StatType::Ytdlp => "ytdlp",
            StatType::Archive => "archive",
            StatType::Proxy => "proxy",
        }
    }
}

/// Composite-key `(type, identifier)` success/failure tally.
///
/// Default success rate when `total_count == 0` is 0.5 — an untried
/// candidate is neither preferred nor penalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessStat {
    pub stat_type: StatType,
    pub identifier: String,
    pub success_count: u64,
    pub total_count: u64,
}

impl SuccessStat {
    pub fn new(stat_type: StatType, identifier: impl Into<String>) -> Self {
        Self {
            stat_type,
            identifier: identifier.into(),
            success_count: 0,
            total_count: 0,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_count == 0 {
            0.5
        } else {
            self.success_count as f64 / self.total_count as f64
        }
    }

    pub fn record_success(&mut self) {
        self.success_count += 1;
        self.total_count += 1;
    }

    pub fn record_failure(&mut self) {
        self.total_count += 1;
    }
}

/// Ordinal quality tier observed for a successful resolution, per §3.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum QualityTier {
    P2160,
    P1440,
    P1080,
    P720,
    P480,
    P360,
    Best,
    Unknown,
}

/// Map a [`QualityTier`] onto the ordinal score used by the tracker's
/// weighted composite ranking (§4.3: `0.15 * avg_quality`).
pub fn quality_score(tier: QualityTier) -> f64 {
    match tier {
        QualityTier::P2160 => 4.0,
        QualityTier::P1440 => 3.5,
        QualityTier::P1080 => 3.0,
        QualityTier::P720 => 2.0,
        QualityTier::P480 => 1.0,
        QualityTier::P360 => 0.5,
        QualityTier::Best => 2.5,
        QualityTier::Unknown => 1.5,
    }
}

/// Per-source running mean of observed quality, updated incrementally so no
/// full history needs to be retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityStat {
    pub identifier: String,
    pub avg_quality: f64,
    pub sample_count: u64,
}

impl QualityStat {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            avg_quality: quality_score(QualityTier::Unknown),
            sample_count: 0,
        }
    }

    pub fn record(&mut self, tier: QualityTier) {
        let score = quality_score(tier);
        let n = self.sample_count as f64;
        self.avg_quality = (self.avg_quality * n + score) / (n + 1.0);
        self.sample_count += 1;
    }
}

/// Fault-isolation record for one instance of a replicated source (C4).
///
/// Transitions per §4.4: closed -> open after 5 consecutive failures;
/// open -> closed after the 10-minute reset window elapses, or immediately
/// on any recorded success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitState {
    pub identifier: String,
    pub failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub open: bool,
}

pub const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
pub const CIRCUIT_RESET_WINDOW_SECS: i64 = 10 * 60;

impl CircuitState {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            failures: 0,
            last_failure_at: None,
            open: false,
        }
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.failures += 1;
        self.last_failure_at = Some(now);
        if self.failures >= CIRCUIT_FAILURE_THRESHOLD {
            self.open = true;
        }
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.open = false;
        self.last_failure_at = None;
    }

    /// Whether the circuit currently permits an attempt. An open circuit
    /// auto-closes (without resetting `failures`) once the reset window has
    /// elapsed since the last failure — this is a read-time check, not a
    /// background sweep.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        if !self.open {
            return true;
        }
        match self.last_failure_at {
            Some(last) => (now - last).num_seconds() > CIRCUIT_RESET_WINDOW_SECS,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_success_rate_is_half() {
        let s = SuccessStat::new(StatType::Itunes, "us");
        assert_eq!(s.success_rate(), 0.5);
    }

    #[test]
    fn success_count_never_exceeds_total() {
        let mut s = SuccessStat::new(StatType::Archive, "imdb_exact");
        s.record_success();
        s.record_failure();
        assert!(s.success_count <= s.total_count);
        assert_eq!(s.success_rate(), 0.5);
    }

    #[test]
    fn circuit_opens_after_five_consecutive_failures() {
        let mut c = CircuitState::new("proxy-1");
        let now = Utc::now();
        for _ in 0..4 {
            c.record_failure(now);
        }
        assert!(!c.open);
        c.record_failure(now);
        assert!(c.open);
    }

    #[test]
    fn circuit_closes_immediately_on_success() {
        let mut c = CircuitState::new("proxy-1");
        let now = Utc::now();
        for _ in 0..5 {
            c.record_failure(now);
        }
        assert!(c.open);
        c.record_success();
        assert!(!c.open);
        assert_eq!(c.failures, 0);
    }

    #[test]
    fn circuit_auto_closes_after_reset_window() {
        let mut c = CircuitState::new("proxy-1");
        let past = Utc::now() - chrono::Duration::minutes(11);
        for _ in 0..5 {
            c.record_failure(past);
        }
        assert!(c.open);
        assert!(c.is_available(Utc::now()));
    }
}
