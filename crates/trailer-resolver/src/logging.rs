//! Structured per-resolution logging, mirroring this codebase's job-logger
//! idiom (`vclip-worker`'s `JobLogger`) adapted to log by IMDb id instead of
//! a job id, per §4.13.

use tracing::{error, info, warn, Span};

#[derive(Debug, Clone)]
pub struct ResolutionLogger {
    imdb_id: String,
    source: String,
}

impl ResolutionLogger {
    pub fn new(imdb_id: &str, source: &str) -> Self {
        Self {
            imdb_id: imdb_id.to_string(),
            source: source.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(imdb_id = %self.imdb_id, source = %self.source, "resolution started: {}", message);
    }

    pub fn log_outcome(&self, duration_ms: u128, message: &str) {
        info!(imdb_id = %self.imdb_id, source = %self.source, duration_ms, "resolution outcome: {}", message);
    }

    pub fn log_miss(&self, message: &str) {
        warn!(imdb_id = %self.imdb_id, source = %self.source, "resolution miss: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(imdb_id = %self.imdb_id, source = %self.source, "resolution error: {}", message);
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!("resolution", imdb_id = %self.imdb_id, source = %self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_imdb_id_and_source() {
        let logger = ResolutionLogger::new("tt0111161", "ytdlp");
        assert_eq!(logger.imdb_id, "tt0111161");
        assert_eq!(logger.source, "ytdlp");
    }
}
