//! Rotatable archive-search credential record (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cookie jar usable against the archive's search/metadata endpoints.
///
/// Selection policy (C8): least-recently-used valid cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveCookie {
    pub id: i64,
    pub cookies: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub is_valid: bool,
    pub use_count: u64,
}

impl ArchiveCookie {
    pub fn new(cookies: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: 0,
            cookies: cookies.into(),
            email,
            created_at: Utc::now(),
            last_used: None,
            is_valid: true,
            use_count: 0,
        }
    }

    pub fn mark_used(&mut self) {
        self.last_used = Some(Utc::now());
        self.use_count += 1;
    }

    pub fn mark_invalid(&mut self) {
        self.is_valid = false;
    }
}
