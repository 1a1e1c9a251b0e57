//! Archive cookie rotation: a thin wrapper over C1's cookie table
//! implementing the least-recently-used-valid-cookie selection policy (§3).

use tracing::warn;

use trailer_models::ArchiveCookie;

use crate::db::Db;

pub struct CookieJar {
    db: Db,
}

impl CookieJar {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn seed(&self, cookies: impl Into<String>, email: Option<String>) {
        let cookie = ArchiveCookie::new(cookies, email);
        if let Err(e) = self.db.insert_cookie(&cookie).await {
            warn!(error = %e, "failed to seed archive cookie");
        }
    }

    /// Pick the least-recently-used valid cookie and mark it used, so the
    /// next call rotates to a different one.
    pub async fn checkout(&self) -> Option<ArchiveCookie> {
        let cookie = self.db.pick_oldest_valid_cookie().await.ok().flatten()?;
        if let Err(e) = self.db.mark_cookie_used(cookie.id).await {
            warn!(error = %e, "failed to stamp cookie last_used");
        }
        Some(cookie)
    }

    pub async fn invalidate(&self, id: i64) {
        if let Err(e) = self.db.mark_cookie_invalid(id).await {
            warn!(error = %e, "failed to mark cookie invalid");
        }
    }

    pub async fn list(&self) -> Vec<ArchiveCookie> {
        self.db.list_cookies().await.unwrap_or_else(|e| {
            warn!(error = %e, "failed to list archive cookies");
            Vec::new()
        })
    }
}
