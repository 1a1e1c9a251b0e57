//! Persistence store (C1): a single local SQLite file holding three tables
//! — cache, success_tracker, archive_cookies — per §3/§4.1.
//!
//! Opened in WAL journal mode with `synchronous=NORMAL`, a 256 MB mmap, and
//! a 64 MB page cache, per §6 "Persisted state layout". All reads here are
//! startup-hydration reads; steady-state reads are served from the
//! in-memory structures in `cache.rs`/`tracker.rs`/`circuit.rs`.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use trailer_models::{ArchiveCookie, QualityStat, ResolvedArtifact, SourceType, StatType, SuccessStat};

use crate::error::{StorageError, StorageResult};

const MMAP_SIZE_BYTES: i64 = 256_000_000;
const CACHE_SIZE_PAGES: i64 = -64_000; // negative = KB of page cache, per SQLite pragma semantics (~64 MB)

#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn connect(db_path: &str) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{db_path}"))
            .map_err(|e| StorageError::config_error(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        sqlx::query(&format!("PRAGMA mmap_size = {MMAP_SIZE_BYTES}"))
            .execute(&pool)
            .await?;
        sqlx::query(&format!("PRAGMA cache_size = {CACHE_SIZE_PAGES}"))
            .execute(&pool)
            .await?;

        let db = Self { pool };
        db.create_schema().await?;
        Ok(db)
    }

    async fn create_schema(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache (
                imdb_id TEXT PRIMARY KEY,
                preview_url TEXT NOT NULL,
                track_id TEXT,
                country TEXT,
                youtube_key TEXT,
                source_type TEXT NOT NULL,
                source TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS success_tracker (
                stat_type TEXT NOT NULL,
                identifier TEXT NOT NULL,
                success_count INTEGER NOT NULL DEFAULT 0,
                total_count INTEGER NOT NULL DEFAULT 0,
                avg_quality REAL NOT NULL DEFAULT 1.5,
                sample_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (stat_type, identifier)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS archive_cookies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cookies TEXT NOT NULL,
                email TEXT,
                created_at TEXT NOT NULL,
                last_used TEXT,
                is_valid INTEGER NOT NULL DEFAULT 1,
                use_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // -- cache --------------------------------------------------------

    pub async fn upsert_cache(&self, artifact: &ResolvedArtifact) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cache (imdb_id, preview_url, track_id, country, youtube_key, source_type, source, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(imdb_id) DO UPDATE SET
                preview_url = excluded.preview_url,
                track_id = excluded.track_id,
                country = excluded.country,
                youtube_key = excluded.youtube_key,
                source_type = excluded.source_type,
                source = excluded.source,
                timestamp = excluded.timestamp
            "#,
        )
        .bind(&artifact.imdb_id)
        .bind(&artifact.preview_url)
        .bind(&artifact.track_id)
        .bind(&artifact.country)
        .bind(&artifact.youtube_key)
        .bind(artifact.source_type.as_str())
        .bind(&artifact.source)
        .bind(artifact.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_cache(&self, imdb_id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM cache WHERE imdb_id = ?1")
            .bind(imdb_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_all_cache(&self) -> StorageResult<()> {
        sqlx::query("DELETE FROM cache").execute(&self.pool).await?;
        Ok(())
    }

    /// Hydrate the in-memory cache at startup with the N most recent rows.
    pub async fn load_recent_cache(&self, limit: i64) -> StorageResult<Vec<ResolvedArtifact>> {
        let rows = sqlx::query(
            "SELECT imdb_id, preview_url, track_id, country, youtube_key, source_type, source, timestamp \
             FROM cache ORDER BY timestamp DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_artifact).collect()
    }

    // -- success tracker ------------------------------------------------

    pub async fn upsert_stat(&self, stat: &SuccessStat) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO success_tracker (stat_type, identifier, success_count, total_count)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(stat_type, identifier) DO UPDATE SET
                success_count = excluded.success_count,
                total_count = excluded.total_count
            "#,
        )
        .bind(stat.stat_type.as_str())
        .bind(&stat.identifier)
        .bind(stat.success_count as i64)
        .bind(stat.total_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_top_stats_by_type(&self, stat_type: StatType, limit: i64) -> StorageResult<Vec<SuccessStat>> {
        let rows = sqlx::query(
            "SELECT stat_type, identifier, success_count, total_count FROM success_tracker \
             WHERE stat_type = ?1 ORDER BY (CAST(success_count AS REAL) / MAX(total_count, 1)) DESC LIMIT ?2",
        )
        .bind(stat_type.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| SuccessStat {
                stat_type,
                identifier: row.get("identifier"),
                success_count: row.get::<i64, _>("success_count") as u64,
                total_count: row.get::<i64, _>("total_count") as u64,
            })
            .collect())
    }

    /// Upsert just the quality columns of a `(stat_type, identifier)` row,
    /// leaving success/total counts untouched (or defaulted to 0 on first
    /// insert) — quality and success/failure are recorded independently.
    pub async fn upsert_quality(&self, stat_type: StatType, identifier: &str, avg_quality: f64, sample_count: u64) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO success_tracker (stat_type, identifier, avg_quality, sample_count)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(stat_type, identifier) DO UPDATE SET
                avg_quality = excluded.avg_quality,
                sample_count = excluded.sample_count
            "#,
        )
        .bind(stat_type.as_str())
        .bind(identifier)
        .bind(avg_quality)
        .bind(sample_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Hydrate every `(identifier, avg_quality, sample_count)` row recorded
    /// for a `stat_type` that has actually observed a quality sample.
    pub async fn load_quality_stats(&self, stat_type: StatType) -> StorageResult<Vec<QualityStat>> {
        let rows = sqlx::query("SELECT identifier, avg_quality, sample_count FROM success_tracker WHERE stat_type = ?1 AND sample_count > 0")
            .bind(stat_type.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| QualityStat {
                identifier: row.get("identifier"),
                avg_quality: row.get("avg_quality"),
                sample_count: row.get::<i64, _>("sample_count") as u64,
            })
            .collect())
    }

    // -- archive cookies ------------------------------------------------

    pub async fn insert_cookie(&self, cookie: &ArchiveCookie) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO archive_cookies (cookies, email, created_at, last_used, is_valid, use_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&cookie.cookies)
        .bind(&cookie.email)
        .bind(cookie.created_at.to_rfc3339())
        .bind(cookie.last_used.map(|t| t.to_rfc3339()))
        .bind(cookie.is_valid as i64)
        .bind(cookie.use_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Least-recently-used valid cookie, per §3 selection policy. Cookies
    /// never used sort first (NULLS FIRST via COALESCE to the epoch).
    pub async fn pick_oldest_valid_cookie(&self) -> StorageResult<Option<ArchiveCookie>> {
        let row = sqlx::query(
            "SELECT id, cookies, email, created_at, last_used, is_valid, use_count FROM archive_cookies \
             WHERE is_valid = 1 ORDER BY COALESCE(last_used, '1970-01-01') ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_cookie).transpose()
    }

    pub async fn mark_cookie_used(&self, id: i64) -> StorageResult<()> {
        sqlx::query("UPDATE archive_cookies SET last_used = ?1, use_count = use_count + 1 WHERE id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_cookie_invalid(&self, id: i64) -> StorageResult<()> {
        sqlx::query("UPDATE archive_cookies SET is_valid = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All cookies, most recently created first — used by the admin listing
    /// endpoint, not by the rotation policy itself.
    pub async fn list_cookies(&self) -> StorageResult<Vec<ArchiveCookie>> {
        let rows = sqlx::query(
            "SELECT id, cookies, email, created_at, last_used, is_valid, use_count \
             FROM archive_cookies ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_cookie).collect()
    }
}

fn row_to_artifact(row: sqlx::sqlite::SqliteRow) -> StorageResult<ResolvedArtifact> {
    let source_type = match row.get::<String, _>("source_type").as_str() {
        "itunes" => SourceType::Itunes,
        "youtube" => SourceType::Youtube,
        "archive" => SourceType::Archive,
        "apple" => SourceType::Apple,
        "vimeo" => SourceType::Vimeo,
        "dailymotion" => SourceType::Dailymotion,
        other => return Err(StorageError::config_error(format!("unknown source_type in db: {other}"))),
    };

    let timestamp: DateTime<Utc> = row
        .get::<String, _>("timestamp")
        .parse::<DateTime<Utc>>()
        .map_err(|e| StorageError::config_error(e.to_string()))?;

    Ok(ResolvedArtifact {
        imdb_id: row.get("imdb_id"),
        preview_url: row.get("preview_url"),
        track_id: row.get("track_id"),
        country: row.get("country"),
        youtube_key: row.get("youtube_key"),
        source_type,
        source: row.get("source"),
        timestamp,
    })
}

fn row_to_cookie(row: sqlx::sqlite::SqliteRow) -> StorageResult<ArchiveCookie> {
    let created_at = row
        .get::<String, _>("created_at")
        .parse::<DateTime<Utc>>()
        .map_err(|e| StorageError::config_error(e.to_string()))?;
    let last_used = row
        .get::<Option<String>, _>("last_used")
        .map(|s| s.parse::<DateTime<Utc>>())
        .transpose()
        .map_err(|e| StorageError::config_error(e.to_string()))?;

    Ok(ArchiveCookie {
        id: row.get("id"),
        cookies: row.get("cookies"),
        email: row.get("email"),
        created_at,
        last_used,
        is_valid: row.get::<i64, _>("is_valid") != 0,
        use_count: row.get::<i64, _>("use_count") as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Db {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        // leak the tempdir so the file survives for the connection's lifetime
        std::mem::forget(dir);
        Db::connect(path.to_str().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn cache_round_trips() {
        let db = test_db().await;
        let artifact = ResolvedArtifact {
            imdb_id: "tt0111161".into(),
            preview_url: "https://example.com/a.mp4".into(),
            track_id: None,
            country: Some("us".into()),
            youtube_key: None,
            source_type: SourceType::Itunes,
            source: "itunes".into(),
            timestamp: Utc::now(),
        };
        db.upsert_cache(&artifact).await.unwrap();
        let loaded = db.load_recent_cache(10).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].imdb_id, "tt0111161");
    }

    #[tokio::test]
    async fn cookie_picks_least_recently_used() {
        let db = test_db().await;
        let mut a = ArchiveCookie::new("cookie-a", None);
        a.last_used = Some(Utc::now() - chrono::Duration::hours(2));
        let mut b = ArchiveCookie::new("cookie-b", None);
        b.last_used = Some(Utc::now());
        db.insert_cookie(&a).await.unwrap();
        db.insert_cookie(&b).await.unwrap();

        let picked = db.pick_oldest_valid_cookie().await.unwrap().unwrap();
        assert_eq!(picked.cookies, "cookie-a");
    }
}
