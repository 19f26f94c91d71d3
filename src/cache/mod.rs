use crate::model::{RedirectStep, ScanResult};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// A live (unexpired) cache row (spec.md §3 `CacheEntry`).
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub domain: String,
    pub final_url: String,
    pub related_domains: Vec<String>,
    pub redirect_chain: Vec<RedirectStep>,
    pub updated_at: i64,
    pub ttl_at: i64,
}

/// Domain-keyed persistent result cache, backed by a local SQLite file opened in WAL
/// mode for durable writes under concurrent readers and writers (spec.md §4.2).
///
/// There is no remaining teacher module to generalise here — the teacher's
/// screenshot pipeline never persists results — so this is grounded on
/// `danielchristiancazares-forge`'s `rusqlite` usage elsewhere in the retrieval pack.
pub struct Cache {
    conn: Mutex<Connection>,
    ttl_seconds: u64,
}

impl Cache {
    pub fn open(path: &str, ttl_seconds: u64) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("opening cache db at {path}"))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("enabling WAL journal mode")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS domain_cache (
                domain               TEXT PRIMARY KEY,
                result_json          TEXT NOT NULL,
                final_url            TEXT NOT NULL,
                redirect_chain_json  TEXT NOT NULL,
                updated_at           INTEGER NOT NULL,
                ttl_at               INTEGER NOT NULL
            )",
            [],
        )
        .context("creating domain_cache table")?;

        Ok(Self { conn: Mutex::new(conn), ttl_seconds })
    }

    /// Returns the live entry for `domain`, or `None` on a miss, an expired row, or a
    /// row whose JSON blobs fail to parse (treated as a miss and logged, per spec.md §4.2).
    pub fn lookup(&self, domain: &str) -> Result<Option<CacheEntry>> {
        let conn = self.conn.lock().expect("cache connection mutex poisoned");
        let row = conn
            .query_row(
                "SELECT domain, result_json, final_url, redirect_chain_json, updated_at, ttl_at
                 FROM domain_cache WHERE domain = ?1",
                params![domain],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()
            .context("querying domain_cache")?;

        let Some((domain, result_json, final_url, redirect_chain_json, updated_at, ttl_at)) = row
        else {
            return Ok(None);
        };

        let now = now_unix();
        if ttl_at <= now {
            debug!(%domain, "cache row expired");
            return Ok(None);
        }

        let related_domains: Vec<String> = match serde_json::from_str(&result_json) {
            Ok(v) => v,
            Err(e) => {
                warn!(%domain, error = %e, "cache row result_json failed to parse, treating as miss");
                return Ok(None);
            }
        };
        let redirect_chain: Vec<RedirectStep> = match serde_json::from_str(&redirect_chain_json) {
            Ok(v) => v,
            Err(e) => {
                warn!(%domain, error = %e, "cache row redirect_chain_json failed to parse, treating as miss");
                return Ok(None);
            }
        };

        Ok(Some(CacheEntry {
            domain,
            final_url,
            related_domains,
            redirect_chain,
            updated_at,
            ttl_at,
        }))
    }

    /// Replaces any prior row for `domain` with `result`, stamping `updated_at`/`ttl_at`.
    pub fn upsert(&self, domain: &str, result: &ScanResult) -> Result<()> {
        let result_json = serde_json::to_string(&result.related_domains)?;
        let redirect_chain_json = serde_json::to_string(&result.redirect_chain)?;
        let now = now_unix();
        let ttl_at = now + self.ttl_seconds as i64;

        let conn = self.conn.lock().expect("cache connection mutex poisoned");
        conn.execute(
            "INSERT INTO domain_cache (domain, result_json, final_url, redirect_chain_json, updated_at, ttl_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(domain) DO UPDATE SET
                result_json = excluded.result_json,
                final_url = excluded.final_url,
                redirect_chain_json = excluded.redirect_chain_json,
                updated_at = excluded.updated_at,
                ttl_at = excluded.ttl_at",
            params![domain, result_json, result.final_url, redirect_chain_json, now, ttl_at],
        )
        .context("upserting domain_cache row")?;

        debug!(%domain, ttl_at, "cache row upserted");
        Ok(())
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> ScanResult {
        ScanResult {
            final_url: "https://example.com/".to_string(),
            related_domains: vec!["example.com".to_string()],
            redirect_chain: vec![],
        }
    }

    #[test]
    fn round_trips_while_live() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let cache = Cache::open(path.to_str().unwrap(), 3600).unwrap();

        assert!(cache.lookup("example.com").unwrap().is_none());

        cache.upsert("example.com", &sample_result()).unwrap();
        let entry = cache.lookup("example.com").unwrap().expect("should be live");
        assert_eq!(entry.final_url, "https://example.com/");
        assert_eq!(entry.related_domains, vec!["example.com".to_string()]);
        assert_eq!(entry.ttl_at, entry.updated_at + 3600);
    }

    #[test]
    fn expired_row_reads_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let cache = Cache::open(path.to_str().unwrap(), 0).unwrap();

        cache.upsert("example.com", &sample_result()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert!(cache.lookup("example.com").unwrap().is_none());
    }

    #[test]
    fn upsert_replaces_prior_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let cache = Cache::open(path.to_str().unwrap(), 3600).unwrap();

        cache.upsert("example.com", &sample_result()).unwrap();
        let mut updated = sample_result();
        updated.final_url = "https://example.com/landing".to_string();
        cache.upsert("example.com", &updated).unwrap();

        let entry = cache.lookup("example.com").unwrap().unwrap();
        assert_eq!(entry.final_url, "https://example.com/landing");
    }

    #[test]
    fn schema_initialisation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        Cache::open(path.to_str().unwrap(), 3600).unwrap();
        // Reopening against the same file must not fail on the existing schema.
        Cache::open(path.to_str().unwrap(), 3600).unwrap();
    }
}
