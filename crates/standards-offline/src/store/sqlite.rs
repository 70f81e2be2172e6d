//! SQLite-backed bucket store.

use super::traits::{ensure_cacheable, BucketMeta, BucketStore, StoreStats};
use crate::error::{OfflineError, Result};
use crate::message::{FetchResponse, RequestDescriptor, ResponseType};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use url::Url;

/// SQLite-based bucket store.
///
/// Every bucket lives in one shared database file. Thread-safe via an internal
/// mutex on the connection.
pub struct SqliteBucketStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBucketStore {
    /// Open (or create) a store at the specified database path.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| OfflineError::Io {
                message: format!("Failed to create cache directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| OfflineError::Database {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        // WAL keeps readers unblocked while a background write commits
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| OfflineError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        Self::from_connection(conn)
    }

    /// Store backed by a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| OfflineError::Database {
            message: format!("Failed to open in-memory database: {}", e),
            source: Some(e),
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS buckets (
                name TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS bucket_entries (
                bucket TEXT NOT NULL,
                method TEXT NOT NULL,
                url TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                body BLOB NOT NULL,
                response_url TEXT NOT NULL,
                response_type TEXT NOT NULL,
                redirected INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL,
                stored_at TEXT NOT NULL,
                PRIMARY KEY (bucket, method, url)
            );

            CREATE INDEX IF NOT EXISTS idx_entries_bucket
                ON bucket_entries(bucket);
            "#,
        )
        .map_err(|e| OfflineError::Database {
            message: format!("Failed to initialize cache schema: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| OfflineError::Database {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }
}

fn ensure_bucket(conn: &Connection, name: &str, now: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO buckets (name, created_at) VALUES (?1, ?2)",
        params![name, now],
    )
    .map_err(|e| OfflineError::Database {
        message: format!("Failed to create bucket {}: {}", name, e),
        source: Some(e),
    })?;
    Ok(())
}

fn write_entry(
    conn: &Connection,
    bucket: &str,
    descriptor: &RequestDescriptor,
    response: &FetchResponse,
    now: &str,
) -> Result<()> {
    let headers = encode_headers(&response.headers)?;

    conn.execute(
        r#"
        INSERT OR REPLACE INTO bucket_entries
        (bucket, method, url, status, headers, body, response_url, response_type,
         redirected, size_bytes, stored_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            bucket,
            descriptor.method().as_str(),
            descriptor.url().as_str(),
            response.status.as_u16(),
            headers,
            response.body.as_ref(),
            response.url.as_str(),
            response.response_type.as_str(),
            response.redirected,
            response.size_bytes() as i64,
            now,
        ],
    )
    .map_err(|e| OfflineError::Database {
        message: format!("Failed to store {}: {}", descriptor, e),
        source: Some(e),
    })?;

    Ok(())
}

fn encode_headers(headers: &HeaderMap) -> Result<String> {
    let pairs: Vec<(&str, String)> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    Ok(serde_json::to_string(&pairs)?)
}

fn decode_headers(raw: &str) -> Result<HeaderMap> {
    let pairs: Vec<(String, String)> = serde_json::from_str(raw)?;
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| corrupt(&name, e))?;
        let header_value = HeaderValue::from_str(&value).map_err(|e| corrupt(&name, e))?;
        headers.append(header_name, header_value);
    }
    Ok(headers)
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> OfflineError {
    OfflineError::Database {
        message: format!("Stored entry has invalid {}: {}", what, err),
        source: None,
    }
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl BucketStore for SqliteBucketStore {
    fn bucket_names(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare("SELECT name FROM buckets ORDER BY name")
            .map_err(|e| OfflineError::Database {
                message: format!("Failed to prepare bucket query: {}", e),
                source: Some(e),
            })?;

        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| OfflineError::Database {
                message: format!("Failed to list buckets: {}", e),
                source: Some(e),
            })?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(names)
    }

    fn has_bucket(&self, name: &str) -> Result<bool> {
        let conn = self.lock()?;

        let exists = conn
            .query_row(
                "SELECT 1 FROM buckets WHERE name = ?1 LIMIT 1",
                params![name],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        Ok(exists)
    }

    fn open_bucket(&self, name: &str) -> Result<()> {
        let conn = self.lock()?;
        ensure_bucket(&conn, name, &Utc::now().to_rfc3339())
    }

    fn delete_bucket(&self, name: &str) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let entries = tx.execute(
            "DELETE FROM bucket_entries WHERE bucket = ?1",
            params![name],
        )?;
        let deleted = tx.execute("DELETE FROM buckets WHERE name = ?1", params![name])?;

        tx.commit().map_err(|e| OfflineError::Database {
            message: format!("Failed to delete bucket {}: {}", name, e),
            source: Some(e),
        })?;

        if deleted > 0 {
            debug!("Deleted bucket '{}' ({} entries)", name, entries);
        }

        Ok(deleted > 0)
    }

    fn lookup(&self, bucket: &str, descriptor: &RequestDescriptor) -> Result<Option<FetchResponse>> {
        if !descriptor.is_cacheable() {
            return Ok(None);
        }

        let conn = self.lock()?;

        let row: Option<(u16, String, Vec<u8>, String, String, bool)> = conn
            .query_row(
                r#"
                SELECT status, headers, body, response_url, response_type, redirected
                FROM bucket_entries
                WHERE bucket = ?1 AND method = ?2 AND url = ?3
                "#,
                params![bucket, descriptor.method().as_str(), descriptor.url().as_str()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| OfflineError::Database {
                message: format!("Failed to query cache entry: {}", e),
                source: Some(e),
            })?;

        let (status, headers, body, response_url, response_type, redirected) = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        Ok(Some(FetchResponse {
            url: Url::parse(&response_url).map_err(|e| corrupt("response url", e))?,
            status: StatusCode::from_u16(status).map_err(|e| corrupt("status", e))?,
            headers: decode_headers(&headers)?,
            body: body.into(),
            response_type: ResponseType::parse(&response_type)
                .ok_or_else(|| corrupt("response type", &response_type))?,
            redirected,
        }))
    }

    fn put(
        &self,
        bucket: &str,
        descriptor: &RequestDescriptor,
        response: &FetchResponse,
    ) -> Result<()> {
        ensure_cacheable(descriptor)?;

        let mut conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        let tx = conn.transaction()?;
        ensure_bucket(&tx, bucket, &now)?;
        write_entry(&tx, bucket, descriptor, response, &now)?;
        tx.commit()?;

        Ok(())
    }

    fn put_all(&self, bucket: &str, entries: &[(RequestDescriptor, FetchResponse)]) -> Result<()> {
        for (descriptor, _) in entries {
            ensure_cacheable(descriptor)?;
        }

        let mut conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        // Dropping the transaction on any error rolls everything back
        let tx = conn.transaction()?;
        ensure_bucket(&tx, bucket, &now)?;
        for (descriptor, response) in entries {
            write_entry(&tx, bucket, descriptor, response, &now)?;
        }
        tx.commit().map_err(|e| OfflineError::Database {
            message: format!("Failed to commit bucket {}: {}", bucket, e),
            source: Some(e),
        })?;

        debug!("Committed {} entries to bucket '{}'", entries.len(), bucket);
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT b.name, b.created_at, COUNT(e.url), COALESCE(SUM(e.size_bytes), 0)
                FROM buckets b
                LEFT JOIN bucket_entries e ON e.bucket = b.name
                GROUP BY b.name, b.created_at
                ORDER BY b.name
                "#,
            )
            .map_err(|e| OfflineError::Database {
                message: format!("Failed to prepare stats query: {}", e),
                source: Some(e),
            })?;

        let buckets: Vec<BucketMeta> = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let created_at: Option<String> = row.get(1)?;
                let entry_count: i64 = row.get(2)?;
                let total_size_bytes: i64 = row.get(3)?;
                Ok(BucketMeta {
                    name,
                    entry_count: entry_count as usize,
                    total_size_bytes: total_size_bytes as u64,
                    created_at: parse_timestamp(created_at),
                })
            })
            .map_err(|e| OfflineError::Database {
                message: format!("Failed to query bucket stats: {}", e),
                source: Some(e),
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(StoreStats {
            bucket_count: buckets.len(),
            total_entries: buckets.iter().map(|b| b.entry_count).sum(),
            total_size_bytes: buckets.iter().map(|b| b.total_size_bytes).sum(),
            buckets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::CONTENT_TYPE;
    use reqwest::Method;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SqliteBucketStore) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("offline.sqlite");
        let store = SqliteBucketStore::new(&db_path).unwrap();
        (temp_dir, store)
    }

    fn url(path: &str) -> Url {
        Url::parse("http://localhost:8080").unwrap().join(path).unwrap()
    }

    fn json_response(path: &str, body: &str) -> FetchResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        FetchResponse::basic(url(path), StatusCode::OK, body.to_string()).with_headers(headers)
    }

    #[test]
    fn test_put_and_lookup_preserves_response() {
        let (_temp, store) = create_test_store();
        let descriptor = RequestDescriptor::get(url("/api/standards"));
        let response = json_response("/api/standards", r#"[{"id":1}]"#);

        store.put("jazz-standards-v1", &descriptor, &response).unwrap();

        let stored = store.lookup("jazz-standards-v1", &descriptor).unwrap();
        assert_eq!(stored, Some(response));
    }

    #[test]
    fn test_put_overwrites_previous_entry() {
        let (_temp, store) = create_test_store();
        let descriptor = RequestDescriptor::get(url("/api/standards"));

        store
            .put("v1", &descriptor, &json_response("/api/standards", "old"))
            .unwrap();
        store
            .put("v1", &descriptor, &json_response("/api/standards", "new"))
            .unwrap();

        let stored = store.lookup("v1", &descriptor).unwrap().unwrap();
        assert_eq!(stored.body.as_ref(), b"new");
        assert_eq!(store.stats().unwrap().total_entries, 1);
    }

    #[test]
    fn test_put_rejects_non_get() {
        let (_temp, store) = create_test_store();
        let descriptor = RequestDescriptor::new(Method::POST, url("/api/standards"));

        let err = store
            .put("v1", &descriptor, &json_response("/api/standards", "{}"))
            .unwrap_err();
        assert!(matches!(err, OfflineError::Validation { .. }));
        assert!(!store.has_bucket("v1").unwrap());
    }

    #[test]
    fn test_lookup_ignores_non_get() {
        let store = SqliteBucketStore::open_in_memory().unwrap();
        let descriptor = RequestDescriptor::get(url("/api/standards"));
        store
            .put("v1", &descriptor, &json_response("/api/standards", "[]"))
            .unwrap();

        let head = RequestDescriptor::new(Method::HEAD, url("/api/standards"));
        assert!(store.lookup("v1", &head).unwrap().is_none());
        assert!(store.lookup("v1", &descriptor).unwrap().is_some());
    }

    #[test]
    fn test_put_all_is_atomic() {
        let (_temp, store) = create_test_store();
        let entries = vec![
            (RequestDescriptor::get(url("/")), json_response("/", "shell")),
            (
                RequestDescriptor::new(Method::DELETE, url("/a.css")),
                json_response("/a.css", "body{}"),
            ),
        ];

        assert!(store.put_all("v1", &entries).is_err());
        assert!(!store.has_bucket("v1").unwrap());
        assert!(store
            .lookup("v1", &RequestDescriptor::get(url("/")))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_put_all_creates_bucket() {
        let (_temp, store) = create_test_store();
        let entries = vec![
            (RequestDescriptor::get(url("/")), json_response("/", "shell")),
            (RequestDescriptor::get(url("/a.css")), json_response("/a.css", "body{}")),
        ];

        store.put_all("v1", &entries).unwrap();

        assert_eq!(store.bucket_names().unwrap(), vec!["v1".to_string()]);
        let stats = store.stats().unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.total_size_bytes, 11);
    }

    #[test]
    fn test_bucket_isolation_and_delete() {
        let (_temp, store) = create_test_store();
        let descriptor = RequestDescriptor::get(url("/app.js"));

        store.put("v1", &descriptor, &json_response("/app.js", "one")).unwrap();
        store.put("v2", &descriptor, &json_response("/app.js", "two")).unwrap();

        assert!(store.delete_bucket("v1").unwrap());
        assert!(!store.delete_bucket("v1").unwrap());

        assert!(store.lookup("v1", &descriptor).unwrap().is_none());
        let kept = store.lookup("v2", &descriptor).unwrap().unwrap();
        assert_eq!(kept.body.as_ref(), b"two");
        assert_eq!(store.bucket_names().unwrap(), vec!["v2".to_string()]);
    }

    #[test]
    fn test_open_bucket_is_idempotent() {
        let (_temp, store) = create_test_store();
        store.open_bucket("v1").unwrap();
        store.open_bucket("v1").unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.bucket_count, 1);
        assert_eq!(stats.buckets[0].entry_count, 0);
        assert!(stats.buckets[0].created_at.is_some());
    }

    #[test]
    fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("offline.sqlite");
        let descriptor = RequestDescriptor::get(url("/manifest.json"));

        {
            let store = SqliteBucketStore::new(&db_path).unwrap();
            store
                .put("v1", &descriptor, &json_response("/manifest.json", "{}"))
                .unwrap();
        }

        let store = SqliteBucketStore::new(&db_path).unwrap();
        assert!(store.lookup("v1", &descriptor).unwrap().is_some());
    }
}
