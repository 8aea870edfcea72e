use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use beacon_core::error::{BeaconError, Result};
use beacon_core::time::now_ms;
use duckdb::{Connection, params};

use super::{Entry, KvPair, KvStore, ScanOptions, prefix_upper_bound};
use crate::schema::SCHEMA_SQL;

/// DuckDB-backed key-value table.
///
/// The connection sits behind a mutex, so each trait call (including the
/// read-then-write inside `compare_and_swap`) runs without interleaving.
pub struct DuckKv {
    conn: Mutex<Option<Connection>>,
    db_path: String,
}

impl DuckKv {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BeaconError::Io(format!("failed to create db dir: {e}")))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| BeaconError::Store(format!("failed to open duckdb: {e}")))?;
        conn.execute_batch("PRAGMA threads=4;")
            .map_err(|e| BeaconError::Store(format!("failed to set pragmas: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| BeaconError::Store(format!("failed to initialize schema: {e}")))?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            db_path: path.display().to_string(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BeaconError::Store(format!("failed to open in-memory db: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| BeaconError::Store(format!("failed to initialize schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            db_path: ":memory:".to_string(),
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock().expect("store mutex poisoned");
        let conn = guard.as_ref().ok_or(BeaconError::NotInitialized)?;
        f(conn)
    }
}

fn read_live(conn: &Connection, key: &[u8], now: i64) -> Result<Option<Entry>> {
    let mut stmt = conn
        .prepare(
            "SELECT value, version FROM kv
             WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .map_err(|e| BeaconError::Store(format!("prepare kv get failed: {e}")))?;
    let mut rows = stmt
        .query(params![key.to_vec(), now])
        .map_err(|e| BeaconError::Store(format!("kv get failed: {e}")))?;

    let Some(row) = rows
        .next()
        .map_err(|e| BeaconError::Store(format!("kv get row failed: {e}")))?
    else {
        return Ok(None);
    };
    let value = row
        .get::<_, Vec<u8>>(0)
        .map_err(|e| BeaconError::Store(format!("kv get value failed: {e}")))?;
    let version = row
        .get::<_, i64>(1)
        .map_err(|e| BeaconError::Store(format!("kv get version failed: {e}")))?;
    Ok(Some(Entry {
        value,
        version: version as u64,
    }))
}

fn write_entry(conn: &Connection, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<u64> {
    let version = conn
        .query_row("SELECT nextval('kv_version_seq')", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| BeaconError::Store(format!("kv version allocation failed: {e}")))?;
    let expires_at = ttl.map(|d| now_ms() + d.as_millis() as i64);

    conn.execute(
        "INSERT OR REPLACE INTO kv (key, value, version, expires_at) VALUES (?, ?, ?, ?)",
        params![key.to_vec(), value.to_vec(), version, expires_at],
    )
    .map_err(|e| BeaconError::Store(format!("kv write failed: {e}")))?;
    Ok(version as u64)
}

impl KvStore for DuckKv {
    fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        self.with_conn(|conn| read_live(conn, key, now_ms()))
    }

    fn set(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<u64> {
        self.with_conn(|conn| write_entry(conn, key, value, ttl))
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn
                .execute("DELETE FROM kv WHERE key = ?", params![key.to_vec()])
                .map_err(|e| BeaconError::Store(format!("kv delete failed: {e}")))?;
            Ok(deleted > 0)
        })
    }

    fn scan(&self, prefix: &[u8], opts: ScanOptions) -> Result<Vec<KvPair>> {
        let order = if opts.reverse { "DESC" } else { "ASC" };
        let limit = opts
            .limit
            .map(|n| format!(" LIMIT {n}"))
            .unwrap_or_default();
        let sql = format!(
            "SELECT key, value, version FROM kv
             WHERE key > ? AND key < ? AND (expires_at IS NULL OR expires_at > ?)
             ORDER BY key {order}{limit}"
        );

        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| BeaconError::Store(format!("prepare kv scan failed: {e}")))?;
            let rows = stmt
                .query_map(
                    params![prefix.to_vec(), prefix_upper_bound(prefix), now_ms()],
                    |row| {
                        Ok(KvPair {
                            key: row.get::<_, Vec<u8>>(0)?,
                            entry: Entry {
                                value: row.get::<_, Vec<u8>>(1)?,
                                version: row.get::<_, i64>(2)? as u64,
                            },
                        })
                    },
                )
                .map_err(|e| BeaconError::Store(format!("kv scan failed: {e}")))?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(|e| BeaconError::Store(format!("map kv row failed: {e}")))?);
            }
            Ok(out)
        })
    }

    fn compare_and_swap(
        &self,
        key: &[u8],
        expected: Option<u64>,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let current = read_live(conn, key, now_ms())?.map(|e| e.version);
            let matches = match (expected, current) {
                (None, None) => true,
                (Some(exp), Some(cur)) => exp == cur,
                _ => false,
            };
            if !matches {
                return Ok(false);
            }
            write_entry(conn, key, value, ttl)?;
            Ok(true)
        })
    }

    fn purge_expired(&self) -> Result<usize> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?",
                params![now_ms()],
            )
            .map_err(|e| BeaconError::Store(format!("kv purge failed: {e}")))
        })
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().expect("store mutex poisoned");
        if let Some(conn) = guard.take() {
            conn.close()
                .map_err(|(_, e)| BeaconError::Store(format!("failed to close duckdb: {e}")))?;
        }
        Ok(())
    }
}
