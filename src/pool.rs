//! Connection pool (C2): one serialized writer, N read-only connections,
//! and a transient bulk-mode pragma profile entered only by the indexer.

use crate::config::PoolConfig;
use crate::entry::SCHEMA_SQL;
use crate::error::{SeekError, StoreError};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct Pool {
    db_path: PathBuf,
    config: PoolConfig,
    write: Mutex<Option<Connection>>,
    reads: Mutex<Vec<Connection>>,
    bulk: Mutex<bool>,
}

/// A checked-out read connection. Returns itself to the pool's free-list on drop.
pub struct ReadGuard<'p> {
    pool: &'p Pool,
    conn: Option<Connection>,
}

impl std::ops::Deref for ReadGuard<'_> {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken")
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.reads.lock().push(conn);
        }
    }
}

impl Pool {
    pub fn open(db_path: &Path, config: PoolConfig) -> Result<Self, SeekError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let write = open_write_connection(db_path, &config)?;
        write.execute_batch(SCHEMA_SQL)?;

        let pool = Pool {
            db_path: db_path.to_path_buf(),
            config,
            write: Mutex::new(Some(write)),
            reads: Mutex::new(Vec::new()),
            bulk: Mutex::new(false),
        };
        Ok(pool)
    }

    pub fn write<F, T>(&self, f: F) -> Result<T, SeekError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let guard = self.write.lock();
        let conn = guard
            .as_ref()
            .ok_or(SeekError::Store(StoreError::Unavailable))?;
        Ok(f(conn)?)
    }

    pub fn read<F, T>(&self, f: F) -> Result<T, SeekError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let guard = self.checkout_read()?;
        Ok(f(&guard)?)
    }

    fn checkout_read(&self) -> Result<ReadGuard<'_>, SeekError> {
        if let Some(conn) = self.reads.lock().pop() {
            return Ok(ReadGuard {
                pool: self,
                conn: Some(conn),
            });
        }
        if self.reads_in_use_and_total() >= self.config.read_pool_size.max(1) {
            // still allow one-off connections past the soft cap rather than blocking;
            // the pool self-trims back down as guards are returned.
        }
        let conn = open_read_connection(&self.db_path, &self.config)?;
        Ok(ReadGuard {
            pool: self,
            conn: Some(conn),
        })
    }

    fn reads_in_use_and_total(&self) -> usize {
        self.reads.lock().len()
    }

    pub fn reconnect(&self) -> Result<(), SeekError> {
        debug!(mode = "write", "reconnecting store write connection");
        let new_conn = open_write_connection(&self.db_path, &self.config)?;
        *self.write.lock() = Some(new_conn);
        self.reads.lock().clear();
        Ok(())
    }

    pub fn health_check(&self) -> Result<(), SeekError> {
        self.write(|conn| conn.query_row("SELECT 1", [], |_| Ok(())))
    }

    /// Enter bulk-load mode: single long write transaction with relaxed
    /// durability pragmas. Only the indexer (C7) calls this.
    pub fn enter_bulk_mode(&self) -> Result<(), SeekError> {
        *self.bulk.lock() = true;
        self.write(|conn| {
            conn.execute_batch(&format!(
                "PRAGMA synchronous=OFF;
                 PRAGMA cache_size=-{cache};
                 PRAGMA mmap_size={mmap};
                 BEGIN IMMEDIATE;",
                cache = self.config.bulk_cache_kib,
                mmap = self.config.bulk_mmap_bytes,
            ))
        })
    }

    /// Commit the bulk transaction, restore write-mode pragmas, vacuum + analyze.
    pub fn exit_bulk_mode(&self) -> Result<(), SeekError> {
        self.write(|conn| {
            conn.execute_batch(&format!(
                "COMMIT;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA cache_size=-{cache};
                 PRAGMA mmap_size={mmap};
                 PRAGMA wal_autocheckpoint=1000;",
                cache = self.config.write_cache_kib,
                mmap = self.config.write_mmap_bytes,
            ))?;
            conn.execute_batch("VACUUM; ANALYZE;")
        })?;
        *self.bulk.lock() = false;
        Ok(())
    }

    /// Roll back a bulk transaction after a failure and restore normal pragmas.
    pub fn abort_bulk_mode(&self) -> Result<(), SeekError> {
        let result = self.write(|conn| {
            conn.execute_batch(&format!(
                "ROLLBACK;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA cache_size=-{cache};
                 PRAGMA mmap_size={mmap};
                 PRAGMA wal_autocheckpoint=1000;",
                cache = self.config.write_cache_kib,
                mmap = self.config.write_mmap_bytes,
            ))
        });
        *self.bulk.lock() = false;
        result
    }

    pub fn is_bulk_mode(&self) -> bool {
        *self.bulk.lock()
    }
}

fn open_write_connection(path: &Path, config: &PoolConfig) -> Result<Connection, SeekError> {
    let conn = Connection::open(path)
        .map_err(|e| SeekError::Store(StoreError::ConnectionFailed(e.to_string())))?;
    conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
    conn.execute_batch(&format!(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA cache_size=-{cache};
         PRAGMA temp_store=MEMORY;
         PRAGMA mmap_size={mmap};
         PRAGMA wal_autocheckpoint=1000;",
        cache = config.write_cache_kib,
        mmap = config.write_mmap_bytes,
    ))?;
    debug!(path = %path.display(), "opened write connection");
    Ok(conn)
}

fn open_read_connection(path: &Path, config: &PoolConfig) -> Result<Connection, SeekError> {
    let conn = Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| SeekError::Store(StoreError::ConnectionFailed(e.to_string())))?;
    conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
    conn.execute_batch(&format!(
        "PRAGMA cache_size=-{cache};
         PRAGMA temp_store=MEMORY;",
        cache = config.read_cache_kib,
    ))?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_schema_and_metadata_row() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("file_indexing_table.db"), PoolConfig::default())
            .unwrap();
        let indexed: bool = pool
            .read(|c| c.query_row("SELECT is_indexed FROM indexing_metadata WHERE id=1", [], |r| r.get(0)))
            .unwrap();
        assert!(!indexed);
    }

    #[test]
    fn health_check_succeeds_on_fresh_pool() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("db.sqlite"), PoolConfig::default()).unwrap();
        assert!(pool.health_check().is_ok());
    }

    #[test]
    fn bulk_mode_roundtrip_leaves_pool_usable() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("db.sqlite"), PoolConfig::default()).unwrap();
        pool.enter_bulk_mode().unwrap();
        pool.write(|c| {
            c.execute(
                "INSERT INTO file_entries (name, full_path, is_directory, date_modified, date_added) VALUES ('a','/a',0,0.0,0.0)",
                [],
            )
        })
        .unwrap();
        pool.exit_bulk_mode().unwrap();
        assert!(!pool.is_bulk_mode());
        let count: i64 = pool.read(|c| c.query_row("SELECT count(*) FROM file_entries", [], |r| r.get(0))).unwrap();
        assert_eq!(count, 1);
    }
}
