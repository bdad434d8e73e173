//! Entry model and store schema (C1).

use rusqlite::{params, Connection, Row};

/// One logical indexed item: a file, an ordinary directory, or a bundle
/// reported as a file-like entry (see DESIGN.md Open Question resolution).
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub name: String,
    pub full_path: String,
    pub is_directory: bool,
    pub file_extension: Option<String>,
    pub size: Option<i64>,
    pub date_modified: f64,
    pub date_added: f64,
}

impl Entry {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Entry {
            name: row.get("name")?,
            full_path: row.get("full_path")?,
            is_directory: row.get("is_directory")?,
            file_extension: row.get("file_extension")?,
            size: row.get("size")?,
            date_modified: row.get("date_modified")?,
            date_added: row.get("date_added").unwrap_or(0.0),
        })
    }
}

/// Single-row indexing metadata (`indexing_metadata`, row id 1).
#[derive(Debug, Clone, Default)]
pub struct IndexingMetadata {
    pub is_indexed: bool,
    pub last_indexed_date: Option<f64>,
    pub indexed_paths: Option<Vec<String>>,
    pub total_files_indexed: i64,
    pub indexing_version: i64,
    pub last_event_id: Option<i64>,
}

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS file_entries (
    id            INTEGER PRIMARY KEY,
    name          TEXT NOT NULL,
    full_path     TEXT NOT NULL UNIQUE,
    is_directory  BOOLEAN NOT NULL,
    file_extension TEXT,
    size          INTEGER,
    date_modified REAL NOT NULL,
    date_added    REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_file_entries_name_nocase
    ON file_entries(name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_file_entries_extension
    ON file_entries(file_extension) WHERE file_extension IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_file_entries_size ON file_entries(size);
CREATE INDEX IF NOT EXISTS idx_file_entries_date_modified ON file_entries(date_modified);
CREATE INDEX IF NOT EXISTS idx_file_entries_is_directory ON file_entries(is_directory);

CREATE VIRTUAL TABLE IF NOT EXISTS file_entries_fts USING fts5(
    name,
    content='file_entries',
    content_rowid='id',
    tokenize='unicode61'
);

CREATE TRIGGER IF NOT EXISTS file_entries_ai AFTER INSERT ON file_entries BEGIN
    INSERT INTO file_entries_fts(rowid, name) VALUES (new.id, new.name);
END;

CREATE TRIGGER IF NOT EXISTS file_entries_ad AFTER DELETE ON file_entries BEGIN
    INSERT INTO file_entries_fts(file_entries_fts, rowid, name) VALUES ('delete', old.id, old.name);
END;

CREATE TRIGGER IF NOT EXISTS file_entries_au AFTER UPDATE ON file_entries BEGIN
    INSERT INTO file_entries_fts(file_entries_fts, rowid, name) VALUES ('delete', old.id, old.name);
    INSERT INTO file_entries_fts(rowid, name) VALUES (new.id, new.name);
END;

CREATE TABLE IF NOT EXISTS indexing_metadata (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    is_indexed BOOLEAN NOT NULL DEFAULT 0,
    last_indexed_date REAL,
    indexed_paths TEXT,
    total_files_indexed INTEGER DEFAULT 0,
    indexing_version INTEGER DEFAULT 1,
    last_event_id INTEGER
);

INSERT OR IGNORE INTO indexing_metadata (id, is_indexed, total_files_indexed, indexing_version)
    VALUES (1, 0, 0, 1);
"#;

/// Batched `INSERT ... ON CONFLICT(full_path) DO UPDATE`. `date_added` is
/// intentionally absent from the SET list so a conflicting row keeps its
/// original insertion timestamp.
pub fn upsert_batch(conn: &Connection, entries: &[Entry]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO file_entries (name, full_path, is_directory, file_extension, size, date_modified, date_added)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(full_path) DO UPDATE SET
            name = excluded.name,
            is_directory = excluded.is_directory,
            file_extension = excluded.file_extension,
            size = excluded.size,
            date_modified = excluded.date_modified",
    )?;
    for e in entries {
        stmt.execute(params![
            e.name,
            e.full_path,
            e.is_directory,
            e.file_extension,
            e.size,
            e.date_modified,
            e.date_added,
        ])?;
    }
    Ok(())
}

/// Deletes exact paths plus, for directories among them, every descendant
/// via a B-tree range scan (`path >= "{prefix}/" AND path < "{prefix}\x7f"`).
pub fn delete_paths(conn: &Connection, paths: &[String]) -> rusqlite::Result<()> {
    let mut exact = conn.prepare_cached("DELETE FROM file_entries WHERE full_path = ?1")?;
    let mut range =
        conn.prepare_cached("DELETE FROM file_entries WHERE full_path >= ?1 AND full_path < ?2")?;
    for path in paths {
        exact.execute(params![path])?;
        let lower = format!("{}/", path);
        let upper = format!("{}\u{7f}", path);
        range.execute(params![lower, upper])?;
    }
    Ok(())
}

pub fn truncate_entries(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM file_entries", [])?;
    Ok(())
}

pub fn count_entries(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT count(*) FROM file_entries", [], |r| r.get(0))
}

pub fn read_metadata(conn: &Connection) -> rusqlite::Result<IndexingMetadata> {
    conn.query_row(
        "SELECT is_indexed, last_indexed_date, indexed_paths, total_files_indexed, indexing_version, last_event_id
         FROM indexing_metadata WHERE id = 1",
        [],
        |row| {
            let indexed_paths: Option<String> = row.get(2)?;
            Ok(IndexingMetadata {
                is_indexed: row.get(0)?,
                last_indexed_date: row.get(1)?,
                indexed_paths: indexed_paths
                    .and_then(|s| serde_json::from_str::<Vec<String>>(&s).ok()),
                total_files_indexed: row.get(3)?,
                indexing_version: row.get(4)?,
                last_event_id: row.get(5)?,
            })
        },
    )
}

pub fn write_metadata(conn: &Connection, metadata: &IndexingMetadata) -> rusqlite::Result<()> {
    let indexed_paths = metadata
        .indexed_paths
        .as_ref()
        .map(|p| serde_json::to_string(p).unwrap_or_default());
    conn.execute(
        "UPDATE indexing_metadata SET
            is_indexed = ?1,
            last_indexed_date = ?2,
            indexed_paths = ?3,
            total_files_indexed = ?4,
            indexing_version = ?5,
            last_event_id = ?6
         WHERE id = 1",
        params![
            metadata.is_indexed,
            metadata.last_indexed_date,
            indexed_paths,
            metadata.total_files_indexed,
            metadata.indexing_version,
            metadata.last_event_id,
        ],
    )?;
    Ok(())
}

pub fn write_last_event_id(conn: &Connection, event_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE indexing_metadata SET last_event_id = ?1 WHERE id = 1",
        params![event_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn schema_creates_tables_and_default_metadata_row() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        let indexed: bool = conn
            .query_row(
                "SELECT is_indexed FROM indexing_metadata WHERE id = 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert!(!indexed);
    }

    #[test]
    fn fts_row_tracks_insert_and_delete() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        conn.execute(
            "INSERT INTO file_entries (name, full_path, is_directory, date_modified, date_added) VALUES (?1, ?2, 0, 0.0, 0.0)",
            rusqlite::params!["readme.md", "/r/readme.md"],
        )
        .unwrap();
        let fts_count: i64 = conn
            .query_row("SELECT count(*) FROM file_entries_fts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(fts_count, 1);

        conn.execute("DELETE FROM file_entries WHERE full_path = ?1", ["/r/readme.md"])
            .unwrap();
        let fts_count: i64 = conn
            .query_row("SELECT count(*) FROM file_entries_fts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(fts_count, 0);
    }

    fn sample(name: &str, path: &str) -> Entry {
        Entry {
            name: name.to_string(),
            full_path: path.to_string(),
            is_directory: false,
            file_extension: Some("txt".to_string()),
            size: Some(5),
            date_modified: 100.0,
            date_added: 100.0,
        }
    }

    #[test]
    fn upsert_then_conflict_preserves_date_added() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        upsert_batch(&conn, &[sample("a.txt", "/r/a.txt")]).unwrap();
        let mut second = sample("a.txt", "/r/a.txt");
        second.date_added = 999.0;
        second.size = Some(7);
        upsert_batch(&conn, &[second]).unwrap();
        let (size, date_added): (i64, f64) = conn
            .query_row(
                "SELECT size, date_added FROM file_entries WHERE full_path = '/r/a.txt'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(size, 7);
        assert_eq!(date_added, 100.0);
    }

    #[test]
    fn delete_paths_removes_directory_and_descendants() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        upsert_batch(
            &conn,
            &[
                sample("dir", "/r/dir"),
                sample("child.txt", "/r/dir/child.txt"),
                sample("sibling.txt", "/r/sibling.txt"),
            ],
        )
        .unwrap();
        delete_paths(&conn, &["/r/dir".to_string()]).unwrap();
        let remaining = count_entries(&conn).unwrap();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn metadata_round_trips() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        let meta = IndexingMetadata {
            is_indexed: true,
            last_indexed_date: Some(123.0),
            indexed_paths: Some(vec!["/r".to_string()]),
            total_files_indexed: 3,
            indexing_version: 1,
            last_event_id: Some(42),
        };
        write_metadata(&conn, &meta).unwrap();
        let read_back = read_metadata(&conn).unwrap();
        assert_eq!(read_back.total_files_indexed, 3);
        assert_eq!(read_back.last_event_id, Some(42));
        assert_eq!(read_back.indexed_paths, Some(vec!["/r".to_string()]));
    }
}
