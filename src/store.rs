//! The SQLite record store.
//!
//! Two tables: `samples`, the append-only corpus, and `listing_cache`,
//! the revision-keyed cache of the expensive package enumeration. Every
//! append commits synchronously before returning; the caller serializes
//! writes (the pool funnels all samples through one thread), and cache
//! rows are insert-only so redundant cold-cache population by concurrent
//! runs stays harmless.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use nixbreak_mutate::Strategy;

use crate::candidates::CandidateUnit;
use crate::revision::{Revision, REVISION_LEN};
use crate::sample::Sample;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("corrupt row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },
}

/// A sample read back with its assigned row id.
#[derive(Debug, Clone)]
pub struct StoredSample {
    pub id: i64,
    pub sample: Sample,
}

/// Column values exactly as stored, before validation.
struct RawSampleRow {
    id: i64,
    pname: String,
    attr: String,
    system: String,
    file: String,
    line: u32,
    revision: Vec<u8>,
    strategy: u8,
    original: String,
    mutated: String,
    build_output: String,
    error: Option<String>,
    duration_ns: i64,
    created_at: String,
}

/// Synchronous SQLite-backed record store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (and if necessary create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::bootstrap(conn)
    }

    /// An in-memory store, for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS samples(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pname TEXT NOT NULL,
                attribute TEXT NOT NULL,
                system TEXT NOT NULL,
                file TEXT NOT NULL,
                line INTEGER NOT NULL,
                revision BLOB NOT NULL,
                strategy INTEGER NOT NULL,
                recipe_working TEXT NOT NULL,
                recipe_broken TEXT NOT NULL,
                build_output TEXT NOT NULL,
                error_message TEXT,
                build_duration_ns INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS listing_cache(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                revision BLOB NOT NULL,
                listing TEXT NOT NULL
            );
            ",
        )?;
        Ok(SqliteStore { conn })
    }

    /// Append one sample; committed before this returns.
    pub fn append(&mut self, sample: &Sample) -> Result<i64, StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "
            INSERT INTO samples(
                pname, attribute, system, file, line, revision, strategy,
                recipe_working, recipe_broken, build_output, error_message,
                build_duration_ns, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ",
            params![
                sample.candidate.pname,
                sample.candidate.attr,
                sample.candidate.system,
                sample.candidate.file.to_string_lossy().into_owned(),
                sample.candidate.line,
                sample.revision.as_bytes().as_slice(),
                sample.strategy.id(),
                sample.original,
                sample.mutated,
                sample.build_output,
                sample.error,
                sample.duration.as_nanos() as i64,
                sample.created_at.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    /// All samples whose mutation actually broke the build, in randomized
    /// order, optionally limited. This is the downstream-export read path.
    pub fn labeled(&self, limit: Option<usize>) -> Result<Vec<StoredSample>, StoreError> {
        let base = "
            SELECT id, pname, attribute, system, file, line, revision, strategy,
                   recipe_working, recipe_broken, build_output, error_message,
                   build_duration_ns, created_at
            FROM samples
            WHERE error_message IS NOT NULL
            ORDER BY RANDOM()
        ";
        let mut rows = Vec::new();
        match limit {
            Some(limit) => {
                let mut stmt = self.conn.prepare(&format!("{base} LIMIT ?1"))?;
                let mapped = stmt.query_map(params![limit as i64], Self::read_row)?;
                for raw in mapped {
                    rows.push(Self::hydrate(raw?)?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(base)?;
                let mapped = stmt.query_map([], Self::read_row)?;
                for raw in mapped {
                    rows.push(Self::hydrate(raw?)?);
                }
            }
        }
        Ok(rows)
    }

    /// Read the cached enumeration for `revision`, if any. With multiple
    /// equivalent rows present the first wins.
    pub fn read_cache(&self, revision: Revision) -> Result<Option<String>, StoreError> {
        let listing = self
            .conn
            .query_row(
                "SELECT listing FROM listing_cache WHERE revision = ?1 LIMIT 1",
                params![revision.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(listing)
    }

    /// Insert a cache entry for `revision`. Entries are never updated in
    /// place.
    pub fn write_cache(&mut self, revision: Revision, listing: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO listing_cache(revision, listing) VALUES (?1, ?2)",
            params![revision.as_bytes().as_slice(), listing],
        )?;
        Ok(())
    }

    fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSampleRow> {
        Ok(RawSampleRow {
            id: row.get(0)?,
            pname: row.get(1)?,
            attr: row.get(2)?,
            system: row.get(3)?,
            file: row.get(4)?,
            line: row.get(5)?,
            revision: row.get(6)?,
            strategy: row.get(7)?,
            original: row.get(8)?,
            mutated: row.get(9)?,
            build_output: row.get(10)?,
            error: row.get(11)?,
            duration_ns: row.get(12)?,
            created_at: row.get(13)?,
        })
    }

    fn hydrate(raw: RawSampleRow) -> Result<StoredSample, StoreError> {
        let id = raw.id;
        let revision: [u8; REVISION_LEN] =
            raw.revision
                .as_slice()
                .try_into()
                .map_err(|_| StoreError::CorruptRow {
                    id,
                    reason: format!("revision blob has {} bytes", raw.revision.len()),
                })?;
        let strategy = Strategy::from_id(raw.strategy).ok_or_else(|| StoreError::CorruptRow {
            id,
            reason: format!("unknown strategy id {}", raw.strategy),
        })?;
        let created_at: DateTime<Utc> =
            raw.created_at
                .parse()
                .map_err(|_| StoreError::CorruptRow {
                    id,
                    reason: format!("unparseable timestamp {:?}", raw.created_at),
                })?;

        Ok(StoredSample {
            id,
            sample: Sample {
                candidate: CandidateUnit {
                    attr: raw.attr,
                    pname: raw.pname,
                    system: raw.system,
                    file: raw.file.into(),
                    line: raw.line,
                },
                revision: Revision::from_bytes(revision),
                strategy,
                original: raw.original,
                mutated: raw.mutated,
                build_output: raw.build_output,
                error: raw.error,
                duration: Duration::from_nanos(raw.duration_ns.max(0) as u64),
                created_at,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample(attr: &str, error: Option<&str>) -> Sample {
        Sample {
            candidate: CandidateUnit {
                attr: attr.to_string(),
                pname: "demo".to_string(),
                system: "x86_64-linux".to_string(),
                file: PathBuf::from("pkgs/demo.nix"),
                line: 4,
            },
            revision: "89f196fe781c53cb50fef61d3063fa5e8d61b6e5".parse().unwrap(),
            strategy: Strategy::LineDeletion,
            original: "{ }: null\n".to_string(),
            mutated: "{ }:\n".to_string(),
            build_output: "@nix {}".to_string(),
            error: error.map(|e| e.to_string()),
            duration: Duration::from_millis(1500),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_append_then_read_back() {
        let mut store = SqliteStore::in_memory().unwrap();
        let id = store.append(&sample("a", Some("error: boom"))).unwrap();
        assert!(id > 0);

        let rows = store.labeled(None).unwrap();
        assert_eq!(rows.len(), 1);
        let stored = &rows[0].sample;
        assert_eq!(stored.candidate.attr, "a");
        assert_eq!(stored.error.as_deref(), Some("error: boom"));
        assert_eq!(stored.strategy, Strategy::LineDeletion);
        assert_eq!(stored.duration, Duration::from_millis(1500));
        assert_eq!(
            stored.revision.to_hex(),
            "89f196fe781c53cb50fef61d3063fa5e8d61b6e5"
        );
    }

    #[test]
    fn test_labeled_excludes_negative_samples() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.append(&sample("broken", Some("error"))).unwrap();
        store.append(&sample("still-fine", None)).unwrap();

        let rows = store.labeled(None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sample.candidate.attr, "broken");
    }

    #[test]
    fn test_labeled_respects_limit() {
        let mut store = SqliteStore::in_memory().unwrap();
        for i in 0..5 {
            store
                .append(&sample(&format!("pkg{i}"), Some("error")))
                .unwrap();
        }
        assert_eq!(store.labeled(Some(3)).unwrap().len(), 3);
        assert_eq!(store.labeled(None).unwrap().len(), 5);
    }

    #[test]
    fn test_cache_miss_then_hit() {
        let mut store = SqliteStore::in_memory().unwrap();
        let revision: Revision = "89f196fe781c53cb50fef61d3063fa5e8d61b6e5".parse().unwrap();
        assert_eq!(store.read_cache(revision).unwrap(), None);

        store.write_cache(revision, "{\"pkg\":{}}").unwrap();
        assert_eq!(
            store.read_cache(revision).unwrap().as_deref(),
            Some("{\"pkg\":{}}")
        );

        // A second, equivalent insert is tolerated; reads still succeed.
        store.write_cache(revision, "{\"pkg\":{}}").unwrap();
        assert!(store.read_cache(revision).unwrap().is_some());
    }

    #[test]
    fn test_cache_is_keyed_by_revision() {
        let mut store = SqliteStore::in_memory().unwrap();
        let a: Revision = "89f196fe781c53cb50fef61d3063fa5e8d61b6e5".parse().unwrap();
        let b: Revision = "0000000000000000000000000000000000000000".parse().unwrap();
        store.write_cache(a, "listing-a").unwrap();
        assert_eq!(store.read_cache(b).unwrap(), None);
    }
}
