//! SQLite-backed index of filesystem entries.
//!
//! Every operation opens its own connection in WAL mode, so readers keep
//! seeing the last committed snapshot while a writer is mid-batch. Each write
//! call is a single transaction. Full reindexes stream into a staging table
//! private to their own connection and swap it in with one transaction at the
//! end, so two replaces running at once never see each other's rows.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::entry::{now_epoch, IndexEntry};
use crate::error::{Error, Result};

const SCHEMA_VERSION: i32 = 2;
const STAGE_BATCH_SIZE: usize = 10_000;
const LAST_INDEXED_KEY: &str = "last_indexed_time";

const STAGING_TABLE: &str = "temp.entries_staging";

const ENTRY_COLUMNS: &str = "path, name, dir, is_dir, ext, size, mtime, indexed_at";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub count: u64,
    pub total_size: u64,
    pub last_indexed_time: Option<i64>,
    pub db_size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct IndexStore {
    db_path: PathBuf,
}

fn db_connection(db_path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA temp_store=MEMORY;
        PRAGMA busy_timeout=5000;
        "#,
    )?;
    Ok(conn)
}

/// Tables and indexes are created when missing. The only thing ever dropped
/// is the shared staging table of version 1 files.
fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
          id INTEGER PRIMARY KEY,
          path TEXT NOT NULL UNIQUE,
          name TEXT NOT NULL,
          dir TEXT NOT NULL,
          is_dir INTEGER NOT NULL,
          ext TEXT,
          size INTEGER NOT NULL DEFAULT 0,
          mtime INTEGER NOT NULL DEFAULT 0,
          indexed_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_entries_name_nocase ON entries(name COLLATE NOCASE);
        CREATE INDEX IF NOT EXISTS idx_entries_dir ON entries(dir);

        CREATE TABLE IF NOT EXISTS meta (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );
        "#,
    )?;
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version < SCHEMA_VERSION {
        if version < 2 {
            conn.execute_batch("DROP TABLE IF EXISTS main.entries_staging;")?;
        }
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
    }
    Ok(())
}

fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM meta WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta(key, value) VALUES(?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

pub fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Bounds of the byte range holding `root` and everything below it:
/// `root/` up to (excluding) `root0`, `'0'` being the byte after `'/'`.
fn subtree_range(root: &str) -> (String, String) {
    let trimmed = root.trim_end_matches('/');
    (format!("{trimmed}/"), format!("{trimmed}0"))
}

fn upsert_sql(table: &str) -> String {
    format!(
        r#"
        INSERT INTO {table}({ENTRY_COLUMNS})
        VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(path) DO UPDATE SET
          name = excluded.name,
          dir = excluded.dir,
          is_dir = excluded.is_dir,
          ext = excluded.ext,
          size = excluded.size,
          mtime = excluded.mtime,
          indexed_at = excluded.indexed_at
        "#
    )
}

fn insert_rows(
    tx: &rusqlite::Transaction<'_>,
    table: &str,
    entries: &[IndexEntry],
    indexed_at: i64,
) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare(&upsert_sql(table))?;
    for entry in entries {
        stmt.execute(params![
            entry.path,
            entry.name,
            entry.dir(),
            entry.is_directory as i64,
            entry.ext(),
            entry.size as i64,
            entry.modified_time,
            indexed_at,
        ])?;
    }
    Ok(())
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexEntry> {
    Ok(IndexEntry {
        path: row.get(0)?,
        name: row.get(1)?,
        is_directory: row.get::<_, i64>(2)? != 0,
        size: row.get::<_, i64>(3)?.max(0) as u64,
        modified_time: row.get(4)?,
    })
}

impl IndexStore {
    /// Opens (creating if needed) the index file and its schema.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = db_connection(&db_path).map_err(Error::write)?;
        init_schema(&conn).map_err(Error::write)?;
        tracing::debug!(db = %db_path.display(), "index store ready");
        Ok(Self { db_path })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn reader(&self) -> Result<Connection> {
        db_connection(&self.db_path).map_err(Error::read)
    }

    fn writer(&self) -> Result<Connection> {
        db_connection(&self.db_path).map_err(Error::write)
    }

    /// Clears and repopulates the whole index. Readers see either the old
    /// contents or the new ones, never a mix.
    pub fn replace_all<I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = IndexEntry>,
    {
        let mut staged = self.begin_replace()?;
        for entry in entries {
            staged.push(entry)?;
        }
        staged.commit()
    }

    /// The staging table is a TEMP table of the returned handle's own
    /// connection; it disappears with the handle.
    pub fn begin_replace(&self) -> Result<StagedReplace> {
        let conn = self.writer()?;
        // Staging a whole tree in memory is too much for large homes.
        conn.execute_batch(&format!(
            r#"
            PRAGMA temp_store=FILE;
            CREATE TEMP TABLE IF NOT EXISTS {STAGING_TABLE} (
              id INTEGER PRIMARY KEY,
              path TEXT NOT NULL UNIQUE,
              name TEXT NOT NULL,
              dir TEXT NOT NULL,
              is_dir INTEGER NOT NULL,
              ext TEXT,
              size INTEGER NOT NULL DEFAULT 0,
              mtime INTEGER NOT NULL DEFAULT 0,
              indexed_at INTEGER NOT NULL
            );
            "#
        ))
        .map_err(Error::write)?;
        Ok(StagedReplace {
            conn,
            pending: Vec::with_capacity(STAGE_BATCH_SIZE),
            staged: 0,
            indexed_at: now_epoch(),
        })
    }

    /// Inserts new paths and replaces existing ones, all in one transaction.
    pub fn upsert(&self, entries: &[IndexEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let mut conn = self.writer()?;
        let now = now_epoch();
        let tx = conn.transaction().map_err(Error::write)?;
        insert_rows(&tx, "entries", entries, now).map_err(Error::write)?;
        set_meta(&tx, LAST_INDEXED_KEY, &now.to_string()).map_err(Error::write)?;
        tx.commit().map_err(Error::write)?;
        Ok(entries.len())
    }

    /// Deletes rows at or below any of `roots` that are not in `still_present`.
    pub fn remove_missing(
        &self,
        roots: &[PathBuf],
        still_present: &HashSet<String>,
    ) -> Result<usize> {
        if roots.is_empty() {
            return Ok(0);
        }
        let mut conn = self.writer()?;
        let tx = conn.transaction().map_err(Error::write)?;
        let mut removed = 0;
        {
            let mut select = tx
                .prepare("SELECT path FROM entries WHERE path = ?1 OR (path >= ?2 AND path < ?3)")
                .map_err(Error::write)?;
            let mut delete = tx
                .prepare("DELETE FROM entries WHERE path = ?1")
                .map_err(Error::write)?;

            for root in roots {
                let root = root.to_string_lossy();
                let exact = if root == "/" {
                    "/".to_string()
                } else {
                    root.trim_end_matches('/').to_string()
                };
                let (low, high) = subtree_range(&exact);

                let stale: Vec<String> = select
                    .query_map(params![exact, low, high], |row| row.get::<_, String>(0))
                    .map_err(Error::write)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(Error::write)?
                    .into_iter()
                    .filter(|path| !still_present.contains(path))
                    .collect();

                for path in &stale {
                    removed += delete.execute(params![path]).map_err(Error::write)?;
                }
            }
        }
        tx.commit().map_err(Error::write)?;
        Ok(removed)
    }

    /// Every indexed path in insertion order.
    pub fn all_paths(&self) -> Result<Vec<String>> {
        let conn = self.reader()?;
        let mut stmt = conn
            .prepare("SELECT path FROM entries ORDER BY id")
            .map_err(Error::read)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(Error::read)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::read)
    }

    /// Case-insensitive substring match over name and path.
    pub fn find(&self, needle: &str, limit: Option<usize>) -> Result<Vec<String>> {
        let conn = self.reader()?;
        let pattern = format!("%{}%", escape_like(needle.trim()));
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn
            .prepare(
                r"SELECT path FROM entries
                  WHERE name LIKE ?1 ESCAPE '\' OR path LIKE ?1 ESCAPE '\'
                  ORDER BY name COLLATE NOCASE, id
                  LIMIT ?2",
            )
            .map_err(Error::read)?;
        let rows = stmt
            .query_map(params![pattern, limit], |row| row.get::<_, String>(0))
            .map_err(Error::read)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::read)
    }

    pub fn get(&self, path: &str) -> Result<Option<IndexEntry>> {
        let conn = self.reader()?;
        conn.query_row(
            "SELECT path, name, is_dir, size, mtime FROM entries WHERE path = ?1",
            params![path],
            row_to_entry,
        )
        .optional()
        .map_err(Error::read)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.reader()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(Error::read)?;
        Ok(count.max(0) as u64)
    }

    pub fn is_empty(&self) -> Result<bool> {
        let conn = self.reader()?;
        let any: Option<i64> = conn
            .query_row("SELECT 1 FROM entries LIMIT 1", [], |row| row.get(0))
            .optional()
            .map_err(Error::read)?;
        Ok(any.is_none())
    }

    pub fn last_indexed_time(&self) -> Result<Option<i64>> {
        let conn = self.reader()?;
        let value = get_meta(&conn, LAST_INDEXED_KEY).map_err(Error::read)?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let conn = self.reader()?;
        let (count, total_size): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM entries",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(Error::read)?;
        let last_indexed_time = get_meta(&conn, LAST_INDEXED_KEY)
            .map_err(Error::read)?
            .and_then(|v| v.parse().ok());
        let db_size_bytes = fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0);

        Ok(IndexStats {
            count: count.max(0) as u64,
            total_size: total_size.max(0) as u64,
            last_indexed_time,
            db_size_bytes,
        })
    }

    pub fn clear(&self) -> Result<()> {
        let mut conn = self.writer()?;
        let tx = conn.transaction().map_err(Error::write)?;
        tx.execute_batch(
            r#"
            DELETE FROM entries;
            DELETE FROM meta;
            "#,
        )
        .map_err(Error::write)?;
        tx.commit().map_err(Error::write)?;
        tracing::info!(db = %self.db_path.display(), "index cleared");
        Ok(())
    }
}

/// A full reindex in progress. Entries go to a staging table only this
/// handle's connection can see; the live table is untouched until
/// [`commit`](Self::commit) or [`merge`](Self::merge). Dropping it discards
/// what was staged.
pub struct StagedReplace {
    conn: Connection,
    pending: Vec<IndexEntry>,
    staged: usize,
    indexed_at: i64,
}

impl std::fmt::Debug for StagedReplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedReplace")
            .field("staged", &self.staged)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl StagedReplace {
    pub fn push(&mut self, entry: IndexEntry) -> Result<()> {
        self.pending.push(entry);
        if self.pending.len() >= STAGE_BATCH_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.staged + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction().map_err(Error::write)?;
        insert_rows(&tx, STAGING_TABLE, &self.pending, self.indexed_at)
            .map_err(Error::write)?;
        tx.commit().map_err(Error::write)?;
        self.staged += self.pending.len();
        self.pending.clear();
        Ok(())
    }

    /// Swaps the staged rows in as the entire index.
    pub fn commit(mut self) -> Result<usize> {
        self.flush()?;
        let tx = self.conn.transaction().map_err(Error::write)?;
        tx.execute("DELETE FROM entries", []).map_err(Error::write)?;
        tx.execute(
            &format!(
                "INSERT INTO entries({ENTRY_COLUMNS}) \
                 SELECT {ENTRY_COLUMNS} FROM {STAGING_TABLE} ORDER BY id"
            ),
            [],
        )
        .map_err(Error::write)?;
        set_meta(&tx, LAST_INDEXED_KEY, &self.indexed_at.to_string()).map_err(Error::write)?;
        tx.commit().map_err(Error::write)?;
        Ok(self.staged)
    }

    /// Upserts the staged rows into the live index without removing anything.
    pub fn merge(mut self) -> Result<usize> {
        self.flush()?;
        let tx = self.conn.transaction().map_err(Error::write)?;
        tx.execute(
            &format!(
                "INSERT INTO entries({ENTRY_COLUMNS}) \
                 SELECT {ENTRY_COLUMNS} FROM {STAGING_TABLE} WHERE true ORDER BY id \
                 ON CONFLICT(path) DO UPDATE SET \
                   name = excluded.name, dir = excluded.dir, is_dir = excluded.is_dir, \
                   ext = excluded.ext, size = excluded.size, mtime = excluded.mtime, \
                   indexed_at = excluded.indexed_at"
            ),
            [],
        )
        .map_err(Error::write)?;
        if self.staged > 0 {
            set_meta(&tx, LAST_INDEXED_KEY, &self.indexed_at.to_string())
                .map_err(Error::write)?;
        }
        tx.commit().map_err(Error::write)?;
        Ok(self.staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, size: u64) -> IndexEntry {
        IndexEntry {
            path: path.to_string(),
            name: Path::new(path)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .to_string(),
            size,
            modified_time: 1_700_000_000,
            is_directory: false,
        }
    }

    fn store() -> (tempfile::TempDir, IndexStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open(dir.path().join("index.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn open_is_idempotent_and_keeps_rows() {
        let (dir, store) = store();
        store.upsert(&[entry("/a/x.txt", 1)]).unwrap();
        let reopened = IndexStore::open(dir.path().join("index.db")).unwrap();
        assert_eq!(reopened.all_paths().unwrap(), vec!["/a/x.txt"]);
    }

    #[test]
    fn upsert_does_not_duplicate() {
        let (_dir, store) = store();
        let e = entry("/a/x.txt", 1);
        store.upsert(&[e.clone()]).unwrap();
        store.upsert(&[e.clone()]).unwrap();
        assert_eq!(store.all_paths().unwrap(), vec![e.path.clone()]);

        let mut bigger = e.clone();
        bigger.size = 42;
        store.upsert(&[bigger]).unwrap();
        assert_eq!(store.get(&e.path).unwrap().unwrap().size, 42);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn all_paths_keeps_insertion_order() {
        let (_dir, store) = store();
        store
            .upsert(&[entry("/z/last.txt", 1), entry("/a/first.txt", 1)])
            .unwrap();
        store.upsert(&[entry("/m/middle.txt", 1)]).unwrap();
        store.upsert(&[entry("/z/last.txt", 7)]).unwrap();
        assert_eq!(
            store.all_paths().unwrap(),
            vec!["/z/last.txt", "/a/first.txt", "/m/middle.txt"]
        );
    }

    #[test]
    fn replace_all_swaps_contents() {
        let (_dir, store) = store();
        store.upsert(&[entry("/old/gone.txt", 1)]).unwrap();

        let written = store
            .replace_all(vec![entry("/new/a.txt", 3), entry("/new/b.txt", 4)])
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.all_paths().unwrap(), vec!["/new/a.txt", "/new/b.txt"]);

        let stats = store.stats().unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_size, 7);
        assert!(stats.last_indexed_time.is_some());
    }

    #[test]
    fn replace_all_twice_is_idempotent() {
        let (_dir, store) = store();
        let snapshot = vec![entry("/r/a", 1), entry("/r/b", 2), entry("/r/c", 3)];
        store.replace_all(snapshot.clone()).unwrap();
        let first = store.all_paths().unwrap();
        store.replace_all(snapshot).unwrap();
        assert_eq!(store.all_paths().unwrap(), first);
    }

    #[test]
    fn staged_rows_are_invisible_until_commit() {
        let (_dir, store) = store();
        store.upsert(&[entry("/live/kept.txt", 1)]).unwrap();

        let mut staged = store.begin_replace().unwrap();
        for i in 0..(STAGE_BATCH_SIZE + 5) {
            staged.push(entry(&format!("/stage/f{i}"), 1)).unwrap();
        }
        // One batch has been flushed to staging already.
        assert_eq!(store.all_paths().unwrap(), vec!["/live/kept.txt"]);

        let written = staged.commit().unwrap();
        assert_eq!(written, STAGE_BATCH_SIZE + 5);
        assert_eq!(store.count().unwrap(), (STAGE_BATCH_SIZE + 5) as u64);
        assert!(store.get("/live/kept.txt").unwrap().is_none());
    }

    #[test]
    fn dropped_stage_leaves_index_untouched() {
        let (_dir, store) = store();
        store.upsert(&[entry("/live/kept.txt", 1)]).unwrap();
        {
            let mut staged = store.begin_replace().unwrap();
            staged.push(entry("/stage/a", 1)).unwrap();
        }
        assert_eq!(store.all_paths().unwrap(), vec!["/live/kept.txt"]);

        // A later replace does not pick up the abandoned rows.
        store.replace_all(vec![entry("/stage/b", 1)]).unwrap();
        assert_eq!(store.all_paths().unwrap(), vec!["/stage/b"]);
    }

    #[test]
    fn overlapping_replaces_do_not_mix_rows() {
        let (_dir, store) = store();
        let mut first = store.begin_replace().unwrap();
        let mut second = store.begin_replace().unwrap();
        for i in 0..(STAGE_BATCH_SIZE + 5) {
            second.push(entry(&format!("/second/f{i}"), 1)).unwrap();
            if i < 3 {
                first.push(entry(&format!("/first/f{i}"), 1)).unwrap();
            }
        }

        assert_eq!(first.commit().unwrap(), 3);
        assert_eq!(store.count().unwrap(), 3);

        assert_eq!(second.commit().unwrap(), STAGE_BATCH_SIZE + 5);
        let paths = store.all_paths().unwrap();
        assert_eq!(paths.len(), STAGE_BATCH_SIZE + 5);
        assert!(paths.iter().all(|p| p.starts_with("/second/")));
    }

    #[test]
    fn legacy_staging_table_is_dropped_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("index.db");
        {
            let conn = Connection::open(&db).unwrap();
            conn.execute_batch(
                "CREATE TABLE entries_staging (id INTEGER PRIMARY KEY, path TEXT);
                 INSERT INTO entries_staging(path) VALUES ('/stale');
                 PRAGMA user_version = 1;",
            )
            .unwrap();
        }
        let store = IndexStore::open(&db).unwrap();
        store.replace_all(vec![entry("/fresh/a", 1)]).unwrap();
        assert_eq!(store.all_paths().unwrap(), vec!["/fresh/a"]);

        let conn = Connection::open(&db).unwrap();
        let left: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'entries_staging'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(left, 0);
    }

    #[test]
    fn merge_keeps_existing_rows() {
        let (_dir, store) = store();
        store
            .upsert(&[entry("/live/a", 1), entry("/live/b", 1)])
            .unwrap();
        let mut staged = store.begin_replace().unwrap();
        staged.push(entry("/live/b", 9)).unwrap();
        staged.push(entry("/live/c", 1)).unwrap();
        assert_eq!(staged.merge().unwrap(), 2);

        assert_eq!(
            store.all_paths().unwrap(),
            vec!["/live/a", "/live/b", "/live/c"]
        );
        assert_eq!(store.get("/live/b").unwrap().unwrap().size, 9);
    }

    #[test]
    fn remove_missing_prunes_only_under_roots() {
        let (_dir, store) = store();
        store
            .upsert(&[
                entry("/data/keep.txt", 1),
                entry("/data/sub/gone.txt", 1),
                entry("/data2/other.txt", 1),
                entry("/elsewhere/x.txt", 1),
            ])
            .unwrap();

        let present: HashSet<String> = ["/data/keep.txt".to_string()].into_iter().collect();
        let removed = store
            .remove_missing(&[PathBuf::from("/data")], &present)
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(
            store.all_paths().unwrap(),
            vec!["/data/keep.txt", "/data2/other.txt", "/elsewhere/x.txt"]
        );
    }

    #[test]
    fn remove_missing_is_case_sensitive() {
        let (_dir, store) = store();
        store
            .upsert(&[entry("/Data/a.txt", 1), entry("/data/b.txt", 1)])
            .unwrap();
        let removed = store
            .remove_missing(&[PathBuf::from("/data")], &HashSet::new())
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.all_paths().unwrap(), vec!["/Data/a.txt"]);
    }

    #[test]
    fn find_matches_substrings_case_insensitively() {
        let (_dir, store) = store();
        store
            .upsert(&[
                entry("/docs/Report_2024.pdf", 1),
                entry("/docs/notes.md", 1),
                entry("/docs/report%done.txt", 1),
            ])
            .unwrap();
        assert_eq!(
            store.find("report_", None).unwrap(),
            vec!["/docs/Report_2024.pdf"]
        );
        assert_eq!(
            store.find("%done", None).unwrap(),
            vec!["/docs/report%done.txt"]
        );
        assert_eq!(store.find("DOCS", Some(2)).unwrap().len(), 2);
    }

    #[test]
    fn clear_empties_everything() {
        let (_dir, store) = store();
        store.upsert(&[entry("/a", 1)]).unwrap();
        assert!(!store.is_empty().unwrap());
        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
        let stats = store.stats().unwrap();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.last_indexed_time, None);
    }

    #[test]
    fn subtree_range_bounds() {
        assert_eq!(
            subtree_range("/data"),
            ("/data/".to_string(), "/data0".to_string())
        );
        assert_eq!(subtree_range("/"), ("/".to_string(), "0".to_string()));
    }
}
