//! Answer history storage.
//!
//! Every answered question can be recorded in a local `SQLite` database so
//! it can be listed, searched and pruned later.

pub mod migrations;
pub mod schema;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::HistoryConfig;
use crate::error::{Error, Result};
use crate::qa::QaResponse;

const SELECT_COLUMNS: &str = "SELECT id, timestamp, question, answer, sources, mode, model FROM answers";

/// How an answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// Grounded in retrieved passages.
    #[default]
    Retrieval,
    /// The model alone.
    Direct,
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retrieval => write!(f, "retrieval"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

impl FromStr for AnswerMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "retrieval" => Ok(Self::Retrieval),
            "direct" => Ok(Self::Direct),
            other => Err(Error::internal(format!("unknown answer mode: {other}"))),
        }
    }
}

/// A recorded question and its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Database id, once stored.
    pub id: Option<i64>,

    /// When the answer was produced.
    pub timestamp: DateTime<Utc>,

    /// The question.
    pub question: String,

    /// The answer.
    pub answer: String,

    /// Sources cited in the answer.
    pub sources: Option<String>,

    /// How the answer was produced.
    pub mode: AnswerMode,

    /// Completion model that wrote the answer.
    pub model: Option<String>,
}

impl HistoryEntry {
    /// A new, unsaved entry for a chain response.
    #[must_use]
    pub fn from_response(response: &QaResponse, mode: AnswerMode, model: Option<&str>) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            question: response.question.clone(),
            answer: response.answer.clone(),
            sources: response.sources.clone(),
            mode,
            model: model.map(str::to_string),
        }
    }
}

/// Summary of the history database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    /// Number of stored entries.
    pub total_entries: i64,
    /// Timestamp of the oldest entry.
    pub oldest_entry: Option<DateTime<Utc>>,
    /// Timestamp of the newest entry.
    pub newest_entry: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// `SQLite`-backed answer history.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    conn: Connection,
}

fn timestamp_to_sql(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn timestamp_from_sql(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Escape `LIKE` wildcards so `query` matches literally, with `\` as the escape.
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl HistoryStore {
    /// Open or create the database at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created or
    /// the schema cannot be brought up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        debug!("Opening history database at {}", path.display());
        let mut conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&mut conn)?;

        Ok(Self { path, conn })
    }

    /// Open a throwaway in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let path = PathBuf::from(":memory:");
        let mut conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        migrations::initialize_schema(&mut conn)?;
        Ok(Self { path, conn })
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store an entry, returning its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert(&self, entry: &HistoryEntry) -> Result<i64> {
        self.conn.execute(
            r"
            INSERT INTO answers (timestamp, question, answer, sources, mode, model)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                timestamp_to_sql(&entry.timestamp),
                entry.question,
                entry.answer,
                entry.sources,
                entry.mode.to_string(),
                entry.model,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Recorded answer {id}");
        Ok(id)
    }

    /// Fetch one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: i64) -> Result<Option<HistoryEntry>> {
        Ok(self
            .conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                [id],
                Self::row_to_entry,
            )
            .optional()?)
    }

    /// The newest `limit` entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} ORDER BY timestamp DESC, id DESC LIMIT ?1"
        ))?;
        let entries = stmt
            .query_map([sql_limit(limit)], Self::row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Entries whose question or answer contains `query`, newest first.
    ///
    /// Matching is case-insensitive for ASCII letters.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let pattern = format!("%{}%", escape_like(query));
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE question LIKE ?1 ESCAPE '\\' OR answer LIKE ?1 ESCAPE '\\' \
             ORDER BY timestamp DESC, id DESC LIMIT ?2"
        ))?;
        let entries = stmt
            .query_map(params![pattern, sql_limit(limit)], Self::row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM answers", [], |row| row.get(0))?)
    }

    /// Delete one entry, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM answers WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Delete every entry, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&self) -> Result<usize> {
        let affected = self.conn.execute("DELETE FROM answers", [])?;
        info!("Cleared {affected} history entries");
        Ok(affected)
    }

    /// Delete entries older than `max_age`.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn prune_older_than(&self, max_age: std::time::Duration) -> Result<usize> {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(0);
        };

        let affected = self.conn.execute(
            "DELETE FROM answers WHERE timestamp < ?1",
            [timestamp_to_sql(&cutoff)],
        )?;
        if affected > 0 {
            info!("Pruned {affected} history entries older than {cutoff}");
        }
        Ok(affected)
    }

    /// Keep only the newest `keep_count` entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn prune_keep_recent(&self, keep_count: usize) -> Result<usize> {
        let affected = self.conn.execute(
            r"
            DELETE FROM answers WHERE id NOT IN (
                SELECT id FROM answers ORDER BY timestamp DESC, id DESC LIMIT ?1
            )
            ",
            [sql_limit(keep_count)],
        )?;
        if affected > 0 {
            info!("Pruned {affected} history entries to keep {keep_count}");
        }
        Ok(affected)
    }

    /// Apply the configured age and count limits; 0 disables a limit.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete fails.
    pub fn apply_retention(&self, config: &HistoryConfig) -> Result<usize> {
        let mut pruned = 0;
        if config.max_age_days > 0 {
            pruned += self.prune_older_than(std::time::Duration::from_secs(
                u64::from(config.max_age_days) * 24 * 60 * 60,
            ))?;
        }
        if config.max_entries > 0 {
            pruned += self.prune_keep_recent(config.max_entries)?;
        }
        Ok(pruned)
    }

    /// Database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn stats(&self) -> Result<HistoryStats> {
        let (oldest, newest): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM answers",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let db_size_bytes = if self.path == Path::new(":memory:") {
            0
        } else {
            std::fs::metadata(&self.path).map_or(0, |m| m.len())
        };

        Ok(HistoryStats {
            total_entries: self.count()?,
            oldest_entry: oldest.as_deref().and_then(timestamp_from_sql),
            newest_entry: newest.as_deref().and_then(timestamp_from_sql),
            db_size_bytes,
        })
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<HistoryEntry> {
        let timestamp: String = row.get(1)?;
        let mode: String = row.get(5)?;

        Ok(HistoryEntry {
            id: Some(row.get(0)?),
            timestamp: timestamp_from_sql(&timestamp).unwrap_or_else(|| {
                warn!("Unparseable timestamp in history: {timestamp}");
                DateTime::<Utc>::UNIX_EPOCH
            }),
            question: row.get(2)?,
            answer: row.get(3)?,
            sources: row.get(4)?,
            mode: mode.parse().unwrap_or_else(|_| {
                warn!("Unknown answer mode in history: {mode}");
                AnswerMode::default()
            }),
            model: row.get(6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn store() -> HistoryStore {
        HistoryStore::open_in_memory().expect("failed to create test store")
    }

    fn entry(question: &str, answer: &str) -> HistoryEntry {
        HistoryEntry {
            id: None,
            timestamp: Utc::now(),
            question: question.to_string(),
            answer: answer.to_string(),
            sources: Some("D20191065.pdf".to_string()),
            mode: AnswerMode::Retrieval,
            model: Some("gpt-3.5-turbo-instruct".to_string()),
        }
    }

    fn aged(question: &str, days: i64) -> HistoryEntry {
        let mut e = entry(question, "answer");
        e.timestamp = Utc::now() - Duration::days(days);
        e
    }

    #[test]
    fn test_insert_and_get() {
        let store = store();
        let original = entry("Minimalna wysokość pokoju?", "2,5 m");
        let id = store.insert(&original).unwrap();

        let stored = store.get(id).unwrap().unwrap();
        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.question, original.question);
        assert_eq!(stored.answer, "2,5 m");
        assert_eq!(stored.sources.as_deref(), Some("D20191065.pdf"));
        assert_eq!(stored.mode, AnswerMode::Retrieval);
        assert_eq!(stored.timestamp, original.timestamp);
    }

    #[test]
    fn test_get_missing() {
        assert!(store().get(42).unwrap().is_none());
    }

    #[test]
    fn test_get_recent_newest_first() {
        let store = store();
        store.insert(&aged("old", 3)).unwrap();
        store.insert(&aged("new", 1)).unwrap();
        store.insert(&aged("middle", 2)).unwrap();

        let recent = store.get_recent(2).unwrap();
        let questions: Vec<_> = recent.iter().map(|e| e.question.as_str()).collect();
        assert_eq!(questions, vec!["new", "middle"]);
        assert!(store.get_recent(0).unwrap().is_empty());
    }

    #[test]
    fn test_search_question_and_answer() {
        let store = store();
        store.insert(&entry("Corridor width?", "At least 1.2 m")).unwrap();
        store.insert(&entry("Stair height?", "Max 17.5 cm per step")).unwrap();

        assert_eq!(store.search("corridor", 10).unwrap().len(), 1);
        assert_eq!(store.search("17.5", 10).unwrap().len(), 1);
        assert_eq!(store.search("?", 10).unwrap().len(), 2);
        assert!(store.search("balcony", 10).unwrap().is_empty());
    }

    #[test]
    fn test_search_matches_wildcards_literally() {
        let store = store();
        store.insert(&entry("Glazing share?", "Up to 50% of the facade")).unwrap();
        store.insert(&entry("Roof pitch?", "Between 30 and 45 degrees")).unwrap();
        store.insert(&entry("Column name?", "window_area")).unwrap();
        store.insert(&entry("Path?", r"C:\plans")).unwrap();

        assert_eq!(store.search("%", 10).unwrap().len(), 1);
        assert_eq!(store.search("50%", 10).unwrap().len(), 1);
        assert_eq!(store.search("_", 10).unwrap().len(), 1);
        assert_eq!(store.search(r"\", 10).unwrap().len(), 1);
        assert!(store.search("5_%", 10).unwrap().is_empty());
    }

    #[test]
    fn test_delete_and_clear() {
        let store = store();
        let id = store.insert(&entry("a", "b")).unwrap();
        store.insert(&entry("c", "d")).unwrap();

        assert!(store.delete(id).unwrap());
        assert!(!store.delete(id).unwrap());
        assert_eq!(store.count().unwrap(), 1);

        assert_eq!(store.clear().unwrap(), 1);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_prune_older_than() {
        let store = store();
        store.insert(&aged("ancient", 40)).unwrap();
        store.insert(&aged("recent", 1)).unwrap();

        let pruned = store
            .prune_older_than(std::time::Duration::from_secs(30 * 24 * 60 * 60))
            .unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(store.get_recent(10).unwrap()[0].question, "recent");
    }

    #[test]
    fn test_prune_keep_recent() {
        let store = store();
        for days in 1..=5 {
            store.insert(&aged(&format!("q{days}"), days)).unwrap();
        }

        assert_eq!(store.prune_keep_recent(2).unwrap(), 3);
        let questions: Vec<_> = store
            .get_recent(10)
            .unwrap()
            .into_iter()
            .map(|e| e.question)
            .collect();
        assert_eq!(questions, vec!["q1", "q2"]);
        assert_eq!(store.prune_keep_recent(10).unwrap(), 0);
    }

    #[test]
    fn test_apply_retention() {
        let store = store();
        store.insert(&aged("old", 10)).unwrap();
        for i in 0..3 {
            store.insert(&entry(&format!("q{i}"), "a")).unwrap();
        }

        let config = HistoryConfig {
            max_entries: 2,
            max_age_days: 5,
            ..HistoryConfig::default()
        };
        assert_eq!(store.apply_retention(&config).unwrap(), 2);
        assert_eq!(store.count().unwrap(), 2);

        let unlimited = HistoryConfig {
            max_entries: 0,
            max_age_days: 0,
            ..HistoryConfig::default()
        };
        assert_eq!(store.apply_retention(&unlimited).unwrap(), 0);
    }

    #[test]
    fn test_stats() {
        let store = store();
        let empty = store.stats().unwrap();
        assert_eq!(empty.total_entries, 0);
        assert!(empty.oldest_entry.is_none());

        let old = aged("old", 2);
        let new = aged("new", 1);
        store.insert(&old).unwrap();
        store.insert(&new).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.oldest_entry, Some(old.timestamp));
        assert_eq!(stats.newest_entry, Some(new.timestamp));
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_open_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");

        let store = HistoryStore::open(&path).unwrap();
        store.insert(&entry("q", "a")).unwrap();
        assert_eq!(store.path(), path);
        assert!(path.exists());

        drop(store);
        let reopened = HistoryStore::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }

    #[test]
    fn test_from_response() {
        let response = QaResponse {
            question: "q".into(),
            answer: "a".into(),
            sources: None,
            passages: Vec::new(),
        };
        let entry = HistoryEntry::from_response(&response, AnswerMode::Direct, Some("m"));
        assert_eq!(entry.mode, AnswerMode::Direct);
        assert_eq!(entry.model.as_deref(), Some("m"));
        assert!(entry.id.is_none());
    }

    #[test]
    fn test_answer_mode_round_trip() {
        for mode in [AnswerMode::Retrieval, AnswerMode::Direct] {
            assert_eq!(mode.to_string().parse::<AnswerMode>().unwrap(), mode);
        }
        assert!("other".parse::<AnswerMode>().is_err());
    }
}
