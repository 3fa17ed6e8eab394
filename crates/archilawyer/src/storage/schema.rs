//! `SQLite` schema for the answer history.

/// Key/value table holding the schema version.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// One row per answered question.
pub const CREATE_ANSWERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS answers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    question TEXT NOT NULL,
    answer TEXT NOT NULL,
    sources TEXT,
    mode TEXT NOT NULL,
    model TEXT
)
";

/// Newest-first listing and age-based pruning.
pub const CREATE_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_answers_timestamp ON answers(timestamp DESC)
";

/// Statements introduced by each schema version, oldest first.
pub const MIGRATIONS: &[(i32, &[&str])] = &[(1, &[CREATE_ANSWERS_TABLE, CREATE_TIMESTAMP_INDEX])];
