//! Schema versioning for the history database.
//!
//! The version lives in the `metadata` table. Each pending entry of
//! [`MIGRATIONS`] runs in its own transaction together with the version bump.

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use super::schema::{CREATE_METADATA_TABLE, MIGRATIONS};
use crate::error::{Error, Result};

/// Key used to store the schema version in the metadata table.
const VERSION_KEY: &str = "schema_version";

/// The newest schema version this build understands.
#[must_use]
pub fn current_version() -> i32 {
    MIGRATIONS.last().map_or(0, |(version, _)| *version)
}

/// Create or upgrade the schema.
///
/// # Errors
///
/// Returns an error if a statement fails or the database was written by a
/// newer build.
pub fn initialize_schema(conn: &mut Connection) -> Result<()> {
    conn.execute(CREATE_METADATA_TABLE, [])?;

    let version = schema_version(conn)?;
    let current = current_version();
    if version > current {
        return Err(Error::DatabaseMigration {
            message: format!("database schema version {version} is newer than supported {current}"),
        });
    }

    for (target, statements) in MIGRATIONS.iter().filter(|(v, _)| *v > version) {
        debug!("Migrating history database to version {target}");
        let tx = conn.transaction()?;
        for statement in *statements {
            tx.execute(statement, [])?;
        }
        set_schema_version(&tx, *target)?;
        tx.commit()?;
    }

    if version < current {
        info!("History database schema at version {current}");
    }
    Ok(())
}

/// The stored schema version; 0 for a fresh database.
///
/// # Errors
///
/// Returns an error if the stored value is not a number.
pub fn schema_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    value.map_or(Ok(0), |value| {
        value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        })
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn test_fresh_database_is_migrated() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialize_schema(&mut conn).unwrap();

        assert!(table_exists(&conn, "answers"));
        assert!(table_exists(&conn, "metadata"));
        assert_eq!(schema_version(&conn).unwrap(), current_version());
    }

    #[test]
    fn test_initialize_twice() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialize_schema(&mut conn).unwrap();
        initialize_schema(&mut conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), current_version());
    }

    #[test]
    fn test_newer_database_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute(CREATE_METADATA_TABLE, []).unwrap();
        set_schema_version(&conn, current_version() + 1).unwrap();

        let err = initialize_schema(&mut conn).unwrap_err();
        assert!(err.to_string().contains("newer than supported"));
    }

    #[test]
    fn test_invalid_version_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(CREATE_METADATA_TABLE, []).unwrap();
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, 'two')",
            [VERSION_KEY],
        )
        .unwrap();

        assert!(schema_version(&conn).is_err());
    }

    #[test]
    fn test_timestamp_index_created() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialize_schema(&mut conn).unwrap();

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND tbl_name='answers'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(std::result::Result::ok)
            .collect();
        assert!(indexes.iter().any(|n| n.contains("timestamp")));
    }
}
