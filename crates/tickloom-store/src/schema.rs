//! Schema and forward-only migrations.
//!
//! A `meta(schema_version)` row gates every migration. Migrations only
//! append — a database written by an older build upgrades in place; a
//! database from a newer build is refused rather than mangled.

use rusqlite::Connection;

use crate::StoreError;

/// The schema version this build writes.
pub const SCHEMA_VERSION: i64 = 1;

/// Migration scripts, index = source version. `MIGRATIONS[0]` brings an
/// empty database to version 1.
const MIGRATIONS: &[&str] = &[
    // v0 → v1: initial schema.
    "
    CREATE TABLE meta (
        schema_version INTEGER NOT NULL
    );
    INSERT INTO meta (schema_version) VALUES (1);

    CREATE TABLE animations (
        animation_id TEXT PRIMARY KEY,
        definition   TEXT NOT NULL,
        active       INTEGER NOT NULL DEFAULT 0,
        start_tick   INTEGER,
        end_tick     INTEGER,
        updated_at   INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE timeline_events (
        event_id     INTEGER PRIMARY KEY AUTOINCREMENT,
        tick         INTEGER NOT NULL,
        kind         TEXT NOT NULL,
        primitive_id TEXT NOT NULL,
        animation_id TEXT,
        payload      TEXT,
        created_at   INTEGER NOT NULL
    );
    CREATE INDEX idx_timeline_events_tick ON timeline_events (tick);
    CREATE INDEX idx_timeline_events_kind ON timeline_events (kind);
    CREATE INDEX idx_timeline_events_primitive ON timeline_events (primitive_id);

    CREATE TABLE coordination_plans (
        plan_id         TEXT PRIMARY KEY,
        definition      TEXT NOT NULL,
        state           TEXT,
        start_tick      INTEGER,
        completion_tick INTEGER,
        active          INTEGER NOT NULL DEFAULT 1,
        updated_at      INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE performance_metrics (
        metric_id  INTEGER PRIMARY KEY AUTOINCREMENT,
        tick       INTEGER NOT NULL,
        kind       TEXT NOT NULL,
        value      REAL NOT NULL,
        payload    TEXT,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX idx_performance_metrics_tick_kind
        ON performance_metrics (tick, kind);

    CREATE TABLE data_history (
        data_id    INTEGER PRIMARY KEY AUTOINCREMENT,
        name       TEXT NOT NULL,
        value      TEXT NOT NULL,
        tick       INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX idx_data_history_name_tick ON data_history (name, tick);

    CREATE TABLE checkpoints (
        checkpoint_id INTEGER PRIMARY KEY AUTOINCREMENT,
        tick          INTEGER NOT NULL,
        snapshot      BLOB NOT NULL,
        created_at    INTEGER NOT NULL
    );
    CREATE INDEX idx_checkpoints_tick ON checkpoints (tick);
    ",
];

/// Reads the current schema version (0 for an empty database).
fn current_version(conn: &Connection) -> Result<i64, StoreError> {
    let has_meta: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'meta')",
        [],
        |row| row.get(0),
    )?;
    if !has_meta {
        return Ok(0);
    }
    let version =
        conn.query_row("SELECT schema_version FROM meta", [], |row| row.get(0))?;
    Ok(version)
}

/// Applies all pending migrations inside transactions.
///
/// # Errors
/// [`StoreError::SchemaTooNew`] if the database is from a newer build;
/// [`StoreError::Db`] if a migration fails (the transaction rolls back).
pub fn migrate(conn: &mut Connection) -> Result<(), StoreError> {
    let mut version = current_version(conn)?;
    if version > SCHEMA_VERSION {
        return Err(StoreError::SchemaTooNew {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }
    while version < SCHEMA_VERSION {
        let tx = conn.transaction()?;
        tx.execute_batch(MIGRATIONS[version as usize])?;
        if version > 0 {
            tx.execute(
                "UPDATE meta SET schema_version = ?1",
                [version + 1],
            )?;
        }
        tx.commit()?;
        tracing::info!(from = version, to = version + 1, "schema migrated");
        version += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_empty_database_to_latest() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
        // Idempotent.
        migrate(&mut conn).unwrap();
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute("UPDATE meta SET schema_version = 99", []).unwrap();
        let err = migrate(&mut conn).unwrap_err();
        assert!(matches!(err, StoreError::SchemaTooNew { found: 99, .. }));
    }

    #[test]
    fn test_all_tables_exist_after_migration() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        for table in [
            "animations",
            "timeline_events",
            "coordination_plans",
            "performance_metrics",
            "data_history",
            "checkpoints",
        ] {
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE name = ?1)",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(exists, "missing table {table}");
        }
    }
}
