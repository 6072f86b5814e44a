use chrono::Utc;
use rusqlite::Connection;

use crate::error::{CoreError, Result};

pub trait Migration {
    fn version(&self) -> u32;
    fn description(&self) -> &'static str;
    fn up(&self, conn: &Connection) -> Result<()>;
}

struct V1Initial;

impl Migration for V1Initial {
    fn version(&self) -> u32 {
        1
    }

    fn description(&self) -> &'static str {
        "people, identifiers and reports"
    }

    fn up(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS people (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                institution TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS identifiers (
                person_id   INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
                source      TEXT NOT NULL,
                identifier  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (person_id, source)
            );

            CREATE TABLE IF NOT EXISTS reports (
                person_id   INTEGER PRIMARY KEY REFERENCES people(id) ON DELETE CASCADE,
                report_json TEXT NOT NULL,
                saved_at    TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_identifiers_source ON identifiers(source, identifier);
            ",
        )?;
        Ok(())
    }
}

fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn is_migration_applied(conn: &Connection, version: u32) -> Result<bool> {
    let applied = conn
        .prepare("SELECT 1 FROM schema_migrations WHERE version = ?1")?
        .exists(rusqlite::params![version])?;
    Ok(applied)
}

fn record_migration(conn: &Connection, version: u32) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    ensure_migrations_table(conn)?;

    let migrations: Vec<Box<dyn Migration>> = vec![Box::new(V1Initial)];

    for migration in migrations {
        if is_migration_applied(conn, migration.version())? {
            continue;
        }
        migration.up(conn).map_err(|e| CoreError::Migration {
            version: migration.version(),
            message: format!("{}: {e}", migration.description()),
        })?;
        record_migration(conn, migration.version())?;
        tracing::debug!(version = migration.version(), "applied migration");
    }

    Ok(())
}

pub(crate) fn applied_versions(conn: &Connection) -> Result<Vec<u32>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    Ok(versions)
}
