use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::migrations::run_migrations;
use super::{IdentityStore, ReportStore, StoredReport};
use crate::error::{CoreError, Result};
use crate::models::{NewPerson, PersonId, PersonIdentity, SourceKind};

/// SQLite-backed identity and report store.
pub struct SqliteStore {
    path: Option<String>,
    connection: Mutex<Connection>,
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::StorageUnavailable(format!("bad timestamp '{raw}': {e}")))
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_string_lossy().to_string()))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<String>) -> Result<Self> {
        apply_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            path,
            connection: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| CoreError::StorageUnavailable("connection lock poisoned".to_string()))
    }

    fn load_identifiers(conn: &Connection, id: PersonId) -> Result<BTreeMap<SourceKind, String>> {
        let mut stmt =
            conn.prepare("SELECT source, identifier FROM identifiers WHERE person_id = ?1")?;
        let rows = stmt.query_map(params![id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut identifiers = BTreeMap::new();
        for row in rows {
            let (source, identifier) = row?;
            identifiers.insert(source.parse::<SourceKind>()?, identifier);
        }
        Ok(identifiers)
    }

    fn load_person(conn: &Connection, id: PersonId) -> Result<PersonIdentity> {
        let row = conn
            .query_row(
                "SELECT id, name, institution, created_at FROM people WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let (id, name, institution, created_at) = row.ok_or(CoreError::PersonNotFound(id))?;
        Ok(PersonIdentity {
            id,
            name,
            institution,
            identifiers: Self::load_identifiers(conn, id)?,
            created_at: parse_timestamp(&created_at)?,
        })
    }

    fn person_exists(conn: &Connection, id: PersonId) -> Result<bool> {
        Ok(conn
            .prepare("SELECT 1 FROM people WHERE id = ?1")?
            .exists(params![id])?)
    }

    #[cfg(test)]
    fn migration_versions(&self) -> Result<Vec<u32>> {
        super::migrations::applied_versions(&*self.conn()?)
    }
}

impl IdentityStore for SqliteStore {
    fn add_person(&self, person: NewPerson) -> Result<PersonIdentity> {
        let name = person.name.trim();
        if name.is_empty() {
            return Err(CoreError::ValidationError("person name must not be empty".into()));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO people (name, institution, created_at) VALUES (?1, ?2, ?3)",
            params![name, person.institution, now],
        )?;
        let id = tx.last_insert_rowid();
        for (source, identifier) in &person.identifiers {
            tx.execute(
                "INSERT INTO identifiers (person_id, source, identifier, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, source.as_str(), identifier, now],
            )?;
        }
        tx.commit()?;

        Self::load_person(&conn, id)
    }

    fn get_person(&self, id: PersonId) -> Result<PersonIdentity> {
        Self::load_person(&*self.conn()?, id)
    }

    fn list_people(&self) -> Result<Vec<PersonIdentity>> {
        let conn = self.conn()?;
        let ids: Vec<i64> = {
            let mut stmt = conn.prepare("SELECT id FROM people ORDER BY id")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<std::result::Result<_, _>>()?
        };
        ids.into_iter()
            .map(|id| Self::load_person(&conn, id))
            .collect()
    }

    fn get_identifiers(&self, id: PersonId) -> Result<BTreeMap<SourceKind, String>> {
        let conn = self.conn()?;
        if !Self::person_exists(&conn, id)? {
            return Err(CoreError::PersonNotFound(id));
        }
        Self::load_identifiers(&conn, id)
    }

    fn set_identifier(&self, id: PersonId, source: SourceKind, identifier: &str) -> Result<()> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(CoreError::ValidationError("identifier must not be empty".into()));
        }
        let conn = self.conn()?;
        if !Self::person_exists(&conn, id)? {
            return Err(CoreError::PersonNotFound(id));
        }
        conn.execute(
            "INSERT INTO identifiers (person_id, source, identifier, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(person_id, source)
             DO UPDATE SET identifier = excluded.identifier, updated_at = excluded.updated_at",
            params![id, source.as_str(), identifier, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

impl ReportStore for SqliteStore {
    fn save_report(&self, id: PersonId, report: &serde_json::Value) -> Result<()> {
        let conn = self.conn()?;
        if !Self::person_exists(&conn, id)? {
            return Err(CoreError::PersonNotFound(id));
        }
        conn.execute(
            "INSERT INTO reports (person_id, report_json, saved_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(person_id)
             DO UPDATE SET report_json = excluded.report_json, saved_at = excluded.saved_at",
            params![id, serde_json::to_string(report)?, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn load_report(&self, id: PersonId) -> Result<Option<StoredReport>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT report_json, saved_at FROM reports WHERE person_id = ?1",
                params![id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match row {
            Some((json, saved_at)) => Ok(Some(StoredReport {
                person_id: id,
                report: serde_json::from_str(&json)?,
                saved_at: parse_timestamp(&saved_at)?,
            })),
            None => Ok(None),
        }
    }
}
