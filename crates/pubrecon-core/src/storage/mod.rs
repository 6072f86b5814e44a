//! Identity and report persistence.
//!
//! Stores are explicit objects handed to the engine as `Arc<dyn ...>`; nothing here
//! is global.

mod memory;
mod migrations;
mod sqlite;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{NewPerson, PersonId, PersonIdentity, SourceKind};

pub use memory::MemoryStore;
pub use migrations::{Migration, run_migrations};
pub use sqlite::SqliteStore;

/// People and their per-source identifiers.
pub trait IdentityStore: Send + Sync {
    fn add_person(&self, person: NewPerson) -> Result<PersonIdentity>;

    fn get_person(&self, id: PersonId) -> Result<PersonIdentity>;

    fn list_people(&self) -> Result<Vec<PersonIdentity>>;

    fn get_identifiers(&self, id: PersonId) -> Result<BTreeMap<SourceKind, String>>;

    /// Overwrites any previous identifier for `source`.
    fn set_identifier(&self, id: PersonId, source: SourceKind, identifier: &str) -> Result<()>;
}

/// A persisted report together with the time it was written.
#[derive(Debug, Clone)]
pub struct StoredReport {
    pub person_id: PersonId,
    pub report: serde_json::Value,
    pub saved_at: DateTime<Utc>,
}

/// One current report per person.
pub trait ReportStore: Send + Sync {
    /// Insert or replace the person's report.
    fn save_report(&self, id: PersonId, report: &serde_json::Value) -> Result<()>;

    fn load_report(&self, id: PersonId) -> Result<Option<StoredReport>>;
}
