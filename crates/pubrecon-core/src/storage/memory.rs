use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::{IdentityStore, ReportStore, StoredReport};
use crate::error::{CoreError, Result};
use crate::models::{NewPerson, PersonId, PersonIdentity, SourceKind};

#[derive(Default)]
struct Inner {
    next_id: PersonId,
    people: BTreeMap<PersonId, PersonIdentity>,
    reports: HashMap<PersonId, StoredReport>,
    identifier_writes: usize,
}

/// In-process store, used by tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| CoreError::StorageUnavailable("memory store lock poisoned".to_string()))
    }

    /// Number of successful `set_identifier` calls so far.
    pub fn identifier_writes(&self) -> usize {
        self.lock().map(|inner| inner.identifier_writes).unwrap_or(0)
    }
}

impl IdentityStore for MemoryStore {
    fn add_person(&self, person: NewPerson) -> Result<PersonIdentity> {
        let name = person.name.trim().to_string();
        if name.is_empty() {
            return Err(CoreError::ValidationError("person name must not be empty".into()));
        }
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let identity = PersonIdentity {
            id: inner.next_id,
            name,
            institution: person.institution,
            identifiers: person.identifiers,
            created_at: Utc::now(),
        };
        inner.people.insert(identity.id, identity.clone());
        Ok(identity)
    }

    fn get_person(&self, id: PersonId) -> Result<PersonIdentity> {
        self.lock()?
            .people
            .get(&id)
            .cloned()
            .ok_or(CoreError::PersonNotFound(id))
    }

    fn list_people(&self) -> Result<Vec<PersonIdentity>> {
        Ok(self.lock()?.people.values().cloned().collect())
    }

    fn get_identifiers(&self, id: PersonId) -> Result<BTreeMap<SourceKind, String>> {
        Ok(self.get_person(id)?.identifiers)
    }

    fn set_identifier(&self, id: PersonId, source: SourceKind, identifier: &str) -> Result<()> {
        let mut inner = self.lock()?;
        let person = inner
            .people
            .get_mut(&id)
            .ok_or(CoreError::PersonNotFound(id))?;
        person.identifiers.insert(source, identifier.trim().to_string());
        inner.identifier_writes += 1;
        Ok(())
    }
}

impl ReportStore for MemoryStore {
    fn save_report(&self, id: PersonId, report: &serde_json::Value) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.people.contains_key(&id) {
            return Err(CoreError::PersonNotFound(id));
        }
        inner.reports.insert(
            id,
            StoredReport {
                person_id: id,
                report: report.clone(),
                saved_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn load_report(&self, id: PersonId) -> Result<Option<StoredReport>> {
        Ok(self.lock()?.reports.get(&id).cloned())
    }
}
