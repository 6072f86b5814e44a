use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SourceKind;

pub type PersonId = i64;

/// A researcher tracked across sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonIdentity {
    pub id: PersonId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    /// Resolved identifier per source. A source with no entry is unresolved.
    #[serde(default)]
    pub identifiers: BTreeMap<SourceKind, String>,
    pub created_at: DateTime<Utc>,
}

impl PersonIdentity {
    pub fn identifier(&self, source: SourceKind) -> Option<&str> {
        self.identifiers.get(&source).map(String::as_str)
    }
}

/// Fields supplied when registering a new person.
#[derive(Debug, Clone, Default)]
pub struct NewPerson {
    pub name: String,
    pub institution: Option<String>,
    pub identifiers: BTreeMap<SourceKind, String>,
}

impl NewPerson {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_institution(mut self, institution: impl Into<String>) -> Self {
        self.institution = Some(institution.into());
        self
    }

    pub fn with_identifier(mut self, source: SourceKind, id: impl Into<String>) -> Self {
        self.identifiers.insert(source, id.into());
        self
    }
}
