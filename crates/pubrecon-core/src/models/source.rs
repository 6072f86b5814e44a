use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// An external bibliographic system a person's publications are pulled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Institutional academic registry (rendered, tabbed profile pages).
    Registry,
    /// Global citation index with a JSON search API.
    CitationIndex,
    /// Publisher digital library with rendered author profiles.
    Xplore,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [Self::Registry, Self::CitationIndex, Self::Xplore];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::CitationIndex => "citation_index",
            Self::Xplore => "xplore",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "registry" | "yok" => Ok(Self::Registry),
            "citation_index" | "scopus" => Ok(Self::CitationIndex),
            "xplore" | "ieee" => Ok(Self::Xplore),
            other => Err(CoreError::UnknownSource(other.to_string())),
        }
    }
}
