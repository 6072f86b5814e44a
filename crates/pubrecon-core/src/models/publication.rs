use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::models::SourceKind;

/// Year placeholder for records whose source gives no date.
pub const UNKNOWN_YEAR: &str = "unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PublicationType {
    Journal,
    Conference,
    Book,
    #[default]
    Other,
}

impl PublicationType {
    /// Types compared during reconciliation unless configured otherwise.
    pub const COMPARED: [PublicationType; 2] = [Self::Journal, Self::Conference];

    pub const ALL: [PublicationType; 4] = [Self::Journal, Self::Conference, Self::Book, Self::Other];
}

impl std::fmt::Display for PublicationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Journal => "Journal",
            Self::Conference => "Conference",
            Self::Book => "Book",
            Self::Other => "Other",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for PublicationType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "journal" => Ok(Self::Journal),
            "conference" => Ok(Self::Conference),
            "book" => Ok(Self::Book),
            "other" => Ok(Self::Other),
            other => Err(CoreError::ValidationError(format!(
                "unknown publication type: {other}"
            ))),
        }
    }
}

/// One publication as extracted from a single source. Never mutated after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub title: String,
    pub year: String,
    #[serde(default)]
    pub venue: String,
    #[serde(rename = "type", default)]
    pub kind: PublicationType,
    pub source: SourceKind,
}

impl PublicationRecord {
    /// Build a record, rejecting blank titles. A missing year becomes `"unknown"`.
    pub fn new(
        title: impl Into<String>,
        year: Option<String>,
        venue: impl Into<String>,
        kind: PublicationType,
        source: SourceKind,
    ) -> Result<Self> {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(CoreError::ValidationError(
                "publication title must not be empty".to_string(),
            ));
        }
        let year = year
            .map(|y| y.trim().to_string())
            .filter(|y| !y.is_empty())
            .unwrap_or_else(|| UNKNOWN_YEAR.to_string());

        Ok(Self {
            title,
            year,
            venue: venue.into().trim().to_string(),
            kind,
            source,
        })
    }

    pub fn has_known_year(&self) -> bool {
        self.year != UNKNOWN_YEAR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_title_rejected() {
        let err = PublicationRecord::new(
            "   ",
            Some("2020".into()),
            "",
            PublicationType::Journal,
            SourceKind::Registry,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_missing_year_is_unknown() {
        let rec = PublicationRecord::new(
            "Deep Learning for Radar",
            None,
            "IEEE Access",
            PublicationType::Journal,
            SourceKind::CitationIndex,
        )
        .unwrap();
        assert_eq!(rec.year, UNKNOWN_YEAR);
        assert!(!rec.has_known_year());
    }

    #[test]
    fn test_record_serializes_type_field() {
        let rec = PublicationRecord::new(
            "A Survey",
            Some("2021".into()),
            "",
            PublicationType::Conference,
            SourceKind::Xplore,
        )
        .unwrap();
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["type"], "Conference");
        assert_eq!(json["source"], "xplore");
    }

    #[test]
    fn test_type_defaults_to_other() {
        assert_eq!(PublicationType::default(), PublicationType::Other);
        assert_eq!("JOURNAL".parse::<PublicationType>().unwrap(), PublicationType::Journal);
    }
}
