use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{PublicationRecord, PublicationType, SourceKind};

/// Which tier of the title matcher produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    Substring,
    TokenSet,
    FuzzyRatio,
    #[serde(rename = "none")]
    NoMatch,
}

/// Auditable outcome of comparing two titles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDecision {
    pub left: String,
    pub right: String,
    pub matched: bool,
    pub tier: MatchTier,
}

/// How far an extraction got for one side of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// Every section was read.
    Complete,
    /// Some sections failed; the records present are real but the list may be short.
    Partial,
    /// No identifier could be found for the person.
    Unresolved,
    /// Extraction failed outright. The empty record set means "unknown".
    #[default]
    Failed,
}

impl ExtractionStatus {
    /// Whether an empty result from this side can be trusted as "no publications".
    pub fn is_trustworthy(&self) -> bool {
        matches!(self, Self::Complete | Self::Partial)
    }
}

pub type TypeCounts = BTreeMap<PublicationType, usize>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    pub source_a: Option<SourceKind>,
    pub source_b: Option<SourceKind>,
    /// Records present in B with no match in A.
    pub missing_in_a: Vec<PublicationRecord>,
    /// Records present in A with no match in B.
    pub missing_in_b: Vec<PublicationRecord>,
    pub stats: BTreeMap<SourceKind, TypeCounts>,
    #[serde(default)]
    pub status_a: ExtractionStatus,
    #[serde(default)]
    pub status_b: ExtractionStatus,
    #[serde(skip)]
    pub decisions: Vec<MatchDecision>,
}

impl DiscrepancyReport {
    pub fn count(&self, source: SourceKind, kind: PublicationType) -> usize {
        self.stats
            .get(&source)
            .and_then(|counts| counts.get(&kind))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_consistent(&self) -> bool {
        self.missing_in_a.is_empty() && self.missing_in_b.is_empty()
    }
}

/// Missing publications of one type sharing one publisher bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueGroup {
    pub kind: PublicationType,
    pub publisher: String,
    pub publications: Vec<PublicationRecord>,
}

/// A discrepancy report with both missing lists bucketed by publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedReport {
    #[serde(flatten)]
    pub report: DiscrepancyReport,
    pub grouped_missing_in_a: Vec<VenueGroup>,
    pub grouped_missing_in_b: Vec<VenueGroup>,
}
