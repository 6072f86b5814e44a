//! Cross-source reconciliation of publication lists.

use pubrecon_core::{
    DiscrepancyReport, MatchDecision, MatchTier, PublicationRecord, PublicationType, SourceKind,
    TypeCounts,
};

use crate::matcher::TitleMatcher;

#[derive(Debug, Clone)]
pub struct Reconciler {
    matcher: TitleMatcher,
    compared_types: Vec<PublicationType>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(TitleMatcher::default(), PublicationType::COMPARED.to_vec())
    }
}

impl Reconciler {
    pub fn new(matcher: TitleMatcher, compared_types: Vec<PublicationType>) -> Self {
        Self {
            matcher,
            compared_types,
        }
    }

    pub fn matcher(&self) -> &TitleMatcher {
        &self.matcher
    }

    /// Finds the records of each side that have no counterpart on the other side.
    ///
    /// Only records of a compared type take part; a record is tested against
    /// every record of the same type on the other side and the first match wins.
    /// Missing lists keep extraction order. Every type, compared or not, is
    /// counted in `stats`.
    pub fn reconcile(
        &self,
        records_a: &[PublicationRecord],
        records_b: &[PublicationRecord],
        source_a: SourceKind,
        source_b: SourceKind,
    ) -> DiscrepancyReport {
        let mut decisions = Vec::new();
        let missing_in_a = self.unmatched(records_b, records_a, &mut decisions);
        let missing_in_b = self.unmatched(records_a, records_b, &mut decisions);

        let mut report = DiscrepancyReport {
            source_a: Some(source_a),
            source_b: Some(source_b),
            missing_in_a,
            missing_in_b,
            decisions,
            ..Default::default()
        };
        report.stats.insert(source_a, type_counts(records_a));
        report.stats.insert(source_b, type_counts(records_b));

        tracing::debug!(
            missing_in_a = report.missing_in_a.len(),
            missing_in_b = report.missing_in_b.len(),
            "reconciled"
        );
        report
    }

    fn unmatched(
        &self,
        records: &[PublicationRecord],
        against: &[PublicationRecord],
        decisions: &mut Vec<MatchDecision>,
    ) -> Vec<PublicationRecord> {
        let mut missing = Vec::new();
        for record in records.iter().filter(|r| self.compared_types.contains(&r.kind)) {
            let hit = against
                .iter()
                .filter(|other| other.kind == record.kind)
                .map(|other| self.matcher.decide(&record.title, &other.title))
                .find(|d| d.matched);
            match hit {
                Some(decision) => decisions.push(decision),
                None => {
                    decisions.push(MatchDecision {
                        left: record.title.clone(),
                        right: String::new(),
                        matched: false,
                        tier: MatchTier::NoMatch,
                    });
                    missing.push(record.clone());
                }
            }
        }
        missing
    }
}

fn type_counts(records: &[PublicationRecord]) -> TypeCounts {
    let mut counts = TypeCounts::new();
    for record in records {
        *counts.entry(record.kind).or_default() += 1;
    }
    counts
}

/// Thesis titles with no matching publication, checked at `matcher`'s threshold
/// (normally the lower thesis threshold).
pub fn cross_check_theses(
    theses: &[String],
    publications: &[PublicationRecord],
    matcher: &TitleMatcher,
) -> Vec<String> {
    theses
        .iter()
        .filter(|thesis| !publications.iter().any(|p| matcher.is_match(thesis, &p.title)))
        .cloned()
        .collect()
}
