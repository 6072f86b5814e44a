//! Buckets missing publications by publisher for presentation.

use pubrecon_core::config::GroupingConfig;
use pubrecon_core::{
    DiscrepancyReport, GroupedReport, PublicationRecord, PublicationType, VenueGroup,
};
use regex::Regex;

use crate::error::Result;

pub struct ReportGrouper {
    buckets: Vec<(String, Regex)>,
    other_label: String,
}

impl ReportGrouper {
    pub fn new(config: &GroupingConfig) -> Result<Self> {
        let mut buckets = Vec::with_capacity(config.buckets.len());
        for bucket in &config.buckets {
            if let Some(re) = keyword_regex(&bucket.keywords)? {
                buckets.push((bucket.publisher.clone(), re));
            }
        }
        Ok(Self {
            buckets,
            other_label: config.other_label.clone(),
        })
    }

    /// Publisher bucket for a venue; the first matching bucket wins.
    pub fn publisher_for(&self, venue: &str) -> &str {
        self.buckets
            .iter()
            .find(|(_, re)| re.is_match(venue))
            .map(|(publisher, _)| publisher.as_str())
            .unwrap_or(&self.other_label)
    }

    pub fn group(&self, report: DiscrepancyReport) -> GroupedReport {
        GroupedReport {
            grouped_missing_in_a: self.group_records(&report.missing_in_a),
            grouped_missing_in_b: self.group_records(&report.missing_in_b),
            report,
        }
    }

    /// Groups by publication type, then in bucket order with the fallback bucket
    /// last. Empty groups are left out.
    pub fn group_records(&self, records: &[PublicationRecord]) -> Vec<VenueGroup> {
        let mut groups = Vec::new();
        for kind in PublicationType::ALL {
            let mut buckets: Vec<Vec<PublicationRecord>> = vec![Vec::new(); self.buckets.len() + 1];
            for record in records.iter().filter(|r| r.kind == kind) {
                let index = self
                    .buckets
                    .iter()
                    .position(|(_, re)| re.is_match(&record.venue))
                    .unwrap_or(self.buckets.len());
                buckets[index].push(record.clone());
            }

            let labels = self
                .buckets
                .iter()
                .map(|(publisher, _)| publisher.as_str())
                .chain(std::iter::once(self.other_label.as_str()));
            groups.extend(
                labels
                    .zip(buckets)
                    .filter(|(_, publications)| !publications.is_empty())
                    .map(|(label, publications)| VenueGroup {
                        kind,
                        publisher: label.to_string(),
                        publications,
                    }),
            );
        }
        groups
    }
}

/// Case-insensitive alternation, longest keyword first. Word boundaries are only
/// added on alphanumeric edges so keywords like "Taylor & Francis" still match.
fn keyword_regex(keywords: &[String]) -> Result<Option<Regex>> {
    let mut keywords: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return Ok(None);
    }
    keywords.sort_by_key(|k| std::cmp::Reverse(k.chars().count()));

    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| {
            let start = if k.starts_with(char::is_alphanumeric) { r"\b" } else { "" };
            let end = if k.ends_with(char::is_alphanumeric) { r"\b" } else { "" };
            format!("{start}{}{end}", regex::escape(k))
        })
        .collect();
    Ok(Some(Regex::new(&format!("(?i)(?:{})", alternatives.join("|")))?))
}
