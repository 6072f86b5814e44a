//! Per-person analysis: resolution, extraction, reconciliation, grouping and
//! persistence, plus the sequential batch scan.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use pubrecon_core::{
    AppConfig, ExtractionStatus, GroupedReport, IdentityStore, PersonId, ReportStore, SourceKind,
};
use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::grouper::ReportGrouper;
use crate::matcher::{THESIS_THRESHOLD, TitleMatcher};
use crate::reconcile::{Reconciler, cross_check_theses};
use crate::resolver::{IdentifierResolver, PersonQuery, ResolutionStep};
use crate::sources::{Extraction, PublicationSource, SourceContext, extract_publications};

#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeOptions {
    /// Persist the report even when a side failed and would replace a stored one.
    pub confirm_overwrite: bool,
}

/// One side of an analysis, without the records themselves.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    pub source: SourceKind,
    pub identifier: Option<String>,
    pub identifier_changed: bool,
    pub status: ExtractionStatus,
    pub count: usize,
    pub trace: Vec<ResolutionStep>,
}

impl From<&Extraction> for ExtractionSummary {
    fn from(e: &Extraction) -> Self {
        Self {
            source: e.source,
            identifier: e.identifier.clone(),
            identifier_changed: e.identifier_changed,
            status: e.status,
            count: e.count(),
            trace: e.trace.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub person_id: PersonId,
    pub name: String,
    pub saved: bool,
    pub extractions: Vec<ExtractionSummary>,
    pub report: GroupedReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanFailure {
    pub person_id: PersonId,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub analyzed: usize,
    pub saved: usize,
    /// Analyses whose report was held back to protect a stored one.
    pub held_back: usize,
    pub failures: Vec<ScanFailure>,
}

/// Supervised theses checked against one source's publications.
#[derive(Debug, Clone, Serialize)]
pub struct ThesisCheck {
    pub person_id: PersonId,
    pub source: SourceKind,
    pub status: ExtractionStatus,
    /// False when the source yielded nothing usable; `unmatched` is then empty.
    pub checked: bool,
    pub unmatched: Vec<String>,
}

pub struct Analyzer {
    identities: Arc<dyn IdentityStore>,
    reports: Arc<dyn ReportStore>,
    sources: BTreeMap<SourceKind, Arc<dyn PublicationSource>>,
    resolver: IdentifierResolver,
    reconciler: Reconciler,
    thesis_matcher: TitleMatcher,
    grouper: ReportGrouper,
    source_a: SourceKind,
    source_b: SourceKind,
    honorifics: Vec<String>,
    affiliation_keywords: Vec<String>,
    inter_person_delay: Duration,
}

impl Analyzer {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        reports: Arc<dyn ReportStore>,
        grouper: ReportGrouper,
    ) -> Self {
        Self {
            resolver: IdentifierResolver::new(Duration::from_secs(30)).with_store(identities.clone()),
            identities,
            reports,
            sources: BTreeMap::new(),
            reconciler: Reconciler::default(),
            thesis_matcher: TitleMatcher::new(THESIS_THRESHOLD),
            grouper,
            source_a: SourceKind::Registry,
            source_b: SourceKind::CitationIndex,
            honorifics: Vec::new(),
            affiliation_keywords: Vec::new(),
            inter_person_delay: Duration::ZERO,
        }
    }

    /// Wires every enabled side from `config`: one shared render pool, one web
    /// search client and an adapter per side.
    pub fn from_config(
        config: &AppConfig,
        identities: Arc<dyn IdentityStore>,
        reports: Arc<dyn ReportStore>,
    ) -> Result<Self> {
        let context = SourceContext::from_config(config)?;
        let mut analyzer = Self::new(identities, reports, ReportGrouper::new(&config.grouping)?)
            .with_sides(config.scan.source_a, config.scan.source_b)
            .with_reconciler(Reconciler::new(
                TitleMatcher::new(config.matcher.threshold),
                config.scan.compared_types.clone(),
            ))
            .with_thesis_matcher(TitleMatcher::new(config.matcher.thesis_threshold))
            .with_strategy_timeout(Duration::from_secs(config.resolver.strategy_timeout_secs))
            .with_honorifics(config.resolver.honorifics.clone())
            .with_affiliation_keywords(config.resolver.affiliation_keywords.clone())
            .with_delay(Duration::from_millis(config.scan.inter_person_delay_ms));

        for kind in [config.scan.source_a, config.scan.source_b] {
            if !config.is_enabled(kind) {
                tracing::warn!(source = %kind, "source disabled in config");
                continue;
            }
            analyzer = analyzer.with_source(Arc::new(context.adapter(kind, config)?));
        }
        Ok(analyzer)
    }

    pub fn with_source(mut self, source: Arc<dyn PublicationSource>) -> Self {
        self.sources.insert(source.kind(), source);
        self
    }

    pub fn with_sides(mut self, source_a: SourceKind, source_b: SourceKind) -> Self {
        self.source_a = source_a;
        self.source_b = source_b;
        self
    }

    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn with_thesis_matcher(mut self, matcher: TitleMatcher) -> Self {
        self.thesis_matcher = matcher;
        self
    }

    pub fn with_strategy_timeout(mut self, timeout: Duration) -> Self {
        self.resolver = IdentifierResolver::new(timeout).with_store(self.identities.clone());
        self
    }

    pub fn with_honorifics(mut self, honorifics: Vec<String>) -> Self {
        self.honorifics = honorifics;
        self
    }

    pub fn with_affiliation_keywords(mut self, keywords: Vec<String>) -> Self {
        self.affiliation_keywords = keywords;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.inter_person_delay = delay;
        self
    }

    fn source(&self, kind: SourceKind) -> Result<&dyn PublicationSource> {
        self.sources
            .get(&kind)
            .map(|s| s.as_ref())
            .ok_or(EngineError::SourceUnavailable(kind))
    }

    /// Runs the whole pipeline for one person. Resolution and extraction problems
    /// end up in the sides' statuses; only store failures, an unknown person or a
    /// missing source are errors.
    pub async fn analyze_person(
        &self,
        person_id: PersonId,
        options: AnalyzeOptions,
    ) -> Result<AnalysisOutcome> {
        let person = self.identities.get_person(person_id)?;
        let source_a = self.source(self.source_a)?;
        let source_b = self.source(self.source_b)?;
        let query =
            PersonQuery::for_person(&person, &self.honorifics, &self.affiliation_keywords);

        tracing::info!(person = person.id, name = %person.name, "analysis started");
        let side_a = extract_publications(source_a, &self.resolver, &person, &query).await?;
        let side_b = extract_publications(source_b, &self.resolver, &person, &query).await?;

        let mut report =
            self.reconciler
                .reconcile(&side_a.records, &side_b.records, side_a.source, side_b.source);
        report.status_a = side_a.status;
        report.status_b = side_b.status;
        let grouped = self.grouper.group(report);

        let complete = is_reliable(&side_a) && is_reliable(&side_b);
        let saved = if complete || options.confirm_overwrite {
            true
        } else {
            self.reports.load_report(person.id)?.is_none()
        };

        if saved {
            self.reports
                .save_report(person.id, &serde_json::to_value(&grouped)?)?;
            tracing::info!(
                person = person.id,
                missing_in_a = grouped.report.missing_in_a.len(),
                missing_in_b = grouped.report.missing_in_b.len(),
                "report saved"
            );
        } else {
            tracing::warn!(
                person = person.id,
                status_a = ?side_a.status,
                status_b = ?side_b.status,
                count_a = side_a.count(),
                count_b = side_b.count(),
                "incomplete run, keeping the stored report"
            );
        }

        Ok(AnalysisOutcome {
            person_id: person.id,
            name: person.name,
            saved,
            extractions: vec![(&side_a).into(), (&side_b).into()],
            report: grouped,
        })
    }

    /// Lists supervised-thesis titles that match none of the person's publications
    /// in source B, at the thesis threshold. Nothing is persisted.
    pub async fn unverified_theses(
        &self,
        person_id: PersonId,
        theses: &[String],
    ) -> Result<ThesisCheck> {
        let person = self.identities.get_person(person_id)?;
        let source = self.source(self.source_b)?;
        let query =
            PersonQuery::for_person(&person, &self.honorifics, &self.affiliation_keywords);
        let side = extract_publications(source, &self.resolver, &person, &query).await?;

        let checked = is_reliable(&side);
        let unmatched = if checked {
            cross_check_theses(theses, &side.records, &self.thesis_matcher)
        } else {
            tracing::warn!(person = person.id, source = %side.source, status = ?side.status, "no publications to check theses against");
            Vec::new()
        };
        Ok(ThesisCheck {
            person_id: person.id,
            source: side.source,
            status: side.status,
            checked,
            unmatched,
        })
    }

    /// Analyzes everyone in the identity store, one at a time, with the configured
    /// delay between people. Per-person failures are collected, not returned.
    pub async fn scan_all(&self, options: AnalyzeOptions) -> Result<ScanSummary> {
        let people = self.identities.list_people()?;
        let mut summary = ScanSummary::default();

        for (index, person) in people.iter().enumerate() {
            if index > 0 && !self.inter_person_delay.is_zero() {
                tokio::time::sleep(self.inter_person_delay).await;
            }
            match self.analyze_person(person.id, options).await {
                Ok(outcome) => {
                    summary.analyzed += 1;
                    if outcome.saved {
                        summary.saved += 1;
                    } else {
                        summary.held_back += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(person = person.id, error = %e, "analysis failed");
                    summary.failures.push(ScanFailure {
                        person_id: person.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            analyzed = summary.analyzed,
            saved = summary.saved,
            failed = summary.failures.len(),
            "scan finished"
        );
        Ok(summary)
    }
}

/// A side may replace stored data only if it finished and found something; an
/// empty listing is indistinguishable from a page that failed to load.
fn is_reliable(side: &Extraction) -> bool {
    side.status.is_trustworthy() && !side.records.is_empty()
}
