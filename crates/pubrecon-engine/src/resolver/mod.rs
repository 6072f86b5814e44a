//! Identifier resolution with an ordered fallback chain.

pub mod strategies;

use std::sync::Arc;
use std::time::Duration;

use pubrecon_core::{IdentityStore, PersonIdentity};
use serde::Serialize;
use tokio::time::timeout;

use crate::error::Result;
use crate::sources::{PageExtraction, PublicationSource};
use crate::text::strip_honorifics;

pub use strategies::{
    AffiliationQuery, AuthorCandidate, AuthorSearchApi, InternalSearch, ProfilePatterns, SiteSearch,
    select_candidate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Search API keyed by first and last name, filtered by affiliation.
    AuthorSearch,
    /// Web search restricted to the source's domain.
    SiteSearch,
    /// The source's own search UI.
    InternalSearch,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AuthorSearch => "author_search",
            Self::SiteSearch => "site_search",
            Self::InternalSearch => "internal_search",
        };
        f.write_str(s)
    }
}

/// What the resolver knows about the person being looked up.
#[derive(Debug, Clone, Default)]
pub struct PersonQuery {
    /// Display name with honorifics removed.
    pub name: String,
    pub raw_name: String,
    pub institution: Option<String>,
    pub affiliation_keywords: Vec<String>,
}

impl PersonQuery {
    pub fn new(raw_name: &str, honorifics: &[String]) -> Self {
        Self {
            name: strip_honorifics(raw_name, honorifics),
            raw_name: raw_name.trim().to_string(),
            ..Default::default()
        }
    }

    pub fn for_person(person: &PersonIdentity, honorifics: &[String], keywords: &[String]) -> Self {
        Self::new(&person.name, honorifics)
            .with_institution(person.institution.clone())
            .with_affiliation_keywords(keywords.to_vec())
    }

    pub fn with_institution(mut self, institution: Option<String>) -> Self {
        self.institution = institution.filter(|i| !i.trim().is_empty());
        self
    }

    pub fn with_affiliation_keywords(mut self, keywords: Vec<String>) -> Self {
        self.affiliation_keywords = keywords;
        self
    }

    pub fn first_name(&self) -> Option<&str> {
        self.name.split_whitespace().next()
    }

    pub fn last_name(&self) -> Option<&str> {
        self.name.split_whitespace().last()
    }

    /// Configured affiliation keywords, or the institution when none are set.
    pub fn affiliation_terms(&self) -> Vec<String> {
        if !self.affiliation_keywords.is_empty() {
            return self.affiliation_keywords.clone();
        }
        self.institution.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    HasIdentifier,
    NeedsResolution,
    Resolving(StrategyKind),
    Resolved,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionStep {
    pub state: ResolutionState,
    pub detail: String,
}

/// Why a resolution ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionFailure {
    /// No identifier was known and no strategy produced one.
    NoIdentifier,
    /// An identifier was available but its extraction failed.
    Extraction(String),
}

#[derive(Debug)]
pub struct Resolution {
    pub state: ResolutionState,
    /// The working identifier, set only when resolved.
    pub identifier: Option<String>,
    pub via: Option<StrategyKind>,
    /// Whether `identifier` differs from the one we started with.
    pub changed: bool,
    /// The extraction that proved the identifier works.
    pub page: Option<PageExtraction>,
    pub failure: Option<ResolutionFailure>,
    pub trace: Vec<ResolutionStep>,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        self.state == ResolutionState::Resolved
    }
}

struct Trace(Vec<ResolutionStep>);

impl Trace {
    fn push(&mut self, state: ResolutionState, detail: impl Into<String>) {
        self.0.push(ResolutionStep {
            state,
            detail: detail.into(),
        });
    }
}

pub struct IdentifierResolver {
    strategy_timeout: Duration,
    store: Option<Arc<dyn IdentityStore>>,
}

impl IdentifierResolver {
    pub fn new(strategy_timeout: Duration) -> Self {
        Self {
            strategy_timeout,
            store: None,
        }
    }

    /// Persist winning identifiers through `store`.
    pub fn with_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Finds a working identifier for `query` in `source`.
    ///
    /// A known identifier is tried first and, if it extracts, no strategy runs. An
    /// explicit "not found" sends the resolver down the source's strategy chain; the
    /// first identifier a strategy produces is tried exactly once.
    pub async fn resolve(
        &self,
        source: &dyn PublicationSource,
        query: &PersonQuery,
        known: Option<&str>,
    ) -> Resolution {
        let kind = source.kind();
        let mut trace = Trace(Vec::new());
        let known = known.map(str::trim).filter(|k| !k.is_empty());

        if let Some(id) = known {
            trace.push(ResolutionState::HasIdentifier, id);
            match source.extract_page(id).await {
                Ok(page) => {
                    trace.push(ResolutionState::Resolved, id);
                    return Resolution {
                        state: ResolutionState::Resolved,
                        identifier: Some(id.to_string()),
                        via: None,
                        changed: false,
                        page: Some(page),
                        failure: None,
                        trace: trace.0,
                    };
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!(source = %kind, identifier = id, "stored identifier not found, searching by name");
                    trace.push(ResolutionState::NeedsResolution, e.to_string());
                }
                Err(e) => {
                    tracing::warn!(source = %kind, identifier = id, error = %e, "extraction failed");
                    trace.push(ResolutionState::Failed, e.to_string());
                    return failed(trace, ResolutionFailure::Extraction(e.to_string()));
                }
            }
        } else {
            trace.push(ResolutionState::NeedsResolution, "no stored identifier");
        }

        for strategy in source.strategy_order() {
            trace.push(ResolutionState::Resolving(strategy), query.name.clone());
            let attempt = timeout(
                self.strategy_timeout,
                source.resolve_candidate_identifier(strategy, query),
            )
            .await;

            let candidate = match attempt {
                Err(_) => {
                    tracing::warn!(source = %kind, %strategy, "strategy timed out");
                    continue;
                }
                Ok(Err(e)) => {
                    tracing::warn!(source = %kind, %strategy, error = %e, "strategy failed");
                    continue;
                }
                Ok(Ok(None)) => {
                    tracing::debug!(source = %kind, %strategy, "strategy found nothing");
                    continue;
                }
                Ok(Ok(Some(candidate))) => candidate,
            };

            if Some(candidate.as_str()) == known {
                tracing::debug!(source = %kind, %strategy, "strategy returned the identifier that just failed");
                continue;
            }

            tracing::info!(source = %kind, %strategy, identifier = %candidate, "identifier resolved");
            return match source.extract_page(&candidate).await {
                Ok(page) => {
                    trace.push(ResolutionState::Resolved, candidate.clone());
                    Resolution {
                        state: ResolutionState::Resolved,
                        identifier: Some(candidate),
                        via: Some(strategy),
                        changed: true,
                        page: Some(page),
                        failure: None,
                        trace: trace.0,
                    }
                }
                Err(e) => {
                    tracing::warn!(source = %kind, identifier = %candidate, error = %e, "retry with resolved identifier failed");
                    trace.push(ResolutionState::Failed, e.to_string());
                    failed(trace, ResolutionFailure::Extraction(e.to_string()))
                }
            };
        }

        tracing::warn!(source = %kind, name = %query.name, "all resolution strategies exhausted");
        trace.push(ResolutionState::Failed, "all strategies exhausted");
        failed(trace, ResolutionFailure::NoIdentifier)
    }

    /// Just the identifier, `None` when resolution fails.
    pub async fn resolve_identifier(
        &self,
        source: &dyn PublicationSource,
        query: &PersonQuery,
        known: Option<&str>,
    ) -> Option<String> {
        self.resolve(source, query, known).await.identifier
    }

    /// Resolves for a stored person and records a newly found identifier.
    /// Store failures are the only errors returned.
    pub async fn resolve_for_person(
        &self,
        source: &dyn PublicationSource,
        person: &PersonIdentity,
        query: &PersonQuery,
    ) -> Result<Resolution> {
        let kind = source.kind();
        let resolution = self.resolve(source, query, person.identifier(kind)).await;

        if resolution.is_resolved()
            && resolution.changed
            && let (Some(store), Some(id)) = (&self.store, &resolution.identifier)
        {
            store.set_identifier(person.id, kind, id)?;
            tracing::info!(person = person.id, source = %kind, identifier = %id, "identifier saved");
        }
        Ok(resolution)
    }
}

fn failed(trace: Trace, failure: ResolutionFailure) -> Resolution {
    Resolution {
        state: ResolutionState::Failed,
        identifier: None,
        via: None,
        changed: false,
        page: None,
        failure: Some(failure),
        trace: trace.0,
    }
}


#[cfg(test)]
mod tests {
    use pubrecon_core::{MemoryStore, NewPerson, PublicationRecord, PublicationType, SourceKind};

    use super::testing::{FakeSource, Step};
    use super::*;

    fn record(title: &str) -> PublicationRecord {
        PublicationRecord::new(
            title,
            Some("2020".into()),
            "",
            PublicationType::Journal,
            SourceKind::Registry,
        )
        .unwrap()
    }

    fn resolver() -> IdentifierResolver {
        IdentifierResolver::new(Duration::from_millis(200))
    }

    fn query() -> PersonQuery {
        PersonQuery::new("Prof. Dr. Ali Veli", &["Prof.".into(), "Dr.".into()])
    }

    #[tokio::test]
    async fn test_working_known_identifier_runs_no_strategy() {
        let source = FakeSource::new(SourceKind::Registry)
            .with_page("100", vec![record("Thin film infrared detectors")])
            .with_step(StrategyKind::SiteSearch, Step::Found("200"));

        let resolution = resolver().resolve(&source, &query(), Some("100")).await;

        assert!(resolution.is_resolved());
        assert_eq!(resolution.identifier.as_deref(), Some("100"));
        assert!(!resolution.changed);
        assert_eq!(source.strategy_calls(), 0);
        assert_eq!(source.extract_calls(), 1);
        assert_eq!(resolution.trace[0].state, ResolutionState::HasIdentifier);
    }

    #[tokio::test]
    async fn test_not_found_falls_back_and_retries_once() {
        let source = FakeSource::new(SourceKind::Registry)
            .with_page("200", vec![record("Thin film infrared detectors")])
            .with_step(StrategyKind::SiteSearch, Step::Fail)
            .with_step(StrategyKind::InternalSearch, Step::Found("200"));

        let resolution = resolver().resolve(&source, &query(), Some("100")).await;

        assert!(resolution.is_resolved());
        assert_eq!(resolution.identifier.as_deref(), Some("200"));
        assert_eq!(resolution.via, Some(StrategyKind::InternalSearch));
        assert!(resolution.changed);
        assert_eq!(source.strategy_calls(), 2);
        assert_eq!(source.extract_calls(), 2);

        let states: Vec<ResolutionState> = resolution.trace.iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![
                ResolutionState::HasIdentifier,
                ResolutionState::NeedsResolution,
                ResolutionState::Resolving(StrategyKind::SiteSearch),
                ResolutionState::Resolving(StrategyKind::InternalSearch),
                ResolutionState::Resolved,
            ]
        );
    }

    #[tokio::test]
    async fn test_strategy_timeout_moves_to_next() {
        let source = FakeSource::new(SourceKind::Xplore)
            .with_page("9", vec![record("Radar signal processing review")])
            .with_step(StrategyKind::InternalSearch, Step::Hang)
            .with_step(StrategyKind::SiteSearch, Step::Found("9"));

        let resolution = resolver().resolve(&source, &query(), None).await;
        assert_eq!(resolution.identifier.as_deref(), Some("9"));
        assert_eq!(resolution.via, Some(StrategyKind::SiteSearch));
    }

    #[tokio::test]
    async fn test_strategy_returning_failed_identifier_is_skipped() {
        let source = FakeSource::new(SourceKind::Registry)
            .with_step(StrategyKind::SiteSearch, Step::Found("100"))
            .with_step(StrategyKind::InternalSearch, Step::Nothing);

        let resolution = resolver().resolve(&source, &query(), Some("100")).await;
        assert_eq!(resolution.state, ResolutionState::Failed);
        assert_eq!(resolution.failure, Some(ResolutionFailure::NoIdentifier));
        // only the initial extraction; the duplicate identifier is not re-extracted
        assert_eq!(source.extract_calls(), 1);
    }

    #[tokio::test]
    async fn test_non_not_found_error_keeps_identifier_and_skips_search() {
        let source = FakeSource::new(SourceKind::Registry)
            .with_broken("100")
            .with_step(StrategyKind::SiteSearch, Step::Found("200"));

        let resolution = resolver().resolve(&source, &query(), Some("100")).await;
        assert_eq!(resolution.state, ResolutionState::Failed);
        assert!(matches!(resolution.failure, Some(ResolutionFailure::Extraction(_))));
        assert_eq!(source.strategy_calls(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_chain_leaves_store_untouched() {
        let store = Arc::new(MemoryStore::new());
        let person = store
            .add_person(
                NewPerson::new("Ali Veli").with_identifier(SourceKind::CitationIndex, "old-id"),
            )
            .unwrap();
        let source = FakeSource::new(SourceKind::CitationIndex)
            .with_step(StrategyKind::AuthorSearch, Step::Nothing)
            .with_step(StrategyKind::SiteSearch, Step::Fail);

        let resolver = resolver().with_store(store.clone());
        let resolution = resolver
            .resolve_for_person(&source, &person, &query())
            .await
            .unwrap();

        assert_eq!(resolution.state, ResolutionState::Failed);
        assert!(resolution.identifier.is_none());
        assert_eq!(store.identifier_writes(), 0);
        assert_eq!(
            store.get_identifiers(person.id).unwrap()[&SourceKind::CitationIndex],
            "old-id"
        );
    }

    #[tokio::test]
    async fn test_new_identifier_is_persisted() {
        let store = Arc::new(MemoryStore::new());
        let person = store.add_person(NewPerson::new("Ali Veli")).unwrap();
        let source = FakeSource::new(SourceKind::Registry)
            .with_page("321", vec![record("Thin film infrared detectors")])
            .with_step(StrategyKind::SiteSearch, Step::Found("321"));

        let resolution = resolver()
            .with_store(store.clone())
            .resolve_for_person(&source, &person, &query())
            .await
            .unwrap();

        assert!(resolution.is_resolved());
        assert_eq!(store.get_identifiers(person.id).unwrap()[&SourceKind::Registry], "321");
    }

    #[test]
    fn test_person_query_names() {
        let q = query();
        assert_eq!(q.name, "Ali Veli");
        assert_eq!(q.first_name(), Some("Ali"));
        assert_eq!(q.last_name(), Some("Veli"));
        assert!(q.affiliation_terms().is_empty());
        let q = q.with_institution(Some("METU".into()));
        assert_eq!(q.affiliation_terms(), vec!["METU".to_string()]);
    }
}
