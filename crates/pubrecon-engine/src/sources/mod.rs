//! Publication sources and the extraction flow shared by all of them.

pub mod citation_index;
pub mod markup;
pub mod registry;
pub mod xplore;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pubrecon_core::{
    AppConfig, ExtractionStatus, PersonIdentity, PublicationRecord, SourceKind,
};
use serde::Serialize;

use crate::error::Result;
use crate::http::RateLimitedClient;
use crate::render::{HttpRenderer, LoadLimits, RenderPool};
use crate::resolver::{
    IdentifierResolver, PersonQuery, ResolutionFailure, ResolutionStep, StrategyKind,
};
use crate::text::normalize;

pub use citation_index::CitationIndexSource;
pub use registry::RegistrySource;
pub use xplore::XploreSource;

/// What one profile yielded.
#[derive(Debug, Clone, Default)]
pub struct PageExtraction {
    pub records: Vec<PublicationRecord>,
    pub total_sections: usize,
    pub failed_sections: usize,
}

impl PageExtraction {
    pub fn complete(records: Vec<PublicationRecord>, sections: usize) -> Self {
        Self {
            records,
            total_sections: sections,
            failed_sections: 0,
        }
    }

    pub fn status(&self) -> ExtractionStatus {
        if self.total_sections > 0 && self.failed_sections >= self.total_sections {
            ExtractionStatus::Failed
        } else if self.failed_sections > 0 {
            ExtractionStatus::Partial
        } else {
            ExtractionStatus::Complete
        }
    }
}

/// One external bibliographic source.
#[async_trait]
pub trait PublicationSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Resolution strategies this source supports, in the order they are tried.
    fn strategy_order(&self) -> Vec<StrategyKind>;

    /// Runs a single strategy. `Ok(None)` when it finds nothing.
    async fn resolve_candidate_identifier(
        &self,
        strategy: StrategyKind,
        query: &PersonQuery,
    ) -> Result<Option<String>>;

    /// Extracts the profile behind `identifier`. An explicit "not found" from the
    /// source is reported as `EngineError::ProfileNotFound`.
    async fn extract_page(&self, identifier: &str) -> Result<PageExtraction>;
}

/// Clients shared by every adapter of one run: a single render pool and the
/// restricted web search client.
#[derive(Clone)]
pub struct SourceContext {
    pub pool: Arc<RenderPool>,
    pub search_client: Arc<RateLimitedClient>,
}

impl SourceContext {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let page_timeout = Duration::from_secs(config.render.page_timeout_secs);
        let render_client = Arc::new(RateLimitedClient::new(
            "render",
            Duration::from_millis(config.render.min_interval_ms),
            2,
            &config.render.user_agent,
            page_timeout,
        )?);
        let search_client = Arc::new(RateLimitedClient::new(
            "site_search",
            Duration::from_millis(config.search.min_interval_ms),
            2,
            &config.render.user_agent,
            page_timeout,
        )?);
        Ok(Self {
            pool: Arc::new(RenderPool::new(
                Arc::new(HttpRenderer::new(render_client)),
                page_timeout,
            )),
            search_client,
        })
    }

    pub fn adapter(&self, kind: SourceKind, config: &AppConfig) -> Result<SourceAdapter> {
        SourceAdapter::from_config(kind, config, self.pool.clone(), self.search_client.clone())
    }
}

/// The closed set of sources pubrecon knows how to read.
pub enum SourceAdapter {
    Registry(RegistrySource),
    CitationIndex(CitationIndexSource),
    Xplore(XploreSource),
}

impl SourceAdapter {
    pub fn from_config(
        kind: SourceKind,
        config: &AppConfig,
        pool: Arc<RenderPool>,
        search_client: Arc<RateLimitedClient>,
    ) -> Result<Self> {
        let limits = LoadLimits {
            max_triggers: config.scan.max_load_more,
            stuck_limit: config.scan.stuck_limit,
        };
        Ok(match kind {
            SourceKind::Registry => Self::Registry(RegistrySource::new(
                &config.sources.registry,
                limits,
                pool,
                &config.search,
                search_client,
            )?),
            SourceKind::CitationIndex => {
                let client = Arc::new(RateLimitedClient::new(
                    "citation_index",
                    Duration::from_millis(config.sources.citation_index.min_interval_ms),
                    3,
                    &config.render.user_agent,
                    Duration::from_secs(config.render.page_timeout_secs),
                )?);
                Self::CitationIndex(CitationIndexSource::new(
                    &config.sources.citation_index,
                    client,
                    &config.search,
                    search_client,
                )?)
            }
            SourceKind::Xplore => Self::Xplore(XploreSource::new(
                &config.sources.xplore,
                limits,
                pool,
                &config.search,
                search_client,
            )?),
        })
    }

    fn inner(&self) -> &dyn PublicationSource {
        match self {
            Self::Registry(s) => s,
            Self::CitationIndex(s) => s,
            Self::Xplore(s) => s,
        }
    }
}

#[async_trait]
impl PublicationSource for SourceAdapter {
    fn kind(&self) -> SourceKind {
        self.inner().kind()
    }

    fn strategy_order(&self) -> Vec<StrategyKind> {
        self.inner().strategy_order()
    }

    async fn resolve_candidate_identifier(
        &self,
        strategy: StrategyKind,
        query: &PersonQuery,
    ) -> Result<Option<String>> {
        self.inner().resolve_candidate_identifier(strategy, query).await
    }

    async fn extract_page(&self, identifier: &str) -> Result<PageExtraction> {
        self.inner().extract_page(identifier).await
    }
}

/// A person's publications from one source, with how far extraction got.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub source: SourceKind,
    pub identifier: Option<String>,
    pub identifier_changed: bool,
    pub status: ExtractionStatus,
    pub records: Vec<PublicationRecord>,
    pub trace: Vec<ResolutionStep>,
}

impl Extraction {
    pub fn count(&self) -> usize {
        self.records.len()
    }
}

/// Resolves the person's identifier in `source` and extracts their publications.
///
/// Resolution and extraction failures come back as an empty, non-`Complete`
/// extraction; only identity-store errors are returned.
pub async fn extract_publications(
    source: &dyn PublicationSource,
    resolver: &IdentifierResolver,
    person: &PersonIdentity,
    query: &PersonQuery,
) -> Result<Extraction> {
    let kind = source.kind();
    let resolution = resolver.resolve_for_person(source, person, query).await?;

    let (status, records) = match (&resolution.page, &resolution.failure) {
        (Some(page), _) => (page.status(), dedupe_by_title(page.records.clone())),
        (None, Some(ResolutionFailure::NoIdentifier)) => (ExtractionStatus::Unresolved, Vec::new()),
        (None, _) => (ExtractionStatus::Failed, Vec::new()),
    };

    tracing::info!(
        person = person.id,
        source = %kind,
        status = ?status,
        count = records.len(),
        "extraction finished"
    );

    Ok(Extraction {
        source: kind,
        identifier: resolution
            .identifier
            .or_else(|| person.identifier(kind).map(str::to_string)),
        identifier_changed: resolution.changed,
        status,
        records,
        trace: resolution.trace,
    })
}

/// Keeps the first record for each normalized title.
pub fn dedupe_by_title(records: Vec<PublicationRecord>) -> Vec<PublicationRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(normalize(&r.title)))
        .collect()
}

#[cfg(test)]
mod tests {
    use pubrecon_core::{IdentityStore, MemoryStore, NewPerson, PublicationType};

    use super::*;
    use crate::resolver::testing::{FakeSource, Step};

    fn record(title: &str) -> PublicationRecord {
        PublicationRecord::new(
            title,
            Some("2021".into()),
            "",
            PublicationType::Conference,
            SourceKind::Xplore,
        )
        .unwrap()
    }

    #[test]
    fn test_dedupe_by_title_keeps_first() {
        let records = vec![
            record("Radar Signal Processing"),
            record("radar signal-processing"),
            record("Another Paper Title Here"),
        ];
        let deduped = dedupe_by_title(records);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "Radar Signal Processing");
    }

    #[test]
    fn test_page_status() {
        assert_eq!(PageExtraction::complete(vec![], 2).status(), ExtractionStatus::Complete);
        let partial = PageExtraction {
            records: vec![],
            total_sections: 2,
            failed_sections: 1,
        };
        assert_eq!(partial.status(), ExtractionStatus::Partial);
        let failed = PageExtraction {
            total_sections: 2,
            failed_sections: 2,
            ..Default::default()
        };
        assert_eq!(failed.status(), ExtractionStatus::Failed);
    }

    #[tokio::test]
    async fn test_extract_publications_unresolved_is_empty_not_zero() {
        let store = Arc::new(MemoryStore::new());
        let person = store.add_person(NewPerson::new("Ali Veli")).unwrap();
        let source = FakeSource::new(SourceKind::Xplore)
            .with_step(StrategyKind::InternalSearch, Step::Nothing);
        let resolver = IdentifierResolver::new(Duration::from_secs(1)).with_store(store.clone());

        let extraction = extract_publications(
            &source,
            &resolver,
            &person,
            &PersonQuery::new("Ali Veli", &[]),
        )
        .await
        .unwrap();

        assert_eq!(extraction.status, ExtractionStatus::Unresolved);
        assert!(extraction.records.is_empty());
        assert!(extraction.identifier.is_none());
    }

    #[tokio::test]
    async fn test_extract_publications_dedupes_records() {
        let store = Arc::new(MemoryStore::new());
        let person = store
            .add_person(NewPerson::new("Ali Veli").with_identifier(SourceKind::Xplore, "7"))
            .unwrap();
        let source = FakeSource::new(SourceKind::Xplore).with_page(
            "7",
            vec![record("Radar Signal Processing"), record("RADAR signal processing")],
        );
        let resolver = IdentifierResolver::new(Duration::from_secs(1)).with_store(store.clone());

        let extraction = extract_publications(
            &source,
            &resolver,
            &person,
            &PersonQuery::new("Ali Veli", &[]),
        )
        .await
        .unwrap();

        assert_eq!(extraction.status, ExtractionStatus::Complete);
        assert_eq!(extraction.count(), 1);
        assert_eq!(extraction.identifier.as_deref(), Some("7"));
        assert!(!extraction.identifier_changed);
        assert_eq!(store.identifier_writes(), 0);
    }
}
