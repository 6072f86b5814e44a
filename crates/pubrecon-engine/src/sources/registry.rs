//! Institutional academic registry: rendered profile with one tab per publication
//! type and lazily loaded lists.

use std::sync::Arc;

use async_trait::async_trait;
use pubrecon_core::config::{RegistryConfig, SearchConfig, SectionConfig};
use pubrecon_core::{PublicationRecord, SourceKind};

use super::markup::{ListingParser, has_marker};
use super::{PageExtraction, PublicationSource, dedupe_by_title};
use crate::error::{EngineError, Result};
use crate::http::RateLimitedClient;
use crate::render::{LoadLimits, RenderPool, RenderSession, load_until_stable};
use crate::resolver::{InternalSearch, PersonQuery, ProfilePatterns, SiteSearch, StrategyKind};

pub struct RegistrySource {
    profile_url: String,
    not_found_markers: Vec<String>,
    sections: Vec<SectionConfig>,
    parser: ListingParser,
    limits: LoadLimits,
    pool: Arc<RenderPool>,
    site_search: SiteSearch,
    internal_search: InternalSearch,
}

impl RegistrySource {
    pub fn new(
        config: &RegistryConfig,
        limits: LoadLimits,
        pool: Arc<RenderPool>,
        search: &SearchConfig,
        search_client: Arc<RateLimitedClient>,
    ) -> Result<Self> {
        let base = config.base_url.trim_end_matches('/');
        let patterns = ProfilePatterns::new(&config.profile_link_patterns)?;
        Ok(Self {
            profile_url: format!("{base}{}", config.profile_path),
            not_found_markers: config.not_found_markers.clone(),
            sections: config.sections.clone(),
            parser: ListingParser::new(SourceKind::Registry, config.noise_markers.clone()),
            limits,
            site_search: SiteSearch::new(
                search_client,
                &search.endpoint,
                &search.query_param,
                &config.site_domain,
                patterns.clone(),
            ),
            internal_search: InternalSearch::new(
                pool.clone(),
                &format!("{base}{}", config.search_path),
                config.search_tab.clone(),
                patterns,
            ),
            pool,
        })
    }

    /// Overrides the listing parser, e.g. to pin the accepted year range.
    pub fn with_parser(mut self, parser: ListingParser) -> Self {
        self.parser = parser;
        self
    }

    fn not_found(identifier: &str) -> EngineError {
        EngineError::ProfileNotFound {
            kind: SourceKind::Registry,
            identifier: identifier.to_string(),
        }
    }

    async fn extract_section(
        &self,
        session: &mut RenderSession,
        section: &SectionConfig,
        first: bool,
    ) -> Result<Vec<PublicationRecord>> {
        if !session.activate_link(&section.label).await? {
            if !first {
                return Err(EngineError::SectionMissing(section.label.clone()));
            }
            // The first tab is usually already open and may not be a link.
            tracing::debug!(section = %section.label, "tab not clickable, reading current view");
        }

        let listing =
            load_until_stable(session, self.limits, |html| self.parser.count(html)).await?;
        Ok(self.parser.parse(&listing.html, Some(section.kind)))
    }
}

#[async_trait]
impl PublicationSource for RegistrySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Registry
    }

    fn strategy_order(&self) -> Vec<StrategyKind> {
        vec![StrategyKind::SiteSearch, StrategyKind::InternalSearch]
    }

    async fn resolve_candidate_identifier(
        &self,
        strategy: StrategyKind,
        query: &PersonQuery,
    ) -> Result<Option<String>> {
        match strategy {
            StrategyKind::SiteSearch => self.site_search.find(query).await,
            StrategyKind::InternalSearch => self.internal_search.find(query).await,
            StrategyKind::AuthorSearch => Ok(None),
        }
    }

    async fn extract_page(&self, identifier: &str) -> Result<PageExtraction> {
        let url = self
            .profile_url
            .replace("{id}", &urlencoding::encode(identifier));
        let mut session = self.pool.acquire().await?;
        session.navigate(&url).await.map_err(|e| {
            if e.is_not_found() {
                Self::not_found(identifier)
            } else {
                e
            }
        })?;

        let landing = session.content().await?;
        if has_marker(&landing, &self.not_found_markers) {
            return Err(Self::not_found(identifier));
        }

        let mut page = PageExtraction {
            total_sections: self.sections.len(),
            ..Default::default()
        };
        for (i, section) in self.sections.iter().enumerate() {
            match self.extract_section(&mut session, section, i == 0).await {
                Ok(records) => {
                    tracing::debug!(section = %section.label, count = records.len(), "section extracted");
                    page.records.extend(records);
                }
                Err(e) => {
                    tracing::warn!(identifier, section = %section.label, error = %e, "section extraction failed, skipping");
                    page.failed_sections += 1;
                }
            }
        }
        page.records = dedupe_by_title(page.records);
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pubrecon_core::{ExtractionStatus, PublicationType};

    use super::*;
    use crate::render::testing::{Script, ScriptedRenderer};

    const PROFILE: &str = "https://reg.test/AkademikArama/Akademisyen/Detay/42";
    const MAKALE: &str = "https://reg.test/makale/42";
    const BILDIRI: &str = "https://reg.test/bildiri/42";

    fn source(script: Script) -> RegistrySource {
        let config = RegistryConfig {
            base_url: "https://reg.test".into(),
            ..Default::default()
        };
        let pool = Arc::new(RenderPool::new(
            Arc::new(ScriptedRenderer::new(script)),
            Duration::from_secs(5),
        ));
        let client = Arc::new(
            RateLimitedClient::new(
                "test",
                Duration::from_millis(0),
                0,
                "pubrecon-test",
                Duration::from_secs(5),
            )
            .unwrap(),
        );
        let parser = ListingParser::new(SourceKind::Registry, config.noise_markers.clone())
            .with_max_year(2026);
        RegistrySource::new(&config, LoadLimits::default(), pool, &Default::default(), client)
            .unwrap()
            .with_parser(parser)
    }

    fn nav() -> &'static str {
        r#"<nav><div>Toggle navigation</div><a href="/makale/42">Makale</a><a href="/bildiri/42">Bildiri</a></nav>"#
    }

    #[tokio::test]
    async fn test_extracts_both_tabs_with_lazy_loading() {
        let script = Script::default()
            .page(PROFILE, &[nav()])
            .page(
                MAKALE,
                &[
                    r#"<ul><li><a href="/p/1">Thin film infrared detectors for space</a> 2019</li></ul>"#,
                    r#"<ul><li><a href="/p/2">Uncooled microbolometer arrays revisited</a> 2021</li></ul>"#,
                ],
            )
            .page(
                BILDIRI,
                &[r#"<ul><li><a href="/p/3">Quantum well photodetector characterization</a> 2018</li></ul>"#],
            )
            .link(PROFILE, "Makale", MAKALE)
            .link(MAKALE, "Bildiri", BILDIRI);

        let page = source(script).extract_page("42").await.unwrap();

        assert_eq!(page.status(), ExtractionStatus::Complete);
        let summary: Vec<(&str, PublicationType)> =
            page.records.iter().map(|r| (r.title.as_str(), r.kind)).collect();
        assert_eq!(
            summary,
            vec![
                ("Thin film infrared detectors for space", PublicationType::Journal),
                ("Uncooled microbolometer arrays revisited", PublicationType::Journal),
                ("Quantum well photodetector characterization", PublicationType::Conference),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_second_tab_is_partial() {
        let script = Script::default()
            .page(PROFILE, &[nav()])
            .page(
                MAKALE,
                &[r#"<ul><li><a href="/p/1">Thin film infrared detectors for space</a> 2019</li></ul>"#],
            )
            .link(PROFILE, "Makale", MAKALE);

        let page = source(script).extract_page("42").await.unwrap();
        assert_eq!(page.status(), ExtractionStatus::Partial);
        assert_eq!(page.records.len(), 1);
    }

    #[tokio::test]
    async fn test_not_found_marker() {
        let script = Script::default().page(
            PROFILE,
            &["<p>İstediğiniz işleme cevap veremiyoruz</p>"],
        );
        let err = source(script).extract_page("42").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unknown_page_is_not_found() {
        let err = source(Script::default()).extract_page("42").await.unwrap_err();
        assert!(matches!(err, EngineError::ProfileNotFound { .. }));
    }
}
