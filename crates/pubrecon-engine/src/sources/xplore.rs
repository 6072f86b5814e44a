//! Publisher digital library: a single rendered author profile with infinite scroll.

use std::sync::Arc;

use async_trait::async_trait;
use pubrecon_core::SourceKind;
use pubrecon_core::config::{SearchConfig, XploreConfig};

use super::markup::{ListingParser, has_marker};
use super::{PageExtraction, PublicationSource, dedupe_by_title};
use crate::error::{EngineError, Result};
use crate::http::RateLimitedClient;
use crate::render::{LoadLimits, RenderPool, load_until_stable};
use crate::resolver::{InternalSearch, PersonQuery, ProfilePatterns, SiteSearch, StrategyKind};

pub struct XploreSource {
    profile_url: String,
    not_found_markers: Vec<String>,
    parser: ListingParser,
    limits: LoadLimits,
    pool: Arc<RenderPool>,
    site_search: SiteSearch,
    internal_search: InternalSearch,
}

impl XploreSource {
    pub fn new(
        config: &XploreConfig,
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
            parser: ListingParser::new(SourceKind::Xplore, config.noise_markers.clone())
                .with_default_venue(&config.venue_label),
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

    pub fn with_parser(mut self, parser: ListingParser) -> Self {
        self.parser = parser;
        self
    }
}

#[async_trait]
impl PublicationSource for XploreSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Xplore
    }

    fn strategy_order(&self) -> Vec<StrategyKind> {
        vec![StrategyKind::InternalSearch, StrategyKind::SiteSearch]
    }

    async fn resolve_candidate_identifier(
        &self,
        strategy: StrategyKind,
        query: &PersonQuery,
    ) -> Result<Option<String>> {
        match strategy {
            StrategyKind::InternalSearch => self.internal_search.find(query).await,
            StrategyKind::SiteSearch => self.site_search.find(query).await,
            StrategyKind::AuthorSearch => Ok(None),
        }
    }

    async fn extract_page(&self, identifier: &str) -> Result<PageExtraction> {
        let not_found = || EngineError::ProfileNotFound {
            kind: SourceKind::Xplore,
            identifier: identifier.to_string(),
        };

        let url = self
            .profile_url
            .replace("{id}", &urlencoding::encode(identifier));
        let mut session = self.pool.acquire().await?;
        session
            .navigate(&url)
            .await
            .map_err(|e| if e.is_not_found() { not_found() } else { e })?;

        if has_marker(&session.content().await?, &self.not_found_markers) {
            return Err(not_found());
        }

        let listing =
            load_until_stable(&mut session, self.limits, |html| self.parser.count(html)).await?;
        let records = dedupe_by_title(self.parser.parse(&listing.html, None));
        tracing::debug!(identifier, count = records.len(), triggers = listing.triggers, "profile extracted");
        Ok(PageExtraction::complete(records, 1))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pubrecon_core::PublicationType;

    use super::*;
    use crate::render::testing::{Script, ScriptedRenderer};

    fn source(script: Script) -> XploreSource {
        let config = XploreConfig {
            base_url: "https://xplore.test".into(),
            ..Default::default()
        };
        let pool = Arc::new(RenderPool::new(
            Arc::new(ScriptedRenderer::new(script)),
            Duration::from_secs(5),
        ));
        let client = Arc::new(
            RateLimitedClient::new("t", Duration::ZERO, 0, "t", Duration::from_secs(5)).unwrap(),
        );
        let parser = ListingParser::new(SourceKind::Xplore, config.noise_markers.clone())
            .with_default_venue(&config.venue_label)
            .with_max_year(2026);
        XploreSource::new(&config, LoadLimits::default(), pool, &Default::default(), client)
            .unwrap()
            .with_parser(parser)
    }

    #[tokio::test]
    async fn test_profile_items_classified_by_keywords() {
        let script = Script::default().page(
            "https://xplore.test/author/37",
            &[
                r#"<div class="List-results-items">
                     <div class="result-item"><h3><a href="/document/1">Advanced Radar Systems</a></h3>
                       <div class="description">IEEE Transactions on Aerospace | Year: 2023</div></div>
                   </div>"#,
                r#"<div class="result-item"><h3><a href="/document/2">Conference on Deep Learning Methods</a></h3>
                     <div>2022 International Conference on Radar | Year: 2022</div></div>"#,
            ],
        );

        let page = source(script).extract_page("37").await.unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].title, "Advanced Radar Systems");
        assert_eq!(page.records[0].kind, PublicationType::Journal);
        assert_eq!(page.records[0].year, "2023");
        assert_eq!(page.records[1].kind, PublicationType::Conference);
        assert_eq!(page.records[1].venue, "IEEE Xplore");
    }

    #[tokio::test]
    async fn test_page_not_found_marker() {
        let script =
            Script::default().page("https://xplore.test/author/1", &["<h1>Page Not Found</h1>"]);
        assert!(source(script).extract_page("1").await.unwrap_err().is_not_found());
    }
}
