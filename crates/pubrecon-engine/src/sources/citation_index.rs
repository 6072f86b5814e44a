//! Citation index: a JSON search API keyed by author id, paginated by offset.

use std::sync::Arc;

use async_trait::async_trait;
use pubrecon_core::config::{CitationIndexConfig, SearchConfig};
use pubrecon_core::{PublicationRecord, PublicationType, SourceKind};
use serde_json::Value;

use super::markup::classify;
use super::{PageExtraction, PublicationSource, dedupe_by_title};
use crate::error::{EngineError, Result};
use crate::http::RateLimitedClient;
use crate::resolver::strategies::api_headers;
use crate::resolver::{AuthorSearchApi, PersonQuery, ProfilePatterns, SiteSearch, StrategyKind};

pub struct CitationIndexSource {
    client: Arc<RateLimitedClient>,
    api_base: String,
    api_key: Option<String>,
    page_size: u32,
    max_pages: u32,
    author_search: AuthorSearchApi,
    site_search: SiteSearch,
}

impl CitationIndexSource {
    pub fn new(
        config: &CitationIndexConfig,
        client: Arc<RateLimitedClient>,
        search: &SearchConfig,
        search_client: Arc<RateLimitedClient>,
    ) -> Result<Self> {
        let patterns = ProfilePatterns::new(&config.profile_link_patterns)?;
        Ok(Self {
            author_search: AuthorSearchApi::new(
                client.clone(),
                &config.api_base,
                config.api_key.clone(),
                config.author_candidates,
            ),
            site_search: SiteSearch::new(
                search_client,
                &search.endpoint,
                &search.query_param,
                &config.site_domain,
                patterns,
            ),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            page_size: config.page_size.max(1),
            max_pages: config.max_pages.max(1),
            client,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn author_search(&self) -> &AuthorSearchApi {
        &self.author_search
    }

    /// Publications dated `year`. An empty result set is an empty list here, not
    /// a missing profile.
    pub async fn publications_in_year(
        &self,
        identifier: &str,
        year: i32,
    ) -> Result<Vec<PublicationRecord>> {
        let expr = format!("AU-ID({identifier}) AND PUBYEAR IS {year}");
        let wanted = year.to_string();
        Ok(self
            .search(&expr)
            .await?
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.year == wanted)
            .collect())
    }

    /// Pages through a document search. `None` when the API reports an empty
    /// result set.
    async fn search(&self, expr: &str) -> Result<Option<Vec<PublicationRecord>>> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(EngineError::MissingCredential("citation index API key"))?;

        let mut records = Vec::new();
        for page in 0..self.max_pages {
            let start = page * self.page_size;
            let url = format!(
                "{}/content/search/scopus?query={}&start={start}&count={}&view=STANDARD",
                self.api_base,
                urlencoding::encode(expr),
                self.page_size
            );
            let json: Value = self
                .client
                .get_json_with_headers(&url, api_headers(key)?)
                .await?;

            let results = &json["search-results"];
            if let Some(message) = results.get("service-error").or_else(|| json.get("service-error")) {
                return Err(EngineError::ApiError(
                    "citation_index".into(),
                    message.to_string(),
                ));
            }

            let entries = entries(results);
            if page == 0 && is_empty_result(&entries) {
                return Ok(None);
            }

            let fetched = entries.len() as u32;
            records.extend(entries.iter().filter_map(parse_document));

            // Without a usable total, only a short page ends the listing.
            let total = results
                .get("opensearch:totalResults")
                .and_then(|v| v.as_str().and_then(|s| s.trim().parse::<u64>().ok()).or(v.as_u64()));
            tracing::debug!(page, fetched, ?total, "citation index page");
            if fetched < self.page_size
                || total.is_some_and(|t| u64::from(start + fetched) >= t)
            {
                break;
            }
        }
        Ok(Some(records))
    }
}

#[async_trait]
impl PublicationSource for CitationIndexSource {
    fn kind(&self) -> SourceKind {
        SourceKind::CitationIndex
    }

    fn strategy_order(&self) -> Vec<StrategyKind> {
        vec![StrategyKind::AuthorSearch, StrategyKind::SiteSearch]
    }

    async fn resolve_candidate_identifier(
        &self,
        strategy: StrategyKind,
        query: &PersonQuery,
    ) -> Result<Option<String>> {
        match strategy {
            StrategyKind::AuthorSearch => self.author_search.find(query).await,
            StrategyKind::SiteSearch => self.site_search.find(query).await,
            StrategyKind::InternalSearch => Ok(None),
        }
    }

    async fn extract_page(&self, identifier: &str) -> Result<PageExtraction> {
        let records = self
            .search(&format!("AU-ID({identifier})"))
            .await?
            .ok_or_else(|| EngineError::ProfileNotFound {
                kind: SourceKind::CitationIndex,
                identifier: identifier.to_string(),
            })?;
        Ok(PageExtraction::complete(dedupe_by_title(records), 1))
    }
}

fn entries(results: &Value) -> Vec<Value> {
    match results.get("entry") {
        Some(Value::Array(items)) => items.clone(),
        Some(single @ Value::Object(_)) => vec![single.clone()],
        _ => Vec::new(),
    }
}

/// The API answers an empty search with a single entry carrying an `error` field.
fn is_empty_result(entries: &[Value]) -> bool {
    match entries {
        [] => true,
        [only] => only.get("error").is_some(),
        _ => false,
    }
}

fn parse_document(entry: &Value) -> Option<PublicationRecord> {
    if entry.get("error").is_some() {
        return None;
    }
    let field = |name: &str| {
        entry
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let Some(title) = field("dc:title") else {
        tracing::warn!(id = ?field("dc:identifier"), "document without title skipped");
        return None;
    };

    let year = field("prism:coverDate")
        .and_then(|d| d.get(..4))
        .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string);

    let mut venue = field("prism:publicationName").unwrap_or_default().to_string();
    if let Some(publisher) = field("prism:publisher")
        && !venue.contains(publisher)
    {
        venue = if venue.is_empty() {
            publisher.to_string()
        } else {
            format!("{venue} ({publisher})")
        };
    }

    let kind = document_type(
        field("prism:aggregationType").unwrap_or_default(),
        field("subtypeDescription").unwrap_or_default(),
    );

    match PublicationRecord::new(title, year, venue, kind, SourceKind::CitationIndex) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(error = %e, "malformed document dropped");
            None
        }
    }
}

fn document_type(aggregation: &str, subtype: &str) -> PublicationType {
    let aggregation = aggregation.to_lowercase();
    if aggregation.contains("journal") {
        PublicationType::Journal
    } else if aggregation.contains("conference") || aggregation.contains("proceeding") {
        PublicationType::Conference
    } else if aggregation.contains("book") {
        PublicationType::Book
    } else {
        classify(subtype).unwrap_or_default()
    }
}
