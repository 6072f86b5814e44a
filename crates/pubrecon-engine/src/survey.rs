//! Yearly department survey: per-person article and conference counts from the
//! citation index, split into national and international venues.

use std::sync::Arc;
use std::time::Duration;

use pubrecon_core::{AppConfig, PublicationRecord, PublicationType};
use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::http::RateLimitedClient;
use crate::resolver::{AffiliationQuery, PersonQuery};
use crate::sources::CitationIndexSource;
use crate::text::fold;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SurveyCounts {
    pub national_articles: usize,
    pub international_articles: usize,
    pub national_conferences: usize,
    pub international_conferences: usize,
}

impl SurveyCounts {
    fn add(&mut self, other: &SurveyCounts) {
        self.national_articles += other.national_articles;
        self.international_articles += other.international_articles;
        self.national_conferences += other.national_conferences;
        self.international_conferences += other.international_conferences;
    }

    pub fn total(&self) -> usize {
        self.national_articles
            + self.international_articles
            + self.national_conferences
            + self.international_conferences
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SurveyRow {
    pub name: String,
    pub author_id: Option<String>,
    #[serde(flatten)]
    pub counts: SurveyCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SurveyRow {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            author_id: None,
            counts: SurveyCounts::default(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SurveyReport {
    pub year: i32,
    pub rows: Vec<SurveyRow>,
    pub totals: SurveyCounts,
}

pub struct DepartmentSurvey {
    source: Arc<CitationIndexSource>,
    national_keywords: Vec<String>,
    honorifics: Vec<String>,
    affiliation_keywords: Vec<String>,
    roster: AffiliationQuery,
    roster_size: u32,
    delay: Duration,
}

impl DepartmentSurvey {
    pub fn new(source: Arc<CitationIndexSource>, national_keywords: Vec<String>) -> Self {
        Self {
            source,
            national_keywords: national_keywords.iter().map(|k| fold(k)).collect(),
            honorifics: Vec::new(),
            affiliation_keywords: Vec::new(),
            roster: AffiliationQuery::default(),
            roster_size: 25,
            delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let index = &config.sources.citation_index;
        let client = Arc::new(RateLimitedClient::new(
            "citation_index",
            Duration::from_millis(index.min_interval_ms),
            3,
            &config.render.user_agent,
            Duration::from_secs(config.render.page_timeout_secs),
        )?);
        let search_client = Arc::new(RateLimitedClient::new(
            "site_search",
            Duration::from_millis(config.search.min_interval_ms),
            2,
            &config.render.user_agent,
            Duration::from_secs(config.render.page_timeout_secs),
        )?);
        let source = CitationIndexSource::new(index, client, &config.search, search_client)?
            .with_page_size(config.survey.page_size);

        Ok(Self::new(Arc::new(source), config.survey.national_keywords.clone())
            .with_honorifics(config.resolver.honorifics.clone())
            .with_affiliation_keywords(config.resolver.affiliation_keywords.clone())
            .with_roster(
                AffiliationQuery {
                    institution: config.survey.institution.clone(),
                    affiliation_id: config.survey.affiliation_id.clone(),
                    department: config.survey.department_keyword.clone(),
                },
                config.survey.roster_size,
            )
            .with_delay(Duration::from_millis(config.survey.delay_ms)))
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
        self.delay = delay;
        self
    }

    /// Where faculty come from when [`run`](Self::run) is given no names.
    pub fn with_roster(mut self, roster: AffiliationQuery, size: u32) -> Self {
        self.roster = roster;
        self.roster_size = size.max(1);
        self
    }

    /// Surveys each name in turn. With no names, the faculty are listed from the
    /// configured affiliation instead. A person who cannot be resolved or fetched
    /// gets a zero row with the reason; the run carries on.
    pub async fn run(&self, names: &[String], year: i32) -> Result<SurveyReport> {
        let mut rows = Vec::new();
        let mut totals = SurveyCounts::default();

        if names.is_empty() {
            if self.roster.expression().is_none() {
                return Err(EngineError::NoRoster);
            }
            let authors = self
                .source
                .author_search()
                .by_affiliation(&self.roster, self.roster_size)
                .await?;
            for (index, author) in authors.into_iter().enumerate() {
                self.pause(index).await;
                let mut row = SurveyRow::new(&author.name);
                self.fill_counts(&mut row, author.id, year).await;
                totals.add(&row.counts);
                rows.push(row);
            }
        } else {
            for (index, name) in names.iter().enumerate() {
                self.pause(index).await;
                let row = self.survey_person(name, year).await;
                totals.add(&row.counts);
                rows.push(row);
            }
        }

        tracing::info!(year, people = rows.len(), total = totals.total(), "survey finished");
        Ok(SurveyReport { year, rows, totals })
    }

    async fn pause(&self, index: usize) {
        if index > 0 && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    async fn survey_person(&self, name: &str, year: i32) -> SurveyRow {
        let mut row = SurveyRow::new(name);

        let query = PersonQuery::new(name, &self.honorifics)
            .with_affiliation_keywords(self.affiliation_keywords.clone());
        let author_id = match self.source.author_search().find(&query).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::warn!(name, "no citation index author found");
                return row;
            }
            Err(e) => {
                tracing::warn!(name, error = %e, "author lookup failed");
                row.error = Some(e.to_string());
                return row;
            }
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.fill_counts(&mut row, author_id, year).await;
        row
    }

    async fn fill_counts(&self, row: &mut SurveyRow, author_id: String, year: i32) {
        match self.source.publications_in_year(&author_id, year).await {
            Ok(records) => row.counts = self.count(&records),
            Err(e) => {
                tracing::warn!(name = %row.name, author_id = %author_id, error = %e, "publication fetch failed");
                row.error = Some(e.to_string());
            }
        }
        row.author_id = Some(author_id);
    }

    /// Conference papers count as conferences; every other type counts as an article.
    pub fn count(&self, records: &[PublicationRecord]) -> SurveyCounts {
        let mut counts = SurveyCounts::default();
        for record in records {
            let national = self.is_national(&record.venue);
            let slot = match (record.kind == PublicationType::Conference, national) {
                (true, true) => &mut counts.national_conferences,
                (true, false) => &mut counts.international_conferences,
                (false, true) => &mut counts.national_articles,
                (false, false) => &mut counts.international_articles,
            };
            *slot += 1;
        }
        counts
    }

    /// Single-word keywords match at the start of a word, so "national" does not
    /// fire on "International".
    fn is_national(&self, venue: &str) -> bool {
        let venue = fold(venue);
        let words: Vec<&str> = venue
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        self.national_keywords.iter().any(|k| {
            if k.contains(char::is_whitespace) {
                venue.contains(k.as_str())
            } else {
                words.iter().any(|w| w.starts_with(k.as_str()))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use pubrecon_core::SourceKind;
    use pubrecon_core::config::{CitationIndexConfig, SearchConfig, SurveyConfig};
    use serde_json::json;

    use super::*;

    fn survey(base: &str) -> DepartmentSurvey {
        let config = CitationIndexConfig {
            api_base: base.to_string(),
            api_key: Some("k".into()),
            ..Default::default()
        };
        let client = Arc::new(
            RateLimitedClient::new("t", Duration::ZERO, 0, "t", Duration::from_secs(5)).unwrap(),
        );
        let source =
            CitationIndexSource::new(&config, client.clone(), &SearchConfig::default(), client)
                .unwrap();
        DepartmentSurvey::new(Arc::new(source), SurveyConfig::default().national_keywords)
    }

    fn rec(venue: &str, kind: PublicationType) -> PublicationRecord {
        PublicationRecord::new(
            "Some sufficiently long title",
            Some("2024".into()),
            venue,
            kind,
            SourceKind::CitationIndex,
        )
        .unwrap()
    }

    #[test]
    fn test_count_splits_national_and_types() {
        let s = survey("http://127.0.0.1:9");
        let counts = s.count(&[
            rec("Turkish Journal of Electrical Engineering", PublicationType::Journal),
            rec("IEEE Sensors Journal", PublicationType::Journal),
            rec("Ulusal Elektrik Kongresi", PublicationType::Conference),
            rec("International Conference on Sensing", PublicationType::Conference),
            rec("Türkiye Fizik Dergisi", PublicationType::Other),
            rec("Handbook of Sensors", PublicationType::Book),
        ]);
        assert_eq!(
            counts,
            SurveyCounts {
                national_articles: 2,
                international_articles: 2,
                national_conferences: 1,
                international_conferences: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_run_without_names_lists_the_department() {
        let mut server = Server::new_async().await;
        let _roster = server
            .mock("GET", "/content/search/author")
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                r#"AFFIL("Middle East Technical University") AND AFFIL("Electrical")"#.into(),
            ))
            .with_body(
                json!({"search-results": {"entry": [
                    {"dc:identifier": "AUTHOR_ID:111",
                     "preferred-name": {"ce:given-name": "Ali", "ce:surname": "Veli"}},
                    {"dc:identifier": "AUTHOR_ID:222",
                     "preferred-name": {"ce:given-name": "Ayşe", "ce:surname": "Kaya"}}
                ]}})
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let _first = server
            .mock("GET", "/content/search/scopus")
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                "AU-ID(111) AND PUBYEAR IS 2024".into(),
            ))
            .with_body(
                json!({"search-results": {
                    "opensearch:totalResults": "1",
                    "entry": [{"dc:title": "Radar imaging in cluttered scenes",
                               "prism:coverDate": "2024-03-01",
                               "prism:publicationName": "IEEE Sensors Journal",
                               "prism:aggregationType": "Journal"}]}})
                .to_string(),
            )
            .create_async()
            .await;
        let _second = server
            .mock("GET", "/content/search/scopus")
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                "AU-ID(222) AND PUBYEAR IS 2024".into(),
            ))
            .with_body(json!({"search-results": {"entry": [{"error": "Result set was empty"}]}}).to_string())
            .create_async()
            .await;

        let roster = AffiliationQuery {
            institution: Some("Middle East Technical University".into()),
            department: Some("Electrical".into()),
            ..Default::default()
        };
        let report = survey(&server.url())
            .with_roster(roster, 25)
            .run(&[], 2024)
            .await
            .unwrap();

        let ids: Vec<Option<&str>> = report.rows.iter().map(|r| r.author_id.as_deref()).collect();
        assert_eq!(ids, vec![Some("111"), Some("222")]);
        assert_eq!(report.rows[1].name, "Ayşe Kaya");
        assert_eq!(report.rows[0].counts.international_articles, 1);
        assert_eq!(report.rows[1].counts.total(), 0);
        assert_eq!(report.totals.total(), 1);
    }

    #[tokio::test]
    async fn test_run_without_names_or_roster_is_an_error() {
        let err = survey("http://127.0.0.1:9").run(&[], 2024).await.unwrap_err();
        assert!(matches!(err, EngineError::NoRoster));
    }

    #[tokio::test]
    async fn test_run_resolves_fetches_and_totals() {
        let mut server = Server::new_async().await;
        let _author = server
            .mock("GET", "/content/search/author")
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                "AUTHLASTNAME(Veli) and AUTHFIRST(Ali)".into(),
            ))
            .with_body(
                json!({"search-results": {"entry": [
                    {"dc:identifier": "AUTHOR_ID:57190000001",
                     "preferred-name": {"ce:given-name": "Ali", "ce:surname": "Veli"}}
                ]}})
                .to_string(),
            )
            .create_async()
            .await;
        let _nobody = server
            .mock("GET", "/content/search/author")
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                "AUTHLASTNAME(Yok) and AUTHFIRST(Hic)".into(),
            ))
            .with_body(json!({"search-results": {"entry": []}}).to_string())
            .create_async()
            .await;
        let _docs = server
            .mock("GET", "/content/search/scopus")
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                "AU-ID(57190000001) AND PUBYEAR IS 2024".into(),
            ))
            .with_body(
                json!({"search-results": {
                    "opensearch:totalResults": "2",
                    "entry": [
                        {"dc:title": "Radar imaging in cluttered scenes",
                         "prism:coverDate": "2024-03-01",
                         "prism:publicationName": "Turkish Journal of Physics",
                         "prism:aggregationType": "Journal"},
                        {"dc:title": "Compact antenna design for drones",
                         "prism:coverDate": "2024-06-01",
                         "prism:publicationName": "Proc. European Radar Conference",
                         "prism:aggregationType": "Conference Proceeding"}
                    ]}})
                .to_string(),
            )
            .create_async()
            .await;

        let names = vec!["Prof. Dr. Ali Veli".to_string(), "Hic Yok".to_string()];
        let report = survey(&server.url())
            .with_honorifics(vec!["Prof.".into(), "Dr.".into()])
            .run(&names, 2024)
            .await
            .unwrap();

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].author_id.as_deref(), Some("57190000001"));
        assert_eq!(report.rows[0].counts.national_articles, 1);
        assert_eq!(report.rows[0].counts.international_conferences, 1);
        assert!(report.rows[1].author_id.is_none());
        assert!(report.rows[1].error.is_none());
        assert_eq!(report.totals.total(), 2);
    }
}
