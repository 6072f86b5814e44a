//! The three ways of finding a person's identifier inside a source.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use scraper::{Html, Selector};
use serde_json::Value;

use super::PersonQuery;
use crate::error::{EngineError, Result};
use crate::http::RateLimitedClient;
use crate::render::RenderPool;
use crate::text::{fold, mentions_name, squash_whitespace};

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Regexes whose first capture group is a profile identifier.
#[derive(Debug, Clone)]
pub struct ProfilePatterns(Vec<Regex>);

impl ProfilePatterns {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self(compiled))
    }

    pub fn capture(&self, href: &str) -> Option<String> {
        self.0.iter().find_map(|re| {
            re.captures(href)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })
    }
}

fn anchors(html: &str) -> Vec<(String, String)> {
    let doc = Html::parse_document(html);
    doc.select(&ANCHOR)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            Some((href.to_string(), squash_whitespace(&a.text().collect::<String>())))
        })
        .collect()
}

// ─── Author search API ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorCandidate {
    pub id: String,
    pub name: String,
    pub affiliations: Vec<String>,
}

/// Where a department roster comes from: an affiliation id or an institution
/// name, optionally narrowed by a department keyword.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AffiliationQuery {
    pub institution: Option<String>,
    pub affiliation_id: Option<String>,
    pub department: Option<String>,
}

impl AffiliationQuery {
    /// Search expression, `None` without an institution or affiliation id.
    pub fn expression(&self) -> Option<String> {
        let present = |v: &Option<String>| {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
        };
        let base = match (present(&self.affiliation_id), present(&self.institution)) {
            (Some(id), _) => format!("AF-ID({id})"),
            (None, Some(name)) => format!("AFFIL(\"{name}\")"),
            (None, None) => return None,
        };
        Some(match present(&self.department) {
            Some(department) => format!("{base} AND AFFIL(\"{department}\")"),
            None => base,
        })
    }
}

/// Name-keyed author search of the citation index.
pub struct AuthorSearchApi {
    client: Arc<RateLimitedClient>,
    api_base: String,
    api_key: Option<String>,
    count: u32,
}

impl AuthorSearchApi {
    pub fn new(
        client: Arc<RateLimitedClient>,
        api_base: &str,
        api_key: Option<String>,
        count: u32,
    ) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            count,
        }
    }

    pub async fn candidates(&self, query: &PersonQuery) -> Result<Vec<AuthorCandidate>> {
        let (Some(first), Some(last)) = (query.first_name(), query.last_name()) else {
            return Ok(Vec::new());
        };
        let expr = format!("AUTHLASTNAME({last}) and AUTHFIRST({first})");
        self.search(&expr, self.count).await
    }

    /// Authors currently affiliated with an institution, optionally narrowed to a
    /// department. Empty when `roster` names no institution.
    pub async fn by_affiliation(
        &self,
        roster: &AffiliationQuery,
        count: u32,
    ) -> Result<Vec<AuthorCandidate>> {
        let Some(expr) = roster.expression() else {
            return Ok(Vec::new());
        };
        let mut seen = std::collections::HashSet::new();
        let authors: Vec<AuthorCandidate> = self
            .search(&expr, count)
            .await?
            .into_iter()
            .filter(|a| !a.name.is_empty() && seen.insert(a.id.clone()))
            .collect();
        tracing::info!(query = %expr, count = authors.len(), "affiliation roster");
        Ok(authors)
    }

    async fn search(&self, expr: &str, count: u32) -> Result<Vec<AuthorCandidate>> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(EngineError::MissingCredential("citation index API key"))?;
        let url = format!(
            "{}/content/search/author?query={}&count={count}",
            self.api_base,
            urlencoding::encode(expr),
        );
        let json: Value = self
            .client
            .get_json_with_headers(&url, api_headers(key)?)
            .await?;

        let entries = match &json["search-results"]["entry"] {
            Value::Array(items) => items.clone(),
            Value::Object(_) => vec![json["search-results"]["entry"].clone()],
            _ => Vec::new(),
        };
        Ok(entries.iter().filter_map(parse_author).collect())
    }

    pub async fn find(&self, query: &PersonQuery) -> Result<Option<String>> {
        let candidates = self.candidates(query).await?;
        Ok(select_candidate(&candidates, query).map(|c| c.id.clone()))
    }
}

pub(crate) fn api_headers(key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-els-apikey",
        HeaderValue::from_str(key)
            .map_err(|_| EngineError::Parse("API key is not a valid header value".into()))?,
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    Ok(headers)
}

fn parse_author(entry: &Value) -> Option<AuthorCandidate> {
    if entry.get("error").is_some() {
        return None;
    }
    let id = entry["dc:identifier"]
        .as_str()?
        .trim_start_matches("AUTHOR_ID:")
        .trim()
        .to_string();
    if id.is_empty() {
        return None;
    }

    let name_part = |field: &str| {
        let preferred = &entry["preferred-name"];
        preferred[field]
            .as_str()
            .or_else(|| preferred[format!("ce:{field}").as_str()].as_str())
            .unwrap_or("")
    };
    let given = name_part("given-name");
    let surname = name_part("surname");
    let name = squash_whitespace(&format!("{given} {surname}"));

    let affiliation = &entry["affiliation-current"];
    let affiliations = match affiliation {
        Value::Array(items) => items
            .iter()
            .filter_map(|a| a["affiliation-name"].as_str())
            .map(str::to_string)
            .collect(),
        Value::Object(_) => affiliation["affiliation-name"]
            .as_str()
            .map(|s| vec![s.to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    Some(AuthorCandidate {
        id,
        name,
        affiliations,
    })
}

/// Prefers candidates whose affiliation mentions one of the query's affiliation
/// terms, ranked by name similarity with ties going to the earlier candidate.
/// With no affiliation hit the first candidate wins.
pub fn select_candidate<'a>(
    candidates: &'a [AuthorCandidate],
    query: &PersonQuery,
) -> Option<&'a AuthorCandidate> {
    let terms: Vec<String> = query
        .affiliation_terms()
        .iter()
        .map(|t| fold(t))
        .filter(|t| !t.is_empty())
        .collect();

    let affiliated: Vec<&AuthorCandidate> = candidates
        .iter()
        .filter(|c| {
            c.affiliations
                .iter()
                .any(|a| terms.iter().any(|t| fold(a).contains(t.as_str())))
        })
        .collect();

    if affiliated.is_empty() {
        return candidates.first();
    }

    let wanted = fold(&query.name);
    let mut best: Option<(&AuthorCandidate, f64)> = None;
    for candidate in affiliated {
        let score = strsim::jaro_winkler(&fold(&candidate.name), &wanted);
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }
    best.map(|(c, _)| c)
}

// ─── Restricted web search ───────────────────────────────────────────────────

/// `site:`-scoped web search; the first result linking to a profile wins.
pub struct SiteSearch {
    client: Arc<RateLimitedClient>,
    endpoint: String,
    query_param: String,
    domain: String,
    patterns: ProfilePatterns,
}

impl SiteSearch {
    pub fn new(
        client: Arc<RateLimitedClient>,
        endpoint: &str,
        query_param: &str,
        domain: &str,
        patterns: ProfilePatterns,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            query_param: query_param.to_string(),
            domain: domain.to_string(),
            patterns,
        }
    }

    pub async fn find(&self, query: &PersonQuery) -> Result<Option<String>> {
        if query.name.is_empty() {
            return Ok(None);
        }
        let q = format!("site:{} \"{}\"", self.domain, query.name);
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        let url = format!(
            "{}{separator}{}={}",
            self.endpoint,
            self.query_param,
            urlencoding::encode(&q)
        );
        let html = self.client.get(&url).await?;

        for (href, _) in anchors(&html) {
            let target = unwrap_redirect(&href);
            if !target.contains(&self.domain) {
                continue;
            }
            if let Some(id) = self.patterns.capture(&target) {
                tracing::debug!(domain = %self.domain, %target, "site search hit");
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}

/// Search engines wrap result links (`/l/?uddg=...`, `/url?q=...`).
fn unwrap_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("https://search.invalid{href}")
    } else {
        href.to_string()
    };
    if let Ok(url) = Url::parse(&absolute) {
        for (key, value) in url.query_pairs() {
            if (key == "uddg" || key == "q") && value.starts_with("http") {
                return value.into_owned();
            }
        }
    }
    href.to_string()
}

// ─── Internal search UI ──────────────────────────────────────────────────────

/// The source's own search page, driven through a render session.
pub struct InternalSearch {
    pool: Arc<RenderPool>,
    search_url: String,
    tab: Option<String>,
    patterns: ProfilePatterns,
}

impl InternalSearch {
    /// `search_url` contains a `{query}` placeholder.
    pub fn new(
        pool: Arc<RenderPool>,
        search_url: &str,
        tab: Option<String>,
        patterns: ProfilePatterns,
    ) -> Self {
        Self {
            pool,
            search_url: search_url.to_string(),
            tab,
            patterns,
        }
    }

    pub async fn find(&self, query: &PersonQuery) -> Result<Option<String>> {
        if query.name.is_empty() {
            return Ok(None);
        }
        let url = self
            .search_url
            .replace("{query}", &urlencoding::encode(&query.name));

        let html = {
            let mut session = self.pool.acquire().await?;
            session.navigate(&url).await?;
            if let Some(tab) = &self.tab
                && !session.activate_link(tab).await?
            {
                tracing::debug!(tab = %tab, "search tab not present, reading current results");
            }
            session.content().await?
        };

        Ok(anchors(&html).into_iter().find_map(|(href, text)| {
            let id = self.patterns.capture(&href)?;
            if mentions_name(&text, &query.name) {
                Some(id)
            } else {
                tracing::debug!(candidate = %text, wanted = %query.name, "name mismatch");
                None
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::render::testing::{Script, ScriptedRenderer};
    use mockito::{Matcher, Server};

    fn client() -> Arc<RateLimitedClient> {
        Arc::new(
            RateLimitedClient::new(
                "test",
                Duration::from_millis(0),
                0,
                "pubrecon-test",
                Duration::from_secs(5),
            )
            .unwrap(),
        )
    }

    fn candidate(id: &str, name: &str, affiliation: &str) -> AuthorCandidate {
        AuthorCandidate {
            id: id.into(),
            name: name.into(),
            affiliations: vec![affiliation.into()],
        }
    }

    #[test]
    fn test_profile_patterns_capture_first_group() {
        let patterns =
            ProfilePatterns::new(&[r"Detay/(\d+)".into(), r"authorId=([A-Za-z0-9]+)".into()]).unwrap();
        assert_eq!(
            patterns.capture("https://akademik.yok.gov.tr/AkademikArama/Akademisyen/Detay/98765"),
            Some("98765".into())
        );
        assert_eq!(
            patterns.capture("/view/viewAuthor.jsp?authorId=AB12CD"),
            Some("AB12CD".into())
        );
        assert_eq!(patterns.capture("/about"), None);
        assert!(ProfilePatterns::new(&["(".into()]).is_err());
    }

    #[test]
    fn test_select_candidate_prefers_affiliation() {
        let candidates = vec![
            candidate("1", "Ali Veli", "Bilkent University"),
            candidate("2", "A. Veli", "Middle East Technical University"),
            candidate("3", "Ali Veli", "Middle East Technical University"),
        ];
        let query = PersonQuery::new("Prof. Dr. Ali Veli", &["Prof.".into(), "Dr.".into()])
            .with_affiliation_keywords(vec!["Middle East Technical".into()]);
        assert_eq!(select_candidate(&candidates, &query).unwrap().id, "3");

        let no_match = PersonQuery::new("Ali Veli", &[])
            .with_affiliation_keywords(vec!["Hacettepe".into()]);
        assert_eq!(select_candidate(&candidates, &no_match).unwrap().id, "1");
        assert!(select_candidate(&[], &no_match).is_none());
    }

    #[test]
    fn test_unwrap_redirect() {
        assert_eq!(
            unwrap_redirect("//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.scopus.com%2Fauthid%2Fdetail.uri%3FauthorId%3D123&rut=x"),
            "https://www.scopus.com/authid/detail.uri?authorId=123"
        );
        assert_eq!(
            unwrap_redirect("/url?q=https://ieeexplore.ieee.org/author/42&sa=U"),
            "https://ieeexplore.ieee.org/author/42"
        );
        assert_eq!(unwrap_redirect("https://example.org/x"), "https://example.org/x");
    }

    #[tokio::test]
    async fn test_author_search_api() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/content/search/author")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "AUTHLASTNAME(Veli) and AUTHFIRST(Ali)".into()),
                Matcher::UrlEncoded("count".into(), "10".into()),
            ]))
            .match_header("x-els-apikey", "secret")
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"search-results": {"entry": [
                    {"dc:identifier": "AUTHOR_ID:111",
                     "preferred-name": {"surname": "Veli", "given-name": "Ali"},
                     "affiliation-current": {"affiliation-name": "Bilkent University"}},
                    {"dc:identifier": "AUTHOR_ID:222",
                     "preferred-name": {"surname": "Veli", "given-name": "Ali"},
                     "affiliation-current": [{"affiliation-name": "Orta Dogu Teknik Universitesi"}]}
                ]}}"#,
            )
            .create_async()
            .await;

        let api = AuthorSearchApi::new(client(), &server.url(), Some("secret".into()), 10);
        let query = PersonQuery::new("Ali Veli", &[]).with_institution(Some("Orta Doğu Teknik".into()));
        assert_eq!(api.find(&query).await.unwrap(), Some("222".into()));

        let without_key = AuthorSearchApi::new(client(), &server.url(), None, 10);
        assert!(matches!(
            without_key.find(&query).await,
            Err(EngineError::MissingCredential(_))
        ));
    }

    #[test]
    fn test_affiliation_expression() {
        let by_name = AffiliationQuery {
            institution: Some("Middle East Technical University".into()),
            department: Some("Electrical".into()),
            ..Default::default()
        };
        assert_eq!(
            by_name.expression().as_deref(),
            Some(r#"AFFIL("Middle East Technical University") AND AFFIL("Electrical")"#)
        );

        let by_id = AffiliationQuery {
            affiliation_id: Some("60000123".into()),
            ..by_name
        };
        assert_eq!(
            by_id.expression().as_deref(),
            Some(r#"AF-ID(60000123) AND AFFIL("Electrical")"#)
        );

        let blank = AffiliationQuery {
            institution: Some("  ".into()),
            ..Default::default()
        };
        assert!(blank.expression().is_none());
    }

    #[tokio::test]
    async fn test_by_affiliation_lists_named_authors_once() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/content/search/author")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), r#"AF-ID(60000123) AND AFFIL("Electrical")"#.into()),
                Matcher::UrlEncoded("count".into(), "25".into()),
            ]))
            .with_body(
                r#"{"search-results": {"entry": [
                    {"dc:identifier": "AUTHOR_ID:111",
                     "preferred-name": {"ce:surname": "Veli", "ce:given-name": "Ali"}},
                    {"dc:identifier": "AUTHOR_ID:111",
                     "preferred-name": {"ce:surname": "Veli", "ce:given-name": "Ali"}},
                    {"dc:identifier": "AUTHOR_ID:333",
                     "preferred-name": {"ce:surname": "Kaya", "ce:given-name": "Ayşe"}},
                    {"error": "partial result"}
                ]}}"#,
            )
            .create_async()
            .await;

        let api = AuthorSearchApi::new(client(), &server.url(), Some("k".into()), 10);
        let roster = AffiliationQuery {
            affiliation_id: Some("60000123".into()),
            department: Some("Electrical".into()),
            ..Default::default()
        };
        let authors = api.by_affiliation(&roster, 25).await.unwrap();
        let names: Vec<(&str, &str)> = authors.iter().map(|a| (a.id.as_str(), a.name.as_str())).collect();
        assert_eq!(names, vec![("111", "Ali Veli"), ("333", "Ayşe Kaya")]);

        assert!(api.by_affiliation(&AffiliationQuery::default(), 25).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_site_search_takes_first_profile_link() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/html/")
            .match_query(Matcher::UrlEncoded(
                "q".into(),
                "site:akademik.yok.gov.tr \"Ali Veli\"".into(),
            ))
            .with_body(
                r#"<a href="https://example.org/Detay/1">elsewhere</a>
                   <a href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fakademik.yok.gov.tr%2FAkademikArama%2FAkademisyen%2FDetay%2F555">Ali Veli</a>
                   <a href="https://akademik.yok.gov.tr/AkademikArama/Akademisyen/Detay/777">Ali Veli</a>"#,
            )
            .create_async()
            .await;

        let search = SiteSearch::new(
            client(),
            &format!("{}/html/", server.url()),
            "q",
            "akademik.yok.gov.tr",
            ProfilePatterns::new(&[r"Detay/(\d+)".into()]).unwrap(),
        );
        let query = PersonQuery::new("Ali Veli", &[]);
        assert_eq!(search.find(&query).await.unwrap(), Some("555".into()));
    }

    #[tokio::test]
    async fn test_internal_search_checks_link_text() {
        let search_url = "https://reg.test/search?q=Ali%20Veli";
        let script = Script::default()
            .page(search_url, &[r#"<a href="/people">Akademisyenler</a>"#])
            .page(
                "https://reg.test/people",
                &[r#"<a href="/viewAuthor.jsp?authorId=X1">Ali Yılmaz</a>
                    <a href="/viewAuthor.jsp?authorId=X2">PROF. DR. ALİ VELİ</a>"#],
            )
            .link(search_url, "Akademisyenler", "https://reg.test/people");
        let pool = Arc::new(RenderPool::new(
            Arc::new(ScriptedRenderer::new(script)),
            Duration::from_secs(5),
        ));

        let search = InternalSearch::new(
            pool.clone(),
            "https://reg.test/search?q={query}",
            Some("Akademisyenler".into()),
            ProfilePatterns::new(&[r"authorId=([A-Za-z0-9]+)".into()]).unwrap(),
        );
        let query = PersonQuery::new("Prof. Dr. Ali Veli", &["Prof.".into(), "Dr.".into()]);
        assert_eq!(search.find(&query).await.unwrap(), Some("X2".into()));
        assert_eq!(pool.available(), 1);
    }
}
