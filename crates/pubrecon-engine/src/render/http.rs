use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{Html, Selector};

use super::{BrowserDriver, Renderer};
use crate::error::{EngineError, Result};
use crate::http::RateLimitedClient;
use crate::text::squash_whitespace;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));
static REL_NEXT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[rel~=next][href], link[rel~=next][href]").expect("valid selector"));

const NEXT_LABELS: &[&str] = &["next", "sonraki", "›", "»", "more", "daha fazla"];

/// Renderer for server-rendered sites: "scrolling" follows next-page links and
/// appends each page to the current listing.
pub struct HttpRenderer {
    client: Arc<RateLimitedClient>,
}

impl HttpRenderer {
    pub fn new(client: Arc<RateLimitedClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn launch(&self) -> Result<Box<dyn BrowserDriver>> {
        Ok(Box::new(HttpDriver {
            client: self.client.clone(),
            url: None,
            pages: Vec::new(),
            visited: HashSet::new(),
        }))
    }
}

pub struct HttpDriver {
    client: Arc<RateLimitedClient>,
    url: Option<Url>,
    pages: Vec<String>,
    visited: HashSet<String>,
}

impl HttpDriver {
    fn resolve(&self, href: &str) -> Result<Url> {
        let parsed = match &self.url {
            Some(base) => base.join(href),
            None => Url::parse(href),
        };
        parsed.map_err(|e| EngineError::Render(format!("bad link '{href}': {e}")))
    }

    fn last_page(&self) -> Option<&str> {
        self.pages.last().map(String::as_str)
    }
}

fn link_with_label(html: &str, label: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let needle = label.to_lowercase();
    doc.select(&ANCHOR)
        .find(|a| {
            squash_whitespace(&a.text().collect::<String>())
                .to_lowercase()
                .contains(&needle)
        })
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

fn next_page_link(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    if let Some(href) = doc
        .select(&REL_NEXT)
        .find_map(|el| el.value().attr("href"))
    {
        return Some(href.to_string());
    }
    doc.select(&ANCHOR)
        .find(|a| {
            let text = squash_whitespace(&a.text().collect::<String>()).to_lowercase();
            NEXT_LABELS.contains(&text.as_str())
        })
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

#[async_trait]
impl BrowserDriver for HttpDriver {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let target = self.resolve(url)?;
        let body = self.client.get(target.as_str()).await?;
        self.visited.clear();
        self.visited.insert(target.to_string());
        self.pages = vec![body];
        self.url = Some(target);
        Ok(())
    }

    async fn content(&mut self) -> Result<String> {
        if self.pages.is_empty() {
            return Err(EngineError::Render("no page loaded".to_string()));
        }
        Ok(self.pages.join("\n"))
    }

    async fn activate_link(&mut self, label: &str) -> Result<bool> {
        let Some(href) = self.last_page().and_then(|html| link_with_label(html, label)) else {
            return Ok(false);
        };
        let target = self.resolve(&href)?;
        self.navigate(target.as_str()).await?;
        Ok(true)
    }

    async fn load_more(&mut self) -> Result<bool> {
        let Some(href) = self.last_page().and_then(next_page_link) else {
            return Ok(false);
        };
        let target = self.resolve(&href)?;
        if !self.visited.insert(target.to_string()) {
            return Ok(false);
        }
        let body = self.client.get(target.as_str()).await?;
        self.pages.push(body);
        Ok(true)
    }

    fn current_url(&self) -> Option<String> {
        self.url.as_ref().map(Url::to_string)
    }
}
