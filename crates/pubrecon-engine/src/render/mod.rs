//! Page rendering behind a one-session pool.
//!
//! A [`RenderSession`] owns a driver and a pool permit; dropping it shuts the
//! driver down and frees the slot, including on error paths.

mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::error::{EngineError, Result};

pub use http::{HttpDriver, HttpRenderer};

/// One live browsing context.
#[async_trait]
pub trait BrowserDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Markup of everything loaded so far for the current listing.
    async fn content(&mut self) -> Result<String>;

    /// Follows the first link whose text contains `label`. `Ok(false)` if none exists.
    async fn activate_link(&mut self, label: &str) -> Result<bool>;

    /// Triggers the next page or scroll. `Ok(false)` when there is nothing left to load.
    async fn load_more(&mut self) -> Result<bool>;

    fn current_url(&self) -> Option<String>;

    fn shutdown(&mut self) {}
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserDriver>>;
}

pub struct RenderPool {
    renderer: Arc<dyn Renderer>,
    permits: Arc<Semaphore>,
    page_timeout: Duration,
}

impl RenderPool {
    /// A pool that allows a single active session.
    pub fn new(renderer: Arc<dyn Renderer>, page_timeout: Duration) -> Self {
        Self {
            renderer,
            permits: Arc::new(Semaphore::new(1)),
            page_timeout,
        }
    }

    pub async fn acquire(&self) -> Result<RenderSession> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Render("render pool closed".to_string()))?;
        let driver = bounded(self.page_timeout, "launch", self.renderer.launch()).await?;
        Ok(RenderSession {
            driver,
            page_timeout: self.page_timeout,
            _permit: permit,
        })
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

async fn bounded<T>(
    limit: Duration,
    what: &str,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    timeout(limit, fut)
        .await
        .map_err(|_| EngineError::Timeout(limit.as_secs(), what.to_string()))?
}

pub struct RenderSession {
    driver: Box<dyn BrowserDriver>,
    page_timeout: Duration,
    _permit: OwnedSemaphorePermit,
}

impl RenderSession {
    pub async fn navigate(&mut self, url: &str) -> Result<()> {
        tracing::debug!(url, "navigate");
        bounded(self.page_timeout, url, self.driver.navigate(url)).await
    }

    pub async fn content(&mut self) -> Result<String> {
        bounded(self.page_timeout, "content", self.driver.content()).await
    }

    pub async fn activate_link(&mut self, label: &str) -> Result<bool> {
        bounded(self.page_timeout, label, self.driver.activate_link(label)).await
    }

    pub async fn load_more(&mut self) -> Result<bool> {
        bounded(self.page_timeout, "load more", self.driver.load_more()).await
    }

    pub fn current_url(&self) -> Option<String> {
        self.driver.current_url()
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        self.driver.shutdown();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadLimits {
    pub max_triggers: u32,
    pub stuck_limit: u32,
}

impl Default for LoadLimits {
    fn default() -> Self {
        Self {
            max_triggers: 10,
            stuck_limit: 2,
        }
    }
}

#[derive(Debug)]
pub struct LoadedListing {
    pub html: String,
    pub items: usize,
    pub triggers: u32,
}

/// Keeps triggering `load_more` until `stuck_limit` consecutive triggers add no
/// items, nothing more can be loaded, or `max_triggers` is reached.
pub async fn load_until_stable<F>(
    session: &mut RenderSession,
    limits: LoadLimits,
    count_items: F,
) -> Result<LoadedListing>
where
    F: Fn(&str) -> usize,
{
    let mut html = session.content().await?;
    let mut items = count_items(&html);
    let mut stuck = 0u32;
    let mut triggers = 0u32;

    while triggers < limits.max_triggers && stuck < limits.stuck_limit {
        let advanced = match session.load_more().await {
            Ok(advanced) => advanced,
            Err(e) => {
                tracing::warn!(error = %e, "load-more trigger failed, keeping what was loaded");
                false
            }
        };
        triggers += 1;
        if !advanced {
            break;
        }

        html = session.content().await?;
        let now = count_items(&html);
        if now > items {
            items = now;
            stuck = 0;
        } else {
            stuck += 1;
        }
    }

    tracing::debug!(items, triggers, "listing loaded");
    Ok(LoadedListing {
        html,
        items,
        triggers,
    })
}
