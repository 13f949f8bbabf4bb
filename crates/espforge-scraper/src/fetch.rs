//! Page fetching
//!
//! The crawler only sees the [`PageFetcher`] trait. [`HttpFetcher`] talks to
//! the documentation site; [`StaticFetcher`] serves pages from memory.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::text::plain_text;

pub const DEFAULT_USER_AGENT: &str = concat!("espforge/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },
    #[error("No page at {0}")]
    NotFound(String),
}

/// Both representations of one page; either may be missing
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub markup: Option<String>,
    pub plain_text: Option<String>,
}

impl FetchedPage {
    /// No usable content in either representation
    pub fn is_empty(&self) -> bool {
        let blank = |s: &Option<String>| s.as_deref().map_or(true, |s| s.trim().is_empty());
        blank(&self.markup) && blank(&self.plain_text)
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_markup(&self, url: &str) -> Result<String, FetchError>;

    /// Main-content text of the page, `None` when unavailable
    async fn fetch_plain_text(&self, url: &str) -> Option<String>;

    /// Fetch both representations
    ///
    /// Fails only when neither is available.
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let markup = self.fetch_markup(url).await;
        let plain_text = self.fetch_plain_text(url).await;
        match (markup, plain_text) {
            (Err(e), None) => Err(e),
            (markup, plain_text) => {
                if let Err(e) = &markup {
                    warn!(url = %url, error = %e, "Markup unavailable, using plain text only");
                }
                Ok(FetchedPage {
                    markup: markup.ok(),
                    plain_text,
                })
            }
        }
    }
}

/// Fetcher backed by an HTTP client
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_markup(&self, url: &str) -> Result<String, FetchError> {
        debug!(url = %url, "Fetching page");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "Page fetch failed");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })
    }

    async fn fetch_plain_text(&self, url: &str) -> Option<String> {
        let markup = self.fetch_markup(url).await.ok()?;
        Some(plain_text(&markup))
    }

    // One request per page; the text is derived from the same markup
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let markup = self.fetch_markup(url).await?;
        let text = plain_text(&markup);
        Ok(FetchedPage {
            plain_text: (!text.trim().is_empty()).then_some(text),
            markup: Some(markup),
        })
    }
}

/// Serves a fixed set of pages from memory and records every request
#[derive(Debug, Default)]
pub struct StaticFetcher {
    pages: HashMap<String, String>,
    texts: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
    markup_fetches: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, markup: impl Into<String>) -> Self {
        self.pages.insert(url.into(), markup.into());
        self
    }

    /// Override the plain text served for a URL
    pub fn with_text(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.texts.insert(url.into(), text.into());
        self
    }

    /// URLs requested through `fetch_markup`, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn markup_fetches(&self) -> usize {
        self.markup_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch_markup(&self, url: &str) -> Result<String, FetchError> {
        self.markup_fetches.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }

    async fn fetch_plain_text(&self, url: &str) -> Option<String> {
        if let Some(text) = self.texts.get(url) {
            return Some(text.clone());
        }
        self.pages.get(url).map(|markup| plain_text(markup))
    }
}
