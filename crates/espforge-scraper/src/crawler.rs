//! Crawl orchestration
//!
//! A crawl runs on one background task:
//! 1. Fetch the component listing page
//! 2. Discover component page links
//! 3. For each link, sequentially: fetch, extract, store, report
//! 4. Wait a fixed delay between page requests
//!
//! Cancellation is cooperative and checked before each page and each
//! delay. A panic inside the crawl task ends the crawl as failed.

use espforge_core::{Component, ComponentStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::extract::extract;
use crate::fetch::{FetchError, PageFetcher};
use crate::links::discover_links;

pub const DEFAULT_LISTING_URL: &str = "https://esphome.io/components/";
pub const DEFAULT_COMPONENTS_ROOT: &str = "/components/";
pub const DEFAULT_MAX_COMPONENTS: usize = 100;
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("A crawl is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Page {0} has no content")]
    EmptyPage(String),
    #[error("Crawl task failed: {0}")]
    Task(String),
}

/// Parameters of one crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub listing_url: String,
    /// Path prefix component pages live under
    pub components_root: String,
    pub max_components: usize,
    /// Pause between page requests
    pub request_delay: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            components_root: DEFAULT_COMPONENTS_ROOT.to_string(),
            max_components: DEFAULT_MAX_COMPONENTS,
            request_delay: DEFAULT_REQUEST_DELAY,
        }
    }
}

/// Crawl lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CrawlState {
    Idle,
    Running,
    Completed { scraped: usize, failed: usize },
    /// Stopped on request; components stored so far are kept
    Canceled { scraped: usize, failed: usize },
    Failed { error: String },
}

impl CrawlState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CrawlState::Completed { .. } | CrawlState::Canceled { .. } | CrawlState::Failed { .. }
        )
    }
}

/// Progress notifications for observers
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    Log(String),
    Status(String),
    Progress {
        current: usize,
        total: usize,
        label: String,
    },
    ComponentFound {
        name: String,
        component: Component,
    },
    Finished {
        scraped: usize,
        failed: usize,
    },
    Error {
        message: String,
    },
}

/// Requests cancellation of the running crawl
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Crawler service
pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn ComponentStore>,
    state: Arc<RwLock<CrawlState>>,
    /// Components seen during crawls, keyed by catalog key
    catalog: Arc<RwLock<HashMap<String, Component>>>,
    cancel: CancelHandle,
    event_tx: broadcast::Sender<CrawlEvent>,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, store: Arc<dyn ComponentStore>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            fetcher,
            store,
            state: Arc::new(RwLock::new(CrawlState::Idle)),
            catalog: Arc::new(RwLock::new(HashMap::new())),
            cancel: CancelHandle::default(),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.event_tx.subscribe()
    }

    pub async fn state(&self) -> CrawlState {
        self.state.read().await.clone()
    }

    /// Request cancellation; takes effect before the next page
    pub fn cancel(&self) {
        if !self.cancel.is_canceled() {
            info!("Crawl cancellation requested");
            let _ = self
                .event_tx
                .send(CrawlEvent::Log("Crawl cancellation requested".to_string()));
        }
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub async fn component_count(&self) -> usize {
        self.catalog.read().await.len()
    }

    pub async fn component(&self, key: &str) -> Option<Component> {
        self.catalog.read().await.get(key).cloned()
    }

    pub async fn components(&self) -> Vec<Component> {
        self.catalog.read().await.values().cloned().collect()
    }

    /// Start a crawl on a background task
    ///
    /// Fails if a crawl is already running. Any earlier cancellation request
    /// is cleared. The returned handle resolves to the final state.
    pub async fn start(&self, config: CrawlConfig) -> Result<JoinHandle<CrawlState>, CrawlError> {
        {
            let mut state = self.state.write().await;
            if *state == CrawlState::Running {
                return Err(CrawlError::AlreadyRunning);
            }
            *state = CrawlState::Running;
        }
        self.cancel.reset();

        let fetcher = self.fetcher.clone();
        let store = self.store.clone();
        let state = self.state.clone();
        let catalog = self.catalog.clone();
        let cancel = self.cancel.clone();
        let event_tx = self.event_tx.clone();

        let crawl = tokio::spawn(async move {
            Self::run_crawl(&fetcher, &store, &catalog, &cancel, &event_tx, &config).await
        });

        // The crawl runs on its own task so a panic still ends in a terminal state
        Ok(tokio::spawn(async move {
            let final_state = match crawl.await {
                Ok(final_state) => final_state,
                Err(e) => {
                    error!(error = %e, "Crawl task aborted");
                    CrawlState::Failed {
                        error: format!("Crawl task aborted: {}", e),
                    }
                }
            };
            *state.write().await = final_state.clone();
            final_state
        }))
    }

    /// Run a crawl to completion
    pub async fn run(&self, config: CrawlConfig) -> Result<CrawlState, CrawlError> {
        let handle = self.start(config).await?;
        handle.await.map_err(|e| CrawlError::Task(e.to_string()))
    }

    async fn run_crawl(
        fetcher: &Arc<dyn PageFetcher>,
        store: &Arc<dyn ComponentStore>,
        catalog: &Arc<RwLock<HashMap<String, Component>>>,
        cancel: &CancelHandle,
        event_tx: &broadcast::Sender<CrawlEvent>,
        config: &CrawlConfig,
    ) -> CrawlState {
        let emit = |event: CrawlEvent| {
            let _ = event_tx.send(event);
        };
        let fail = |message: String| {
            error!(error = %message, "Crawl failed");
            let _ = event_tx.send(CrawlEvent::Error {
                message: message.clone(),
            });
            CrawlState::Failed { error: message }
        };

        emit(CrawlEvent::Status("Fetching component listing...".to_string()));
        info!(url = %config.listing_url, "Starting component crawl");

        let listing = match fetcher.fetch_markup(&config.listing_url).await {
            Ok(markup) => markup,
            Err(e) => return fail(format!("Failed to fetch listing page: {}", e)),
        };

        emit(CrawlEvent::Status("Extracting component links...".to_string()));
        let links = discover_links(
            &listing,
            &config.listing_url,
            &config.components_root,
            config.max_components,
        );
        if links.is_empty() {
            return fail("No component links found".to_string());
        }

        let total = links.len();
        info!(count = total, "Found component pages");
        emit(CrawlEvent::Log(format!("Found {} components to crawl", total)));

        let canceled = |scraped: usize, failed: usize| {
            info!(scraped = scraped, failed = failed, "Crawl canceled");
            emit(CrawlEvent::Log("Crawl canceled".to_string()));
            CrawlState::Canceled { scraped, failed }
        };

        let mut scraped = 0;
        let mut failed = 0;

        for (i, link) in links.iter().enumerate() {
            // Pause between pages only, never after the last one
            if i > 0 {
                if cancel.is_canceled() {
                    return canceled(scraped, failed);
                }
                tokio::time::sleep(config.request_delay).await;
            }
            if cancel.is_canceled() {
                return canceled(scraped, failed);
            }

            emit(CrawlEvent::Progress {
                current: i + 1,
                total,
                label: format!("Scraping {}...", link.name),
            });
            emit(CrawlEvent::Status(format!(
                "Scraping component {}/{}: {}",
                i + 1,
                total,
                link.name
            )));

            match Self::crawl_page(fetcher.as_ref(), &link.url).await {
                Ok(component) => {
                    let key = component.catalog_key();
                    catalog.write().await.insert(key.clone(), component.clone());

                    if store.save_component(&component) {
                        scraped += 1;
                        debug!(key = %key, "Stored component");
                        emit(CrawlEvent::ComponentFound {
                            name: link.name.clone(),
                            component,
                        });
                    } else {
                        failed += 1;
                        emit(CrawlEvent::Log(format!("Failed to store {}", key)));
                    }
                }
                Err(e) => {
                    failed += 1;
                    warn!(url = %link.url, error = %e, "Failed to scrape component page");
                    emit(CrawlEvent::Log(format!("Error scraping {}: {}", link.url, e)));
                }
            }
        }

        info!(scraped = scraped, failed = failed, "Crawl completed");
        emit(CrawlEvent::Status(format!(
            "Crawl completed. Found {} components, {} failed.",
            scraped, failed
        )));
        emit(CrawlEvent::Finished { scraped, failed });
        CrawlState::Completed { scraped, failed }
    }

    async fn crawl_page(fetcher: &dyn PageFetcher, url: &str) -> Result<Component, CrawlError> {
        let page = fetcher.fetch_page(url).await?;
        if page.is_empty() {
            return Err(CrawlError::EmptyPage(url.to_string()));
        }
        Ok(extract(
            page.markup.as_deref(),
            page.plain_text.as_deref(),
            url,
        ))
    }
}
