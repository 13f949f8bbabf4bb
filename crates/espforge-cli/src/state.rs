//! Application state shared by the commands

use anyhow::{Context, Result};
use espforge_core::{CatalogStore, Component, Project};
use espforge_scraper::{Crawler, HttpFetcher, PageFetcher};
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;

pub struct AppState {
    pub config: Config,
    /// Components, documents and projects on disk
    pub store: Arc<CatalogStore>,
    pub crawler: Crawler,
}

impl AppState {
    /// Open the store and build an HTTP-backed crawler
    pub fn new(config: Config) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.crawler.timeout(), &config.crawler.user_agent)
            .context("Failed to build HTTP client")?;
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    pub fn with_fetcher(config: Config, fetcher: Arc<dyn PageFetcher>) -> Result<Self> {
        let store = Arc::new(
            CatalogStore::open(&config.store.path)
                .with_context(|| format!("Failed to open store at {}", config.store.path.display()))?,
        );
        debug!(
            path = %config.store.path.display(),
            components = store.component_count(),
            "Store ready"
        );
        let crawler = Crawler::new(fetcher, store.clone());

        Ok(Self {
            config,
            store,
            crawler,
        })
    }

    /// Catalog component by key, preferring this session's crawl results
    pub async fn component(&self, key: &str) -> Result<Component> {
        if let Some(component) = self.crawler.component(key).await {
            return Ok(component);
        }
        self.store
            .get_component(key)
            .with_context(|| format!("Unknown component '{}'", key))
    }

    pub fn project(&self, name: &str) -> Result<Project> {
        self.store
            .load_project(name)
            .with_context(|| format!("Unknown project '{}'", name))
    }

    pub fn save_project(&self, project: &Project) -> Result<()> {
        self.store
            .save_project(project)
            .with_context(|| format!("Failed to save project '{}'", project.name))
    }
}
