//! espforge scraper - component discovery from ESPHome documentation
//!
//! This crate provides:
//! - Page fetching behind the [`PageFetcher`] trait
//! - Component link discovery on the listing page
//! - Metadata and configuration variable extraction from component pages
//! - A cancellable background crawler that stores what it finds

pub mod crawler;
pub mod extract;
pub mod fetch;
pub mod links;
pub mod text;

pub use crawler::{CancelHandle, CrawlConfig, CrawlError, CrawlEvent, CrawlState, Crawler};
pub use extract::{component_type_from_url, detect_platforms, extract};
pub use fetch::{FetchError, FetchedPage, HttpFetcher, PageFetcher, StaticFetcher, DEFAULT_USER_AGENT};
pub use links::{discover_links, ComponentLink};
pub use text::plain_text;
