//! Catalog commands: crawling and browsing stored components

use anyhow::Result;
use espforge_core::{component_snippet, Component, ComponentStore};
use espforge_scraper::{CrawlEvent, CrawlState};
use std::fmt::Write;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::state::AppState;

const DESCRIPTION_WIDTH: usize = 60;

/// Run a crawl in the foreground, printing progress until it ends
///
/// Ctrl-C requests cancellation; components stored so far are kept.
pub async fn scrape(
    state: &AppState,
    listing_url: Option<String>,
    max: Option<usize>,
) -> Result<CrawlState> {
    let config = state.config.crawler.to_crawl_config(listing_url, max);
    info!(
        url = %config.listing_url,
        max = config.max_components,
        "Starting scrape"
    );

    let mut rx = state.crawler.subscribe();
    let mut handle = state.crawler.start(config).await?;
    let mut canceling = false;

    let final_state = loop {
        tokio::select! {
            result = &mut handle => break result?,
            event = rx.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Progress output fell behind");
                }
                Err(RecvError::Closed) => {}
            },
            signal = tokio::signal::ctrl_c(), if !canceling => {
                if let Err(e) = signal {
                    warn!(error = %e, "Unable to listen for Ctrl-C");
                }
                canceling = true;
                println!("Canceling after the current page...");
                state.crawler.cancel();
            }
        }
    };

    while let Ok(event) = rx.try_recv() {
        print_event(&event);
    }

    match &final_state {
        CrawlState::Completed { scraped, failed } => {
            println!("Done: {} components stored, {} failed", scraped, failed)
        }
        CrawlState::Canceled { scraped, failed } => {
            println!("Canceled: {} components stored, {} failed", scraped, failed)
        }
        CrawlState::Failed { error } => println!("Crawl failed: {}", error),
        CrawlState::Idle | CrawlState::Running => {}
    }
    Ok(final_state)
}

fn print_event(event: &CrawlEvent) {
    match event {
        CrawlEvent::Progress {
            current,
            total,
            label,
        } => println!("[{}/{}] {}", current, total, label),
        CrawlEvent::ComponentFound { component, .. } => println!(
            "  + {} ({} variables)",
            component.catalog_key(),
            component.config_vars().len()
        ),
        CrawlEvent::Log(message) => println!("  {}", message),
        CrawlEvent::Error { message } => eprintln!("Error: {}", message),
        CrawlEvent::Status(_) | CrawlEvent::Finished { .. } => {}
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let cut: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", cut.trim_end())
    }
}

/// One line per component, grouped under its type
fn format_listing(components: &[Component]) -> String {
    if components.is_empty() {
        return "No components found\n".to_string();
    }

    let mut out = String::new();
    let mut current_type: Option<&str> = None;
    for component in components {
        if current_type != Some(component.component_type.as_str()) {
            current_type = Some(component.component_type.as_str());
            let count = components
                .iter()
                .filter(|c| c.component_type == component.component_type)
                .count();
            let _ = writeln!(out, "{} ({})", component.component_type, count);
        }
        let _ = writeln!(
            out,
            "  {:<36} {}",
            component.catalog_key(),
            truncate(&component.description, DESCRIPTION_WIDTH)
        );
    }
    out
}

pub fn list(state: &AppState, type_filter: Option<&str>) -> String {
    format_listing(&state.store.search_components("", type_filter))
}

pub fn search(state: &AppState, query: &str, type_filter: Option<&str>) -> String {
    format_listing(&state.store.search_components(query, type_filter))
}

/// Component details followed by its document snippet
pub async fn show(state: &AppState, key: &str) -> Result<String> {
    let component = state.component(key).await?;

    let mut out = String::new();
    writeln!(out, "{} ({})", component.name, component.catalog_key())?;
    if let Some(url) = &component.url {
        writeln!(out, "Source:    {}", url)?;
    }
    if !component.platforms().is_empty() {
        writeln!(out, "Platforms: {}", component.platforms().join(", "))?;
    }
    if !component.description.is_empty() {
        writeln!(out, "\n{}", component.description)?;
    }

    writeln!(out, "\nConfiguration variables:")?;
    if component.config_vars().is_empty() {
        writeln!(out, "  (none)")?;
    }
    for var in component.config_vars() {
        let required = if var.is_required { "required" } else { "optional" };
        write!(out, "  {:<24} {:<12} {:<9}", var.name, var.data_type.to_string(), required)?;
        if let Some(default) = &var.default_value {
            write!(out, " default={}", default.as_text())?;
        }
        writeln!(out, " {}", truncate(&var.description, DESCRIPTION_WIDTH))?;
    }

    writeln!(out, "\n{}", component_snippet(&component))?;
    Ok(out)
}
