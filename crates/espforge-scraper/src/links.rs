//! Component link discovery on the listing page

use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

use crate::text::element_text;

/// A candidate component page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentLink {
    pub name: String,
    pub url: String,
}

struct LinkSelectors {
    content: Selector,
    toctree: Selector,
    menus: Selector,
    anchor: Selector,
}

fn selectors() -> &'static LinkSelectors {
    static SELECTORS: OnceLock<LinkSelectors> = OnceLock::new();
    SELECTORS.get_or_init(|| LinkSelectors {
        content: Selector::parse("div.rst-content").expect("valid selector"),
        toctree: Selector::parse("div.toctree-wrapper").expect("valid selector"),
        menus: Selector::parse("nav, ul").expect("valid selector"),
        anchor: Selector::parse("a[href]").expect("valid selector"),
    })
}

fn menu_class_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"nav|menu|toc").expect("valid regex"))
}

/// Collects links in first-seen order, one per URL
struct LinkCollector<'a> {
    base: &'a Url,
    components_root: &'a str,
    seen: HashSet<String>,
    links: Vec<ComponentLink>,
}

impl<'a> LinkCollector<'a> {
    fn new(base: &'a Url, components_root: &'a str) -> Self {
        Self {
            base,
            components_root,
            seen: HashSet::new(),
            links: Vec::new(),
        }
    }

    fn collect_in(&mut self, region: ElementRef<'_>) {
        for anchor in region.select(&selectors().anchor) {
            self.offer(anchor);
        }
    }

    fn offer(&mut self, anchor: ElementRef<'_>) {
        let Some(href) = anchor.value().attr("href") else {
            return;
        };
        let Some(url) = resolve_component_url(self.base, href, self.components_root) else {
            return;
        };

        let name = element_text(anchor);
        if name.is_empty() || name.starts_with('#') {
            return;
        }

        if self.seen.insert(url.clone()) {
            self.links.push(ComponentLink { name, url });
        }
    }
}

/// Resolve `href` against the listing page and keep it only if it points
/// below the components root on the same host
pub fn resolve_component_url(base: &Url, href: &str, components_root: &str) -> Option<String> {
    let mut url = base.join(href.trim()).ok()?;
    url.set_fragment(None);

    if !matches!(url.scheme(), "http" | "https") || url.host_str() != base.host_str() {
        return None;
    }

    let rest = url.path().strip_prefix(components_root)?;
    if rest.trim_matches('/').is_empty() {
        return None;
    }
    Some(url.to_string())
}

/// Discover component page links on a listing page
///
/// Content, table-of-contents and navigation regions are searched first;
/// when they yield nothing every anchor on the page is considered. The
/// result is truncated to `max`.
pub fn discover_links(
    markup: &str,
    listing_url: &str,
    components_root: &str,
    max: usize,
) -> Vec<ComponentLink> {
    let Ok(base) = Url::parse(listing_url) else {
        debug!(url = %listing_url, "Listing URL does not parse");
        return Vec::new();
    };
    let document = Html::parse_document(markup);
    let sel = selectors();

    let mut collector = LinkCollector::new(&base, components_root);
    for region in document.select(&sel.content) {
        collector.collect_in(region);
    }
    for region in document.select(&sel.toctree) {
        collector.collect_in(region);
    }
    for menu in document.select(&sel.menus) {
        let is_menu = menu
            .value()
            .classes()
            .any(|class| menu_class_regex().is_match(class));
        if is_menu {
            collector.collect_in(menu);
        }
    }

    if collector.links.is_empty() {
        debug!("No links in structured regions, scanning all anchors");
        for anchor in document.select(&sel.anchor) {
            collector.offer(anchor);
        }
    }

    let mut links = collector.links;
    links.truncate(max);
    debug!(count = links.len(), "Discovered component links");
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "https://esphome.io/components/";

    #[test]
    fn test_structured_regions() {
        let markup = r##"<html><body>
            <nav class="wy-nav-side"><ul class="toc">
              <li><a href="/components/switch/gpio.html">GPIO Switch</a></li>
              <li><a href="/guides/getting_started.html">Getting Started</a></li>
            </ul></nav>
            <div class="rst-content">
              <a href="sensor/dht.html">DHT Sensor</a>
              <a href="sensor/dht.html#config">DHT again</a>
              <a href="#top">#</a>
              <a href="/components/">Components</a>
              <a href="https://github.com/components/x">External</a>
              <div class="toctree-wrapper">
                <a href="/components/sensor/bme280.html">BME280</a>
              </div>
            </div>
        </body></html>"##;

        let links = discover_links(markup, LISTING, "/components/", 100);
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            [
                "https://esphome.io/components/sensor/dht.html",
                "https://esphome.io/components/sensor/bme280.html",
                "https://esphome.io/components/switch/gpio.html",
            ]
        );
        assert_eq!(links[0].name, "DHT Sensor");
    }

    #[test]
    fn test_fallback_scans_all_anchors() {
        let markup = r#"<html><body><div>
            <a href="/components/light/rgb.html">RGB Light</a>
            <a href="/about.html">About</a>
        </div></body></html>"#;
        let links = discover_links(markup, LISTING, "/components/", 100);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].name, "RGB Light");
    }

    #[test]
    fn test_truncated_to_max() {
        let markup: String = (0..10)
            .map(|i| format!(r#"<a href="/components/sensor/s{i}.html">S{i}</a>"#))
            .collect();
        let links = discover_links(&markup, LISTING, "/components/", 3);
        assert_eq!(links.len(), 3);
        assert_eq!(links[2].name, "S2");
    }

    #[test]
    fn test_empty_text_ignored() {
        let markup = r#"<div class="rst-content"><a href="/components/x/y.html"><img src="i.png"></a></div>"#;
        assert!(discover_links(markup, LISTING, "/components/", 10).is_empty());
    }
}
