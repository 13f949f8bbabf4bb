//! Crawl a small documentation site into a store, then build a device
//! configuration from what was found.

use espforge_core::{
    parse_document, CatalogStore, ComponentStore, ConfigValue, DeviceSettings, Project,
};
use espforge_scraper::{CrawlConfig, CrawlState, Crawler, StaticFetcher};
use serde_yml::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const LISTING: &str = "https://docs.test/components/";
const DHT: &str = "https://docs.test/components/sensor/dht.html";
const RELAY: &str = "https://docs.test/components/switch/relay.html";

const LISTING_PAGE: &str = r#"<html><body>
    <div class="rst-content">
      <a href="sensor/dht.html">DHT</a>
      <a href="switch/relay.html">Relay</a>
      <a href="/guides/faq.html">FAQ</a>
    </div></body></html>"#;

const DHT_PAGE: &str = r##"<html><body><div class="rst-content">
    <h1>DHT<a class="headerlink" href="#dht">¶</a></h1>
    <p>The DHT platform reads temperature and humidity on ESP32 and ESP8266 boards.</p>
    <pre>sensor:
  - platform: dht
    pin: GPIO2
    update_interval: 60s</pre>
    <section id="configuration-variables">
      <h2>Configuration variables</h2>
      <ul>
        <li><p><strong>pin</strong> (<em>Required</em>, Pin): The data pin.</p></li>
        <li><p><strong>update_interval</strong> (<em>Optional</em>, Time): Polling interval.</p></li>
      </ul>
    </section>
    </div></body></html>"##;

const RELAY_PAGE: &str = r#"<html><body><div class="rst-content">
    <h1>Relay</h1>
    <p>Switches a relay connected to a GPIO pin on ESP8266 boards.</p>
    </div></body></html>"#;

fn fetcher() -> StaticFetcher {
    StaticFetcher::new()
        .with_page(LISTING, LISTING_PAGE)
        .with_page(DHT, DHT_PAGE)
        .with_page(RELAY, RELAY_PAGE)
}

fn config() -> CrawlConfig {
    CrawlConfig {
        listing_url: LISTING.to_string(),
        request_delay: Duration::ZERO,
        ..CrawlConfig::default()
    }
}

#[tokio::test]
async fn test_crawl_then_generate() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(CatalogStore::open(dir.path()).unwrap());
    let crawler = Crawler::new(Arc::new(fetcher()), store.clone());

    let state = crawler.run(config()).await.unwrap();
    assert_eq!(state, CrawlState::Completed { scraped: 2, failed: 0 });
    assert_eq!(store.component_types(), ["sensor", "switch"]);

    // A fresh handle sees what the crawl persisted
    let reopened = CatalogStore::open(dir.path()).unwrap();
    let dht = reopened.get_component("sensor.dht").unwrap();
    assert_eq!(dht.platforms(), ["ESP32", "ESP8266"]);
    assert!(dht.config_var("pin").unwrap().is_required);
    assert_eq!(
        reopened.search_components("relay", None).len(),
        1
    );

    let mut project = Project::new("greenhouse", DeviceSettings::default());
    let first = project.add_from_catalog(&dht);
    let second = project.add_from_catalog(&dht);
    project
        .set_value(first, "pin", Some(ConfigValue::String("GPIO4".to_string())))
        .unwrap();
    project
        .set_value(second, "pin", Some(ConfigValue::String("GPIO5".to_string())))
        .unwrap();
    assert!(project.validate().is_empty());

    let text = project.generate_document();
    let sha = reopened
        .save_document("greenhouse.yaml", &text, Some(&project))
        .unwrap();
    assert_eq!(reopened.load_document(&sha).unwrap(), text);

    let doc = parse_document(&text).unwrap();
    let sensors = doc["sensor"].as_sequence().unwrap();
    assert_eq!(sensors.len(), 2);
    assert_eq!(sensors[0]["platform"], Value::String("DHT".to_string()));
    assert_eq!(sensors[0]["pin"], Value::String("GPIO4".to_string()));
    assert_eq!(sensors[1]["pin"], Value::String("GPIO5".to_string()));
    assert_ne!(sensors[0]["id"], sensors[1]["id"]);
    assert_eq!(doc["esphome"]["name"], Value::String("my_device".to_string()));
}

#[tokio::test]
async fn test_missing_page_is_counted_and_skipped() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(CatalogStore::open(dir.path()).unwrap());
    let fetcher = StaticFetcher::new()
        .with_page(LISTING, LISTING_PAGE)
        .with_page(DHT, DHT_PAGE);
    let crawler = Crawler::new(Arc::new(fetcher), store.clone());

    let state = crawler.run(config()).await.unwrap();
    assert_eq!(state, CrawlState::Completed { scraped: 1, failed: 1 });
    assert_eq!(store.component_count(), 1);
}
