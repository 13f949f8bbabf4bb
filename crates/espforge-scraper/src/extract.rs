//! Component metadata extraction from one documentation page
//!
//! Extraction never fails: each field is produced by an independent
//! strategy and falls back to a neutral value. Configuration variables come
//! from four passes run in order; a later pass only adds names the earlier
//! ones did not find.

use espforge_core::{Component, ConfigVariable, DataType};
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

use crate::text::{element_text, heading_text, is_heading};

pub const PLATFORM_KEYWORDS: [&str; 6] =
    ["esp32", "esp8266", "esp32s2", "esp32s3", "esp32c3", "rp2040"];

/// Top-level document sections that never name a component variable
pub const STRUCTURAL_KEYS: [&str; 6] = ["esphome", "wifi", "api", "ota", "logger", "web_server"];

/// Keys picked up wherever they start a line of page text
pub const KNOWN_KEYS: [&str; 6] = [
    "id",
    "name",
    "pin",
    "platform",
    "update_interval",
    "accuracy_decimals",
];

const DESCRIPTION_LIMIT: usize = 300;
const FALLBACK_DESCRIPTION_LIMIT: usize = 200;

struct PageSelectors {
    h1: Selector,
    headings: Selector,
    paragraph: Selector,
    meta_description: Selector,
    table: Selector,
    row: Selector,
    cell: Selector,
    dl: Selector,
    list_item: Selector,
    code: Selector,
}

fn selectors() -> &'static PageSelectors {
    static SELECTORS: OnceLock<PageSelectors> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        let parse = |s: &str| Selector::parse(s).expect("valid selector");
        PageSelectors {
            h1: parse("h1"),
            headings: parse("h1, h2, h3, h4, h5, h6"),
            paragraph: parse("p"),
            meta_description: parse(r#"meta[name="description"]"#),
            table: parse("table"),
            row: parse("tr"),
            cell: parse("td, th"),
            dl: parse("dl"),
            list_item: parse("li"),
            code: parse("pre, code"),
        }
    })
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

fn trailing_component_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s*component\s*$").expect("valid regex"))
}

fn config_heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)configuration|config").expect("valid regex"))
}

fn config_section_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)configuration|config|options|parameters").expect("valid regex"))
}

fn text_variable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*:\s*(.+)").expect("valid regex"))
}

fn known_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!("^({}):", KNOWN_KEYS.join("|"))).expect("valid regex")
    })
}

fn option_item_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)^\s*([A-Za-z_][A-Za-z0-9_]*)\s*\(\s*(required|optional)\s*(?:,\s*([^)]*))?\)\s*:?\s*(.*)$")
            .expect("valid regex")
    })
}

fn time_value_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\d+(\.\d+)?(ms|s|min|h)$").expect("valid regex"))
}

fn frequency_value_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\d+(\.\d+)?(hz|khz|mhz)$").expect("valid regex"))
}

fn pin_value_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(GPIO\d+|\d+)$").expect("valid regex"))
}

/// Build a component from a page's markup and plain text
///
/// Either input may be missing.
pub fn extract(markup: Option<&str>, plain_text: Option<&str>, source_url: &str) -> Component {
    let document = markup.map(Html::parse_document);
    let document = document.as_ref();

    let name = document
        .and_then(extract_name)
        .unwrap_or_else(|| "Unknown".to_string());
    let component_type = component_type_from_url(source_url);
    let description = plain_text
        .and_then(description_from_text)
        .or_else(|| document.and_then(description_from_markup))
        .unwrap_or_default();

    let mut component = Component::new(name, component_type)
        .with_description(description)
        .with_url(source_url);

    let mut passes: Vec<Vec<ConfigVariable>> = Vec::new();
    if let Some(doc) = document {
        passes.push(structured_variables(doc));
        passes.push(code_block_variables(doc));
    }
    if let Some(text) = plain_text {
        passes.push(free_text_variables(text));
        passes.push(known_key_variables(text));
    }
    for var in passes.into_iter().flatten() {
        component.add_config_var(var);
    }

    let markup_text = document
        .map(|doc| doc.root_element().text().collect::<String>())
        .unwrap_or_default();
    for platform in detect_platforms(&[markup_text.as_str(), plain_text.unwrap_or_default()]) {
        component.add_platform(platform);
    }

    debug!(
        url = %source_url,
        name = %component.name,
        variables = component.config_vars().len(),
        "Extracted component"
    );
    component
}

/// First heading, cleaned of permalink glyphs and a trailing "component"
fn extract_name(document: &Html) -> Option<String> {
    let sel = selectors();
    let heading = document
        .select(&sel.h1)
        .next()
        .or_else(|| document.select(&sel.headings).next())?;
    let text = heading_text(heading);
    let name = trailing_component_regex().replace(&text, "").trim().to_string();
    (!name.is_empty()).then_some(name)
}

/// Second-to-last non-empty URL path segment
pub fn component_type_from_url(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() >= 2 {
        segments[segments.len() - 2].to_string()
    } else {
        "component".to_string()
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit).collect();
    format!("{}...", cut.trim_end())
}

fn description_from_text(text: &str) -> Option<String> {
    text.split("\n\n")
        .map(str::trim)
        .find(|p| p.chars().count() > 20 && !p.starts_with('#'))
        .map(|p| truncate_chars(p, DESCRIPTION_LIMIT))
}

fn description_from_markup(document: &Html) -> Option<String> {
    let sel = selectors();
    if let Some(content) = document
        .select(&sel.meta_description)
        .next()
        .and_then(|meta| meta.value().attr("content"))
    {
        let content = content.trim();
        if !content.is_empty() {
            return Some(content.to_string());
        }
    }
    document
        .select(&sel.paragraph)
        .map(element_text)
        .find(|p| !p.is_empty())
        .map(|p| truncate_chars(&p, FALLBACK_DESCRIPTION_LIMIT))
}

/// Scan page text for known platform keywords
pub fn detect_platforms(texts: &[&str]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for text in texts {
        let lower = text.to_lowercase();
        for keyword in PLATFORM_KEYWORDS {
            let tag = keyword.to_uppercase();
            if lower.contains(keyword) && !found.contains(&tag) {
                found.push(tag);
            }
        }
    }
    found
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Type implied by keywords in a free-text description
pub fn data_type_from_description(description: &str) -> DataType {
    let lower = description.to_lowercase();
    if contains_any(&lower, &["integer", "number", "pin", "gpio"]) {
        DataType::Int
    } else if contains_any(&lower, &["float", "decimal", "temperature", "voltage"]) {
        DataType::Float
    } else if contains_any(&lower, &["boolean", "bool", "true", "false", "enable"]) {
        DataType::Bool
    } else if contains_any(&lower, &["time", "duration", "interval"]) {
        DataType::Time
    } else if contains_any(&lower, &["frequency", "hz"]) {
        DataType::Frequency
    } else if contains_any(&lower, &["percentage", "%"]) {
        DataType::Percentage
    } else {
        DataType::String
    }
}

fn is_required_description(description: &str) -> bool {
    let lower = description.to_lowercase();
    contains_any(&lower, &["required", "must", "mandatory"])
}

/// Type of a variable from its name, falling back to its description
pub fn infer_data_type(name: &str, description: &str) -> DataType {
    let lower = name.to_lowercase();
    if contains_any(&lower, &["pin", "gpio"]) {
        DataType::Pin
    } else if contains_any(&lower, &["interval", "timeout", "delay", "duration"]) {
        DataType::Time
    } else if contains_any(&lower, &["frequency", "freq"]) {
        DataType::Frequency
    } else if contains_any(&lower, &["enable", "invert"]) {
        DataType::Bool
    } else if contains_any(&lower, &["count", "number", "decimals", "threshold"]) {
        DataType::Int
    } else if contains_any(&lower, &["temperature", "voltage", "current", "power"]) {
        DataType::Float
    } else if matches!(lower.as_str(), "id" | "name") {
        DataType::Identifier
    } else {
        data_type_from_description(description)
    }
}

/// Type of a variable from an example value literal
pub fn infer_type_from_value(value: &str) -> DataType {
    let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
    if value.is_empty() || value == "null" || value == "~" {
        return DataType::String;
    }
    let lower = value.to_lowercase();
    if matches!(lower.as_str(), "true" | "false" | "yes" | "no" | "on" | "off") {
        DataType::Bool
    } else if value.parse::<i64>().is_ok() {
        DataType::Int
    } else if value.parse::<f64>().is_ok() && !lower.contains("inf") && !lower.contains("nan") {
        DataType::Float
    } else if time_value_regex().is_match(value) {
        DataType::Time
    } else if frequency_value_regex().is_match(value) {
        DataType::Frequency
    } else if pin_value_regex().is_match(value) {
        DataType::Pin
    } else {
        DataType::String
    }
}

/// Type named in a table's type column or an option's type annotation
fn type_hint(text: &str) -> Option<DataType> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .collect();
    let has_word = |w: &str| words.contains(&w);

    if lower.contains("string") {
        Some(DataType::String)
    } else if lower.contains("pin") {
        Some(DataType::Pin)
    } else if lower.contains("bool") {
        Some(DataType::Bool)
    } else if lower.contains("float") {
        Some(DataType::Float)
    } else if lower.contains("int") {
        Some(DataType::Int)
    } else if lower.contains("time") {
        Some(DataType::Time)
    } else if lower.contains("frequency") {
        Some(DataType::Frequency)
    } else if lower.contains("percentage") {
        Some(DataType::Percentage)
    } else if has_word("id") {
        Some(DataType::Identifier)
    } else {
        None
    }
}

/// Elements belonging to each configuration heading
///
/// A heading wrapped in its own section owns that section; otherwise it
/// owns its following siblings up to the next heading of the same or a
/// higher level. Bold "Configuration variables:" labels own the siblings
/// up to the next heading.
fn config_scopes(document: &Html) -> Vec<ElementRef<'_>> {
    let mut scopes = Vec::new();

    for element in document.root_element().descendants().filter_map(ElementRef::wrap) {
        let tag = element.value().name();
        let label = if is_heading(tag) {
            heading_text(element)
        } else if tag == "p" {
            let text = element_text(element);
            if text.chars().count() > 60 || !text.trim_end().ends_with(':') {
                continue;
            }
            text
        } else {
            continue;
        };
        if !config_heading_regex().is_match(&label) {
            continue;
        }

        if is_heading(tag) {
            if let Some(parent) = element.parent().and_then(ElementRef::wrap) {
                let is_section = parent.value().name() == "section"
                    || parent.value().classes().any(|c| c == "section");
                if is_section {
                    scopes.push(parent);
                    continue;
                }
            }
        }

        let level = heading_level(tag);
        for sibling in element.next_siblings().filter_map(ElementRef::wrap) {
            let sibling_tag = sibling.value().name();
            if is_heading(sibling_tag) && heading_level(sibling_tag) <= level {
                break;
            }
            scopes.push(sibling);
        }
    }

    scopes
}

/// Heading depth; labels rank below every heading
fn heading_level(tag: &str) -> u8 {
    match tag {
        "h1" => 1,
        "h2" => 2,
        "h3" => 3,
        "h4" => 4,
        "h5" => 5,
        "h6" => 6,
        _ => 7,
    }
}

/// Elements matching `selector` at or below `scope`
fn select_within<'a>(scope: ElementRef<'a>, selector: &Selector) -> Vec<ElementRef<'a>> {
    let mut found = Vec::new();
    if selector.matches(&scope) {
        found.push(scope);
    }
    found.extend(scope.select(selector));
    found
}

/// Pass (a): tables, definition lists and option lists under
/// configuration headings
pub fn structured_variables(document: &Html) -> Vec<ConfigVariable> {
    let sel = selectors();
    let mut vars = Vec::new();
    let mut visited = HashSet::new();

    for scope in config_scopes(document) {
        for table in select_within(scope, &sel.table) {
            if visited.insert(table.id()) {
                vars.extend(table_variables(table));
            }
        }
        for dl in select_within(scope, &sel.dl) {
            if visited.insert(dl.id()) {
                vars.extend(definition_list_variables(dl));
            }
        }
        for item in select_within(scope, &sel.list_item) {
            if visited.insert(item.id()) {
                vars.extend(option_item_variable(item));
            }
        }
    }

    vars
}

fn table_variables(table: ElementRef<'_>) -> Vec<ConfigVariable> {
    let sel = selectors();
    table
        .select(&sel.row)
        .skip(1)
        .filter_map(|row| {
            let cells: Vec<String> = row.select(&sel.cell).map(element_text).collect();
            if cells.len() < 2 {
                return None;
            }
            let name = cells[0].trim();
            if name.is_empty() || name.starts_with('*') {
                return None;
            }

            let (data_type, is_required) = match cells.get(2) {
                Some(type_cell) => {
                    let lower = type_cell.to_lowercase();
                    let data_type = if lower.contains("int") && !lower.contains("string") {
                        DataType::Int
                    } else if lower.contains("float") {
                        DataType::Float
                    } else if lower.contains("bool") {
                        DataType::Bool
                    } else {
                        DataType::String
                    };
                    (data_type, lower.contains("required"))
                }
                None => (DataType::String, false),
            };
            Some(ConfigVariable::new(name, cells[1].as_str(), data_type, is_required))
        })
        .collect()
}

fn definition_list_variables(dl: ElementRef<'_>) -> Vec<ConfigVariable> {
    let children: Vec<ElementRef<'_>> = dl.children().filter_map(ElementRef::wrap).collect();
    let terms = children.iter().filter(|c| c.value().name() == "dt");
    let definitions = children.iter().filter(|c| c.value().name() == "dd");

    terms
        .zip(definitions)
        .filter_map(|(dt, dd)| {
            let name = element_text(*dt);
            if !identifier_regex().is_match(&name) {
                return None;
            }
            let description = element_text(*dd);
            let data_type = infer_data_type(&name, &description);
            let is_required = description.to_lowercase().contains("required");
            Some(ConfigVariable::new(name, description, data_type, is_required))
        })
        .collect()
}

/// `name (Required|Optional, Type): description`
fn option_item_variable(item: ElementRef<'_>) -> Option<ConfigVariable> {
    let text = element_text(item);
    let caps = option_item_regex().captures(&text)?;
    let name = caps.get(1)?.as_str();
    let is_required = caps.get(2)?.as_str().eq_ignore_ascii_case("required");
    let description = caps.get(4).map_or("", |m| m.as_str()).trim();
    let data_type = caps
        .get(3)
        .and_then(|m| type_hint(m.as_str()))
        .unwrap_or_else(|| infer_data_type(name, description));
    Some(ConfigVariable::new(name, description, data_type, is_required))
}

/// Pass (b): `key: value` lines of example code blocks
pub fn code_block_variables(document: &Html) -> Vec<ConfigVariable> {
    document
        .select(&selectors().code)
        .flat_map(|block| yaml_example_variables(&block.text().collect::<String>()))
        .collect()
}

fn yaml_example_variables(code: &str) -> Vec<ConfigVariable> {
    let mut vars = Vec::new();
    for line in code.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        // A bare `key:` opens a nested block rather than setting a value
        if value.trim().is_empty()
            || !identifier_regex().is_match(key)
            || STRUCTURAL_KEYS.contains(&key)
        {
            continue;
        }
        vars.push(ConfigVariable::new(
            key,
            format!("Configuration parameter for {}", key),
            infer_type_from_value(value),
            false,
        ));
    }
    vars
}

/// Pass (c): `identifier: description` lines after a configuration line
pub fn free_text_variables(text: &str) -> Vec<ConfigVariable> {
    let mut vars = Vec::new();
    let mut in_config_section = false;

    for line in text.lines() {
        let line = line.trim();
        if config_section_regex().is_match(line) {
            in_config_section = true;
            continue;
        }
        if !in_config_section {
            continue;
        }
        if let Some(caps) = text_variable_regex().captures(line) {
            let name = &caps[1];
            let description = caps[2].trim();
            vars.push(ConfigVariable::new(
                name,
                description,
                data_type_from_description(description),
                is_required_description(description),
            ));
        }
    }

    vars
}

/// Pass (d): well-known keys starting a line
pub fn known_key_variables(text: &str) -> Vec<ConfigVariable> {
    let mut vars: Vec<ConfigVariable> = Vec::new();

    for line in text.lines() {
        let Some(caps) = known_key_regex().captures(line.trim()) else {
            continue;
        };
        let name = &caps[1];
        if vars.iter().any(|v| v.name == name) {
            continue;
        }
        let data_type = match name {
            "pin" | "accuracy_decimals" => DataType::Int,
            "update_interval" => DataType::Time,
            "id" | "name" => DataType::Identifier,
            _ => DataType::String,
        };
        vars.push(ConfigVariable::new(
            name,
            format!("Configuration for {}", name),
            data_type,
            matches!(name, "name" | "platform"),
        ));
    }

    vars
}
