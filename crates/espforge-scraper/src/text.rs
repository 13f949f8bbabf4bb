//! Plain-text rendering of a documentation page's main content

use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

/// Candidate main-content regions, most specific first
const MAIN_REGIONS: [&str; 5] = ["div.rst-content", "main", "article", "[role=main]", "body"];

const BLOCKS: [&str; 14] = [
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "dt", "dd", "pre", "blockquote", "tr",
    "figcaption",
];

fn region_selectors() -> &'static [Selector] {
    static SELECTORS: OnceLock<Vec<Selector>> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        MAIN_REGIONS
            .iter()
            .map(|s| Selector::parse(s).expect("valid selector"))
            .collect()
    })
}

/// Whitespace-collapsed text of an element
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Heading text without Sphinx permalink glyphs
pub fn heading_text(element: ElementRef<'_>) -> String {
    element_text(element).replace('¶', "").trim().to_string()
}

pub fn is_heading(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

/// Main content region of a parsed page
pub fn main_region(document: &Html) -> ElementRef<'_> {
    region_selectors()
        .iter()
        .find_map(|selector| document.select(selector).next())
        .unwrap_or_else(|| document.root_element())
}

/// Render the main content as paragraphs separated by blank lines
///
/// Headings are prefixed with `# `; code blocks keep their line breaks.
pub fn plain_text(markup: &str) -> String {
    let document = Html::parse_document(markup);
    let region = main_region(&document);

    let mut paragraphs: Vec<String> = Vec::new();
    for node in region.descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        let name = element.value().name();
        if !BLOCKS.contains(&name) || inside_block(element, region) {
            continue;
        }

        let text = if is_heading(name) {
            let heading = heading_text(element);
            if heading.is_empty() {
                continue;
            }
            format!("# {}", heading)
        } else if name == "tr" {
            element
                .children()
                .filter_map(ElementRef::wrap)
                .map(element_text)
                .filter(|cell| !cell.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        } else if name == "pre" {
            element
                .text()
                .collect::<String>()
                .lines()
                .map(str::trim_end)
                .filter(|line| !line.trim().is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            element_text(element)
        };

        if !text.is_empty() {
            paragraphs.push(text);
        }
    }

    paragraphs.join("\n\n")
}

/// Nested blocks are rendered as part of their outermost block
fn inside_block(element: ElementRef<'_>, region: ElementRef<'_>) -> bool {
    for ancestor in element.ancestors() {
        if ancestor.id() == region.id() {
            return false;
        }
        if let Some(parent) = ElementRef::wrap(ancestor) {
            if BLOCKS.contains(&parent.value().name()) {
                return true;
            }
        }
    }
    false
}
