//! Search result extraction strategies
//!
//! Each strategy is a pure function from a parsed result page to the
//! services it recognizes. Strategies are tried in order and the first
//! non-empty answer wins.

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

use torwatch_core::{
    collapse_whitespace, truncate_chars, DiscoveredService, ResultMarkup, HIDDEN_SERVICE_TITLE,
    LAST_SEEN_UNKNOWN, SNIPPET_CHARS,
};

static RESULT_BLOCK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li.result").unwrap());
static RESULT_TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h4").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static SNIPPET: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").unwrap());
static LAST_SEEN: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.lastSeen, span.timestamp").unwrap());
static HEADING_ANCHOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("h1 a[href], h2 a[href], h3 a[href], h4 a[href], h5 a[href], h6 a[href]")
        .unwrap()
});

/// Elements whose text is taken as the context around a fallback anchor
const BLOCK_ELEMENTS: &[&str] = &[
    "li", "div", "article", "section", "td", "dd", "p", "blockquote",
];

/// A named extraction function
#[derive(Clone, Copy)]
pub struct ExtractionStrategy {
    pub name: &'static str,
    pub extract: fn(&Html, &str) -> Vec<DiscoveredService>,
}

impl std::fmt::Debug for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionStrategy").field("name", &self.name).finish()
    }
}

/// Strategy A: repeated `li.result` blocks
pub const RESULT_BLOCKS: ExtractionStrategy = ExtractionStrategy {
    name: "result-blocks",
    extract: extract_result_blocks,
};

/// Strategy B: any heading-level anchor pointing at an onion host
pub const HEADING_ANCHORS: ExtractionStrategy = ExtractionStrategy {
    name: "heading-anchors",
    extract: extract_heading_anchors,
};

/// Ordered strategies for a markup convention
pub fn strategies_for(markup: ResultMarkup) -> &'static [ExtractionStrategy] {
    match markup {
        ResultMarkup::Ahmia => &[RESULT_BLOCKS, HEADING_ANCHORS],
        ResultMarkup::Generic => &[HEADING_ANCHORS],
    }
}

/// Services found by the first productive strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub services: Vec<DiscoveredService>,
    /// Name of the strategy that produced `services`, if any did
    pub strategy: Option<&'static str>,
    /// True when the productive strategy was not the first one
    pub fallback_used: bool,
}

/// Run `strategies` in order over `html` until one yields results
pub fn extract_services(html: &str, engine: &str, strategies: &[ExtractionStrategy]) -> Extraction {
    let document = Html::parse_document(html);

    for (idx, strategy) in strategies.iter().enumerate() {
        let services = (strategy.extract)(&document, engine);
        debug!("Strategy {} found {} results for {}", strategy.name, services.len(), engine);
        if !services.is_empty() {
            return Extraction {
                services,
                strategy: Some(strategy.name),
                fallback_used: idx > 0,
            };
        }
    }

    Extraction {
        services: Vec::new(),
        strategy: None,
        fallback_used: false,
    }
}

fn extract_result_blocks(document: &Html, engine: &str) -> Vec<DiscoveredService> {
    let mut results = Vec::new();

    for block in document.select(&RESULT_BLOCK) {
        let title = block
            .select(&RESULT_TITLE)
            .next()
            .map(|el| element_text(&el))
            .unwrap_or_default();

        let url = block
            .select(&ANCHOR)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(unwrap_redirect)
            .unwrap_or_default();

        if title.is_empty() || url.is_empty() {
            continue;
        }

        let snippet = block
            .select(&SNIPPET)
            .next()
            .map(|el| element_text(&el))
            .unwrap_or_default();

        let last_seen_hint = block
            .select(&LAST_SEEN)
            .next()
            .and_then(|el| {
                let text = element_text(&el);
                if text.is_empty() {
                    el.value().attr("data-timestamp").map(str::to_string)
                } else {
                    Some(text)
                }
            })
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| LAST_SEEN_UNKNOWN.to_string());

        results.push(DiscoveredService {
            title,
            url,
            snippet,
            last_seen_hint,
            source_engine: engine.to_string(),
        });
    }

    results
}

fn extract_heading_anchors(document: &Html, engine: &str) -> Vec<DiscoveredService> {
    let mut results = Vec::new();

    for anchor in document.select(&HEADING_ANCHOR) {
        let href = match anchor.value().attr("href") {
            Some(h) if h.contains(".onion") => h,
            _ => continue,
        };

        let text = element_text(&anchor);
        let title = if text.is_empty() {
            HIDDEN_SERVICE_TITLE.to_string()
        } else {
            text
        };

        let snippet = ancestor_block(&anchor)
            .map(|block| truncate_chars(&element_text(&block), SNIPPET_CHARS))
            .unwrap_or_default();

        results.push(DiscoveredService {
            title,
            url: href.to_string(),
            snippet,
            last_seen_hint: LAST_SEEN_UNKNOWN.to_string(),
            source_engine: engine.to_string(),
        });
    }

    results
}

/// Nearest enclosing block element; falls back to the heading's parent
fn ancestor_block<'a>(anchor: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    let mut heading_parent = None;
    for el in anchor.ancestors().filter_map(ElementRef::wrap) {
        let name = el.value().name();
        if BLOCK_ELEMENTS.contains(&name) {
            return Some(el);
        }
        if heading_parent.is_none() && matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6") {
            heading_parent = el.parent().and_then(ElementRef::wrap);
        }
    }

    heading_parent
}

/// Ahmia wraps result links as `/search/redirect?...&redirect_url=<target>`
fn unwrap_redirect(href: &str) -> String {
    let query = href.split_once('?').map(|(_, q)| q).unwrap_or("");
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("redirect_url=") {
            if let Ok(decoded) = urlencoding::decode(value) {
                return decoded.into_owned();
            }
        }
    }
    href.trim().to_string()
}

fn element_text(el: &ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}
