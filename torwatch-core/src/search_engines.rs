//! Hidden-service search engine registry
//!
//! Engines are described by a URL template with a `{query}` placeholder and
//! the result markup convention their pages follow.

use serde::{Deserialize, Serialize};

/// Result-page markup convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultMarkup {
    /// `li.result` blocks with `h4` title, anchor, `p` snippet and last-seen span
    Ahmia,
    /// No known container convention; heading anchors only
    #[default]
    Generic,
}

/// A hidden-service search engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEngine {
    /// Human-readable name, used as the provenance tag on results
    pub name: String,
    /// URL template with {query} placeholder
    pub url_template: String,
    #[serde(default)]
    pub markup: ResultMarkup,
}

impl SearchEngine {
    pub fn new(name: &str, url_template: &str, markup: ResultMarkup) -> Self {
        Self {
            name: name.to_string(),
            url_template: url_template.to_string(),
            markup,
        }
    }

    /// Build search URL for a query
    pub fn build_url(&self, query: &str) -> String {
        self.url_template
            .replace("{query}", &urlencoding::encode(query.trim()))
    }
}

/// Ahmia's onion mirror
pub const AHMIA_URL_TEMPLATE: &str =
    "http://juhanurmihxlp77nkq76byazcldy2hlmovfu2epvl5ankdibsot4csyd.onion/search/?q={query}";

/// Default engine list: Ahmia only, one engine per call
pub fn default_engines() -> Vec<SearchEngine> {
    vec![SearchEngine::new(
        "Ahmia (Tor Network)",
        AHMIA_URL_TEMPLATE,
        ResultMarkup::Ahmia,
    )]
}
