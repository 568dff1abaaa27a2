//! Investigative target classification
//!
//! A raw operator string is classified exactly once into an IPv4 literal,
//! an onion host, or an invalid target. Classification never touches the
//! network and is total over all input strings.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static DOTTED_QUAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").unwrap());

/// Kind of a classified target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Dotted-quad IPv4 literal
    Ipv4,
    /// Hidden service address ending in `.onion`
    OnionHost,
    /// Anything else
    Invalid,
}

/// A classified investigative target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Input exactly as supplied by the caller
    pub raw: String,
    /// Normalized host (scheme, trailing slash and whitespace stripped)
    pub host: String,
    /// Classification result
    pub kind: TargetKind,
}

impl Target {
    pub fn is_valid(&self) -> bool {
        self.kind != TargetKind::Invalid
    }

    /// Absolute URL for an HTTP probe; keeps an explicit `https` scheme
    pub fn probe_url(&self) -> String {
        let raw = self.raw.trim();
        let scheme = if raw.get(..8).is_some_and(|p| p.eq_ignore_ascii_case("https://")) {
            "https"
        } else {
            "http"
        };
        format!("{}://{}", scheme, self.host)
    }
}

/// Classify a raw input string
pub fn classify(raw: &str) -> Target {
    let host = normalize_host(raw);

    let kind = if is_ipv4_literal(&host) {
        TargetKind::Ipv4
    } else if is_onion_host(&host) {
        TargetKind::OnionHost
    } else {
        TargetKind::Invalid
    };

    Target {
        raw: raw.to_string(),
        host,
        kind,
    }
}

/// True if `s` is a dotted-quad with every octet in 0-255
pub fn is_ipv4_literal(s: &str) -> bool {
    match DOTTED_QUAD.captures(s) {
        Some(caps) => (1..=4).all(|i| caps[i].parse::<u16>().map(|o| o <= 255).unwrap_or(false)),
        None => false,
    }
}

fn is_onion_host(host: &str) -> bool {
    let lowered = host.to_ascii_lowercase();
    match lowered.strip_suffix(".onion") {
        Some(label) => {
            !label.is_empty()
                && !label.ends_with('.')
                && !label.contains('/')
                && !label.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Schemes a probe can actually speak; any other scheme leaves the input invalid
const HTTP_SCHEMES: &[&str] = &["http://", "https://"];

fn strip_http_scheme(input: &str) -> &str {
    for scheme in HTTP_SCHEMES {
        let matches = input
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme));
        if matches {
            return &input[scheme.len()..];
        }
    }
    input
}

fn normalize_host(raw: &str) -> String {
    let without_scheme = strip_http_scheme(raw.trim());
    without_scheme
        .strip_suffix('/')
        .unwrap_or(without_scheme)
        .to_string()
}
