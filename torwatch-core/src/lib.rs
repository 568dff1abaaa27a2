//! TorWatch Core - Target classification and reconnaissance data model
//!
//! This crate provides the foundational primitives:
//! - Target classification (IPv4 / onion host / invalid)
//! - Probe outcomes and the scan error taxonomy
//! - Normalized intelligence records (search hits, recon, registry)
//! - Timestamped diagnostic log returned with every scan
//! - Search engine registry

pub mod target;
pub mod outcome;
pub mod records;
pub mod diagnostics;
pub mod search_engines;

pub use target::*;
pub use outcome::*;
pub use records::*;
pub use diagnostics::*;
pub use search_engines::*;

/// Sentinel for a value the source was asked for but withheld
pub const SENTINEL_HIDDEN: &str = "Hidden";

/// Sentinel for a value that was never observed
pub const SENTINEL_UNKNOWN: &str = "Unknown";

/// Sentinel for an address hidden behind the onion network
pub const SENTINEL_MASKED: &str = "MASKED";

/// Maximum characters kept in a recon body preview
pub const BODY_PREVIEW_CHARS: usize = 500;

/// Maximum characters kept in a fallback search snippet
pub const SNIPPET_CHARS: usize = 100;

/// Collapse runs of whitespace into single spaces and trim the ends
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max` characters, never splitting a code point
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
