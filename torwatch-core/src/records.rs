//! Normalized intelligence records
//!
//! Every field is either a value some probe actually observed or one of the
//! explicit sentinels (`Hidden`, `Unknown`, `MASKED`).

use serde::{Deserialize, Serialize};

use crate::{SENTINEL_HIDDEN, SENTINEL_MASKED, SENTINEL_UNKNOWN};

/// Literal used when a search result omits a last-seen timestamp
pub const LAST_SEEN_UNKNOWN: &str = "unknown";

/// Title used when a fallback search anchor has no text
pub const HIDDEN_SERVICE_TITLE: &str = "Hidden Service";

/// Title used when a probed page has no `<title>`
pub const NO_TITLE: &str = "No Title Found";

/// A search-result candidate scraped from a hidden-service search engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredService {
    pub title: String,
    /// Onion URL the result points at
    pub url: String,
    pub snippet: String,
    /// Best-effort timestamp text from the engine, or `"unknown"`
    pub last_seen_hint: String,
    /// Provenance tag (engine name)
    pub source_engine: String,
}

/// Port state from an active probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortStatus {
    Open,
    Filtered,
}

/// One observed port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub port: u16,
    pub service: String,
    pub status: PortStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Role/email pair from an RDAP entity vCard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryContact {
    #[serde(rename = "type")]
    pub role: String,
    pub email: String,
}

/// Ownership and allocation data from an RDAP registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRecord {
    pub queried_ip: String,
    pub asn: String,
    pub cidr: String,
    /// Network handle name
    pub name: String,
    pub organization: String,
    pub country_code: String,
    pub created_at: String,
    pub updated_at: String,
    pub status: Vec<String>,
    pub contacts: Vec<RegistryContact>,
    /// Pretty-printed registry document, kept for audit
    pub raw_document: String,
}

/// Canonical merged result of a single-target scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconRecord {
    pub target: String,
    pub ip_estimate: String,
    pub provider: String,
    pub location: String,
    pub server_header: String,
    pub powered_by: String,
    pub page_title: String,
    /// Absent when no HTTP request was made to the target itself
    pub http_status: Option<u16>,
    pub body_preview: String,
    /// Hex SHA-256 of the raw response body
    pub body_sha256: Option<String>,
    pub tech_stack_hints: Vec<String>,
    pub open_ports: Vec<PortInfo>,
    pub risk_notes: String,
    pub suggested_action: Option<String>,
    pub registry: Option<RegistryRecord>,
}

impl ReconRecord {
    /// Skeleton for an onion target: network-level facts are hidden by Tor
    pub fn onion(target: &str) -> Self {
        Self {
            target: target.to_string(),
            ip_estimate: SENTINEL_MASKED.to_string(),
            provider: SENTINEL_HIDDEN.to_string(),
            location: SENTINEL_HIDDEN.to_string(),
            server_header: SENTINEL_HIDDEN.to_string(),
            powered_by: SENTINEL_HIDDEN.to_string(),
            page_title: NO_TITLE.to_string(),
            http_status: None,
            body_preview: String::new(),
            body_sha256: None,
            tech_stack_hints: Vec::new(),
            open_ports: Vec::new(),
            risk_notes: String::new(),
            suggested_action: None,
            registry: None,
        }
    }

    /// Skeleton for a clearweb IPv4 target: nothing about the host has been probed yet
    pub fn clearweb(target: &str) -> Self {
        Self {
            target: target.to_string(),
            ip_estimate: SENTINEL_UNKNOWN.to_string(),
            provider: SENTINEL_UNKNOWN.to_string(),
            location: SENTINEL_UNKNOWN.to_string(),
            server_header: SENTINEL_UNKNOWN.to_string(),
            powered_by: SENTINEL_UNKNOWN.to_string(),
            page_title: SENTINEL_UNKNOWN.to_string(),
            http_status: None,
            body_preview: String::new(),
            body_sha256: None,
            tech_stack_hints: Vec::new(),
            open_ports: Vec::new(),
            risk_notes: String::new(),
            suggested_action: None,
            registry: None,
        }
    }

    /// Resolved address usable for a registry lookup, if any
    pub fn concrete_ip(&self) -> Option<&str> {
        crate::is_ipv4_literal(&self.ip_estimate).then_some(self.ip_estimate.as_str())
    }
}

/// True if `value` is one of the "not observed" placeholders
pub fn is_sentinel(value: &str) -> bool {
    matches!(value, SENTINEL_HIDDEN | SENTINEL_UNKNOWN | SENTINEL_MASKED) || value.is_empty()
}
