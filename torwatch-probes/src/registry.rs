//! Registry Lookup
//!
//! Maps an RDAP IP-network document onto a flat [`RegistryRecord`]. RDAP
//! documents vary between registries and are walked defensively: every
//! missing segment maps to a sentinel instead of an error.

use serde_json::Value;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use torwatch_core::{
    is_ipv4_literal, ProbeOutcome, RegistryContact, RegistryRecord, ScanError, SENTINEL_UNKNOWN,
};
use torwatch_tor::Transport;

/// Placeholder when the allocation range is not published
pub const CIDR_UNAVAILABLE: &str = "N/A";

/// RDAP client over the clearweb transport
pub struct RegistryLookup {
    transport: Arc<dyn Transport>,
    url_template: String,
    timeout: Duration,
}

impl RegistryLookup {
    pub fn new(transport: Arc<dyn Transport>, url_template: &str, timeout: Duration) -> Self {
        Self {
            transport,
            url_template: url_template.to_string(),
            timeout,
        }
    }

    /// Look up the network allocation containing `ip`
    pub async fn lookup(&self, ip: &str) -> ProbeOutcome<RegistryRecord> {
        let ip = ip.trim();
        if !is_ipv4_literal(ip) {
            return ProbeOutcome::Failed(ScanError::Validation(format!(
                "registry lookup needs an IPv4 literal, got {:?}",
                ip
            )));
        }

        let url = self.url_template.replace("{ip}", ip);
        info!("RDAP lookup: {}", url);

        let response = match self.transport.get(&url, self.timeout).await {
            ProbeOutcome::Success(r) | ProbeOutcome::Degraded(r, _) => r,
            ProbeOutcome::Failed(e) => return ProbeOutcome::Failed(e),
        };

        if !response.is_success() {
            return ProbeOutcome::Failed(ScanError::Upstream(format!(
                "registry returned HTTP {}",
                response.status
            )));
        }

        match serde_json::from_str::<Value>(&response.body) {
            Ok(document) if document.is_object() => {
                let record = parse_rdap(ip, &document);
                debug!("RDAP {} -> {} ({})", ip, record.organization, record.cidr);
                ProbeOutcome::Success(record)
            }
            Ok(_) => ProbeOutcome::Failed(ScanError::Upstream(
                "registry document is not a JSON object".to_string(),
            )),
            Err(e) => ProbeOutcome::Failed(ScanError::Upstream(format!(
                "unreadable registry document: {}",
                e
            ))),
        }
    }
}

/// Flatten an RDAP IP-network document
pub fn parse_rdap(ip: &str, document: &Value) -> RegistryRecord {
    RegistryRecord {
        queried_ip: ip.to_string(),
        asn: origin_asn(document),
        cidr: cidr(document),
        name: string_or_unknown(document.get("name")),
        organization: document
            .get("entities")
            .and_then(|e| e.get(0))
            .and_then(|entity| vcard_property(entity, "fn"))
            .unwrap_or_else(|| SENTINEL_UNKNOWN.to_string()),
        country_code: string_or_unknown(document.get("country")),
        created_at: event_date(document, "registration"),
        updated_at: event_date(document, "last changed"),
        status: document
            .get("status")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        contacts: contacts(document),
        raw_document: serde_json::to_string_pretty(document).unwrap_or_default(),
    }
}

/// Text value of a vCard property (`["fn", {}, "text", "Google LLC"]`)
fn vcard_property(entity: &Value, property: &str) -> Option<String> {
    entity
        .get("vcardArray")?
        .get(1)?
        .as_array()?
        .iter()
        .find(|prop| prop.get(0).and_then(Value::as_str) == Some(property))?
        .get(3)?
        .as_str()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn contacts(document: &Value) -> Vec<RegistryContact> {
    let mut found = Vec::new();
    let entities = match document.get("entities").and_then(Value::as_array) {
        Some(e) => e,
        None => return found,
    };

    for entity in entities {
        let email = match vcard_property(entity, "email") {
            Some(e) => e,
            None => continue,
        };
        let roles = entity
            .get("roles")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect::<Vec<_>>())
            .unwrap_or_default();

        for role in roles {
            found.push(RegistryContact {
                role: role.to_string(),
                email: email.clone(),
            });
        }
    }

    found
}

fn event_date(document: &Value, action: &str) -> String {
    document
        .get("events")
        .and_then(Value::as_array)
        .and_then(|events| {
            events
                .iter()
                .find(|e| e.get("eventAction").and_then(Value::as_str) == Some(action))
        })
        .and_then(|e| e.get("eventDate"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| SENTINEL_UNKNOWN.to_string())
}

/// ARIN publishes origin ASNs under a vendor extension
fn origin_asn(document: &Value) -> String {
    document
        .get("arin_originas0_originautnums")
        .and_then(|v| v.get(0))
        .and_then(Value::as_u64)
        .map(|asn| format!("AS{}", asn))
        .unwrap_or_else(|| SENTINEL_UNKNOWN.to_string())
}

fn cidr(document: &Value) -> String {
    let start = document.get("startAddress").and_then(Value::as_str);
    let end = document.get("endAddress").and_then(Value::as_str);

    match (start, end) {
        (Some(start), Some(end)) => range_to_cidr(start, end),
        _ => CIDR_UNAVAILABLE.to_string(),
    }
}

/// `a.b.c.d/n` when the range is exactly one prefix, else `start - end`
pub fn range_to_cidr(start: &str, end: &str) -> String {
    let fallback = || format!("{} - {}", start, end);

    let (first, last) = match (start.parse::<Ipv4Addr>(), end.parse::<Ipv4Addr>()) {
        (Ok(s), Ok(e)) => (u32::from(s), u32::from(e)),
        _ => return fallback(),
    };
    if last < first {
        return fallback();
    }

    let size = u64::from(last - first) + 1;
    if size.is_power_of_two() && u64::from(first) % size == 0 {
        let prefix = 32 - size.trailing_zeros();
        format!("{}/{}", start, prefix)
    } else {
        fallback()
    }
}

fn string_or_unknown(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| SENTINEL_UNKNOWN.to_string())
}
