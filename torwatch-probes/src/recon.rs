//! Recon Probe
//!
//! Two disjoint paths selected by target kind:
//! - onion hosts are fetched once through Tor; title, headers and a body
//!   preview are taken from whatever status comes back
//! - IPv4 targets are geolocated via a clearweb lookup; the host itself is
//!   never contacted

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use torwatch_core::{
    ProbeOutcome, ReconRecord, ScanError, Target, TargetKind, BODY_PREVIEW_CHARS, NO_TITLE,
    SENTINEL_HIDDEN, SENTINEL_UNKNOWN,
};
use torwatch_tor::{extract_page, RawResponse, Transport};

use crate::ProbeConfig;

/// Session cookie names that identify a server-side framework
const SESSION_COOKIES: &[(&str, &str)] = &[
    ("PHPSESSID", "PHP"),
    ("JSESSIONID", "Java"),
    ("laravel_session", "Laravel"),
    ("ASP.NET_SessionId", "ASP.NET"),
    ("connect.sid", "Express"),
];

/// Single-target recon probe
pub struct ReconProbe {
    onion: Arc<dyn Transport>,
    clearweb: Arc<dyn Transport>,
    config: ProbeConfig,
}

impl ReconProbe {
    pub fn new(onion: Arc<dyn Transport>, clearweb: Arc<dyn Transport>, config: ProbeConfig) -> Self {
        Self {
            onion,
            clearweb,
            config,
        }
    }

    /// Fetch an onion target through Tor
    pub async fn probe_onion(&self, target: &Target) -> ProbeOutcome<ReconRecord> {
        if target.kind != TargetKind::OnionHost {
            return ProbeOutcome::Failed(ScanError::Validation(format!(
                "{} is not an onion host",
                target.raw
            )));
        }

        let url = target.probe_url();
        info!("Onion recon: {}", url);

        match self.onion.get(&url, self.config.slow_timeout()).await {
            ProbeOutcome::Success(response) | ProbeOutcome::Degraded(response, _) => {
                ProbeOutcome::Success(onion_record(target, &response))
            }
            ProbeOutcome::Failed(ScanError::Transport(reason)) => {
                warn!("Onion recon of {} failed: {}", url, reason);
                ProbeOutcome::Failed(ScanError::Transport(format!(
                    "{}. Target might be offline or unreachable via the current Tor circuit",
                    reason
                )))
            }
            ProbeOutcome::Failed(other) => ProbeOutcome::Failed(other),
        }
    }

    /// Geolocate an IPv4 target via the clearweb lookup
    pub async fn probe_ip(&self, target: &Target) -> ProbeOutcome<ReconRecord> {
        if target.kind != TargetKind::Ipv4 {
            return ProbeOutcome::Failed(ScanError::Validation(format!(
                "{} is not an IPv4 address",
                target.raw
            )));
        }

        let url = self.config.geolocation_url.replace("{ip}", &target.host);
        info!("Geolocation lookup: {}", url);

        let response = match self.clearweb.get(&url, self.config.fast_timeout()).await {
            ProbeOutcome::Success(r) | ProbeOutcome::Degraded(r, _) => r,
            ProbeOutcome::Failed(e) => return ProbeOutcome::Failed(e),
        };

        geolocation_record(target, &response)
    }
}

/// Geolocation source payload (ipapi.co shape)
#[derive(Debug, Deserialize)]
struct GeoResponse {
    ip: Option<String>,
    city: Option<String>,
    country_name: Option<String>,
    org: Option<String>,
    #[serde(default)]
    error: bool,
    reason: Option<String>,
}

fn onion_record(target: &Target, response: &RawResponse) -> ReconRecord {
    let page = extract_page(&response.body);

    let mut record = ReconRecord::onion(&target.host);
    record.http_status = Some(response.status);
    record.page_title = page.title.clone().unwrap_or_else(|| NO_TITLE.to_string());
    record.server_header = header_or_hidden(response, "server");
    record.powered_by = header_or_hidden(response, "x-powered-by");
    record.body_preview = page.preview(BODY_PREVIEW_CHARS);
    record.body_sha256 = Some(format!("{:x}", Sha256::digest(response.body.as_bytes())));
    record.tech_stack_hints = tech_stack_hints(response);

    debug!(
        "Onion {} answered HTTP {} (server: {})",
        target.host, response.status, record.server_header
    );
    record
}

fn geolocation_record(target: &Target, response: &RawResponse) -> ProbeOutcome<ReconRecord> {
    if !response.is_success() {
        return ProbeOutcome::Failed(ScanError::Upstream(format!(
            "geolocation source returned HTTP {}",
            response.status
        )));
    }

    let geo: GeoResponse = match serde_json::from_str(&response.body) {
        Ok(g) => g,
        Err(e) => {
            return ProbeOutcome::Failed(ScanError::Upstream(format!(
                "unreadable geolocation response: {}",
                e
            )))
        }
    };

    if geo.error {
        return ProbeOutcome::Failed(ScanError::Upstream(
            geo.reason
                .unwrap_or_else(|| "geolocation source reported an error".to_string()),
        ));
    }

    let mut missing = Vec::new();
    let city = present(geo.city).unwrap_or_else(|| {
        missing.push("city");
        SENTINEL_UNKNOWN.to_string()
    });
    let country = present(geo.country_name).unwrap_or_else(|| {
        missing.push("country_name");
        SENTINEL_UNKNOWN.to_string()
    });
    let provider = present(geo.org).unwrap_or_else(|| {
        missing.push("org");
        SENTINEL_UNKNOWN.to_string()
    });

    let mut record = ReconRecord::clearweb(&target.host);
    record.location = if city == SENTINEL_UNKNOWN && country == SENTINEL_UNKNOWN {
        SENTINEL_UNKNOWN.to_string()
    } else {
        format!("{}, {}", city, country)
    };
    record.provider = provider;
    // The queried literal is itself verified when the source does not echo it
    record.ip_estimate = present(geo.ip).unwrap_or_else(|| target.host.clone());

    if missing.is_empty() {
        ProbeOutcome::Success(record)
    } else {
        let reason = ScanError::Upstream(format!(
            "geolocation response missing {}",
            missing.join(", ")
        ));
        ProbeOutcome::Degraded(record, reason)
    }
}

fn header_or_hidden(response: &RawResponse, name: &str) -> String {
    response
        .header(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| SENTINEL_HIDDEN.to_string())
}

/// Technology hints read strictly from response headers
pub fn tech_stack_hints(response: &RawResponse) -> Vec<String> {
    let mut hints = BTreeSet::new();

    for name in ["server", "x-powered-by", "x-generator"] {
        if let Some(value) = response.header(name).map(str::trim).filter(|v| !v.is_empty()) {
            hints.insert(value.to_string());
        }
    }

    if let Some(version) = response
        .header("x-aspnet-version")
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        hints.insert(format!("ASP.NET {}", version));
    }

    if let Some(cookies) = response.header("set-cookie") {
        for name in cookie_names(cookies) {
            if let Some((_, tech)) = SESSION_COOKIES.iter().find(|(cookie, _)| *cookie == name) {
                hints.insert(tech.to_string());
            }
        }
    }

    hints.into_iter().collect()
}

/// Names of every `name=value` pair in a (possibly folded) Set-Cookie value
fn cookie_names(header: &str) -> impl Iterator<Item = &str> {
    header
        .split([',', ';'])
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, _)| name.trim())
}

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use torwatch_core::classify;
    use torwatch_tor::FixtureTransport;

    const GOOGLE_GEO: &str = r#"{
        "ip": "8.8.8.8",
        "city": "Mountain View",
        "region": "California",
        "country_name": "United States",
        "org": "Google LLC"
    }"#;

    fn probe(onion: FixtureTransport, clearweb: FixtureTransport) -> ReconProbe {
        let config = ProbeConfig {
            geolocation_url: "http://geo.test/{ip}/json/".to_string(),
            ..Default::default()
        };
        ReconProbe::new(Arc::new(onion), Arc::new(clearweb), config)
    }

    #[tokio::test]
    async fn test_onion_404_is_success() {
        let onion = FixtureTransport::new().respond(
            "http://abc.onion",
            404,
            &[("Server", "nginx")],
            "<html><head><title>404 Not Found</title></head><body><h1>Not Found</h1></body></html>",
        );
        let probe = probe(onion, FixtureTransport::new());

        match probe.probe_onion(&classify("abc.onion")).await {
            ProbeOutcome::Success(record) => {
                assert_eq!(record.http_status, Some(404));
                assert_eq!(record.server_header, "nginx");
                assert_eq!(record.powered_by, "Hidden");
                assert_eq!(record.page_title, "404 Not Found");
                assert_eq!(record.body_preview, "Not Found");
                assert_eq!(record.ip_estimate, "MASKED");
                assert_eq!(record.tech_stack_hints, vec!["nginx".to_string()]);
                assert!(record.open_ports.is_empty());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_headers_default_to_hidden() {
        let onion = FixtureTransport::new().respond("http://quiet.onion", 200, &[], "<body>hi</body>");
        let probe = probe(onion, FixtureTransport::new());

        let record = probe
            .probe_onion(&classify("quiet.onion"))
            .await
            .into_result()
            .unwrap();
        assert_eq!(record.server_header, "Hidden");
        assert_eq!(record.powered_by, "Hidden");
        assert_eq!(record.page_title, "No Title Found");
        assert!(record.tech_stack_hints.is_empty());
    }

    #[tokio::test]
    async fn test_body_preview_collapsed_and_truncated() {
        let body = format!(
            "<html><body><p>{}</p><script>var secret = 1;</script></body></html>",
            "word   \n ".repeat(300)
        );
        let onion = FixtureTransport::new().respond("http://long.onion", 200, &[], &body);
        let probe = probe(onion, FixtureTransport::new());

        let record = probe
            .probe_onion(&classify("long.onion"))
            .await
            .into_result()
            .unwrap();
        assert_eq!(record.body_preview.chars().count(), 500);
        assert!(!record.body_preview.contains("  "));
        assert!(!record.body_preview.contains("secret"));
        assert_eq!(record.body_sha256.as_ref().map(String::len), Some(64));
    }

    #[tokio::test]
    async fn test_onion_transport_failure_keeps_reason() {
        let onion = FixtureTransport::new().fail("http://down.onion", "connection refused");
        let probe = probe(onion, FixtureTransport::new());

        match probe.probe_onion(&classify("down.onion")).await {
            ProbeOutcome::Failed(ScanError::Transport(reason)) => {
                assert!(reason.starts_with("connection refused"));
                assert!(reason.contains("Tor circuit"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_onion_rejects_ip_target() {
        let probe = probe(FixtureTransport::new(), FixtureTransport::new());
        assert!(matches!(
            probe.probe_onion(&classify("8.8.8.8")).await,
            ProbeOutcome::Failed(ScanError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_ip_geolocation() {
        let clearweb = FixtureTransport::new().respond("http://geo.test/8.8.8.8", 200, &[], GOOGLE_GEO);
        let probe = probe(FixtureTransport::new(), clearweb);

        match probe.probe_ip(&classify("8.8.8.8")).await {
            ProbeOutcome::Success(record) => {
                assert_eq!(record.location, "Mountain View, United States");
                assert_eq!(record.provider, "Google LLC");
                assert_eq!(record.ip_estimate, "8.8.8.8");
                assert_eq!(record.server_header, "Unknown");
                assert_eq!(record.http_status, None);
                assert!(record.open_ports.is_empty());
                assert!(record.tech_stack_hints.is_empty());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ip_source_error_payload() {
        let clearweb = FixtureTransport::new().respond(
            "http://geo.test/10.0.0.1",
            200,
            &[],
            r#"{"ip":"10.0.0.1","error":true,"reason":"Reserved IP Address"}"#,
        );
        let probe = probe(FixtureTransport::new(), clearweb);

        assert_eq!(
            probe.probe_ip(&classify("10.0.0.1")).await,
            ProbeOutcome::Failed(ScanError::Upstream("Reserved IP Address".to_string()))
        );
    }

    #[tokio::test]
    async fn test_ip_partial_geolocation_is_degraded() {
        let clearweb = FixtureTransport::new().respond(
            "http://geo.test/1.2.3.4",
            200,
            &[],
            r#"{"ip":"1.2.3.4","country_name":"Australia"}"#,
        );
        let probe = probe(FixtureTransport::new(), clearweb);

        match probe.probe_ip(&classify("1.2.3.4")).await {
            ProbeOutcome::Degraded(record, ScanError::Upstream(reason)) => {
                assert_eq!(record.location, "Unknown, Australia");
                assert_eq!(record.provider, "Unknown");
                assert!(reason.contains("city"));
                assert!(reason.contains("org"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ip_rate_limited() {
        let clearweb = FixtureTransport::new().respond("http://geo.test/", 429, &[], "Too Many Requests");
        let probe = probe(FixtureTransport::new(), clearweb);

        match probe.probe_ip(&classify("8.8.4.4")).await {
            ProbeOutcome::Failed(ScanError::Upstream(reason)) => assert!(reason.contains("429")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_tech_stack_hints_from_headers_only() {
        let response = RawResponse {
            url: "http://x.onion".into(),
            status: 200,
            headers: [
                ("server", "Apache/2.4.41 (Ubuntu)"),
                ("x-powered-by", "PHP/7.4.3"),
                ("x-aspnet-version", "4.0.30319"),
                ("set-cookie", "PHPSESSID=abc; path=/, lang=en"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
            body: "WordPress".into(),
        };

        assert_eq!(
            tech_stack_hints(&response),
            vec![
                "ASP.NET 4.0.30319".to_string(),
                "Apache/2.4.41 (Ubuntu)".to_string(),
                "PHP".to_string(),
                "PHP/7.4.3".to_string(),
            ]
        );
    }

    fn cookie_response(set_cookie: &str) -> RawResponse {
        RawResponse {
            url: "http://x.onion".into(),
            status: 200,
            headers: [("set-cookie", set_cookie)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: String::new(),
        }
    }

    #[test]
    fn test_session_cookie_matches_whole_name() {
        assert!(tech_stack_hints(&cookie_response("XPHPSESSID=1; path=/")).is_empty());
        assert!(tech_stack_hints(&cookie_response("theme=PHPSESSID=1")).is_empty());
        assert_eq!(
            tech_stack_hints(&cookie_response("lang=en, JSESSIONID=x; HttpOnly")),
            vec!["Java".to_string()]
        );
        assert_eq!(
            tech_stack_hints(&cookie_response(" connect.sid=s%3A1;Path=/")),
            vec!["Express".to_string()]
        );
    }
}
