//! Outbound HTTP transport
//!
//! Creates HTTP clients that route through Tor for .onion access, or go
//! direct for clearweb lookups. A transport performs exactly one attempt per
//! call; retry policy belongs to the caller.

use async_trait::async_trait;
use reqwest::{Client, Proxy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error as _;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use torwatch_core::{ProbeOutcome, ScanError};

/// Upper bound for quick operations such as the health check
pub const FAST_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for hidden-service fetches; circuits routinely take several seconds
pub const SLOW_TIMEOUT: Duration = Duration::from_secs(45);

/// Declared user agent for every outbound request
pub const DEFAULT_USER_AGENT: &str = "TorWatch-Intel-Bot/1.0";

/// Endpoint reporting whether a request arrived over Tor, and from which exit
pub const DEFAULT_CHECK_URL: &str = "https://check.torproject.org/api/ip";

/// Tor proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TorConfig {
    /// SOCKS5 proxy address (default: socks5h://127.0.0.1:9050)
    pub socks_addr: String,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    /// Connectivity check endpoint
    pub check_url: String,
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            socks_addr: "socks5h://127.0.0.1:9050".to_string(),
            connect_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            check_url: DEFAULT_CHECK_URL.to_string(),
        }
    }
}

impl TorConfig {
    /// Accepts `host:port` or a full proxy URL
    pub fn with_socks(mut self, addr: &str) -> Self {
        self.socks_addr = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("socks5h://{}", addr)
        };
        self
    }
}

/// Direct (non-proxied) client configuration for clearweb sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClearwebConfig {
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    pub check_url: String,
}

impl Default for ClearwebConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            check_url: DEFAULT_CHECK_URL.to_string(),
        }
    }
}

/// Errors building a transport
#[derive(Debug, Error)]
pub enum TransportBuildError {
    #[error("Invalid proxy address {0}: {1}")]
    Proxy(String, String),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// A fully read HTTP response, whatever its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    /// Lower-cased header names; repeated headers joined with ", "
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl RawResponse {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Result of a connectivity probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityStatus {
    pub reachable: bool,
    /// Exit address as seen by the check endpoint
    pub exit_identity: Option<String>,
    /// Whether the check endpoint saw the request arrive over Tor
    pub is_tor: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectivityStatus {
    pub fn offline(reason: impl Into<String>) -> Self {
        Self {
            reachable: false,
            exit_identity: None,
            is_tor: None,
            error: Some(reason.into()),
        }
    }
}

/// Outbound HTTP capability shared by all probes
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short label for logs ("tor", "clearweb", "fixture")
    fn label(&self) -> &str;

    /// GET `url` with a per-call timeout. HTTP error statuses are successes.
    async fn get(&self, url: &str, timeout: Duration) -> ProbeOutcome<RawResponse>;

    /// Check that the egress path works and report the exit identity
    async fn health_check(&self, timeout: Duration) -> ConnectivityStatus;
}

#[derive(Debug, Deserialize)]
struct TorCheckResponse {
    #[serde(rename = "IsTor")]
    is_tor: Option<bool>,
    #[serde(rename = "IP")]
    ip: Option<String>,
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
    label: &'static str,
    check_url: String,
}

impl HttpTransport {
    /// Transport bound to the Tor SOCKS endpoint; no direct fallback exists
    pub fn tor(config: &TorConfig) -> Result<Self, TransportBuildError> {
        let proxy = Proxy::all(&config.socks_addr)
            .map_err(|e| TransportBuildError::Proxy(config.socks_addr.clone(), e.to_string()))?;

        let client = Client::builder()
            .proxy(proxy)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(true) // Many .onion sites have self-signed certs
            .build()
            .map_err(|e| TransportBuildError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            label: "tor",
            check_url: config.check_url.clone(),
        })
    }

    /// Transport for clearweb sources (geolocation, RDAP)
    pub fn direct(config: &ClearwebConfig) -> Result<Self, TransportBuildError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| TransportBuildError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            label: "clearweb",
            check_url: config.check_url.clone(),
        })
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<RawResponse, ScanError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(&e, timeout))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&e, timeout))?;

        Ok(RawResponse {
            url: final_url,
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn label(&self) -> &str {
        self.label
    }

    async fn get(&self, url: &str, timeout: Duration) -> ProbeOutcome<RawResponse> {
        debug!("[{}] GET {}", self.label, url);
        let result = self.fetch(url, timeout).await;
        if let Ok(response) = &result {
            debug!("[{}] {} -> HTTP {}", self.label, url, response.status);
        }
        result.into()
    }

    async fn health_check(&self, timeout: Duration) -> ConnectivityStatus {
        match self.fetch(&self.check_url, timeout).await {
            Ok(response) if response.is_success() => {
                match serde_json::from_str::<TorCheckResponse>(&response.body) {
                    Ok(check) => ConnectivityStatus {
                        reachable: true,
                        exit_identity: check.ip,
                        is_tor: check.is_tor,
                        error: None,
                    },
                    Err(e) => ConnectivityStatus {
                        reachable: true,
                        exit_identity: None,
                        is_tor: None,
                        error: Some(format!("unreadable check response: {}", e)),
                    },
                }
            }
            Ok(response) => {
                ConnectivityStatus::offline(format!("check endpoint returned HTTP {}", response.status))
            }
            Err(e) => ConnectivityStatus::offline(e.to_string()),
        }
    }
}

/// Map a reqwest failure to a precise, human-readable transport error
fn transport_error(err: &reqwest::Error, timeout: Duration) -> ScanError {
    let detail = root_cause(err);
    let reason = if err.is_timeout() {
        format!("timed out after {}s", timeout.as_secs())
    } else if err.is_connect() {
        format!("connection failed: {}", detail)
    } else if err.is_body() || err.is_decode() {
        format!("failed reading response body: {}", detail)
    } else {
        detail
    };
    ScanError::Transport(reason)
}

/// Innermost error message, which carries the useful detail (refused, DNS, SOCKS)
fn root_cause(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message = inner.to_string();
        source = inner.source();
    }
    message
}
