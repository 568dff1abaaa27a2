//! Canned-response transport
//!
//! Replays recorded responses keyed by URL prefix and remembers every URL it
//! was asked for, so scans can be replayed offline and call counts asserted.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use torwatch_core::{ProbeOutcome, ScanError};

use crate::{ConnectivityStatus, RawResponse, Transport};

#[derive(Debug, Clone)]
enum Reply {
    Respond {
        status: u16,
        headers: BTreeMap<String, String>,
        body: String,
    },
    Fail(String),
    Stall,
}

/// Transport answering from a fixed table of responses
#[derive(Debug)]
pub struct FixtureTransport {
    routes: Vec<(String, Reply)>,
    health: ConnectivityStatus,
    requests: Mutex<Vec<String>>,
}

impl Default for FixtureTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureTransport {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            health: ConnectivityStatus::offline("no health fixture"),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer requests starting with `prefix` with a full response
    pub fn respond(mut self, prefix: &str, status: u16, headers: &[(&str, &str)], body: &str) -> Self {
        let headers = headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect();
        self.routes.push((
            prefix.to_string(),
            Reply::Respond {
                status,
                headers,
                body: body.to_string(),
            },
        ));
        self
    }

    /// Fail requests starting with `prefix` at the transport level
    pub fn fail(mut self, prefix: &str, reason: &str) -> Self {
        self.routes.push((prefix.to_string(), Reply::Fail(reason.to_string())));
        self
    }

    /// Never answer requests starting with `prefix` (until the caller gives up)
    pub fn stall(mut self, prefix: &str) -> Self {
        self.routes.push((prefix.to_string(), Reply::Stall));
        self
    }

    pub fn with_health(mut self, health: ConnectivityStatus) -> Self {
        self.health = health;
        self
    }

    /// Every URL requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of requests whose URL contains `needle`
    pub fn count_matching(&self, needle: &str) -> usize {
        self.requests().iter().filter(|u| u.contains(needle)).count()
    }
}

#[async_trait]
impl Transport for FixtureTransport {
    fn label(&self) -> &str {
        "fixture"
    }

    async fn get(&self, url: &str, timeout: Duration) -> ProbeOutcome<RawResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }

        let reply = self
            .routes
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(Reply::Respond { status, headers, body }) => ProbeOutcome::Success(RawResponse {
                url: url.to_string(),
                status,
                headers,
                body,
            }),
            Some(Reply::Fail(reason)) => ProbeOutcome::Failed(ScanError::Transport(reason)),
            Some(Reply::Stall) => {
                tokio::time::sleep(timeout).await;
                ProbeOutcome::Failed(ScanError::Transport(format!(
                    "timed out after {}s",
                    timeout.as_secs()
                )))
            }
            None => ProbeOutcome::Failed(ScanError::Transport(format!("no fixture for {}", url))),
        }
    }

    async fn health_check(&self, _timeout: Duration) -> ConnectivityStatus {
        self.health.clone()
    }
}
