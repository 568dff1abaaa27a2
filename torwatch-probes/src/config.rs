//! Probe endpoints and timeouts

use serde::{Deserialize, Serialize};
use std::time::Duration;

use torwatch_tor::{FAST_TIMEOUT, SLOW_TIMEOUT};

/// Endpoint templates and per-call timeouts shared by the probes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Hidden-service fetch timeout (search and onion recon), seconds
    pub slow_timeout_secs: u64,
    /// Clearweb lookup timeout (geolocation, RDAP), seconds
    pub fast_timeout_secs: u64,
    /// Geolocation URL template with {ip} placeholder
    pub geolocation_url: String,
    /// RDAP URL template with {ip} placeholder
    pub rdap_url: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            slow_timeout_secs: SLOW_TIMEOUT.as_secs(),
            fast_timeout_secs: FAST_TIMEOUT.as_secs(),
            geolocation_url: "https://ipapi.co/{ip}/json/".to_string(),
            rdap_url: "https://rdap.arin.net/registry/ip/{ip}".to_string(),
        }
    }
}

impl ProbeConfig {
    pub fn slow_timeout(&self) -> Duration {
        Duration::from_secs(self.slow_timeout_secs)
    }

    pub fn fast_timeout(&self) -> Duration {
        Duration::from_secs(self.fast_timeout_secs)
    }
}
