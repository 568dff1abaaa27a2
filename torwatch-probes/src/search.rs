//! Search Probe
//!
//! Queries hidden-service search engines through the Tor transport and
//! scrapes their result pages. Engines plug in as [`SearchAdapter`]s.
//! Results keep document order; nothing is ranked or de-duplicated.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use torwatch_core::{DiscoveredService, ProbeOutcome, ScanError, SearchEngine};
use torwatch_tor::{extract_services, strategies_for, ExtractionStrategy, Transport};

/// One hidden-service search engine
pub trait SearchAdapter: Send + Sync {
    /// Provenance tag stamped on every result
    fn name(&self) -> &str;

    /// Request URL for `query`
    fn build_url(&self, query: &str) -> String;

    /// Extraction strategies in the order they are tried
    fn strategies(&self) -> &[ExtractionStrategy];
}

impl SearchAdapter for SearchEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn build_url(&self, query: &str) -> String {
        SearchEngine::build_url(self, query)
    }

    fn strategies(&self) -> &[ExtractionStrategy] {
        strategies_for(self.markup)
    }
}

/// Outcome for a single engine
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    pub engine: String,
    pub outcome: ProbeOutcome<Vec<DiscoveredService>>,
}

/// Search probe over one or more engines
pub struct SearchProbe {
    transport: Arc<dyn Transport>,
    adapters: Vec<Arc<dyn SearchAdapter>>,
    timeout: Duration,
}

impl SearchProbe {
    pub fn new(
        transport: Arc<dyn Transport>,
        adapters: Vec<Arc<dyn SearchAdapter>>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            adapters,
            timeout,
        }
    }

    /// Build adapters from engine descriptors
    pub fn from_engines(
        transport: Arc<dyn Transport>,
        engines: Vec<SearchEngine>,
        timeout: Duration,
    ) -> Self {
        let adapters = engines
            .into_iter()
            .map(|e| Arc::new(e) as Arc<dyn SearchAdapter>)
            .collect();
        Self::new(transport, adapters, timeout)
    }

    pub fn engine_names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    /// Search every configured engine and combine the results
    pub async fn search(&self, query: &str) -> ProbeOutcome<Vec<DiscoveredService>> {
        combine(self.search_each(query).await)
    }

    /// Query all engines concurrently; outcomes come back in configured order
    pub async fn search_each(&self, query: &str) -> Vec<EngineOutcome> {
        let futures = self.adapters.iter().map(|adapter| async move {
            EngineOutcome {
                engine: adapter.name().to_string(),
                outcome: self.search_engine(adapter.as_ref(), query).await,
            }
        });
        join_all(futures).await
    }

    /// Query a single engine
    pub async fn search_engine(
        &self,
        adapter: &dyn SearchAdapter,
        query: &str,
    ) -> ProbeOutcome<Vec<DiscoveredService>> {
        let url = adapter.build_url(query);
        debug!("Searching {} with query: {}", adapter.name(), query);

        let response = match self.transport.get(&url, self.timeout).await {
            ProbeOutcome::Success(r) | ProbeOutcome::Degraded(r, _) => r,
            ProbeOutcome::Failed(e) => {
                warn!("Engine {} failed: {}", adapter.name(), e);
                return ProbeOutcome::Failed(e);
            }
        };

        let extraction = extract_services(&response.body, adapter.name(), adapter.strategies());
        info!(
            "Engine {} returned {} results",
            adapter.name(),
            extraction.services.len()
        );

        if !response.is_success() {
            warn!("Engine {} returned status: {}", adapter.name(), response.status);
            let reason = ScanError::Upstream(format!(
                "{} returned HTTP {}",
                adapter.name(),
                response.status
            ));
            // An error page that still lists results is kept, flagged
            if extraction.services.is_empty() {
                return ProbeOutcome::Failed(reason);
            }
            return ProbeOutcome::Degraded(extraction.services, reason);
        }

        if extraction.fallback_used {
            let reason = ScanError::ParseDegraded(format!(
                "primary extraction matched nothing on {}; {} results from fallback strategy {}",
                adapter.name(),
                extraction.services.len(),
                extraction.strategy.unwrap_or("unknown"),
            ));
            ProbeOutcome::Degraded(extraction.services, reason)
        } else {
            ProbeOutcome::Success(extraction.services)
        }
    }
}

/// Merge per-engine outcomes: results concatenated in engine order.
///
/// All engines failed → the first failure. Any engine failed or degraded →
/// `Degraded` with the first such reason. Otherwise `Success`.
pub fn combine(outcomes: Vec<EngineOutcome>) -> ProbeOutcome<Vec<DiscoveredService>> {
    if outcomes.is_empty() {
        return ProbeOutcome::Failed(ScanError::Validation(
            "no search engines configured".to_string(),
        ));
    }

    let mut services = Vec::new();
    let mut first_failure = None;
    let mut first_degradation = None;
    let mut any_answered = false;

    for EngineOutcome { outcome, .. } in outcomes {
        match outcome {
            ProbeOutcome::Success(mut found) => {
                any_answered = true;
                services.append(&mut found);
            }
            ProbeOutcome::Degraded(mut found, reason) => {
                any_answered = true;
                services.append(&mut found);
                first_degradation.get_or_insert(reason);
            }
            ProbeOutcome::Failed(reason) => {
                first_failure.get_or_insert(reason);
            }
        }
    }

    match (any_answered, first_failure, first_degradation) {
        (false, Some(reason), _) => ProbeOutcome::Failed(reason),
        (_, Some(reason), _) | (_, None, Some(reason)) => ProbeOutcome::Degraded(services, reason),
        _ => ProbeOutcome::Success(services),
    }
}
