//! Aggregator
//!
//! Drives one scan through its states:
//! - START → CLASSIFY → REJECTED for invalid targets (no network)
//! - START → CLASSIFY → ONION_PROBE | IP_PROBE → REGISTRY → MERGE → DONE
//!
//! Each state transition and probe outcome appends one line to the
//! diagnostic log returned with the result. Primary probe failure ends the
//! scan without a record; registry and classifier failures are absorbed.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use torwatch_core::{
    classify, is_ipv4_literal, is_sentinel, DiagnosticLog, DiscoveredService, ProbeOutcome,
    ReconRecord, RegistryRecord, ScanError, SearchEngine, TargetKind,
};
use torwatch_probes::{ProbeConfig, ReconProbe, RegistryLookup, SearchProbe, SharedClassifier};
use torwatch_tor::{ConnectivityStatus, HttpTransport, Transport, TransportBuildError};

use crate::{AggregatorConfig, TorWatchConfig};

/// Result of one scan plus everything that happened along the way
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport<T> {
    pub scan_id: Uuid,
    pub result: Result<T, ScanError>,
    pub log: DiagnosticLog,
}

impl<T> ScanReport<T> {
    fn new(result: Result<T, ScanError>, log: DiagnosticLog) -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            result,
            log,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Append a line to the scan log and mirror it to tracing
fn note(log: &mut DiagnosticLog, message: String) {
    info!("{}", message);
    log.push(message);
}

fn note_warn(log: &mut DiagnosticLog, message: String) {
    warn!("{}", message);
    log.push(message);
}

/// Scan coordinator; the only component that knows every probe
pub struct Aggregator {
    tor: Arc<dyn Transport>,
    search: SearchProbe,
    recon: ReconProbe,
    registry: RegistryLookup,
    classifier: Option<SharedClassifier>,
    config: AggregatorConfig,
    health_timeout: Duration,
}

impl Aggregator {
    /// Wire probes over the given transports
    pub fn new(
        tor: Arc<dyn Transport>,
        clearweb: Arc<dyn Transport>,
        engines: Vec<SearchEngine>,
        probes: ProbeConfig,
        config: AggregatorConfig,
    ) -> Self {
        let search = SearchProbe::from_engines(tor.clone(), engines, probes.slow_timeout());
        let registry = RegistryLookup::new(clearweb.clone(), &probes.rdap_url, probes.fast_timeout());
        let health_timeout = probes.fast_timeout();
        let recon = ReconProbe::new(tor.clone(), clearweb, probes);

        Self {
            tor,
            search,
            recon,
            registry,
            classifier: None,
            config,
            health_timeout,
        }
    }

    /// Build real HTTP transports from configuration
    pub fn from_config(config: &TorWatchConfig) -> Result<Self, TransportBuildError> {
        let tor = HttpTransport::tor(&config.tor)?;
        let clearweb = HttpTransport::direct(&config.clearweb)?;

        Ok(Self::new(
            Arc::new(tor),
            Arc::new(clearweb),
            config.engines.clone(),
            config.probes.clone(),
            config.scan.clone(),
        ))
    }

    /// Install a risk classifier, consulted after a successful probe
    pub fn with_classifier(mut self, classifier: SharedClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Search hidden-service engines, honoring the configured deadline
    pub async fn run_search(&self, query: &str) -> ScanReport<Vec<DiscoveredService>> {
        self.run_search_with_deadline(query, self.config.deadline()).await
    }

    pub async fn run_search_with_deadline(
        &self,
        query: &str,
        deadline: Option<Duration>,
    ) -> ScanReport<Vec<DiscoveredService>> {
        let mut log = DiagnosticLog::new();
        let result = match deadline {
            Some(limit) => match timeout(limit, self.execute_search(query, &mut log)).await {
                Ok(result) => result,
                Err(_) => Err(ScanError::Cancelled),
            },
            None => self.execute_search(query, &mut log).await,
        };
        if let (Err(ScanError::Cancelled), Some(limit)) = (&result, deadline) {
            note_warn(&mut log, cancelled_line(limit));
        }
        ScanReport::new(result, log)
    }

    /// Probe a single target, honoring the configured deadline
    pub async fn run_recon(&self, raw_target: &str) -> ScanReport<ReconRecord> {
        self.run_recon_with_deadline(raw_target, self.config.deadline()).await
    }

    pub async fn run_recon_with_deadline(
        &self,
        raw_target: &str,
        deadline: Option<Duration>,
    ) -> ScanReport<ReconRecord> {
        let mut log = DiagnosticLog::new();
        let result = match deadline {
            Some(limit) => match timeout(limit, self.execute_recon(raw_target, &mut log)).await {
                Ok(result) => result,
                Err(_) => Err(ScanError::Cancelled),
            },
            None => self.execute_recon(raw_target, &mut log).await,
        };
        if let (Err(ScanError::Cancelled), Some(limit)) = (&result, deadline) {
            note_warn(&mut log, cancelled_line(limit));
        }
        ScanReport::new(result, log)
    }

    /// Standalone RDAP lookup
    pub async fn lookup_registry(&self, ip: &str) -> ScanReport<RegistryRecord> {
        let mut log = DiagnosticLog::new();
        note(&mut log, format!("START: registry lookup for {:?}", ip));

        let result = match self.registry.lookup(ip).await {
            ProbeOutcome::Success(record) | ProbeOutcome::Degraded(record, _) => {
                note(
                    &mut log,
                    format!(
                        "DONE: {} belongs to {} ({}, {})",
                        record.queried_ip, record.organization, record.cidr, record.asn
                    ),
                );
                Ok(record)
            }
            ProbeOutcome::Failed(e) => {
                note_warn(&mut log, format!("FAILED: registry lookup: {}", e));
                Err(e)
            }
        };
        ScanReport::new(result, log)
    }

    /// Ask the Tor transport whether the proxy is usable
    pub async fn check_connectivity(&self) -> ConnectivityStatus {
        let status = self.tor.health_check(self.health_timeout).await;
        if status.reachable {
            info!(
                "Proxy {} reachable (exit: {})",
                self.tor.label(),
                status.exit_identity.as_deref().unwrap_or("unknown")
            );
        } else {
            warn!(
                "Proxy {} unreachable: {}",
                self.tor.label(),
                status.error.as_deref().unwrap_or("no reason given")
            );
        }
        status
    }

    async fn execute_search(
        &self,
        query: &str,
        log: &mut DiagnosticLog,
    ) -> Result<Vec<DiscoveredService>, ScanError> {
        note(log, format!("START: search for {:?}", query));

        let query = query.trim();
        if query.is_empty() {
            let error = ScanError::Validation("search query is empty".to_string());
            note_warn(log, format!("REJECTED: {}", error));
            return Err(error);
        }

        note(
            log,
            format!("SEARCH: querying {}", self.search.engine_names().join(", ")),
        );

        let outcomes = self.search.search_each(query).await;
        for engine in &outcomes {
            match &engine.outcome {
                ProbeOutcome::Success(found) => {
                    note(log, format!("SEARCH {}: {} results", engine.engine, found.len()))
                }
                ProbeOutcome::Degraded(found, reason) => note_warn(
                    log,
                    format!("SEARCH {} degraded: {} results, {}", engine.engine, found.len(), reason),
                ),
                ProbeOutcome::Failed(reason) => {
                    note_warn(log, format!("SEARCH {} failed: {}", engine.engine, reason))
                }
            }
        }

        match torwatch_probes::combine(outcomes) {
            ProbeOutcome::Success(services) | ProbeOutcome::Degraded(services, _) => {
                note(log, format!("DONE: {} services discovered", services.len()));
                Ok(services)
            }
            ProbeOutcome::Failed(e) => {
                note_warn(log, format!("FAILED: search failed, no results: {}", e));
                Err(e)
            }
        }
    }

    async fn execute_recon(
        &self,
        raw_target: &str,
        log: &mut DiagnosticLog,
    ) -> Result<ReconRecord, ScanError> {
        note(log, format!("START: recon of {:?}", raw_target));

        let target = classify(raw_target);
        note(
            log,
            format!("CLASSIFY: {:?} is {:?}", target.host, target.kind),
        );

        let outcome = match target.kind {
            TargetKind::Invalid => {
                let error = ScanError::Validation(format!(
                    "{:?} is neither an IPv4 address nor an onion host",
                    raw_target
                ));
                note_warn(log, format!("REJECTED: {}; no request sent", error));
                return Err(error);
            }
            TargetKind::OnionHost => {
                note(
                    log,
                    format!("ONION_PROBE: GET {} via {}", target.probe_url(), self.tor.label()),
                );
                self.recon.probe_onion(&target).await
            }
            TargetKind::Ipv4 => {
                note(log, format!("IP_PROBE: geolocating {}", target.host));
                self.recon.probe_ip(&target).await
            }
        };

        let mut record = match outcome {
            ProbeOutcome::Success(record) => {
                note(log, format!("PROBE succeeded: {}", probe_summary(&record)));
                record
            }
            ProbeOutcome::Degraded(record, reason) => {
                note_warn(
                    log,
                    format!("PROBE degraded: {}; {}", probe_summary(&record), reason),
                );
                record
            }
            ProbeOutcome::Failed(e) => {
                note_warn(log, format!("FAILED: primary probe failed, no record: {}", e));
                return Err(e);
            }
        };

        let registry = self.registry_step(&record, log).await;
        record.registry = registry;
        self.merge(&mut record, log).await;

        note(
            log,
            format!(
                "DONE: record for {} ({} tech hints, registry {})",
                record.target,
                record.tech_stack_hints.len(),
                if record.registry.is_some() { "attached" } else { "absent" }
            ),
        );
        Ok(record)
    }

    async fn registry_step(
        &self,
        record: &ReconRecord,
        log: &mut DiagnosticLog,
    ) -> Option<RegistryRecord> {
        if !self.config.auto_registry {
            note(log, "REGISTRY: skipped, automatic lookup disabled".to_string());
            return None;
        }
        let ip = match record.concrete_ip() {
            Some(ip) => ip,
            None => {
                note(
                    log,
                    format!("REGISTRY: skipped, no concrete IPv4 (ip estimate {})", record.ip_estimate),
                );
                return None;
            }
        };

        note(log, format!("REGISTRY: RDAP lookup for {}", ip));
        match self.registry.lookup(ip).await {
            ProbeOutcome::Success(registry) | ProbeOutcome::Degraded(registry, _) => {
                note(
                    log,
                    format!(
                        "REGISTRY succeeded: {} ({}, {})",
                        registry.organization, registry.cidr, registry.asn
                    ),
                );
                if disagrees(&record.provider, &registry.organization) {
                    note(
                        log,
                        format!(
                            "REGISTRY: organization {:?} differs from provider {:?}; both retained",
                            registry.organization, record.provider
                        ),
                    );
                }
                Some(registry)
            }
            ProbeOutcome::Failed(e) => {
                note_warn(log, format!("REGISTRY failed, continuing without it: {}", e));
                None
            }
        }
    }

    /// Base facts first, classifier prose appended after
    async fn merge(&self, record: &mut ReconRecord, log: &mut DiagnosticLog) {
        record.risk_notes = observed_facts(record);
        note(log, "MERGE: base facts recorded".to_string());

        let classifier = match &self.classifier {
            Some(c) => c,
            None => return,
        };

        note(log, format!("MERGE: requesting assessment from {}", classifier.name()));
        match classifier.classify(record).await {
            Ok(assessment) => {
                let prose = assessment.risk_notes.trim();
                if !prose.is_empty() {
                    record.risk_notes.push_str(" [ASSESSMENT] ");
                    record.risk_notes.push_str(prose);
                }
                let action = assessment.suggested_action.trim();
                if !action.is_empty() {
                    record.suggested_action = Some(action.to_string());
                }
                note(log, "MERGE: assessment appended".to_string());
            }
            Err(e) => note_warn(log, format!("MERGE: classifier failed, base facts kept: {}", e)),
        }
    }
}

fn cancelled_line(limit: Duration) -> String {
    format!(
        "CANCELLED: deadline of {:.1}s elapsed; in-flight requests abandoned, no record",
        limit.as_secs_f64()
    )
}

fn probe_summary(record: &ReconRecord) -> String {
    match record.http_status {
        Some(status) => format!(
            "HTTP {}, server {}, title {:?}",
            status, record.server_header, record.page_title
        ),
        None => format!(
            "{} at {} ({})",
            record.ip_estimate, record.location, record.provider
        ),
    }
}

fn disagrees(provider: &str, organization: &str) -> bool {
    !is_sentinel(provider)
        && !is_sentinel(organization)
        && !provider.eq_ignore_ascii_case(organization)
}

/// One sentence of verified facts; sentinels are reported as not observed
fn observed_facts(record: &ReconRecord) -> String {
    let mut facts = match record.http_status {
        Some(status) => format!(
            "[OBSERVED] {} answered HTTP {}; server: {}; x-powered-by: {}; title: {:?}.",
            record.target, status, record.server_header, record.powered_by, record.page_title
        ),
        None => format!(
            "[OBSERVED] {} geolocated to {}; provider: {}.",
            record.ip_estimate, record.location, record.provider
        ),
    };

    if !record.tech_stack_hints.is_empty() {
        facts.push_str(&format!(" Stack hints: {}.", record.tech_stack_hints.join(", ")));
    }
    if let Some(registry) = &record.registry {
        facts.push_str(&format!(
            " Registry: {} {}, {}, registered {}.",
            registry.organization, registry.asn, registry.cidr, registry.created_at
        ));
    }
    if is_ipv4_literal(&record.target) && record.http_status.is_none() {
        facts.push_str(" The host itself was not contacted.");
    }
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use torwatch_core::ResultMarkup;
    use torwatch_probes::{ClassifierError, RiskAssessment, RiskClassifier};
    use torwatch_tor::FixtureTransport;

    const GOOGLE_GEO: &str = r#"{
        "ip": "8.8.8.8",
        "city": "Mountain View",
        "country_name": "United States",
        "org": "Google LLC"
    }"#;

    const GOOGLE_RDAP: &str = r#"{
        "startAddress": "8.8.8.0",
        "endAddress": "8.8.8.255",
        "name": "GOGL",
        "arin_originas0_originautnums": [15169],
        "entities": [{
            "roles": ["registrant"],
            "vcardArray": ["vcard", [["fn", {}, "text", "Google LLC"]]]
        }]
    }"#;

    const ONION_PAGE: &str =
        "<html><head><title>Market</title></head><body><p>Welcome</p></body></html>";

    const SEARCH_PAGE: &str = r#"<html><body><ol>
        <li class="result">
          <h4><a href="http://alpha111.onion/">Alpha</a></h4>
          <p>First result</p>
        </li>
    </ol></body></html>"#;

    fn probe_config() -> ProbeConfig {
        ProbeConfig {
            geolocation_url: "http://geo.test/{ip}/json/".to_string(),
            rdap_url: "http://rdap.test/ip/{ip}".to_string(),
            ..Default::default()
        }
    }

    fn engines() -> Vec<SearchEngine> {
        vec![SearchEngine::new(
            "Ahmia",
            "http://search.test/?q={query}",
            ResultMarkup::Ahmia,
        )]
    }

    fn aggregator(tor: Arc<FixtureTransport>, clearweb: Arc<FixtureTransport>) -> Aggregator {
        Aggregator::new(
            tor,
            clearweb,
            engines(),
            probe_config(),
            AggregatorConfig::default(),
        )
    }

    fn google_clearweb() -> Arc<FixtureTransport> {
        Arc::new(
            FixtureTransport::new()
                .respond("http://geo.test/8.8.8.8", 200, &[], GOOGLE_GEO)
                .respond("http://rdap.test/ip/8.8.8.8", 200, &[], GOOGLE_RDAP),
        )
    }

    struct FixedClassifier;

    #[async_trait]
    impl RiskClassifier for FixedClassifier {
        async fn classify(&self, context: &ReconRecord) -> Result<RiskAssessment, ClassifierError> {
            assert!(context.risk_notes.starts_with("[OBSERVED]"));
            Ok(RiskAssessment {
                risk_notes: "Public resolver, low risk.".to_string(),
                suggested_action: "No action.".to_string(),
            })
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct BrokenClassifier;

    #[async_trait]
    impl RiskClassifier for BrokenClassifier {
        async fn classify(&self, _context: &ReconRecord) -> Result<RiskAssessment, ClassifierError> {
            Err(ClassifierError::Api("quota exceeded".to_string()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_ip_recon_end_to_end() {
        let clearweb = google_clearweb();
        let tor = Arc::new(FixtureTransport::new());
        let report = aggregator(tor.clone(), clearweb.clone()).run_recon("8.8.8.8").await;

        let record = report.result.unwrap();
        assert_eq!(record.location, "Mountain View, United States");
        assert_eq!(record.provider, "Google LLC");
        assert_eq!(record.ip_estimate, "8.8.8.8");
        assert_eq!(record.server_header, "Unknown");
        assert!(record.open_ports.is_empty());
        assert!(record.risk_notes.starts_with("[OBSERVED]"));
        assert!(!record.risk_notes.contains("[ASSESSMENT]"));

        let registry = record.registry.unwrap();
        assert_eq!(registry.organization, "Google LLC");
        assert_eq!(registry.cidr, "8.8.8.0/24");

        // The target host itself is never contacted
        assert!(tor.requests().is_empty());
        assert_eq!(clearweb.requests().len(), 2);
        assert!(report.log.last().unwrap().message.starts_with("DONE"));
    }

    #[tokio::test]
    async fn test_onion_connection_refused() {
        let tor = Arc::new(FixtureTransport::new().fail("http://xyz123.onion", "connection refused"));
        let clearweb = Arc::new(FixtureTransport::new());
        let report = aggregator(tor, clearweb.clone()).run_recon("xyz123.onion").await;

        assert!(matches!(report.result, Err(ScanError::Transport(_))));
        assert!(report.log.last().unwrap().message.contains("connection"));
        assert_eq!(clearweb.count_matching("rdap"), 0);
    }

    #[tokio::test]
    async fn test_primary_failure_skips_registry() {
        let clearweb = Arc::new(
            FixtureTransport::new()
                .fail("http://geo.test/", "connection reset")
                .respond("http://rdap.test/", 200, &[], GOOGLE_RDAP),
        );
        let report = aggregator(Arc::new(FixtureTransport::new()), clearweb.clone())
            .run_recon("8.8.8.8")
            .await;

        assert!(report.result.is_err());
        assert_eq!(clearweb.count_matching("rdap.test"), 0);
        assert!(!report.log.messages().any(|m| m.starts_with("MERGE")));
    }

    #[tokio::test]
    async fn test_invalid_target_rejected_without_network() {
        let tor = Arc::new(FixtureTransport::new());
        let clearweb = Arc::new(FixtureTransport::new());
        let report = aggregator(tor.clone(), clearweb.clone()).run_recon("not a target").await;

        assert!(matches!(report.result, Err(ScanError::Validation(_))));
        assert!(report.log.last().unwrap().message.starts_with("REJECTED"));
        assert!(tor.requests().is_empty());
        assert!(clearweb.requests().is_empty());
    }

    #[tokio::test]
    async fn test_recon_is_idempotent() {
        let tor = Arc::new(FixtureTransport::new().respond(
            "http://abc.onion",
            200,
            &[("Server", "nginx")],
            ONION_PAGE,
        ));
        let aggregator = aggregator(tor, Arc::new(FixtureTransport::new()));

        let first = aggregator.run_recon("abc.onion").await;
        let second = aggregator.run_recon("abc.onion").await;

        assert_ne!(first.scan_id, second.scan_id);
        assert_eq!(first.result.unwrap(), second.result.unwrap());
    }

    #[tokio::test]
    async fn test_onion_recon_skips_registry() {
        let tor = Arc::new(FixtureTransport::new().respond(
            "http://abc.onion",
            404,
            &[("Server", "nginx")],
            ONION_PAGE,
        ));
        let clearweb = Arc::new(FixtureTransport::new());
        let report = aggregator(tor, clearweb.clone()).run_recon("abc.onion").await;

        let record = report.result.unwrap();
        assert_eq!(record.http_status, Some(404));
        assert_eq!(record.server_header, "nginx");
        assert_eq!(record.ip_estimate, "MASKED");
        assert!(record.registry.is_none());
        assert!(clearweb.requests().is_empty());
        assert!(report.log.messages().any(|m| m.starts_with("REGISTRY: skipped")));
    }

    #[tokio::test]
    async fn test_registry_disabled() {
        let clearweb = google_clearweb();
        let config = AggregatorConfig {
            auto_registry: false,
            ..Default::default()
        };
        let aggregator = Aggregator::new(
            Arc::new(FixtureTransport::new()),
            clearweb.clone(),
            engines(),
            probe_config(),
            config,
        );

        let record = aggregator.run_recon("8.8.8.8").await.result.unwrap();
        assert!(record.registry.is_none());
        assert_eq!(clearweb.count_matching("rdap.test"), 0);
    }

    #[tokio::test]
    async fn test_registry_failure_is_absorbed() {
        let clearweb = Arc::new(
            FixtureTransport::new()
                .respond("http://geo.test/", 200, &[], GOOGLE_GEO)
                .respond("http://rdap.test/", 503, &[], "busy"),
        );
        let report = aggregator(Arc::new(FixtureTransport::new()), clearweb)
            .run_recon("8.8.8.8")
            .await;

        let record = report.result.unwrap();
        assert!(record.registry.is_none());
        assert_eq!(record.provider, "Google LLC");
        assert!(report.log.messages().any(|m| m.contains("HTTP 503")));
    }

    #[tokio::test]
    async fn test_registry_disagreement_retained() {
        let geo = r#"{"ip": "8.8.8.8", "city": "Mountain View",
            "country_name": "United States", "org": "GOOGLE"}"#;
        let rdap = GOOGLE_RDAP.replace("Google LLC", "Level 3 Parent, LLC");
        let clearweb = Arc::new(
            FixtureTransport::new()
                .respond("http://geo.test/", 200, &[], geo)
                .respond("http://rdap.test/", 200, &[], &rdap),
        );
        let report = aggregator(Arc::new(FixtureTransport::new()), clearweb)
            .run_recon("8.8.8.8")
            .await;

        let record = report.result.unwrap();
        assert_eq!(record.provider, "GOOGLE");
        assert_eq!(record.registry.unwrap().organization, "Level 3 Parent, LLC");
        assert!(report.log.messages().any(|m| m.contains("both retained")));
    }

    #[tokio::test]
    async fn test_classifier_appends_after_base_facts() {
        let aggregator = aggregator(Arc::new(FixtureTransport::new()), google_clearweb())
            .with_classifier(Arc::new(FixedClassifier));

        let record = aggregator.run_recon("8.8.8.8").await.result.unwrap();
        let observed = record.risk_notes.find("[OBSERVED]").unwrap();
        let assessed = record.risk_notes.find("[ASSESSMENT] Public resolver").unwrap();
        assert!(observed < assessed);
        assert_eq!(record.suggested_action.as_deref(), Some("No action."));
    }

    #[tokio::test]
    async fn test_classifier_failure_is_absorbed() {
        let aggregator = aggregator(Arc::new(FixtureTransport::new()), google_clearweb())
            .with_classifier(Arc::new(BrokenClassifier));

        let report = aggregator.run_recon("8.8.8.8").await;
        assert!(report.log.messages().any(|m| m.contains("quota exceeded")));

        let record = report.result.unwrap();
        assert!(record.risk_notes.starts_with("[OBSERVED]"));
        assert!(!record.risk_notes.contains("[ASSESSMENT]"));
        assert!(record.suggested_action.is_none());
    }

    #[tokio::test]
    async fn test_classifier_not_called_on_failure() {
        let tor = Arc::new(FixtureTransport::new().fail("http://", "connection refused"));
        let aggregator = aggregator(tor, Arc::new(FixtureTransport::new()))
            .with_classifier(Arc::new(FixedClassifier));

        let report = aggregator.run_recon("abc.onion").await;
        assert!(report.result.is_err());
        assert!(!report.log.messages().any(|m| m.contains("assessment")));
    }

    #[tokio::test]
    async fn test_deadline_cancels_recon() {
        let tor = Arc::new(FixtureTransport::new().stall("http://slow.onion"));
        let aggregator = aggregator(tor, Arc::new(FixtureTransport::new()));

        let report = aggregator
            .run_recon_with_deadline("slow.onion", Some(Duration::from_millis(50)))
            .await;

        assert_eq!(report.result, Err(ScanError::Cancelled));
        assert!(report.log.last().unwrap().message.starts_with("CANCELLED"));
        assert!(report.log.messages().any(|m| m.starts_with("ONION_PROBE")));
    }

    #[tokio::test]
    async fn test_search_collects_results() {
        let tor = Arc::new(FixtureTransport::new().respond("http://search.test/", 200, &[], SEARCH_PAGE));
        let report = aggregator(tor.clone(), Arc::new(FixtureTransport::new()))
            .run_search("market place")
            .await;

        let services = report.result.unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].url, "http://alpha111.onion/");
        assert_eq!(tor.requests(), vec!["http://search.test/?q=market%20place".to_string()]);
        assert!(report.log.messages().any(|m| m == "SEARCH Ahmia: 1 results"));
    }

    #[tokio::test]
    async fn test_search_empty_query_rejected() {
        let tor = Arc::new(FixtureTransport::new());
        let report = aggregator(tor.clone(), Arc::new(FixtureTransport::new()))
            .run_search("   ")
            .await;

        assert!(matches!(report.result, Err(ScanError::Validation(_))));
        assert!(tor.requests().is_empty());
    }

    #[tokio::test]
    async fn test_search_engine_unreachable() {
        let tor = Arc::new(FixtureTransport::new().fail("http://search.test/", "connection refused"));
        let report = aggregator(tor, Arc::new(FixtureTransport::new()))
            .run_search("market")
            .await;

        assert!(matches!(report.result, Err(ScanError::Transport(_))));
        assert!(report.log.last().unwrap().message.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_search_engine_error_status_fails_scan() {
        let tor = Arc::new(FixtureTransport::new().respond(
            "http://search.test/",
            503,
            &[],
            "<html><body>Service Unavailable</body></html>",
        ));
        let report = aggregator(tor, Arc::new(FixtureTransport::new()))
            .run_search("market")
            .await;

        assert!(matches!(report.result, Err(ScanError::Upstream(_))));
        let last = &report.log.last().unwrap().message;
        assert!(last.starts_with("FAILED"));
        assert!(last.contains("HTTP 503"));
    }

    #[tokio::test]
    async fn test_lookup_registry_standalone() {
        let report = aggregator(Arc::new(FixtureTransport::new()), google_clearweb())
            .lookup_registry("8.8.8.8")
            .await;

        assert_eq!(report.result.unwrap().asn, "AS15169");
    }

    #[tokio::test]
    async fn test_check_connectivity() {
        let tor = Arc::new(FixtureTransport::new().with_health(ConnectivityStatus {
            reachable: true,
            exit_identity: Some("185.220.101.1".to_string()),
            is_tor: Some(true),
            error: None,
        }));
        let status = aggregator(tor, Arc::new(FixtureTransport::new()))
            .check_connectivity()
            .await;

        assert!(status.reachable);
        assert_eq!(status.exit_identity.as_deref(), Some("185.220.101.1"));
    }
}
