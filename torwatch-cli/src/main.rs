//! TorWatch CLI
//!
//! Darknet reconnaissance: hidden-service search, single-target recon and
//! registry lookups over a Tor SOCKS5 proxy.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use torwatch_core::{DiscoveredService, ReconRecord, RegistryRecord};
use torwatch_probes::{LlmClassifierConfig, LlmRiskClassifier};
use torwatch_runtime::{load_config, Aggregator, ScanReport, TorWatchConfig};

#[derive(Parser)]
#[command(name = "torwatch")]
#[command(author, version, about = "TorWatch: darknet reconnaissance aggregation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "TORWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Tor SOCKS5 proxy, e.g. socks5h://127.0.0.1:9050
    #[arg(long, global = true, env = "TORWATCH_SOCKS")]
    socks: Option<String>,

    /// Whole-scan deadline in seconds (overrides the config file)
    #[arg(long, global = true)]
    deadline: Option<u64>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbosity level (0-3)
    #[arg(short, long, global = true, default_value = "1")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Search hidden-service engines
    Search {
        /// The search query
        #[arg(short, long)]
        query: String,
    },

    /// Probe one target (IPv4 address or .onion host)
    Recon {
        /// Target to probe
        target: String,

        /// Skip the automatic RDAP lookup
        #[arg(long)]
        no_registry: bool,

        /// OpenAI-compatible API key; enables risk classification
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Base URL for OpenRouter or a local server
        #[arg(long, env = "OPENAI_BASE_URL")]
        base_url: Option<String>,

        /// Classifier model
        #[arg(short, long, env = "TORWATCH_MODEL", default_value = "gpt-4o-mini")]
        model: String,
    },

    /// RDAP ownership lookup for an IPv4 address
    Whois {
        /// IPv4 address
        ip: String,
    },

    /// Check Tor connection status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(socks) = &cli.socks {
        config.tor = config.tor.with_socks(socks);
    }
    if let Some(secs) = cli.deadline {
        config.scan.scan_deadline_secs = secs;
    }

    match cli.command {
        Commands::Search { query } => {
            let aggregator = Aggregator::from_config(&config)?;
            let report = aggregator.run_search(&query).await;
            finish(&report, cli.json, print_services)
        }
        Commands::Recon {
            target,
            no_registry,
            api_key,
            base_url,
            model,
        } => {
            if no_registry {
                config.scan.auto_registry = false;
            }
            let aggregator = build_recon_aggregator(&config, api_key, base_url, &model)?;
            let report = aggregator.run_recon(&target).await;
            finish(&report, cli.json, print_record)
        }
        Commands::Whois { ip } => {
            let aggregator = Aggregator::from_config(&config)?;
            let report = aggregator.lookup_registry(&ip).await;
            finish(&report, cli.json, print_registry)
        }
        Commands::Status => check_status(&config, cli.json).await,
    }
}

fn build_recon_aggregator(
    config: &TorWatchConfig,
    api_key: Option<String>,
    base_url: Option<String>,
    model: &str,
) -> Result<Aggregator> {
    let aggregator = Aggregator::from_config(config)?;

    let key = match api_key.filter(|k| !k.trim().is_empty()) {
        Some(k) => k,
        None => {
            info!("No API key set, risk classification disabled");
            return Ok(aggregator);
        }
    };

    let mut classifier_config = LlmClassifierConfig::openai(&key, model);
    if let Some(url) = base_url.as_deref() {
        classifier_config = classifier_config.with_base_url(url);
    }
    info!("Risk classification via {}", model);

    Ok(aggregator.with_classifier(Arc::new(LlmRiskClassifier::new(classifier_config))))
}

/// Print a report; a failed scan exits non-zero after its log is shown
fn finish<T: Serialize>(report: &ScanReport<T>, json: bool, render: fn(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("Scan {}", report.scan_id);
        for entry in report.log.entries() {
            println!("  {}", entry);
        }
        println!();
        if let Ok(value) = &report.result {
            render(value);
        }
    }

    match &report.result {
        Ok(_) => Ok(()),
        Err(e) => Err(anyhow::anyhow!("scan failed: {}", e)),
    }
}

fn print_services(services: &Vec<DiscoveredService>) {
    if services.is_empty() {
        println!("No hidden services found.");
        return;
    }

    for (i, service) in services.iter().enumerate() {
        println!("{:>3}. {}", i + 1, service.title);
        println!("     {}", service.url);
        if !service.snippet.is_empty() {
            println!("     {}", service.snippet);
        }
        println!(
            "     last seen: {} | via {}",
            service.last_seen_hint, service.source_engine
        );
    }
}

fn print_record(record: &ReconRecord) {
    println!("Target:       {}", record.target);
    println!("IP estimate:  {}", record.ip_estimate);
    println!("Provider:     {}", record.provider);
    println!("Location:     {}", record.location);
    println!("Server:       {}", record.server_header);
    println!("Powered by:   {}", record.powered_by);
    println!("Title:        {}", record.page_title);
    if let Some(status) = record.http_status {
        println!("HTTP status:  {}", status);
    }
    if let Some(hash) = &record.body_sha256 {
        println!("Body SHA-256: {}", hash);
    }
    if !record.tech_stack_hints.is_empty() {
        println!("Tech stack:   {}", record.tech_stack_hints.join(", "));
    }
    if let Some(registry) = &record.registry {
        println!();
        print_registry(registry);
    }
    if !record.body_preview.is_empty() {
        println!("\nPreview:\n{}", record.body_preview);
    }
    println!("\nRisk notes:\n{}", record.risk_notes);
    if let Some(action) = &record.suggested_action {
        println!("\nSuggested action: {}", action);
    }
}

fn print_registry(registry: &RegistryRecord) {
    println!("Registry ({})", registry.queried_ip);
    println!("  Organization: {}", registry.organization);
    println!("  Network:      {} ({})", registry.name, registry.cidr);
    println!("  ASN:          {}", registry.asn);
    println!("  Country:      {}", registry.country_code);
    println!("  Registered:   {}", registry.created_at);
    println!("  Updated:      {}", registry.updated_at);
    if !registry.status.is_empty() {
        println!("  Status:       {}", registry.status.join(", "));
    }
    for contact in &registry.contacts {
        println!("  Contact:      {} <{}>", contact.role, contact.email);
    }
}

async fn check_status(config: &TorWatchConfig, json: bool) -> Result<()> {
    let aggregator = Aggregator::from_config(config)?;
    let status = aggregator.check_connectivity().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Checking Tor connection via {}...\n", config.tor.socks_addr);
    if status.reachable {
        println!("Tor proxy is reachable");
        if let Some(exit) = &status.exit_identity {
            println!("   Exit address: {}", exit);
        }
        if status.is_tor == Some(false) {
            println!("   Warning: check endpoint did not see the request arrive over Tor");
        }
    } else {
        println!("Tor proxy is not accessible");
        if let Some(error) = &status.error {
            println!("   Reason: {}", error);
        }
        println!("\n   To install Tor:");
        println!("   - Linux: sudo apt install tor");
        println!("   - Mac: brew install tor");
        println!("   - Then start: sudo systemctl start tor (or brew services start tor)");
    }

    Ok(())
}
