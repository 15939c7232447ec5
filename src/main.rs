//! blitz-fetch
//!
//! Bulk fetcher for the WoT Blitz public API.
//!
//! # Architecture Overview
//!
//! ```text
//!   account IDs ──▶ wg::Region ──▶ wg::WgApi (Target per request)
//!                                        │
//!                 ┌──────────────────────┼──────────────────────┐
//!                 ▼                      ▼                      ▼
//!         Dispatcher (eu)        Dispatcher (com)        Dispatcher (ru) ...
//!         Governor   (eu)        Governor   (com)        Governor   (ru)
//!                 │                      │                      │
//!                 └──────── shared HttpTransport (reqwest) ─────┘
//!                                        │
//!                                        ▼
//!                          sink::pump_all ──▶ JSON lines
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::AsyncWrite;

use blitz_fetch::config::{load_config, validate_config, EngineConfig};
use blitz_fetch::dispatch::Dispatcher;
use blitz_fetch::governor::Governor;
use blitz_fetch::lifecycle::{spawn_signal_handler, Shutdown};
use blitz_fetch::observability::{logging, metrics, stats};
use blitz_fetch::resilience::{Classifier, RetryPolicy};
use blitz_fetch::sink::{pump_all, JsonLinesSink};
use blitz_fetch::transport::{HttpTransport, Target};
use blitz_fetch::wg::{EnvelopeInspector, Region, WgApi, MAX_ACCOUNTS_PER_REQUEST};

#[derive(Parser)]
#[command(name = "blitz-fetch")]
#[command(about = "Fetch WoT Blitz API data at an adaptive, rate-limited pace", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write JSON lines here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Per-tank stats, one request per account
    TankStats {
        account_ids: Vec<u64>,
        /// Only these tank IDs
        #[arg(long, value_delimiter = ',')]
        tanks: Vec<u32>,
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
    },
    /// Account info, up to 100 accounts per request
    AccountInfo {
        account_ids: Vec<u64>,
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
    },
    /// Account achievements, up to 100 accounts per request
    Achievements {
        account_ids: Vec<u64>,
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
    },
}

type Requests = BTreeMap<Region, Vec<(String, Target)>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let config = EngineConfig::default();
            if let Err(errors) = validate_config(&config) {
                return Err(format!("default configuration is invalid: {:?}", errors).into());
            }
            config
        }
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.observability.log_level.clone());
    logging::init_logging(&level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "blitz-fetch starting");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    if config.api.app_id.is_empty() {
        tracing::warn!("No application_id configured, the API will reject requests");
    }

    let api = WgApi::from_config(&config.api);
    let requests = build_requests(&api, &cli.command);
    if requests.is_empty() {
        return Err("no requests to send".into());
    }

    let transport = Arc::new(HttpTransport::new(&config.transport)?);
    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let mut dispatchers = Vec::new();
    let mut batches = Vec::new();
    for (region, region_requests) in requests {
        let governor = Arc::new(Governor::named(region.as_str(), region_governor(&config, region)));
        let classifier = Classifier::new(RetryPolicy::from(&config.retry))
            .with_inspector(Arc::new(EnvelopeInspector));
        let dispatcher = Dispatcher::from_parts(Arc::clone(&transport), governor, classifier, &config);

        tracing::info!(
            region = %region,
            requests = region_requests.len(),
            max_rate = dispatcher.governor().config().max_rate,
            "Submitting batch"
        );
        batches.push(dispatcher.submit_with_shutdown(region_requests, &shutdown));
        dispatchers.push((region, dispatcher));
    }

    let writer: Box<dyn AsyncWrite + Unpin + Send> = match &cli.output {
        Some(path) => Box::new(tokio::fs::File::create(path).await?),
        None => Box::new(tokio::io::stdout()),
    };
    let mut sink = JsonLinesSink::new(writer);
    let report = pump_all(batches, &mut sink).await?;

    let summaries = dispatchers
        .iter()
        .map(|(region, d)| (region.as_str(), d.stats().summary()));
    for (name, summary) in stats::merge_summaries(summaries) {
        eprintln!("{:<6} {}", name, summary);
    }

    tracing::info!(
        succeeded = report.succeeded,
        failed = report.failed,
        cancelled = report.cancelled,
        "blitz-fetch finished"
    );
    Ok(())
}

/// Governor bounds for one region, capped by the configured API ceiling.
fn region_governor(config: &EngineConfig, region: Region) -> blitz_fetch::config::GovernorConfig {
    let ceiling = match region {
        Region::Ru => config.api.effective_ru_rate_limit(),
        _ => config.api.rate_limit,
    };
    let mut governor = config.governor.clone();
    if ceiling > 0.0 {
        governor.max_rate = governor.max_rate.min(ceiling);
        governor.initial_rate = governor.initial_rate.min(governor.max_rate);
        governor.min_rate = governor.min_rate.min(governor.max_rate);
    }
    governor
}

fn build_requests(api: &WgApi, command: &Commands) -> Requests {
    let mut requests = Requests::new();
    match command {
        Commands::TankStats {
            account_ids,
            tanks,
            fields,
        } => {
            let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
            for &account_id in account_ids {
                let region = Region::from_account_id(account_id);
                match api.tank_stats_target(account_id, region, tanks, &fields) {
                    Ok(target) => requests
                        .entry(region)
                        .or_default()
                        .push((format!("tank-stats:{}", account_id), target)),
                    Err(e) => tracing::warn!(account_id, error = %e, "Skipping account"),
                }
            }
        }
        Commands::AccountInfo { account_ids, fields } => {
            let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
            chunked(account_ids, "account-info", &mut requests, |ids, region| {
                api.account_info_target(ids, region, &fields)
            });
        }
        Commands::Achievements { account_ids, fields } => {
            let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
            chunked(account_ids, "achievements", &mut requests, |ids, region| {
                api.achievements_target(ids, region, &fields)
            });
        }
    }
    requests
}

/// Group IDs by region and build one request per chunk of at most
/// [`MAX_ACCOUNTS_PER_REQUEST`] IDs.
fn chunked<F>(account_ids: &[u64], label: &str, requests: &mut Requests, build: F)
where
    F: Fn(&[u64], Region) -> Result<Target, blitz_fetch::wg::WgError>,
{
    let mut by_region: BTreeMap<Region, Vec<u64>> = BTreeMap::new();
    for &account_id in account_ids {
        by_region
            .entry(Region::from_account_id(account_id))
            .or_default()
            .push(account_id);
    }

    for (region, ids) in by_region {
        for (n, chunk) in ids.chunks(MAX_ACCOUNTS_PER_REQUEST).enumerate() {
            match build(chunk, region) {
                Ok(target) => requests
                    .entry(region)
                    .or_default()
                    .push((format!("{}:{}:{}", label, region, n), target)),
                Err(e) => {
                    tracing::warn!(region = %region, error = %e, "Skipping accounts");
                    break;
                }
            }
        }
    }
}
