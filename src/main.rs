use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use relay_probe_rs::candidates::{self, StaticPool};
use relay_probe_rs::config::{self, RunConfig};
use relay_probe_rs::geo::GeoTable;
use relay_probe_rs::types::StopReason;
use relay_probe_rs::{output, scheduler, server};

/// relay-probe-rs — quota-driven async TCP latency prober building per-country relay lists.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "relay-probe-rs",
    version,
    about = "Quota-driven async TCP latency prober building per-country fast relay endpoint lists.",
    long_about = None
)]
struct Cli {
    /// Candidate list file (IPs, ip:port entries, or CIDR blocks).
    #[arg(long)]
    candidates: Option<PathBuf>,

    /// Address-to-country table file (`address CC` per line).
    #[arg(long)]
    geo: Option<PathBuf>,

    /// Target countries, comma-separated.
    #[arg(long, default_value = "US,HK,JP,SG")]
    countries: String,

    /// Target result count per country, comma-separated (same order).
    #[arg(long, default_value = "20,20,5,5")]
    counts: String,

    /// Probe ports tried in order; the first successful connect wins.
    #[arg(long, default_value = "8443")]
    ports: String,

    /// Max concurrent TCP connect attempts.
    #[arg(long, default_value_t = 30)]
    concurrency: usize,

    /// Socket connect timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 5_000)]
    timeout_ms: u64,

    /// Stop after probing this many candidates (0 = unbounded).
    #[arg(long = "max-candidates", default_value_t = 0)]
    max_candidates: usize,

    /// Discard results slower than this many milliseconds (0 = disabled).
    #[arg(long = "max-latency-ms", default_value_t = 2_000)]
    max_latency_ms: u64,

    /// Host samples drawn per CIDR block in the candidate list.
    #[arg(long = "cidr-samples", default_value_t = candidates::DEFAULT_CIDR_SAMPLES)]
    cidr_samples: usize,

    /// Directory for per-country result files and summary.txt.
    #[arg(long, default_value = "results")]
    output: PathBuf,

    /// Write the full report as pretty JSON to this path (optional).
    #[arg(long)]
    json: Option<PathBuf>,

    /// Start the embedded HTTP status server instead of a one-shot run.
    #[arg(long = "serve-ui", default_value_t = false)]
    serve_ui: bool,

    /// Bind address for the status server.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let countries = config::parse_countries_arg(&cli.countries)?;
    let counts = config::parse_counts_arg(&countries, &cli.counts)?;
    let ports = config::parse_ports_arg(&cli.ports)?;

    let run_config = RunConfig {
        countries,
        counts,
        ports,
        max_concurrent: cli.concurrency,
        timeout: Duration::from_millis(cli.timeout_ms),
        max_candidates: cli.max_candidates,
        max_latency_ms: cli.max_latency_ms,
    };
    run_config.validate()?;

    let resolver = Arc::new(match cli.geo.as_deref() {
        Some(path) => GeoTable::load_from_path(path)?,
        None => {
            eprintln!("Warning: no --geo table given; every address resolves as unknown");
            GeoTable::default()
        }
    });

    if cli.serve_ui {
        println!("Press Ctrl+C to stop the server...");
        return server::spawn_server(&cli.bind, resolver).await;
    }

    let Some(candidates_path) = cli.candidates.as_deref() else {
        bail!("--candidates is required unless --serve-ui is set");
    };
    let pool = candidates::load_candidates_from_path(candidates_path, cli.cidr_samples)?;

    println!("relay-probe-rs configuration:");
    println!("  candidates   : {} ({} addresses)", candidates_path.display(), pool.len());
    println!(
        "  geo table    : {}",
        cli.geo
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );
    println!("  countries    : {}", run_config.countries.join(","));
    println!("  ports        : {:?}", run_config.ports);
    println!("  concurrency  : {}", run_config.max_concurrent);
    println!("  timeout_ms   : {}", cli.timeout_ms);
    println!("  max_cands    : {}", run_config.max_candidates);

    // Ctrl-C cancels the run; in-flight probes finish, results are kept.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_ctrlc.cancel();
    });

    let mut source = StaticPool::new(pool);
    let report =
        scheduler::run_probe_scan_with_cancel(&mut source, resolver, &run_config, cancel).await?;

    output::print_report_table(&report);
    match report.stop_reason {
        StopReason::QuotasSatisfied => println!("\nAll country quotas satisfied."),
        StopReason::PoolExhausted => println!("\nCandidate pool exhausted before all quotas were met."),
        StopReason::ScanCapReached => println!("\nScan cap reached before all quotas were met."),
        StopReason::Cancelled => println!("\nRun cancelled; partial results kept."),
    }

    output::write_country_files(&cli.output, &report)?;
    println!("Wrote country lists to {}", cli.output.display());

    if let Some(path) = cli.json.as_deref() {
        output::write_report_json(path, &report)?;
        println!("Wrote JSON report to {}", path.display());
    }

    Ok(())
}
