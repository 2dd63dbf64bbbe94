//! Netsweep CLI - single-pass network discovery from the terminal
//!
//! This binary drives the netsweep core:
//! - Scan an address range and classify every host
//! - Show the last stored scan
//! - List port profiles and probe capabilities

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use netsweep_core::config::{self, ScanConfig};
use netsweep_core::scanner::{privileges, DeviceRecord, ScanOrchestrator, ScanSnapshot};
use netsweep_core::store::{JsonFileStore, SnapshotStore};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "netsweep")]
#[command(author = "Stratiform LLC")]
#[command(version)]
#[command(about = "Discover and classify the hosts in an IPv4 address range")]
#[command(long_about = "
Netsweep probes every address in a range, correlates MAC vendors from the
local neighbor table and classifies each host (printer, VoIP phone, camera,
Windows PC, ...). Results are written after every host so `netsweep show`
always sees a complete snapshot.

Ranges:
  192.168.1.0/24            CIDR block
  192.168.1.10-20           last-octet range
  10.0.0.250-10.0.1.5       full range
  192.168.1.1               single address

Press Ctrl-C during a scan to stop after the current host.
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan an address range
    Scan {
        /// CIDR, last-octet range, full range or single address
        range: String,

        /// Port profile to probe (see `netsweep profiles`)
        #[arg(short, long)]
        profile: Option<String>,

        /// Addresses probed at once
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Skip reverse hostname lookups
        #[arg(long)]
        no_hostnames: bool,
    },

    /// Show the last stored scan
    Show,

    /// List available port profiles
    Profiles,

    /// Check what this process can probe
    Capabilities,

    /// Show configuration paths and settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("netsweep={},netsweep_core={}", log_level, log_level).into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Scan {
            range,
            profile,
            concurrency,
            no_hostnames,
        } => cmd_scan(&cli, range, profile.clone(), *concurrency, *no_hostnames).await,
        Commands::Show => cmd_show(&cli),
        Commands::Profiles => cmd_profiles(&cli),
        Commands::Capabilities => cmd_capabilities(&cli).await,
        Commands::Config => cmd_config(&cli),
    }
}

async fn cmd_scan(
    cli: &Cli,
    range: &str,
    profile: Option<String>,
    concurrency: Option<usize>,
    no_hostnames: bool,
) -> Result<()> {
    let mut config = config::load_config();
    if let Some(profile) = profile {
        config.profile = profile;
    }
    if let Some(concurrency) = concurrency {
        config.concurrency = concurrency.clamp(1, config::MAX_CONCURRENCY);
    }
    if no_hostnames {
        config.resolve_hostnames = false;
    }

    let profile = config.active_profile()?;
    let orchestrator = ScanOrchestrator::from_config(&config);
    let handle = orchestrator.start(range, profile)?;

    let token = handle.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping after the current host");
            token.cancel();
        }
    });

    let progress = match cli.format {
        OutputFormat::Text => {
            let mut updates = handle.subscribe();
            let initial = updates.borrow_and_update().clone();
            println!(
                "Scanning {} ({} addresses, profile {})...",
                initial.range, initial.total, initial.profile
            );
            Some(tokio::spawn(async move {
                while updates.changed().await.is_ok() {
                    let snapshot = updates.borrow_and_update().clone();
                    if let Some(line) = progress_line(&snapshot) {
                        println!("{}", line);
                    }
                }
            }))
        }
        OutputFormat::Json => None,
    };

    let snapshot = handle.wait().await?;
    ctrl_c.abort();
    if let Some(progress) = progress {
        let _ = progress.await;
    }

    match cli.format {
        OutputFormat::Text => {
            println!();
            print_snapshot(&snapshot);
            if let Some(path) = &config.store_path {
                println!();
                println!("Saved to {}", path.display());
            }
        }
        OutputFormat::Json => print_json(&snapshot)?,
    }

    Ok(())
}

fn cmd_show(cli: &Cli) -> Result<()> {
    let config = config::load_config();
    let path = config
        .store_path
        .context("No store path available on this system")?;

    let store = JsonFileStore::new(&path);
    let snapshot = store.load()?;

    match (cli.format, snapshot) {
        (OutputFormat::Text, Some(snapshot)) => print_snapshot(&snapshot),
        (OutputFormat::Text, None) => {
            println!("No stored scan at {}", path.display());
            println!("Run 'netsweep scan <RANGE>' first.");
        }
        (OutputFormat::Json, snapshot) => print_json(&snapshot)?,
    }

    Ok(())
}

#[derive(Serialize)]
struct ProfileView<'a> {
    name: &'a str,
    ports: &'a [u16],
    active: bool,
}

fn cmd_profiles(cli: &Cli) -> Result<()> {
    let config = config::load_config();
    let profiles = config.available_profiles();
    let views: Vec<ProfileView<'_>> = profiles
        .iter()
        .map(|p| ProfileView {
            name: p.name(),
            ports: p.ports(),
            active: p.name().eq_ignore_ascii_case(&config.profile),
        })
        .collect();

    match cli.format {
        OutputFormat::Text => {
            for view in &views {
                let marker = if view.active { "*" } else { " " };
                let ports: Vec<String> = view.ports.iter().map(|p| p.to_string()).collect();
                println!("{} {:14} {}", marker, view.name, ports.join(", "));
            }
        }
        OutputFormat::Json => print_json(&views)?,
    }

    Ok(())
}

async fn cmd_capabilities(cli: &Cli) -> Result<()> {
    let caps = privileges::detect_capabilities().await;

    match cli.format {
        OutputFormat::Text => {
            println!("Mode:     {}", if caps.is_limited() { "limited" } else { "full" });
            println!("Ping:     {}", if caps.can_ping { "available" } else { "unavailable" });
            println!(
                "Neighbor: {}",
                if caps.can_read_neighbors { "available" } else { "unavailable" }
            );
            println!("Elevated: {}", if caps.is_elevated { "yes" } else { "no" });
            println!();
            println!("{}", privileges::format_capabilities_message(&caps));
        }
        OutputFormat::Json => print_json(&caps)?,
    }

    Ok(())
}

fn cmd_config(cli: &Cli) -> Result<()> {
    let config = config::load_config();
    let config_path = config::config_file_path_string();

    match cli.format {
        OutputFormat::Text => print_config(&config, &config_path),
        OutputFormat::Json => {
            print_json(&serde_json::json!({
                "config_file": config_path,
                "source": config.source.to_string(),
                "profile": config.profile,
                "ping_timeout_ms": config.ping_timeout_ms,
                "connect_timeout_ms": config.connect_timeout_ms,
                "hostname_timeout_ms": config.hostname_timeout_ms,
                "concurrency": config.concurrency,
                "resolve_hostnames": config.resolve_hostnames,
                "vendor_db": config.vendor_db_path,
                "store": config.store_path,
            }))?;
        }
    }

    Ok(())
}

fn print_config(config: &ScanConfig, config_path: &str) {
    let show_path = |p: &Option<std::path::PathBuf>| {
        p.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file:     {}", config_path);
    println!("Loaded from:     {}", config.source);
    println!("Port profile:    {}", config.profile);
    println!(
        "Timeouts:        ping {} ms, connect {} ms, hostname {} ms",
        config.ping_timeout_ms, config.connect_timeout_ms, config.hostname_timeout_ms
    );
    println!("Concurrency:     {}", config.concurrency);
    println!("Hostnames:       {}", if config.resolve_hostnames { "on" } else { "off" });
    println!("Vendor registry: {}", show_path(&config.vendor_db_path));
    println!("Result store:    {}", show_path(&config.store_path));
    println!();
    println!("Environment variables:");
    println!("  NETSWEEP_PROFILE   - Override the port profile");
    println!("  NETSWEEP_VENDOR_DB - Override the vendor registry path");
    println!("  NETSWEEP_STORE     - Override the result store path");
    println!();
    println!("Example config.toml:");
    println!();
    println!("{}", config::generate_example_config());
}

/// The host a progress update just added, if it answered. Terminal
/// snapshots repeat the last host and are skipped.
fn progress_line(snapshot: &ScanSnapshot) -> Option<String> {
    if snapshot.state.is_terminal() {
        return None;
    }
    let record = snapshot.records.last().filter(|r| r.is_reachable())?;
    Some(format!(
        "  [{:>3}%] {:15} {}",
        snapshot.percent(),
        record.ip,
        record.category
    ))
}

fn print_snapshot(snapshot: &ScanSnapshot) {
    let updated = snapshot.updated_at.with_timezone(&Local);
    println!(
        "Scan of {} ({}): {}/{} addresses, {} reachable, last update {}",
        snapshot.range,
        snapshot.state,
        snapshot.progress,
        snapshot.total,
        snapshot.reachable_count(),
        updated.format("%Y-%m-%d %H:%M:%S")
    );
    println!();

    let reachable: Vec<&DeviceRecord> = snapshot.records.iter().filter(|r| r.is_reachable()).collect();
    if reachable.is_empty() {
        println!("  No reachable hosts.");
        return;
    }

    for record in reachable {
        let time_str = record
            .response_time_ms
            .map(|t| format!("{:.1}ms", t))
            .unwrap_or_else(|| "-".to_string());
        let ports: Vec<String> = record.open_ports.iter().map(|p| p.to_string()).collect();

        println!(
            "  {:15} {:>8}  {:17}  {:20}  {}",
            record.ip,
            time_str,
            record.mac,
            record.category.to_string(),
            record.hostname
        );
        println!(
            "  {:15} {:>8}  vendor: {}  ports: {}  os: {}",
            "",
            "",
            record.vendor,
            if ports.is_empty() { "-".to_string() } else { ports.join(",") },
            record.os_hint
        );
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
