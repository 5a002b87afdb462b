//! HBFW - Host-Based FireWall
//!
//! Command-line front end for the rule engine.
//!
//! # Usage
//!
//! ```bash
//! hbfw check --rules rules.csv inbound tcp 80 192.168.1.2   # exit 0 = accept, 1 = reject
//! hbfw batch --rules rules.csv --packets packets.csv --format json
//! hbfw validate --rules rules.csv                           # report every malformed line
//! hbfw list --rules rules.csv                               # print rules in canonical form
//! hbfw config --save                                        # write effective config
//! hbfw audit -n 10                                          # show recent audit events
//! ```
//!
//! `--rules` may be omitted when `rules_path` is set in `config.json`.

use clap::{Parser, Subcommand, ValueEnum};
use hbfw::audit::{self, AuditLog};
use hbfw::config::{self, AppConfig};
use hbfw::core::loader::{self, LoadedRules};
use hbfw::{Packet, QueryPolicy, Strictness};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

shadow_rs::shadow!(build);

/// Exit code for errors (as opposed to a reject decision)
const EXIT_ERROR: u8 = 2;

#[derive(Parser)]
#[command(name = "hbfw")]
#[command(version, long_version = build::CLAP_LONG_VERSION)]
#[command(about = "Host-based firewall - decide packets against a static rule list", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Skip malformed rules with a warning instead of refusing the rule file
    #[arg(long, global = true)]
    trusting: bool,

    /// Report out-of-range ports and malformed addresses as errors instead of rejecting
    #[arg(long, global = true)]
    reject_invalid: bool,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide a single packet
    Check {
        /// Rule file (defaults to rules_path from config)
        #[arg(short, long, value_name = "FILE")]
        rules: Option<PathBuf>,
        /// inbound or outbound
        direction: String,
        /// tcp or udp
        protocol: String,
        /// Port number (1-65535)
        port: u32,
        /// Dotted-quad IPv4 address
        ip_address: String,
    },
    /// Decide every packet in a CSV file (direction,protocol,port,address per line)
    Batch {
        /// Rule file (defaults to rules_path from config)
        #[arg(short, long, value_name = "FILE")]
        rules: Option<PathBuf>,
        /// Packet file
        #[arg(short, long, value_name = "FILE")]
        packets: PathBuf,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Report every malformed rule in a rule file
    Validate {
        /// Rule file (defaults to rules_path from config)
        #[arg(short, long, value_name = "FILE")]
        rules: Option<PathBuf>,
    },
    /// Print the parsed rules in canonical form
    List {
        /// Rule file (defaults to rules_path from config)
        #[arg(short, long, value_name = "FILE")]
        rules: Option<PathBuf>,
    },
    /// Show the effective configuration
    Config {
        /// Write the effective configuration (including flags) to config.json
        #[arg(long)]
        save: bool,
    },
    /// Show recent audit events, newest first
    Audit {
        /// Number of events to show
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// One line of `batch` output
#[derive(Serialize)]
struct BatchResult {
    line: usize,
    packet: String,
    accepted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create Tokio runtime: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
    };
    match runtime.block_on(handle_cli(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Config file values, overridden by command-line flags
async fn effective_config(cli: &Cli) -> AppConfig {
    let mut config = config::load_config().await;
    if cli.trusting {
        config.strictness = Strictness::Trusting;
    }
    if cli.reject_invalid {
        config.query_policy = QueryPolicy::Reject;
    }
    config
}

/// Audit log in the state directory, if enabled and available
fn open_audit_log(config: &AppConfig) -> Option<AuditLog> {
    if !config.audit_log {
        return None;
    }
    if let Err(e) = hbfw::utils::ensure_dirs() {
        tracing::warn!("Failed to create state directory: {}", e);
    }
    match AuditLog::new() {
        Ok(audit) => Some(audit),
        Err(e) => {
            tracing::warn!("Audit log unavailable: {}", e);
            None
        }
    }
}

async fn load_rules(
    config: &AppConfig,
    audit_log: Option<&AuditLog>,
    explicit: Option<&Path>,
) -> hbfw::Result<LoadedRules> {
    let path = config.resolve_rules_path(explicit)?;
    let result = loader::load_engine(&path, config.strictness).await;

    if let Some(log) = audit_log {
        match &result {
            Ok(loaded) => {
                let loaded = (loaded.engine.len(), &loaded.fingerprint);
                audit::log_load(log, &path, Some(loaded), None).await;
            }
            Err(e) => audit::log_load(log, &path, None, Some(e.to_string())).await,
        }
    }
    result
}

async fn handle_cli(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = effective_config(&cli).await;
    let audit_log = open_audit_log(&config);

    match cli.command {
        Commands::Check {
            rules,
            direction,
            protocol,
            port,
            ip_address,
        } => {
            let loaded = load_rules(&config, audit_log.as_ref(), rules.as_deref()).await?;
            let decision = loaded.engine.decide(
                &direction,
                &protocol,
                port,
                &ip_address,
                config.query_policy,
            );

            if let Some(log) = &audit_log {
                let query = format!("{direction},{protocol},{port},{ip_address}");
                audit::log_check(
                    log,
                    &loaded.fingerprint,
                    &query,
                    decision.as_ref().ok().copied(),
                    decision.as_ref().err().map(ToString::to_string),
                )
                .await;
            }

            if decision? {
                // A decided-accept query always parses
                if let Ok(packet) = Packet::parse(&direction, &protocol, port, &ip_address)
                    && let Some((_, rule)) = loaded.engine.matching_rule(&packet)
                {
                    println!("ACCEPT (matched {rule})");
                } else {
                    println!("ACCEPT");
                }
                Ok(ExitCode::SUCCESS)
            } else {
                println!("REJECT");
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Batch {
            rules,
            packets,
            format,
        } => {
            let loaded = load_rules(&config, audit_log.as_ref(), rules.as_deref()).await?;
            let packets = loader::load_packets(&packets).await?;

            let results: Vec<BatchResult> = packets
                .iter()
                .map(|record| {
                    let outcome = record.decide(&loaded.engine, config.query_policy);
                    BatchResult {
                        line: record.line,
                        packet: format!(
                            "{},{},{},{}",
                            record.direction, record.protocol, record.port, record.address
                        ),
                        accepted: outcome.as_ref().ok().copied(),
                        error: outcome.err().as_ref().map(ToString::to_string),
                    }
                })
                .collect();

            let accepted = results.iter().filter(|r| r.accepted == Some(true)).count();
            let invalid = results.iter().filter(|r| r.error.is_some()).count();

            match format {
                OutputFormat::Text => {
                    for result in &results {
                        let verdict = match (&result.accepted, &result.error) {
                            (Some(true), _) => "ACCEPT".to_string(),
                            (Some(false), _) => "REJECT".to_string(),
                            (None, Some(e)) => format!("ERROR {e}"),
                            (None, None) => "ERROR".to_string(),
                        };
                        println!("{}\t{}\t{}", result.line, result.packet, verdict);
                    }
                    eprintln!(
                        "{} of {} packets accepted ({} invalid)",
                        accepted,
                        results.len(),
                        invalid
                    );
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&results)?);
                }
            }

            if let Some(log) = &audit_log {
                audit::log_batch(log, &loaded.fingerprint, results.len(), accepted, invalid)
                    .await;
            }

            Ok(if invalid == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Validate { rules } => {
            let path = config.resolve_rules_path(rules.as_deref())?;
            let errors = loader::lint_file(&path).await?;

            if errors.is_empty() {
                println!("{}: OK", path.display());
                Ok(ExitCode::SUCCESS)
            } else {
                for e in &errors {
                    println!("{}: {e}", path.display());
                }
                eprintln!("{} malformed rule(s)", errors.len());
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::List { rules } => {
            let loaded = load_rules(&config, audit_log.as_ref(), rules.as_deref()).await?;
            // Output is itself a valid rule file
            println!(
                "# {} rules from {} (sha256 {})",
                loaded.engine.len(),
                loaded.path.display(),
                loaded.fingerprint
            );
            for rule in loaded.engine.rules() {
                println!("{rule}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                hbfw::utils::ensure_dirs()?;
                config::save_config(&config).await?;
                if let Some(path) = config::config_path() {
                    eprintln!("Saved {}", path.display());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Audit { count } => {
            let audit = AuditLog::new()?;
            match audit.read_recent(count).await {
                Ok(events) => {
                    for event in events {
                        println!("{}", serde_json::to_string(&event)?);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    eprintln!("No audit events recorded at {}", audit.path().display());
                }
                Err(e) => return Err(e.into()),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
