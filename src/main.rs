//! pulse-link - Real-time session client for PulseJob
//!
//! Entry point for the `pulse-link` binary: watch live traffic, publish a
//! single message, or manage configuration.

mod cli;

use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pulse_link::config::{self, PulseConfig};
use pulse_link::error::{Error, Result};
use pulse_link::logging::{self, LogGuards};
use pulse_link::protocol::{topics, Envelope, MessageKind};
use pulse_link::session::{callback, ClientEvent, ConnectionState, EventName};
use pulse_link::{version, PulseClient};

use crate::cli::{Cli, Commands, ConfigSubcommand};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            print!("{}", version::report());
            Ok(())
        }
        Commands::Config { subcommand } => handle_config_command(subcommand),
        Commands::Watch {
            config,
            url,
            topics,
            log_instances,
        } => {
            let config = load_config(config.as_deref(), url)?;
            let _log_guards = init_logging(&config, cli.verbose, cli.quiet)?;
            block_on(watch(config, topics, log_instances))
        }
        Commands::Send {
            kind,
            topic,
            data,
            config,
            url,
            timeout,
        } => {
            let payload = parse_payload(data.as_deref())?;
            let config = load_config(config.as_deref(), url)?;
            let _log_guards = init_logging(&config, cli.verbose, cli.quiet)?;
            block_on(send_once(config, kind, topic, payload, Duration::from_secs(timeout)))
        }
    }
}

/// Load configuration, applying the CLI endpoint override last
fn load_config(path: Option<&str>, url: Option<String>) -> Result<PulseConfig> {
    let mut config = PulseConfig::load(path)?;
    if let Some(url) = url {
        config.connection.url = url;
        config.validate()?;
    }
    Ok(config)
}

fn init_logging(config: &PulseConfig, verbose: u8, quiet: bool) -> Result<LogGuards> {
    let guards = logging::init_logging(&config.logging, verbose, quiet)?;
    let build = version::BuildStamp::current();
    debug!(version = %build.tag(), target = %build.target, "Starting pulse-link");
    Ok(guards)
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;
    runtime.block_on(future)
}

fn parse_payload(data: Option<&str>) -> Result<Value> {
    match data {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| Error::malformed(format!("--data is not valid JSON: {}", e))),
        None => Ok(Value::Null),
    }
}

// ─────────────────────────────────────────────────────────────────
// Watch
// ─────────────────────────────────────────────────────────────────

async fn watch(config: PulseConfig, mut topic_list: Vec<String>, log_instances: Vec<String>) -> Result<()> {
    topic_list.extend(log_instances.iter().map(|id| topics::job_log(id)));

    let reconnect_enabled = config.reconnect.enabled;
    let client = PulseClient::start(config.to_client_config())?;

    client
        .on(
            EventName::Message,
            callback(|event: &ClientEvent| {
                if let Some(envelope) = event.envelope() {
                    println!("{}", envelope.to_json()?);
                }
                Ok(())
            }),
        )
        .await?;

    let (lost_tx, mut lost_rx) = mpsc::unbounded_channel();
    client
        .on(
            EventName::StateChange,
            callback(move |event: &ClientEvent| {
                if let ClientEvent::StateChanged { old, new } = event {
                    info!(from = %old, to = %new, "Session state");
                    if *new == ConnectionState::Disconnected {
                        let _ = lost_tx.send(());
                    }
                }
                Ok(())
            }),
        )
        .await?;

    for topic in topic_list {
        let label = topic.clone();
        client
            .subscribe(
                topic,
                callback(move |envelope: &Envelope| {
                    debug!(topic = %label, kind = %envelope.kind, "Topic update");
                    Ok(())
                }),
            )
            .await?;
    }

    client.connect()?;
    info!(client_id = %client.client_id(), "Watching, press Ctrl+C to stop");

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, disconnecting");
            Ok(())
        }
        Some(()) = lost_rx.recv() => {
            let status = client.status();
            if reconnect_enabled {
                Err(Error::ReconnectExhausted { attempts: status.reconnect_attempts })
            } else {
                Err(Error::ClientStopped("connection lost and reconnection is disabled".to_string()))
            }
        }
    };

    client.shutdown().await?;
    outcome
}

// ─────────────────────────────────────────────────────────────────
// Send
// ─────────────────────────────────────────────────────────────────

async fn send_once(
    config: PulseConfig,
    kind: MessageKind,
    topic: Option<String>,
    payload: Value,
    timeout: Duration,
) -> Result<()> {
    let url = config.connection.url.clone();
    let client = PulseClient::start(config.to_client_config())?;

    let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
    client
        .on(
            EventName::Connected,
            callback(move |_: &ClientEvent| {
                let _ = connected_tx.send(());
                Ok(())
            }),
        )
        .await?;

    client.connect()?;

    let outcome = match tokio::time::timeout(timeout, connected_rx.recv()).await {
        Ok(Some(())) => {
            if client.send(kind, payload, topic).await? {
                info!(kind = %kind, "Message sent");
                Ok(())
            } else {
                Err(Error::transport_send("connection dropped before the message was written"))
            }
        }
        _ => {
            warn!(url = %url, "Session did not come up in time");
            Err(Error::ConnectionTimeout {
                url,
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    };

    client.shutdown().await?;
    outcome
}

// ─────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────

fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = PulseConfig::load(config.as_deref())?;
            println!("{}", cfg.to_toml()?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", written.display());
        }
        ConfigSubcommand::Validate { config } => {
            PulseConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
