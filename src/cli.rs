//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for pulse-link.

use clap::{Parser, Subcommand};

use pulse_link::protocol::MessageKind;

/// pulse-link - Real-time session client for PulseJob
///
/// Keeps a resilient WebSocket session to a PulseJob server: reconnects with
/// backoff, probes liveness, buffers sends while offline and restores topic
/// subscriptions after every reconnection.
#[derive(Parser, Debug)]
#[command(name = "pulse-link")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect and print every inbound message as a JSON line until Ctrl+C
    Watch {
        /// Path to configuration file
        #[arg(short, long, env = "PULSE_CONFIG")]
        config: Option<String>,

        /// Override the configured endpoint URL
        #[arg(long)]
        url: Option<String>,

        /// Topic to subscribe to (repeatable)
        #[arg(short, long = "topic")]
        topics: Vec<String>,

        /// Job instance whose log stream to follow (repeatable)
        #[arg(long = "log-instance")]
        log_instances: Vec<String>,
    },

    /// Connect, send one message and disconnect
    Send {
        /// Message type, e.g. NOTIFICATION or task_status
        #[arg(short, long)]
        kind: MessageKind,

        /// Topic the message is published on
        #[arg(short, long)]
        topic: Option<String>,

        /// JSON payload
        #[arg(short, long)]
        data: Option<String>,

        /// Path to configuration file
        #[arg(short, long, env = "PULSE_CONFIG")]
        config: Option<String>,

        /// Override the configured endpoint URL
        #[arg(long)]
        url: Option<String>,

        /// Seconds to wait for the session to come up
        #[arg(long, default_value = "10")]
        timeout: u64,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show {
        /// Path to configuration file
        #[arg(short, long, env = "PULSE_CONFIG")]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long, env = "PULSE_CONFIG")]
        config: Option<String>,
    },
}
