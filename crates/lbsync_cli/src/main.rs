//! lbsync CLI
//!
//! Command-line access to a load balancer's upstream server membership.
//!
//! # Commands
//!
//! - `servers` - List the servers of an upstream
//! - `reconcile` - Make an upstream match a desired server list
//! - `add` - Add a single server
//! - `delete` - Remove a single server
//! - `version` - Show client and control API versions

mod commands;
mod transport;

use clap::{Parser, Subcommand};
use commands::{Connection, Kind};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Keeps load balancer upstreams in sync with a desired server list.
#[derive(Parser)]
#[command(name = "lbsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the control API
    #[arg(global = true, short, long, default_value = "http://127.0.0.1:8080/api")]
    endpoint: String,

    /// Upstream family (http, stream)
    #[arg(global = true, short, long, value_enum, default_value = "http")]
    kind: Kind,

    /// Pin the control API version
    #[arg(global = true, long)]
    api_version: Option<u32>,

    /// Fail unless the balancer advertises the pinned version
    #[arg(global = true, long, conflicts_with = "max_api")]
    check_api: bool,

    /// Use the newest version both sides understand
    #[arg(global = true, long)]
    max_api: bool,

    /// Per-request timeout in seconds
    #[arg(global = true, long, default_value = "10")]
    timeout: u64,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the servers of an upstream
    Servers {
        /// Upstream name
        upstream: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Make an upstream match a desired server list
    Reconcile {
        /// Upstream name
        upstream: String,

        /// JSON file holding the desired servers
        #[arg(short = 'F', long)]
        file: PathBuf,

        /// Show what would change without applying it
        #[arg(short, long)]
        dry_run: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Add a single server
    Add {
        /// Upstream name
        upstream: String,

        /// Server address
        server: String,

        /// Load-balancing weight
        #[arg(long)]
        weight: Option<u32>,

        /// Connection limit
        #[arg(long)]
        max_conns: Option<u32>,

        /// Failed attempts before the server is marked unavailable
        #[arg(long)]
        max_fails: Option<u32>,

        /// Mark the server as a backup
        #[arg(long)]
        backup: bool,

        /// Mark the server as down
        #[arg(long)]
        down: bool,
    },

    /// Remove a single server
    Delete {
        /// Upstream name
        upstream: String,

        /// Server address
        server: String,
    },

    /// Show client and control API versions
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let connection = Connection {
        endpoint: cli.endpoint,
        kind: cli.kind,
        api_version: cli.api_version,
        check_api: cli.check_api,
        max_api: cli.max_api,
        timeout: std::time::Duration::from_secs(cli.timeout),
    };

    match cli.command {
        Commands::Servers { upstream, format } => {
            commands::servers::run(&connection, &upstream, &format)?;
        }
        Commands::Reconcile {
            upstream,
            file,
            dry_run,
            format,
        } => {
            commands::reconcile::run(&connection, &upstream, &file, dry_run, &format)?;
        }
        Commands::Add {
            upstream,
            server,
            weight,
            max_conns,
            max_fails,
            backup,
            down,
        } => {
            let params = commands::add::ServerParams {
                weight,
                max_conns,
                max_fails,
                backup,
                down,
            };
            commands::add::run(&connection, &upstream, &server, &params)?;
        }
        Commands::Delete { upstream, server } => {
            commands::delete::run(&connection, &upstream, &server)?;
        }
        Commands::Version => {
            commands::version::run(&connection)?;
        }
    }

    Ok(())
}
