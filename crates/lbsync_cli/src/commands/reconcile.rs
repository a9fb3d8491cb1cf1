//! Reconcile command implementation.

use super::{Connection, Kind};
use crate::transport::ReqwestClient;
use lbsync_client::{ClientError, ReconcileOutcome, RequestContext, UpstreamClient};
use lbsync_protocol::{ServerRecord, StreamUpstreamServer, UpstreamServer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reading the desired server list.
#[derive(Error, Debug)]
pub enum InputError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not a JSON array of servers.
    #[error("failed to parse {}: {source}", .path.display())]
    Json {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// What a reconciliation changed, or would change.
#[derive(Debug, Serialize)]
pub struct ReconcileReport {
    /// Upstream name.
    pub upstream: String,
    /// Whether nothing was applied.
    pub dry_run: bool,
    /// Added server addresses.
    pub added: Vec<String>,
    /// Removed server addresses.
    pub deleted: Vec<String>,
    /// Updated server addresses.
    pub updated: Vec<String>,
    /// Failures, one message each.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Reads a JSON array of desired servers.
pub fn load_desired<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, InputError> {
    let data = std::fs::read(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| InputError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Runs the reconcile command.
pub fn run(
    connection: &Connection,
    upstream: &str,
    file: &Path,
    dry_run: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = connection.connect()?;
    let ctx = connection.context();

    let report = match connection.kind {
        Kind::Http => {
            let desired: Vec<UpstreamServer> = load_desired(file)?;
            apply(&client, &ctx, upstream, &desired, dry_run)?
        }
        Kind::Stream => {
            let desired: Vec<StreamUpstreamServer> = load_desired(file)?;
            apply(&client, &ctx, upstream, &desired, dry_run)?
        }
    };

    print!("{}", render(&report, format)?);

    if report.errors.is_empty() {
        Ok(())
    } else {
        Err(format!("{} operation(s) failed", report.errors.len()).into())
    }
}

fn apply<T: ServerRecord>(
    client: &UpstreamClient<ReqwestClient>,
    ctx: &RequestContext,
    upstream: &str,
    desired: &[T],
    dry_run: bool,
) -> Result<ReconcileReport, ClientError> {
    let outcome = if dry_run {
        client.plan(ctx, upstream, desired)?
    } else {
        client.reconcile(ctx, upstream, desired)?
    };
    Ok(report(upstream, dry_run, outcome))
}

/// Summarizes an outcome.
pub fn report<T: ServerRecord>(
    upstream: &str,
    dry_run: bool,
    outcome: ReconcileOutcome<T>,
) -> ReconcileReport {
    ReconcileReport {
        upstream: upstream.to_string(),
        dry_run,
        added: addresses(&outcome.added),
        deleted: addresses(&outcome.deleted),
        updated: addresses(&outcome.updated),
        errors: outcome
            .error
            .as_ref()
            .map(|err| err.errors().iter().map(ToString::to_string).collect())
            .unwrap_or_default(),
    }
}

fn addresses<T: ServerRecord>(servers: &[T]) -> Vec<String> {
    servers.iter().map(|s| s.server().to_string()).collect()
}

/// Renders a report as text or JSON.
pub fn render(report: &ReconcileReport, format: &str) -> Result<String, Box<dyn std::error::Error>> {
    match format {
        "json" => Ok(format!("{}\n", serde_json::to_string_pretty(report)?)),
        "text" => {
            let mut out = String::new();
            let verb = if report.dry_run { "would change" } else { "changed" };
            out.push_str(&format!(
                "{} upstream {}: {} added, {} deleted, {} updated\n",
                verb,
                report.upstream,
                report.added.len(),
                report.deleted.len(),
                report.updated.len()
            ));
            for server in &report.added {
                out.push_str(&format!("  + {server}\n"));
            }
            for server in &report.deleted {
                out.push_str(&format!("  - {server}\n"));
            }
            for server in &report.updated {
                out.push_str(&format!("  ~ {server}\n"));
            }
            for error in &report.errors {
                out.push_str(&format!("  ! {error}\n"));
            }
            Ok(out)
        }
        other => Err(format!("Unknown format: {other}").into()),
    }
}
