//! Version command implementation.

use super::Connection;
use lbsync_protocol::{MAX_API_VERSION, MIN_API_VERSION};

/// Runs the version command.
pub fn run(connection: &Connection) -> Result<(), Box<dyn std::error::Error>> {
    println!("lbsync CLI v{}", env!("CARGO_PKG_VERSION"));
    println!("Supported API versions: {MIN_API_VERSION}..={MAX_API_VERSION}");

    let client = connection.connect()?;
    println!("Using API version: {}", client.resolved_version());

    match client.max_remote_version(&connection.context()) {
        Ok(version) => println!("Newest common API version: {version}"),
        Err(e) => println!("Newest common API version: unavailable ({e})"),
    }
    Ok(())
}
