//! Delete command implementation.

use super::{Connection, Kind};

/// Runs the delete command.
pub fn run(
    connection: &Connection,
    upstream: &str,
    server: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = connection.connect()?;
    let ctx = connection.context();

    match connection.kind {
        Kind::Http => client.delete_http_server(&ctx, upstream, server)?,
        Kind::Stream => client.delete_stream_server(&ctx, upstream, server)?,
    }

    println!("removed {server} from {upstream}");
    Ok(())
}
