//! Add command implementation.

use super::{Connection, Kind};
use lbsync_protocol::{StreamUpstreamServer, UpstreamServer};

/// Parameters accepted on the command line for a new server.
#[derive(Debug, Clone, Default)]
pub struct ServerParams {
    /// Load-balancing weight.
    pub weight: Option<u32>,
    /// Connection limit.
    pub max_conns: Option<u32>,
    /// Failed attempts before the server is marked unavailable.
    pub max_fails: Option<u32>,
    /// Backup flag.
    pub backup: bool,
    /// Down flag.
    pub down: bool,
}

impl ServerParams {
    /// Builds an HTTP server record.
    pub fn http(&self, server: &str) -> UpstreamServer {
        let mut record = UpstreamServer::new(server);
        record.weight = self.weight;
        record.max_conns = self.max_conns;
        record.max_fails = self.max_fails;
        record.backup = self.backup.then_some(true);
        record.down = self.down.then_some(true);
        record
    }

    /// Builds a stream server record.
    pub fn stream(&self, server: &str) -> StreamUpstreamServer {
        let mut record = StreamUpstreamServer::new(server);
        record.weight = self.weight;
        record.max_conns = self.max_conns;
        record.max_fails = self.max_fails;
        record.backup = self.backup.then_some(true);
        record.down = self.down.then_some(true);
        record
    }
}

/// Runs the add command.
pub fn run(
    connection: &Connection,
    upstream: &str,
    server: &str,
    params: &ServerParams,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = connection.connect()?;
    let ctx = connection.context();

    match connection.kind {
        Kind::Http => client.add_http_server(&ctx, upstream, &params.http(server))?,
        Kind::Stream => client.add_stream_server(&ctx, upstream, &params.stream(server))?,
    }

    println!("added {server} to {upstream}");
    Ok(())
}
