//! Servers command implementation.

use super::{Connection, Kind};
use lbsync_protocol::ServerRecord;
use serde_json::Value;

/// Runs the servers command.
pub fn run(
    connection: &Connection,
    upstream: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = connection.connect()?;
    let ctx = connection.context();

    let rendered = match connection.kind {
        Kind::Http => render(&client.get_http_servers(&ctx, upstream)?, format)?,
        Kind::Stream => render(&client.get_stream_servers(&ctx, upstream)?, format)?,
    };
    print!("{rendered}");
    Ok(())
}

/// Renders a server list as text or JSON.
pub fn render<T: ServerRecord>(
    servers: &[T],
    format: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    match format {
        "json" => Ok(format!("{}\n", serde_json::to_string_pretty(servers)?)),
        "text" => {
            let mut out = String::new();
            if servers.is_empty() {
                out.push_str("(no servers)\n");
            }
            for server in servers {
                out.push_str(&format!("{:>4}  {}", server.id(), server.server()));
                for (key, value) in parameters(server)? {
                    out.push_str(&format!("  {key}={value}"));
                }
                out.push('\n');
            }
            Ok(out)
        }
        other => Err(format!("Unknown format: {other}").into()),
    }
}

/// Every set parameter except `id` and `server`, sorted by name.
fn parameters<T: ServerRecord>(
    server: &T,
) -> Result<Vec<(String, String)>, serde_json::Error> {
    let Value::Object(fields) = serde_json::to_value(server)? else {
        return Ok(Vec::new());
    };
    Ok(fields
        .into_iter()
        .filter(|(key, _)| key != "id" && key != "server")
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbsync_protocol::UpstreamServer;

    #[test]
    fn text_listing() {
        let servers = vec![UpstreamServer::new("10.0.0.1:80")
            .with_id(3)
            .with_weight(2)
            .with_fail_timeout("10s")];
        let out = render(&servers, "text").unwrap();
        assert!(out.starts_with("   3  10.0.0.1:80"));
        assert!(out.contains("weight=2"));
        assert!(out.contains("fail_timeout=10s"));
        assert!(!out.contains("id="));
    }

    #[test]
    fn json_listing() {
        let servers = vec![UpstreamServer::new("10.0.0.1:80").with_id(3)];
        let out = render(&servers, "json").unwrap();
        let parsed: Vec<UpstreamServer> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, servers);
    }

    #[test]
    fn empty_and_unknown_format() {
        assert_eq!(render::<UpstreamServer>(&[], "text").unwrap(), "(no servers)\n");
        assert!(render::<UpstreamServer>(&[], "yaml").is_err());
    }
}
