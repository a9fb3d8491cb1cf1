//! Server address normalization.
//!
//! The remote always reports addresses with an explicit port. Desired
//! records may omit it, so they are normalized before being compared to
//! anything the remote returned.

/// Port appended to addresses that do not carry one.
pub const DEFAULT_PORT: u16 = 80;

const UNIX_PREFIX: &str = "unix:";

/// Returns `addr` with the default port appended when it has none.
///
/// Recognized forms:
/// - `host:port` and `ipv4:port` are returned unchanged
/// - `[ipv6]:port` is returned unchanged, `[ipv6]` gains a port
/// - `unix:/path` socket addresses are returned unchanged
///
/// The function is idempotent.
pub fn normalize_address(addr: &str) -> String {
    if addr.starts_with(UNIX_PREFIX) || has_port(addr) {
        return addr.to_string();
    }
    format!("{addr}:{DEFAULT_PORT}")
}

fn has_port(addr: &str) -> bool {
    if let Some(rest) = addr.strip_prefix('[') {
        // Bracketed IPv6: only a colon after the closing bracket is a port.
        return match rest.find(']') {
            Some(end) => rest[end + 1..].starts_with(':'),
            None => false,
        };
    }

    // Unbracketed IPv6 literals are returned as-is.
    addr.contains(':')
}
