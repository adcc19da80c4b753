//! Address helpers shared by server and client configuration.

/// Join a host and a port into a `host:port` string, bracketing bare IPv6
/// addresses.
pub fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
