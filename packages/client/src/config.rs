//! Client configuration.

use std::time::Duration;

use darkcomm_shared::net::host_port;

/// Default time over which one message is streamed to the terminal.
pub const DEFAULT_STREAM_DURATION: Duration = Duration::from_secs(2);

/// Settings for [`run_client`](crate::run_client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server host (`SERVER_IP`)
    pub host: String,
    /// Server port (`PORT`)
    pub port: u16,
    /// Username to use; prompted for when `None`
    pub username: Option<String>,
    /// Streaming effect duration per message; zero prints at once
    pub stream_duration: Duration,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            stream_duration: DEFAULT_STREAM_DURATION,
        }
    }

    /// Address the session connects to.
    pub fn server_addr(&self) -> String {
        host_port(&self.host, self.port)
    }
}
