//! Server configuration.

use darkcomm_shared::net::host_port;

use crate::error::ServerError;

/// Default interface the server binds to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default TCP port shared by server and client.
pub const DEFAULT_PORT: u16 = 12345;

/// Settings for [`ChatServer::bind`](crate::ChatServer::bind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind (`SERVER_IP`)
    pub host: String,
    /// Port to bind (`PORT`); 0 picks an ephemeral port
    pub port: u16,
    /// Drop a connection whose line grows beyond this many bytes
    pub max_line_bytes: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            max_line_bytes: None,
        }
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: Option<usize>) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Address string handed to the listener.
    pub fn bind_addr(&self) -> String {
        host_port(&self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.host.trim().is_empty() {
            return Err(ServerError::InvalidConfig("host must not be empty".to_string()));
        }
        if self.max_line_bytes == Some(0) {
            return Err(ServerError::InvalidConfig(
                "max_line_bytes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr_ipv4_and_hostname() {
        // テスト項目: IPv4 アドレス・ホスト名はそのまま host:port になる
        // given (前提条件):
        let ipv4 = ServerConfig::new("0.0.0.0", 8080);
        let hostname = ServerConfig::new("localhost", 12345);

        // when (操作) / then (期待する結果):
        assert_eq!(ipv4.bind_addr(), "0.0.0.0:8080");
        assert_eq!(hostname.bind_addr(), "localhost:12345");
    }

    #[test]
    fn test_validate_rejects_empty_host_and_zero_line_limit() {
        // テスト項目: 空のホストと 0 バイトの行上限は設定エラーになる
        // given (前提条件):
        let empty_host = ServerConfig::new(" ", 8080);
        let zero_limit = ServerConfig::default().with_max_line_bytes(Some(0));

        // when (操作) / then (期待する結果):
        assert!(matches!(
            empty_host.validate(),
            Err(ServerError::InvalidConfig(_))
        ));
        assert!(matches!(
            zero_limit.validate(),
            Err(ServerError::InvalidConfig(_))
        ));
        assert!(ServerConfig::default().validate().is_ok());
    }
}
