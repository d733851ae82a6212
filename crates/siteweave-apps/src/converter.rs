//! Data converters bridge an inbound tunnel stream to a local service
//!
//! The app manager only decides which converter receives a stream. The
//! default `SocketConverter` connects to the configured upstream socket and
//! copies bytes in both directions.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::config::{LocalExposedAppConfig, SocketMode};
use crate::error::AppError;
use crate::listener::SocketAddress;
use crate::stream::BoxedStream;

#[async_trait]
pub trait DataConverter: Send + Sync {
    /// Take ownership of `stream` and connect it to the local service.
    ///
    /// `socket` selects the upstream socket for range-mode apps (empty for
    /// single mode). `remaining` holds bytes an upstream handshake layer
    /// already consumed from `stream`; they must reach the local service
    /// before anything else read from `stream`.
    async fn start(
        &self,
        stream: BoxedStream,
        socket: &str,
        remaining: Vec<u8>,
    ) -> Result<(), AppError>;
}

/// Inclusive port range, written `"8000-8010"` or `"8080"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn parse(range: &str) -> Result<Self, AppError> {
        let invalid = || AppError::InvalidConfig(format!("invalid port range '{}'", range));
        let parse_port = |s: &str| s.trim().parse::<u16>().map_err(|_| invalid());

        let (start, end) = match range.split_once('-') {
            Some((start, end)) => (parse_port(start)?, parse_port(end)?),
            None => {
                let port = parse_port(range)?;
                (port, port)
            }
        };

        if start > end {
            return Err(invalid());
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }
}

/// Default converter: one upstream socket connection per tunnel stream
pub struct SocketConverter {
    app_name: String,
    mode: SocketMode,
    app_socket: Option<String>,
    port_ranges: Vec<PortRange>,
    address_range: Vec<String>,
}

impl SocketConverter {
    pub fn new(config: &LocalExposedAppConfig) -> Result<Self, AppError> {
        let port_ranges = config
            .port_range
            .iter()
            .map(|r| PortRange::parse(r))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            app_name: config.app_name.clone(),
            mode: config.mode,
            app_socket: config.app_socket.clone(),
            port_ranges,
            address_range: config.address_range.clone(),
        })
    }

    /// Pick the upstream socket for a connection
    pub fn resolve(&self, socket: &str) -> Result<String, AppError> {
        match self.mode {
            SocketMode::Single => self.app_socket.clone().ok_or_else(|| {
                AppError::Converter(format!("app {} has no app_socket", self.app_name))
            }),
            SocketMode::Range => {
                let rejected = || {
                    AppError::Converter(format!(
                        "socket '{}' is not exposed by app {}",
                        socket, self.app_name
                    ))
                };

                let (host, port) = socket.rsplit_once(':').ok_or_else(rejected)?;
                let port: u16 = port.parse().map_err(|_| rejected())?;
                let host = host.trim_start_matches('[').trim_end_matches(']');

                if !self.port_ranges.iter().any(|r| r.contains(port)) {
                    return Err(rejected());
                }
                if !self.address_range.is_empty() && !self.address_range.iter().any(|a| a == host)
                {
                    return Err(rejected());
                }
                Ok(socket.to_string())
            }
        }
    }
}

#[async_trait]
impl DataConverter for SocketConverter {
    async fn start(
        &self,
        mut stream: BoxedStream,
        socket: &str,
        remaining: Vec<u8>,
    ) -> Result<(), AppError> {
        let target = self.resolve(socket)?;

        let mut upstream = SocketAddress::parse(&target)
            .connect()
            .await
            .map_err(|e| {
                AppError::Converter(format!("failed to connect to {}: {}", target, e))
            })?;

        debug!("Connected {} to upstream {}", self.app_name, target);

        let app_name = self.app_name.clone();
        tokio::spawn(async move {
            if !remaining.is_empty() {
                if let Err(e) = upstream.write_all(&remaining).await {
                    error!("Failed to write handshake remainder to {}: {}", target, e);
                    return;
                }
            }

            match tokio::io::copy_bidirectional(&mut stream, &mut upstream).await {
                Ok((to_local, to_tunnel)) => {
                    info!(
                        app = %app_name,
                        upstream = %target,
                        bytes_to_local = to_local + remaining.len() as u64,
                        bytes_to_tunnel = to_tunnel,
                        "Local app connection closed"
                    );
                }
                Err(e) => {
                    debug!("Local app connection to {} ended with error: {}", target, e);
                }
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn range_app(ports: &[&str], addresses: &[&str]) -> LocalExposedAppConfig {
        LocalExposedAppConfig {
            app_name: "vnc".to_string(),
            mode: SocketMode::Range,
            app_socket: None,
            port_range: ports.iter().map(|s| s.to_string()).collect(),
            address_range: addresses.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_port_range_parse() {
        assert_eq!(
            PortRange::parse("8000-8010").unwrap(),
            PortRange { start: 8000, end: 8010 }
        );
        assert_eq!(
            PortRange::parse("22").unwrap(),
            PortRange { start: 22, end: 22 }
        );
        assert!(PortRange::parse("abc").is_err());
        assert!(PortRange::parse("9000-8000").is_err());
        assert!(PortRange::parse("1-70000").is_err());
    }

    #[test]
    fn test_single_mode_ignores_selector() {
        let converter =
            SocketConverter::new(&LocalExposedAppConfig::single("ssh", "127.0.0.1:22")).unwrap();
        assert_eq!(converter.resolve("").unwrap(), "127.0.0.1:22");
        assert_eq!(converter.resolve("10.1.1.1:80").unwrap(), "127.0.0.1:22");
    }

    #[test]
    fn test_range_mode_checks_port_and_address() {
        let converter =
            SocketConverter::new(&range_app(&["5900-5910"], &["127.0.0.1"])).unwrap();

        assert_eq!(converter.resolve("127.0.0.1:5901").unwrap(), "127.0.0.1:5901");
        assert!(converter.resolve("127.0.0.1:5911").is_err());
        assert!(converter.resolve("10.0.0.1:5901").is_err());
        assert!(converter.resolve("").is_err());
    }

    #[test]
    fn test_range_mode_without_address_range_allows_any_host() {
        let converter = SocketConverter::new(&range_app(&["6000"], &[])).unwrap();
        assert!(converter.resolve("192.168.1.20:6000").is_ok());
        assert!(converter.resolve("[::1]:6000").is_ok());
    }

    #[tokio::test]
    async fn test_remainder_written_before_stream_bytes() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_addr = upstream.local_addr().unwrap().to_string();
        let converter =
            SocketConverter::new(&LocalExposedAppConfig::single("echo", upstream_addr)).unwrap();

        let (mut tunnel_side, converter_side) = tokio::io::duplex(1024);
        converter
            .start(Box::new(converter_side), "", b"hello ".to_vec())
            .await
            .unwrap();

        let (mut local, _) = upstream.accept().await.unwrap();
        tunnel_side.write_all(b"world").await.unwrap();

        let mut received = vec![0u8; 11];
        local.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"hello world");

        local.write_all(b"reply").await.unwrap();
        let mut reply = vec![0u8; 5];
        tunnel_side.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"reply");
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let converter =
            SocketConverter::new(&LocalExposedAppConfig::single("gone", addr)).unwrap();

        let (_tunnel_side, converter_side) = tokio::io::duplex(64);
        let result = converter.start(Box::new(converter_side), "", Vec::new()).await;
        assert!(matches!(result, Err(AppError::Converter(_))));
    }
}
