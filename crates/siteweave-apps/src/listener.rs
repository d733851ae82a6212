//! Local socket listeners for remote apps
//!
//! A remote app's local socket is either `host:port` (TCP) or a filesystem
//! path (unix domain socket, optionally written as `unix:/path`).

use std::io;
use std::path::PathBuf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::stream::BoxedStream;

/// Parsed form of a configured socket string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketAddress {
    Tcp(String),
    Unix(PathBuf),
}

impl SocketAddress {
    pub fn parse(socket: &str) -> Self {
        if let Some(path) = socket.strip_prefix("unix:") {
            return SocketAddress::Unix(PathBuf::from(path));
        }
        if socket.starts_with('/') || socket.starts_with("./") {
            return SocketAddress::Unix(PathBuf::from(socket));
        }
        SocketAddress::Tcp(socket.to_string())
    }

    /// Open an outbound connection to this address
    pub async fn connect(&self) -> io::Result<BoxedStream> {
        match self {
            SocketAddress::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).await?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            SocketAddress::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path).await?;
                Ok(Box::new(stream))
            }
            #[cfg(not(unix))]
            SocketAddress::Unix(path) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unix sockets are not supported: {}", path.display()),
            )),
        }
    }
}

/// A bound local listener
pub(crate) enum LocalListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: tokio::net::UnixListener,
        path: PathBuf,
    },
}

impl LocalListener {
    pub(crate) async fn bind(socket: &str) -> Result<Self, AppError> {
        let bind_error = |e: io::Error| AppError::ListenerBind {
            address: socket.to_string(),
            reason: e.to_string(),
        };

        match SocketAddress::parse(socket) {
            SocketAddress::Tcp(addr) => {
                let listener = TcpListener::bind(addr.as_str()).await.map_err(bind_error)?;
                Ok(LocalListener::Tcp(listener))
            }
            #[cfg(unix)]
            SocketAddress::Unix(path) => {
                remove_stale_socket(&path);
                let listener = tokio::net::UnixListener::bind(&path).map_err(bind_error)?;
                Ok(LocalListener::Unix { listener, path })
            }
            #[cfg(not(unix))]
            SocketAddress::Unix(_) => Err(AppError::ListenerBind {
                address: socket.to_string(),
                reason: "unix sockets are not supported on this platform".to_string(),
            }),
        }
    }

    /// Address actually bound (resolves port 0)
    pub(crate) fn local_addr(&self) -> String {
        match self {
            LocalListener::Tcp(listener) => listener
                .local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "<unknown>".to_string()),
            #[cfg(unix)]
            LocalListener::Unix { path, .. } => path.display().to_string(),
        }
    }

    /// Accept one connection, returning the stream and a printable peer
    pub(crate) async fn accept(&self) -> io::Result<(BoxedStream, String)> {
        match self {
            LocalListener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                Ok((Box::new(stream), peer.to_string()))
            }
            #[cfg(unix)]
            LocalListener::Unix { listener, path } => {
                let (stream, _) = listener.accept().await?;
                Ok((Box::new(stream), format!("unix:{}", path.display())))
            }
        }
    }

    /// Close the listener; unix socket files are removed
    pub(crate) fn close(self) {
        match self {
            LocalListener::Tcp(listener) => drop(listener),
            #[cfg(unix)]
            LocalListener::Unix { listener, path } => {
                drop(listener);
                if let Err(e) = std::fs::remove_file(&path) {
                    if e.kind() != io::ErrorKind::NotFound {
                        warn!("Failed to remove socket file {}: {}", path.display(), e);
                    }
                }
            }
        }
    }
}

/// A socket file left behind by a previous process blocks `bind`
#[cfg(unix)]
fn remove_stale_socket(path: &std::path::Path) {
    use std::os::unix::fs::FileTypeExt;

    if let Ok(meta) = std::fs::symlink_metadata(path) {
        if meta.file_type().is_socket() {
            debug!("Removing stale socket file {}", path.display());
            if let Err(e) = std::fs::remove_file(path) {
                debug!("Failed to remove stale socket file {}: {}", path.display(), e);
            }
        }
    }
}
