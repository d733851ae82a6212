//! Remote app instances and their local listeners
//!
//! Each instance owns one listening socket. `listen` and `stop` serialize on
//! a per-instance mutex; instances never share a lock.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, SocketMode};
use crate::error::AppError;
use crate::listener::LocalListener;
use crate::store::RemoteAppId;
use crate::stream::BoxedStream;

/// Where connections accepted on a remote app's local socket must go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub remote_app_id: RemoteAppId,
    pub site_name: String,
    pub app_name: String,
    pub app_socket: String,
    pub mode: SocketMode,
}

/// Receives every connection accepted on a remote app's local socket and
/// carries it over the tunnel to the remote site
#[async_trait]
pub trait ClientConnectedHandler: Send + Sync {
    async fn on_client_connected(
        &self,
        target: &RemoteTarget,
        client: BoxedStream,
        peer: String,
    ) -> std::io::Result<()>;
}

enum ListenerState {
    Stopped,
    Listening {
        local_addr: String,
        shutdown: CancellationToken,
        accept_task: JoinHandle<()>,
    },
    /// Removed from the registry; never listens again
    Retired,
}

pub struct RemoteAppInstance {
    id: RemoteAppId,
    config: AppConfig,
    state: Mutex<ListenerState>,
    active: AtomicBool,
}

impl RemoteAppInstance {
    pub fn new(id: RemoteAppId, config: AppConfig) -> Self {
        Self {
            id,
            config,
            state: Mutex::new(ListenerState::Stopped),
            active: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> RemoteAppId {
        self.id
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Bound address while listening (resolves port 0)
    pub async fn listening_addr(&self) -> Option<String> {
        match &*self.state.lock().await {
            ListenerState::Listening { local_addr, .. } => Some(local_addr.clone()),
            ListenerState::Stopped | ListenerState::Retired => None,
        }
    }

    fn target(&self) -> RemoteTarget {
        RemoteTarget {
            remote_app_id: self.id,
            site_name: self.config.site_name.clone(),
            app_name: self.config.app_name.clone(),
            app_socket: self.config.app_socket.clone(),
            mode: self.config.mode,
        }
    }

    /// Start listening on the local socket.
    ///
    /// Returns `Ok(false)` without binding when already listening. On bind
    /// failure the instance stays stopped.
    pub async fn listen(&self, handler: Arc<dyn ClientConnectedHandler>) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        match *state {
            ListenerState::Listening { .. } => {
                debug!(
                    remote_app_id = self.id,
                    local_socket = %self.config.local_socket,
                    "Remote app is already listening"
                );
                return Ok(false);
            }
            ListenerState::Retired => {
                debug!(remote_app_id = self.id, "Remote app was removed, not listening");
                return Err(AppError::remote_app_not_found(self.id));
            }
            ListenerState::Stopped => {}
        }

        let listener = LocalListener::bind(&self.config.local_socket).await?;
        let local_addr = listener.local_addr();

        info!(
            remote_app_id = self.id,
            site = %self.config.site_name,
            app = %self.config.app_name,
            local_addr = %local_addr,
            "Listening for remote app"
        );

        let shutdown = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::new(self.target()),
            handler,
            shutdown.clone(),
        ));

        *state = ListenerState::Listening {
            local_addr,
            shutdown,
            accept_task,
        };
        self.active.store(true, Ordering::SeqCst);
        Ok(true)
    }

    /// Close the listening socket.
    ///
    /// Returns once no further connection can be accepted. Connections already
    /// handed to the handler keep running. The instance is stopped afterwards
    /// even when an error is returned.
    pub async fn stop(&self) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if matches!(*state, ListenerState::Retired) {
            return Ok(());
        }
        let previous = std::mem::replace(&mut *state, ListenerState::Stopped);
        self.active.store(false, Ordering::SeqCst);
        self.close(previous).await
    }

    /// Stop listening for good. Later `listen` calls fail with NotFound,
    /// including calls through handles taken before the app was removed.
    pub async fn retire(&self) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, ListenerState::Retired);
        self.active.store(false, Ordering::SeqCst);
        self.close(previous).await
    }

    pub async fn is_retired(&self) -> bool {
        matches!(*self.state.lock().await, ListenerState::Retired)
    }

    async fn close(&self, previous: ListenerState) -> Result<(), AppError> {
        let ListenerState::Listening {
            local_addr,
            shutdown,
            accept_task,
        } = previous
        else {
            return Ok(());
        };

        shutdown.cancel();
        match accept_task.await {
            Ok(()) => {
                info!(
                    remote_app_id = self.id,
                    local_addr = %local_addr,
                    "Stopped listening for remote app"
                );
                Ok(())
            }
            Err(e) => Err(AppError::ListenerShutdown {
                address: local_addr,
                reason: e.to_string(),
            }),
        }
    }
}

impl Drop for RemoteAppInstance {
    fn drop(&mut self) {
        if let ListenerState::Listening { shutdown, .. } = self.state.get_mut() {
            shutdown.cancel();
        }
    }
}

async fn accept_loop(
    listener: LocalListener,
    target: Arc<RemoteTarget>,
    handler: Arc<dyn ClientConnectedHandler>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((client, peer)) => {
                    debug!(
                        "New connection from {} for remote app {} at {}",
                        peer, target.app_name, target.site_name
                    );
                    let target = target.clone();
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handler.on_client_connected(&target, client, peer.clone()).await {
                            warn!(
                                "Failed to route connection from {} to {} at {}: {}",
                                peer, target.app_name, target.site_name, e
                            );
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection for remote app {}: {}", target.app_name, e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    listener.close();
}
