//! Connection handler used when no tunnel is attached to the process

use async_trait::async_trait;
use siteweave_apps::{BoxedStream, ClientConnectedHandler, RemoteTarget};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Closes every client. The admin CLI never carries traffic to a remote
/// site.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedHandler;

#[async_trait]
impl ClientConnectedHandler for DetachedHandler {
    async fn on_client_connected(
        &self,
        target: &RemoteTarget,
        mut client: BoxedStream,
        peer: String,
    ) -> std::io::Result<()> {
        warn!(
            site = %target.site_name,
            app = %target.app_name,
            peer = %peer,
            "No tunnel attached, closing client connection"
        );
        client.shutdown().await
    }
}
