//! Shared fixtures for app manager integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use siteweave_apps::{
    AppConfig, BoxedStream, ClientConnectedHandler, DbAppStore, RemoteAppFilter, RemoteAppId,
    RemoteAppRecord, RemoteAppStore, RemoteTarget, StoreError,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Route library logs to the test harness output; repeated calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("siteweave_apps=debug")
        .with_test_writer()
        .try_init();
}

/// In-memory SQLite store with migrations applied
pub async fn memory_store() -> DbAppStore {
    let db = siteweave_db::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");
    siteweave_db::migrate(&db)
        .await
        .expect("Failed to run migrations");
    DbAppStore::new(db)
}

/// A loopback `host:port` nobody is listening on right now
pub fn free_local_socket() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

/// Store wrapper counting writes, with switchable failure injection
pub struct CountingStore {
    inner: DbAppStore,
    pub inserts: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail_writes: AtomicBool,
}

impl CountingStore {
    pub fn new(inner: DbAppStore) -> Self {
        Self {
            inner,
            inserts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn mutations(&self) -> usize {
        self.inserts.load(Ordering::SeqCst) + self.deletes.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sea_orm::DbErr::Custom(
                "store is read-only".to_string(),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteAppStore for CountingStore {
    async fn query(&self, filter: &RemoteAppFilter) -> Result<Vec<RemoteAppRecord>, StoreError> {
        self.inner.query(filter).await
    }

    async fn get(&self, id: RemoteAppId) -> Result<RemoteAppRecord, StoreError> {
        self.inner.get(id).await
    }

    async fn insert(
        &self,
        config: &AppConfig,
        from_config: bool,
    ) -> Result<RemoteAppRecord, StoreError> {
        self.check_writable()?;
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(config, from_config).await
    }

    async fn delete(&self, id: RemoteAppId) -> Result<bool, StoreError> {
        self.check_writable()?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(id).await
    }
}

/// Handler that answers each client with the remote app socket it targets,
/// then closes
#[derive(Default)]
pub struct AnnouncingHandler {
    pub targets: Mutex<Vec<RemoteTarget>>,
}

impl AnnouncingHandler {
    pub fn count(&self) -> usize {
        self.targets.lock().unwrap().len()
    }
}

#[async_trait]
impl ClientConnectedHandler for AnnouncingHandler {
    async fn on_client_connected(
        &self,
        target: &RemoteTarget,
        mut client: BoxedStream,
        _peer: String,
    ) -> std::io::Result<()> {
        self.targets.lock().unwrap().push(target.clone());
        client.write_all(target.app_socket.as_bytes()).await?;
        client.shutdown().await
    }
}

/// Handler that echoes bytes back for as long as the client stays connected
pub struct EchoHandler;

#[async_trait]
impl ClientConnectedHandler for EchoHandler {
    async fn on_client_connected(
        &self,
        _target: &RemoteTarget,
        client: BoxedStream,
        _peer: String,
    ) -> std::io::Result<()> {
        let (mut reader, mut writer) = tokio::io::split(client);
        tokio::io::copy(&mut reader, &mut writer).await?;
        Ok(())
    }
}

pub fn announcing_handler() -> Arc<AnnouncingHandler> {
    Arc::new(AnnouncingHandler::default())
}

/// Poll `condition` for up to a second
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
