//! Routing inbound tunnel streams to local exposed apps

mod common;

use async_trait::async_trait;
use common::{announcing_handler, memory_store};
use siteweave_apps::{
    AppError, AppManager, BoxedStream, DataConverter, LocalAppRegistry, LocalExposedAppConfig,
    SocketMode,
};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpListener;

/// Stream that records whether anyone ever polled it
#[derive(Clone, Default)]
struct TouchedStream {
    touched: Arc<AtomicBool>,
}

impl AsyncRead for TouchedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.touched.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for TouchedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.touched.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Converter that records what it was started with
#[derive(Default)]
struct RecordingConverter {
    calls: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl DataConverter for RecordingConverter {
    async fn start(
        &self,
        _stream: BoxedStream,
        socket: &str,
        remaining: Vec<u8>,
    ) -> Result<(), AppError> {
        self.calls
            .lock()
            .unwrap()
            .push((socket.to_string(), remaining));
        Ok(())
    }
}

/// Converter that refuses every stream
struct RefusingConverter;

#[async_trait]
impl DataConverter for RefusingConverter {
    async fn start(&self, _stream: BoxedStream, _socket: &str, _remaining: Vec<u8>) -> Result<(), AppError> {
        Err(AppError::Converter("upstream unavailable".to_string()))
    }
}

async fn manager_with_local(local_apps: LocalAppRegistry) -> AppManager {
    AppManager::new(
        Arc::new(memory_store().await),
        local_apps,
        &[],
        announcing_handler(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_unknown_app_leaves_stream_untouched() {
    let manager = manager_with_local(LocalAppRegistry::new()).await;
    let stream = TouchedStream::default();
    let touched = stream.touched.clone();

    let err = manager
        .dispatch_to_local_app("nope", "", Box::new(stream), b"hello".to_vec())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(!touched.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_converter_receives_selector_and_remainder() {
    let converter = Arc::new(RecordingConverter::default());
    let registry = LocalAppRegistry::new()
        .with_app(LocalExposedAppConfig::single("ssh", "127.0.0.1:22"), converter.clone())
        .unwrap();
    let manager = manager_with_local(registry).await;

    manager
        .dispatch_to_local_app(
            "ssh",
            "",
            Box::new(TouchedStream::default()),
            b"SSH-2.0".to_vec(),
        )
        .await
        .unwrap();

    let calls = converter.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], (String::new(), b"SSH-2.0".to_vec()));
}

#[tokio::test]
async fn test_converter_error_is_returned() {
    let registry = LocalAppRegistry::new()
        .with_app(
            LocalExposedAppConfig::single("web", "127.0.0.1:8080"),
            Arc::new(RefusingConverter),
        )
        .unwrap();
    let manager = manager_with_local(registry).await;

    let err = manager
        .dispatch_to_local_app("web", "", Box::new(TouchedStream::default()), Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Converter(_)));
}

#[tokio::test]
async fn test_list_and_show_local_exposed_apps() {
    let registry = LocalAppRegistry::from_configs(&[
        LocalExposedAppConfig::single("web", "127.0.0.1:8080"),
        LocalExposedAppConfig {
            app_name: "vnc".to_string(),
            mode: SocketMode::Range,
            app_socket: None,
            port_range: vec!["5900-5910".to_string()],
            address_range: vec!["127.0.0.1".to_string()],
        },
    ])
    .unwrap();
    let manager = manager_with_local(registry).await;

    let names: Vec<String> = manager
        .list_local_exposed_apps()
        .into_iter()
        .map(|summary| summary.app_name)
        .collect();
    assert_eq!(names, vec!["vnc".to_string(), "web".to_string()]);
    assert_eq!(manager.exposed_apps(), names);

    let vnc = manager.show_local_exposed_app("vnc").unwrap();
    assert_eq!(vnc.config.mode, SocketMode::Range);
    assert_eq!(vnc.config.port_range, vec!["5900-5910".to_string()]);

    let missing = manager.show_local_exposed_app("mail").unwrap_err();
    assert!(missing.is_not_found());

    let json = serde_json::to_value(&vnc).unwrap();
    assert_eq!(json["app_name"], "vnc");
    assert_eq!(json["mode"], "range");
}

#[tokio::test]
async fn test_socket_converter_bridges_to_local_service() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream.local_addr().unwrap().to_string();
    let service = tokio::spawn(async move {
        let (mut conn, _) = upstream.accept().await.unwrap();
        let mut request = [0u8; 10];
        conn.read_exact(&mut request).await.unwrap();
        conn.write_all(b"pong").await.unwrap();
        request
    });

    let registry =
        LocalAppRegistry::from_configs(&[LocalExposedAppConfig::single("svc", upstream_addr)])
            .unwrap();
    let manager = manager_with_local(registry).await;

    let (mut tunnel, far_end) = tokio::io::duplex(64);
    manager
        .dispatch_to_local_app("svc", "", Box::new(far_end), b"HELLO".to_vec())
        .await
        .unwrap();

    tunnel.write_all(b"-ping").await.unwrap();
    let mut reply = [0u8; 4];
    tunnel.read_exact(&mut reply).await.unwrap();

    assert_eq!(&reply, b"pong");
    assert_eq!(&service.await.unwrap(), b"HELLO-ping");
}

#[tokio::test]
async fn test_socket_converter_unreachable_upstream() {
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = closed.local_addr().unwrap().to_string();
    drop(closed);

    let registry =
        LocalAppRegistry::from_configs(&[LocalExposedAppConfig::single("svc", addr)]).unwrap();
    let manager = manager_with_local(registry).await;

    let (_tunnel, far_end) = tokio::io::duplex(64);
    let err = manager
        .dispatch_to_local_app("svc", "", Box::new(far_end), Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Converter(_)));
}
