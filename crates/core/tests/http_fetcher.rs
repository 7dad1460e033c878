//! HTTP fetcher integration tests against a local axum server.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

use pressroom_core::{
    testing::fixtures, CancelFlag, FetchError, Fetcher, HttpFetcher, TransferConfig,
    TransferProgress,
};

fn document() -> Vec<u8> {
    fixtures::pdf_without_images(3)
}

async fn pdf() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/pdf")], document())
}

async fn html() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html")], "<html></html>")
}

/// Body without a Content-Length header.
async fn chunked() -> impl IntoResponse {
    let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
        document().chunks(100).map(|c| Ok(c.to_vec())).collect();
    (
        [(header::CONTENT_TYPE, "application/pdf")],
        Body::from_stream(futures::stream::iter(chunks)),
    )
}

async fn large() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/pdf")], vec![b'%'; 8192])
}

/// A PDF body with no Content-Type header at all.
async fn untyped() -> Response {
    Response::new(Body::from(document()))
}

async fn empty() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/pdf")], Vec::<u8>::new())
}

async fn start_server() -> SocketAddr {
    let app = Router::new()
        .route("/doc.pdf", get(pdf))
        .route("/page.html", get(html))
        .route("/chunked.pdf", get(chunked))
        .route("/large.pdf", get(large))
        .route("/untyped", get(untyped))
        .route("/empty.pdf", get(empty))
        .fallback(|| async { StatusCode::NOT_FOUND });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn fetcher(adjust: impl FnOnce(&mut TransferConfig)) -> HttpFetcher {
    let mut config = TransferConfig {
        chunk_size_bytes: 256,
        ..Default::default()
    };
    adjust(&mut config);
    HttpFetcher::new(config).unwrap()
}

fn drain(mut rx: mpsc::Receiver<TransferProgress>) -> Vec<TransferProgress> {
    let mut updates = Vec::new();
    while let Ok(p) = rx.try_recv() {
        updates.push(p);
    }
    updates
}

#[tokio::test]
async fn test_fetch_streams_body_with_progress() {
    let addr = start_server().await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("source.pdf");
    let (tx, rx) = mpsc::channel(1024);

    let outcome = fetcher(|_| {})
        .fetch(&format!("http://{}/doc.pdf", addr), &dest, tx, &CancelFlag::new())
        .await
        .unwrap();

    let expected = document();
    assert_eq!(outcome.bytes, expected.len() as u64);
    assert_eq!(outcome.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(std::fs::read(&dest).unwrap(), expected);

    let updates = drain(rx);
    assert_eq!(updates.len(), expected.len().div_ceil(256));
    assert!(updates.windows(2).all(|w| w[1].bytes_received > w[0].bytes_received));
    let last = updates.last().unwrap();
    assert_eq!(last.total_bytes, Some(expected.len() as u64));
    assert_eq!(last.fraction(), Some(1.0));
}

#[tokio::test]
async fn test_fetch_without_length_is_indeterminate() {
    let addr = start_server().await;
    let dir = TempDir::new().unwrap();
    let (tx, rx) = mpsc::channel(1024);

    let outcome = fetcher(|_| {})
        .fetch(
            &format!("http://{}/chunked.pdf", addr),
            &dir.path().join("source.pdf"),
            tx,
            &CancelFlag::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.bytes, document().len() as u64);

    let updates = drain(rx);
    assert!(!updates.is_empty());
    assert!(updates.iter().all(|p| p.total_bytes.is_none() && p.fraction().is_none()));
}

#[tokio::test]
async fn test_fetch_not_found() {
    let addr = start_server().await;
    let dir = TempDir::new().unwrap();
    let (tx, _rx) = mpsc::channel(16);

    let err = fetcher(|_| {})
        .fetch(
            &format!("http://{}/missing.pdf", addr),
            &dir.path().join("source.pdf"),
            tx,
            &CancelFlag::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_fetch_rejects_non_pdf_content_type() {
    let addr = start_server().await;
    let dir = TempDir::new().unwrap();
    let url = format!("http://{}/page.html", addr);

    let (tx, _rx) = mpsc::channel(16);
    let err = fetcher(|_| {})
        .fetch(&url, &dir.path().join("a.pdf"), tx, &CancelFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::ContentType { .. }));

    // Accepted once the check is switched off.
    let (tx, _rx) = mpsc::channel(16);
    let outcome = fetcher(|c| c.require_pdf_content_type = false)
        .fetch(&url, &dir.path().join("b.pdf"), tx, &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(outcome.bytes, "<html></html>".len() as u64);
}

#[tokio::test]
async fn test_fetch_enforces_size_limit() {
    let addr = start_server().await;
    let dir = TempDir::new().unwrap();
    let small = |c: &mut TransferConfig| c.max_size_bytes = 1024;

    // Announced length over the limit.
    let (tx, _rx) = mpsc::channel(64);
    let err = fetcher(small)
        .fetch(
            &format!("http://{}/large.pdf", addr),
            &dir.path().join("a.pdf"),
            tx,
            &CancelFlag::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::TooLarge { limit: 1024, .. }));

    // No announced length: caught while streaming.
    let (tx, _rx) = mpsc::channel(64);
    let err = fetcher(|c| c.max_size_bytes = 300)
        .fetch(
            &format!("http://{}/chunked.pdf", addr),
            &dir.path().join("b.pdf"),
            tx,
            &CancelFlag::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::TooLarge { limit: 300, .. }));
}

#[tokio::test]
async fn test_fetch_observes_cancel_flag() {
    let addr = start_server().await;
    let dir = TempDir::new().unwrap();
    let (tx, _rx) = mpsc::channel(16);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let err = fetcher(|_| {})
        .fetch(
            &format!("http://{}/doc.pdf", addr),
            &dir.path().join("a.pdf"),
            tx,
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Cancelled));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Bind and drop to get a port nobody listens on.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let dir = TempDir::new().unwrap();
    let (tx, _rx) = mpsc::channel(16);

    let err = fetcher(|c| c.connect_timeout_secs = 2)
        .fetch(
            &format!("http://{}/doc.pdf", addr),
            &dir.path().join("a.pdf"),
            tx,
            &CancelFlag::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Network { .. }));
}

#[tokio::test]
async fn test_probe_reports_source_info() {
    let addr = start_server().await;
    let fetcher = fetcher(|_| {});

    let info = fetcher
        .probe(&format!("http://{}/doc.pdf", addr))
        .await
        .unwrap();
    assert_eq!(info.status, 200);
    assert_eq!(info.content_type.as_deref(), Some("application/pdf"));
    if let Some(size) = info.size_bytes {
        assert_eq!(size, document().len() as u64);
    }

    let err = fetcher
        .probe(&format!("http://{}/page.html", addr))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::ContentType { .. }));

    let err = tokio::time::timeout(
        Duration::from_secs(10),
        fetcher.probe(&format!("http://{}/missing.pdf", addr)),
    )
    .await
    .unwrap()
    .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_probe_requires_pdf_content_type() {
    let addr = start_server().await;
    let url = format!("http://{}/untyped", addr);

    let err = fetcher(|_| {}).probe(&url).await.unwrap_err();
    assert!(matches!(err, FetchError::ContentType { .. }));

    let info = fetcher(|c| c.require_pdf_content_type = false)
        .probe(&url)
        .await
        .unwrap();
    assert_eq!(info.content_type, None);
}

#[tokio::test]
async fn test_probe_rejects_empty_body() {
    let addr = start_server().await;

    let err = fetcher(|_| {})
        .probe(&format!("http://{}/empty.pdf", addr))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Empty));
}
