//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with a mock fetcher injected, enabling end-to-end API testing without
//! network access.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use pressroom_core::{testing::MockFetcher, Config, Fetcher, JobCoordinator, PdfTransformer};
use pressroom_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use pressroom_core::testing::fixtures;

/// Test fixture for API testing with a mock fetcher.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_submit() {
///     let fixture = TestFixture::new().await;
///     fixture.fetcher.add_document(URL, fixtures::pdf_without_images(1)).await;
///
///     let response = fixture.post("/api/v1/jobs", json!({ "url": URL })).await;
///     assert_eq!(response.status, StatusCode::ACCEPTED);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock fetcher - register source documents
    pub fetcher: MockFetcher,
    /// Coordinator behind the router
    pub coordinator: Arc<JobCoordinator>,
    /// Working directory for job files
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Raw response, for downloads
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestFixture {
    /// Create a new test fixture with default configuration.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test fixture, adjusting the configuration first.
    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.server.host = std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
        config.storage.work_dir = temp_dir.path().join("work");
        config.transfer.chunk_size_bytes = 4096;
        adjust(&mut config);

        let fetcher = MockFetcher::new();
        let shared: Arc<dyn Fetcher> = Arc::new(fetcher.clone());
        let coordinator = Arc::new(JobCoordinator::new(
            &config,
            Arc::clone(&shared),
            Arc::new(PdfTransformer::new()),
        ));
        coordinator
            .storage()
            .prepare()
            .await
            .expect("Failed to prepare work dir");

        let state = Arc::new(AppState::new(config, Arc::clone(&coordinator), shared));
        let router = create_router(state);

        Self {
            router,
            fetcher,
            coordinator,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with a raw body and the JSON content type.
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Send a generic request.
    pub async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);

        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_string(&json).expect("Failed to serialize body"))
            }
            None => Body::empty(),
        };

        let request = builder.body(body).expect("Failed to build request");
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.raw(request).await;
        let body = if response.body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&response.body).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&response.body).to_string())
            })
        };

        TestResponse {
            status: response.status,
            body,
        }
    }

    /// GET returning headers and the undecoded body.
    pub async fn get_raw(&self, path: &str) -> RawResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .expect("Failed to build request");
        self.raw(request).await
    }

    async fn raw(&self, request: Request<Body>) -> RawResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes()
            .to_vec();

        RawResponse {
            status,
            headers,
            body,
        }
    }

    /// Poll a job until its phase is terminal.
    pub async fn wait_for_terminal(&self, id: &str) -> Value {
        for _ in 0..600 {
            let response = self.get(&format!("/api/v1/jobs/{}", id)).await;
            let phase = response.body["phase"].as_str().unwrap_or_default().to_string();
            if phase == "completed" || phase == "failed" {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("Job {} did not finish in time", id);
    }
}
