//! Mock HTTP server setup for integration tests

use faultline::config::PipelineConfig;
use faultline::{ErrorPipeline, Result};
use mockito::{Matcher, Mock, Server, ServerGuard};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const ANALYZE_PATH: &str = "/v1/analyze";

/// Test fixture that manages a mock analysis provider
pub struct MockServerFixture {
    pub server: Arc<Mutex<ServerGuard>>,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self {
            server: Arc::new(Mutex::new(server)),
            base_url,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, ANALYZE_PATH)
    }

    /// Build a pipeline whose HTTP backend points at the mock server.
    pub fn pipeline(&self, config: PipelineConfig) -> Result<ErrorPipeline> {
        ErrorPipeline::builder()
            .with_config(config.with_endpoint(self.endpoint()))
            .build()
    }

    /// Successful advice response, expected exactly `hits` times
    pub async fn mock_advice(&self, advice: &str, hits: usize) -> Mock {
        let body = serde_json::json!({ "advice": advice }).to_string();
        let mut server = self.server.lock().await;
        server
            .mock("POST", ANALYZE_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    /// Error response with an optional `Retry-After` header
    pub async fn mock_error(&self, status: usize, retry_after: Option<u64>, hits: usize) -> Mock {
        let mut server = self.server.lock().await;
        let mut mock = server
            .mock("POST", ANALYZE_PATH)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"provider unavailable"}"#);
        if let Some(secs) = retry_after {
            mock = mock.with_header("retry-after", &secs.to_string());
        }
        mock.expect(hits).create_async().await
    }

    /// Advice response that only matches requests carrying a bearer token and
    /// a request id
    pub async fn mock_authenticated(&self, api_key: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("POST", ANALYZE_PATH)
            .match_header("authorization", format!("Bearer {}", api_key).as_str())
            .match_header(
                faultline::transport::http::REQUEST_ID_HEADER,
                Matcher::Regex("^[0-9a-f]{8}-[0-9a-f]{4}-".to_string()),
            )
            .match_body(Matcher::PartialJson(serde_json::json!({
                "kind": "PoolTimeout",
                "origin": "src/db/pool.rs:88",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"advice":"raise the pool size","ttl_secs":120}"#)
            .expect(1)
            .create_async()
            .await
    }

    /// Raw body for 2xx responses that are not advice documents
    pub async fn mock_raw(&self, body: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("POST", ANALYZE_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }
}

/// Poll `check` until it holds or `limit` elapses.
pub async fn eventually<F>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
