//! HTTP backend and retrying client against the mock provider.

use crate::mock_server::MockServerFixture;
use faultline::transport::{
    AnalysisBackend, AnalysisRequest, ConnectionPool, HttpBackend, HttpBackendConfig, PoolConfig,
    RetryPolicy, RetryingClient,
};
use faultline::types::{Advice, ErrorReport};
use faultline::{Error, ErrorSignature, FailureClass};
use std::sync::Arc;
use std::time::Duration;

fn pool_timeout_request() -> AnalysisRequest {
    let report = ErrorReport::new("PoolTimeout", "timed out after 3000ms waiting for conn 17")
        .with_origin("src/db/pool.rs:88");
    AnalysisRequest::new(&ErrorSignature::from_report(&report), report)
}

fn backend(fixture: &MockServerFixture) -> HttpBackend {
    HttpBackend::new(
        HttpBackendConfig::new(fixture.endpoint())
            .with_timeout(Duration::from_secs(5))
            .with_target_name("advisor"),
    )
    .expect("valid endpoint")
}

#[tokio::test]
async fn test_advice_response_with_auth_and_request_id() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture.mock_authenticated("test-key").await;

    let backend = HttpBackend::new(
        HttpBackendConfig::new(fixture.endpoint()).with_api_key("test-key"),
    )
    .expect("valid endpoint");
    let resp = backend.send(&pool_timeout_request()).await.expect("advice");

    assert_eq!(resp.advice, Advice::Text("raise the pool size".into()));
    assert_eq!(resp.ttl_secs, Some(120));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_structured_advice_is_kept_as_json() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_raw(r#"{"advice":{"summary":"pool exhausted","steps":["raise max_size"]}}"#)
        .await;

    let resp = backend(&fixture)
        .send(&pool_timeout_request())
        .await
        .expect("advice");
    match resp.advice {
        Advice::Structured(v) => assert_eq!(v["summary"], "pool exhausted"),
        other => panic!("expected structured advice, got {:?}", other),
    }
    assert_eq!(resp.ttl_secs, None);
}

#[tokio::test]
async fn test_server_error_carries_retry_after() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture.mock_error(503, Some(7), 1).await;

    let err = backend(&fixture)
        .send(&pool_timeout_request())
        .await
        .unwrap_err();
    match &err {
        Error::Remote { status, class, .. } => {
            assert_eq!(*status, 503);
            assert_eq!(*class, FailureClass::ServerError);
        }
        other => panic!("expected remote error, got {:?}", other),
    }
    assert_eq!(err.retry_after_ms(), Some(7000));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_client_error_is_not_retryable() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture.mock_error(400, None, 1).await;

    let err = backend(&fixture)
        .send(&pool_timeout_request())
        .await
        .unwrap_err();
    assert_eq!(err.failure_class(), Some(FailureClass::ClientError));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_rate_limited_status() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture.mock_error(429, Some(2), 1).await;

    let err = backend(&fixture)
        .send(&pool_timeout_request())
        .await
        .unwrap_err();
    assert_eq!(err.failure_class(), Some(FailureClass::RateLimited));
    assert_eq!(err.retry_after_ms(), Some(2000));
}

#[tokio::test]
async fn test_malformed_body_is_a_decode_failure() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture.mock_raw(r#"{"unexpected":true}"#).await;

    let err = backend(&fixture)
        .send(&pool_timeout_request())
        .await
        .unwrap_err();
    assert_eq!(err.failure_class(), Some(FailureClass::Decode));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_connection_refused_is_a_connection_failure() {
    let backend = HttpBackend::new(
        HttpBackendConfig::new("http://127.0.0.1:1/v1/analyze")
            .with_timeout(Duration::from_secs(2)),
    )
    .expect("valid endpoint");

    let err = backend.send(&pool_timeout_request()).await.unwrap_err();
    assert_eq!(err.failure_class(), Some(FailureClass::Connection));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_retrying_client_stops_at_retry_ceiling() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture.mock_error(500, None, 3).await;

    let client = RetryingClient::new(
        Arc::new(backend(&fixture)),
        RetryPolicy::new()
            .with_base_delay(Duration::from_millis(5))
            .with_jitter(0.0),
        Arc::new(ConnectionPool::new(PoolConfig::new().with_bounds(1, 2))),
        Duration::from_secs(5),
    );

    let err = client.send(&pool_timeout_request(), 2).await.unwrap_err();
    assert_eq!(err.failure_class(), Some(FailureClass::ServerError));
    assert_eq!(client.attempts(), 3);
    assert_eq!(client.retries(), 2);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_retrying_client_does_not_retry_client_errors() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture.mock_error(422, None, 1).await;

    let client = RetryingClient::new(
        Arc::new(backend(&fixture)),
        RetryPolicy::new().with_base_delay(Duration::from_millis(5)),
        Arc::new(ConnectionPool::new(PoolConfig::new())),
        Duration::from_secs(5),
    );

    assert!(client.send(&pool_timeout_request(), 3).await.is_err());
    assert_eq!(client.attempts(), 1);
    mock.assert_async().await;
}

#[test]
fn test_endpoint_must_be_http() {
    let err = HttpBackend::new(HttpBackendConfig::new("ftp://advisor.internal/analyze"))
        .err()
        .expect("scheme rejected");
    let ctx = err.context().expect("configuration context");
    assert_eq!(ctx.field_path.as_deref(), Some("transport.endpoint"));
}
