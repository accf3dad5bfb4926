//! Benchmarks for the report path
//!
//! This benchmark measures:
//! - Signature computation for messages with volatile parts
//! - `report_error` on a cache hit
//! - `report_error` on a deduplicated miss

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;

use faultline::transport::{AnalysisBackend, AnalysisRequest, ProviderResponse};
use faultline::{ErrorPipeline, ErrorReport, ErrorSignature, PipelineConfig};

struct Immediate;

#[async_trait]
impl AnalysisBackend for Immediate {
    async fn send(&self, request: &AnalysisRequest) -> faultline::Result<ProviderResponse> {
        Ok(ProviderResponse::text(format!("check {}", request.kind)))
    }

    fn name(&self) -> &str {
        "bench"
    }
}

/// Never answers; keeps signatures pending.
struct Stalled;

#[async_trait]
impl AnalysisBackend for Stalled {
    async fn send(&self, _request: &AnalysisRequest) -> faultline::Result<ProviderResponse> {
        std::future::pending().await
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

fn sample_messages() -> Vec<(&'static str, String)> {
    vec![
        ("short", "connection reset by peer".to_string()),
        (
            "volatile",
            "request 3f2a9c1e-77aa-4b1c-9d0e-5a6b7c8d9e0f failed at 2024-05-01T12:03:44.123Z after 30000 ms (ptr 0x7ffd1234abcd)"
                .to_string(),
        ),
        ("long", "x".repeat(4096)),
    ]
}

fn bench_signature(c: &mut Criterion) {
    let mut group = c.benchmark_group("signature");
    for (name, message) in sample_messages() {
        let report = ErrorReport::new("RequestFailed", message).with_origin("src/api/orders.rs:120:17");
        group.bench_with_input(BenchmarkId::from_parameter(name), &report, |b, report| {
            b.iter(|| ErrorSignature::from_report(black_box(report)))
        });
    }
    group.finish();
}

fn bench_report_error(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let _guard = rt.enter();

    let hit_pipeline = ErrorPipeline::builder()
        .with_config(PipelineConfig::new())
        .with_backend(Arc::new(Immediate))
        .build()
        .expect("pipeline");
    let report = ErrorReport::new("PoolTimeout", "no connection within 3000 ms").here();
    hit_pipeline.report_error(&report);
    rt.block_on(async {
        while hit_pipeline.get_analysis_for(&report).is_none() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });

    let pending_pipeline = ErrorPipeline::builder()
        .with_config(PipelineConfig::new())
        .with_backend(Arc::new(Stalled))
        .build()
        .expect("pipeline");
    pending_pipeline.report_error(&report);

    let mut group = c.benchmark_group("report_error");
    group.bench_function("cache_hit", |b| {
        b.iter(|| hit_pipeline.report_error(black_box(&report)))
    });
    group.bench_function("pending_dedup", |b| {
        b.iter(|| pending_pipeline.report_error(black_box(&report)))
    });
    group.finish();

    rt.block_on(async {
        hit_pipeline.shutdown().await;
        pending_pipeline.shutdown().await;
    });
}

criterion_group!(benches, bench_signature, bench_report_error);
criterion_main!(benches);
