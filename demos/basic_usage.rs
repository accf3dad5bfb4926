//! Basic usage example
//!
//! Reports a few errors to an analysis provider and prints whatever advice
//! comes back, then dumps the pipeline signals.
//!
//! The provider endpoint and key are read from the environment:
//! - FAULTLINE_ENDPOINT (e.g. http://localhost:4010/v1/analyze)
//! - FAULTLINE_API_KEY (optional)
//!
//! Usage:
//!   FAULTLINE_ENDPOINT=http://localhost:4010/v1/analyze cargo run --example basic_usage

use faultline::{ErrorPipeline, ErrorReport, PipelineConfig};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("connection pool exhausted after {waited_ms} ms")]
struct PoolExhausted {
    waited_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    faultline::telemetry::init_tracing("faultline=debug,basic_usage=info");

    let config = PipelineConfig::from_env();
    if config.endpoint.is_none() {
        eprintln!("FAULTLINE_ENDPOINT not set; example needs an analysis provider.");
        return Ok(());
    }
    let pipeline = ErrorPipeline::builder().with_config(config).build()?;

    // Same failure, different volatile parts: one analysis.
    for waited_ms in [3000, 3012, 2998] {
        let outcome = pipeline.report(&PoolExhausted { waited_ms });
        println!("reported pool error, pending = {}", outcome.is_pending());
    }

    let report = ErrorReport::new("DeadlockDetected", "deadlock on relation orders (txn 88123)")
        .here()
        .with_detail("route", "/checkout");
    pipeline.report_error(&report);

    tokio::time::sleep(Duration::from_secs(3)).await;

    match pipeline.get_analysis_for(&report) {
        Some(result) => println!("advice for deadlock:\n{}", result.advice.as_text()),
        None => println!("no advice yet for deadlock"),
    }

    let signals = pipeline.signals();
    println!("\nqueue: {:?}", signals.queue);
    println!("cache: {:?}", signals.cache);
    println!("pool: {:?}", signals.pool);
    for (target, breaker) in &signals.breakers {
        println!("breaker {}: {}", target, breaker.state);
    }

    pipeline.shutdown().await;
    Ok(())
}
