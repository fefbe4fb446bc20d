#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use common::{free_port, init_tracing, CannedRunner};
use portwait_rs::config::PollOptions;
use portwait_rs::pipeline::{run_pipeline, PipelineConfig};
use portwait_rs::poller::TimeoutFailure;
use portwait_rs::target::ProbeTarget;
use portwait_rs::types::ProbeMethod;
use tokio_util::sync::CancellationToken;

fn config(port: u16, max_wait_ms: u64, serve: Option<&str>, then: Option<&str>) -> PipelineConfig {
    PipelineConfig {
        target: ProbeTarget::new("127.0.0.1", port).unwrap(),
        options: PollOptions {
            fallback: false,
            ..PollOptions::from_millis(max_wait_ms, 100)
        },
        serve: serve.map(str::to_string),
        then: then.map(str::to_string),
    }
}

#[tokio::test]
async fn ready_target_runs_build_and_stops_server() {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("built");
    let then = format!("touch '{}'", marker.display());

    let start = Instant::now();
    let ready = run_pipeline(
        &config(port, 5_000, Some("echo starting; sleep 30"), Some(&then)),
        &CannedRunner::new(),
        CancellationToken::new(),
    )
    .await
    .expect("pipeline ok");
    assert_eq!(ready.method, ProbeMethod::Socket);
    assert!(marker.exists());
    // The 30s server must have been killed rather than awaited.
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn server_exiting_early_fails_fast() {
    init_tracing();
    let start = Instant::now();
    let err = run_pipeline(
        &config(free_port(), 10_000, Some("echo boom >&2; exit 3"), None),
        &CannedRunner::new(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("exited before"), "{err}");
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn failing_build_step_is_an_error() {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let err = run_pipeline(
        &config(port, 5_000, None, Some("exit 7")),
        &CannedRunner::new(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("build command failed"), "{err}");
}

#[tokio::test]
async fn timeout_is_downcastable() {
    init_tracing();
    let err = run_pipeline(
        &config(free_port(), 300, None, Some("exit 0")),
        &CannedRunner::new(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    let failure = err.downcast_ref::<TimeoutFailure>().expect("timeout failure");
    assert_eq!(failure.max_wait_ms, 300);
    assert!(failure.attempts >= 1);
}

#[tokio::test]
async fn cancellation_stops_waiting() {
    init_tracing();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let start = Instant::now();
    let err = run_pipeline(
        &config(free_port(), 30_000, Some("sleep 30"), None),
        &CannedRunner::new(),
        cancel,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("cancelled"), "{err}");
    assert!(start.elapsed() < Duration::from_secs(5));
}
