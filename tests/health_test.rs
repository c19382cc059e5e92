//! Health monitor driven by a manual schedule against live mock backends.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use inference_gateway::config::HealthCheckConfig;
use inference_gateway::health::{HealthMonitor, ManualSchedule};
use inference_gateway::load_balancer::{Backend, BackendRegistry};

mod common;

use common::{wait_until, MockBackend};

const SETTLE: Duration = Duration::from_secs(5);

fn monitor_for(backends: &[(&str, &MockBackend)], threshold: u32) -> Arc<HealthMonitor> {
    let backends = backends
        .iter()
        .map(|(name, mock)| Arc::new(Backend::new(*name, "127.0.0.1", mock.port(), None).unwrap()))
        .collect();
    let config = HealthCheckConfig {
        failure_threshold: threshold,
        timeout_ms: 1_000,
        ..HealthCheckConfig::default()
    };
    Arc::new(HealthMonitor::new(BackendRegistry::from_backends(backends), config))
}

#[tokio::test]
async fn test_threshold_and_recovery() {
    let up = MockBackend::start("up", &[]).await;
    let flaky = MockBackend::start("flaky", &[]).await;
    let monitor = monitor_for(&[("up", &up), ("flaky", &flaky)], 3);
    let (schedule, trigger) = ManualSchedule::new();

    flaky.state.healthy.store(false, Ordering::SeqCst);
    monitor.start(schedule);

    // Startup cycle runs without a trigger
    wait_until(SETTLE, || monitor.cycles_completed() == 1).await;
    assert_eq!(monitor.status()["flaky"].consecutive_errors, 1);
    assert!(monitor.status()["flaky"].healthy);

    trigger.fire();
    wait_until(SETTLE, || monitor.cycles_completed() == 2).await;
    assert!(monitor.status()["flaky"].healthy, "still below threshold");

    trigger.fire();
    wait_until(SETTLE, || monitor.cycles_completed() == 3).await;
    let status = monitor.status();
    assert!(!status["flaky"].healthy);
    assert_eq!(status["flaky"].consecutive_errors, 3);
    assert!(status["flaky"].last_error.is_some());
    assert!(status["up"].healthy);

    let healthy: Vec<String> = monitor.healthy_backends().iter().map(|b| b.name.clone()).collect();
    assert_eq!(healthy, vec!["up"]);

    // One success restores it
    flaky.state.healthy.store(true, Ordering::SeqCst);
    trigger.fire();
    wait_until(SETTLE, || monitor.cycles_completed() == 4).await;
    let status = monitor.status();
    assert!(status["flaky"].healthy);
    assert_eq!(status["flaky"].consecutive_errors, 0);
    assert!(status["flaky"].last_error.is_none());
    assert_eq!(monitor.healthy_backends().len(), 2);

    monitor.stop();
}

#[tokio::test]
async fn test_stop_halts_probing() {
    let up = MockBackend::start("up", &[]).await;
    let monitor = monitor_for(&[("up", &up)], 1);
    let (schedule, trigger) = ManualSchedule::new();

    monitor.start(schedule);
    wait_until(SETTLE, || monitor.cycles_completed() == 1).await;

    monitor.stop();
    monitor.stop();
    trigger.fire();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(monitor.cycles_completed(), 1);
    assert_eq!(up.state.health_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_custom_health_path() {
    let up = MockBackend::start("up", &[]).await;
    let backend = Arc::new(
        Backend::new("up", "127.0.0.1", up.port(), Some("/v1/models".to_string())).unwrap(),
    );
    let monitor = HealthMonitor::new(
        BackendRegistry::from_backends(vec![backend.clone()]),
        HealthCheckConfig::default(),
    );

    assert!(monitor.check_one(&backend).await);
    assert_eq!(up.state.health_hits.load(Ordering::SeqCst), 0);
    assert_eq!(up.state.model_hits.load(Ordering::SeqCst), 1);
}
