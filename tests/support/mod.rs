#![allow(dead_code)]

pub mod scripted_store;

use std::thread;
use std::time::{Duration, Instant};

use survey_model::ModelConfig;

/// Install a test subscriber once; `RUST_LOG=survey_model=debug` shows the
/// worker's cycles.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Intervals short enough for tests to converge quickly.
pub fn fast_config() -> ModelConfig {
    ModelConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_notify_interval(Duration::from_millis(20))
        .with_reconnect_delay(Duration::from_millis(10))
        .with_worker_name("model-test")
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub const SETTLE: Duration = Duration::from_secs(5);
