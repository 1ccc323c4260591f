#![allow(dead_code)]

use courier::event_thread::EventThread;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber once; `RUST_LOG` controls the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `cond` every millisecond until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;

    while !cond() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }

    true
}

pub fn spawn_ui(name: &str) -> Arc<EventThread> {
    Arc::new(EventThread::spawn(name).unwrap())
}
