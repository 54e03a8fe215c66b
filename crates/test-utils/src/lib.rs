pub mod fake_backend;

pub use fake_backend::FakeBackend;

use std::sync::{Arc, Once};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::{fmt, EnvFilter};
use treewatch::config::WatchOptions;
use treewatch::fs::mock::MockFileSystem;
use treewatch::types::{FsEventKind, WatchEvent};
use treewatch::FsWatcher;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=treewatch=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Watcher over a mock filesystem and a fake backend.
pub fn fake_watcher(options: WatchOptions) -> (FsWatcher, MockFileSystem, FakeBackend) {
    let fs = MockFileSystem::new();
    let backend = FakeBackend::new();
    let watcher = FsWatcher::with_parts(options, Arc::new(fs.clone()), backend.clone())
        .expect("watcher should start");
    (watcher, fs, backend)
}

/// Receive events until `ready`, returning everything before it.
pub async fn until_ready(rx: &mut UnboundedReceiver<WatchEvent>) -> Vec<WatchEvent> {
    let mut seen = Vec::new();
    with_timeout(async {
        while let Some(event) = rx.recv().await {
            if matches!(event, WatchEvent::Ready) {
                break;
            }
            seen.push(event);
        }
    })
    .await;
    seen
}

/// Let spawned tasks and timers up to `by` run, then take what arrived.
pub async fn settle(rx: &mut UnboundedReceiver<WatchEvent>, by: Duration) -> Vec<WatchEvent> {
    tokio::time::sleep(by).await;
    // Yield so the runtime can drain messages posted just before the deadline.
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

/// `(kind, path)` pairs of the filesystem events in `events`.
pub fn fs_pairs(events: &[WatchEvent]) -> Vec<(FsEventKind, String)> {
    events
        .iter()
        .filter_map(|e| e.as_fs())
        .map(|e| (e.kind, e.path.to_string_lossy().replace('\\', "/")))
        .collect()
}
