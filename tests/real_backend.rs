use std::fs;
use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use treewatch::config::WatchOptions;
use treewatch::types::{FsEventKind, WatchEvent};
use treewatch::watch;
use treewatch_test_utils::{init_tracing, until_ready, with_timeout};

/// Wait for an event of `kind` whose path ends with `suffix`.
async fn wait_for(rx: &mut UnboundedReceiver<WatchEvent>, kind: FsEventKind, suffix: &str) {
    with_timeout(async {
        while let Some(event) = rx.recv().await {
            if let Some(ev) = event.as_fs() {
                if ev.kind == kind && ev.path.ends_with(suffix) {
                    return;
                }
            }
        }
        panic!("event stream ended before {kind} {suffix}");
    })
    .await;
}

fn quick_polling() -> WatchOptions {
    WatchOptions {
        use_polling: true,
        interval: Duration::from_millis(20),
        ..WatchOptions::default()
    }
}

#[tokio::test]
async fn detects_created_changed_and_removed_files() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("existing.txt"), "x").unwrap();

    let (watcher, mut rx) = watch([dir.path()], quick_polling()).unwrap();
    let initial = until_ready(&mut rx).await;
    assert!(initial.iter().filter_map(|e| e.as_fs()).any(|e| {
        e.kind == FsEventKind::Add && e.path.ends_with("existing.txt")
    }));

    let file = dir.path().join("new.txt");
    fs::write(&file, "hello").unwrap();
    wait_for(&mut rx, FsEventKind::Add, "new.txt").await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    fs::write(&file, "hello, world").unwrap();
    wait_for(&mut rx, FsEventKind::Change, "new.txt").await;

    fs::remove_file(&file).unwrap();
    wait_for(&mut rx, FsEventKind::Unlink, "new.txt").await;

    watcher.close().await.unwrap();
}

#[tokio::test]
async fn non_persistent_watch_only_scans() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub/a.txt"), "a").unwrap();

    let (watcher, mut rx) = watch(
        [dir.path()],
        WatchOptions {
            persistent: false,
            ..WatchOptions::default()
        },
    )
    .unwrap();
    let initial = until_ready(&mut rx).await;

    let kinds: Vec<FsEventKind> = initial.iter().filter_map(|e| e.as_fs()).map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![FsEventKind::AddDir, FsEventKind::AddDir, FsEventKind::Add]
    );
    let watched = watcher.get_watched().await;
    assert!(watched.keys().any(|k| Path::new(k).ends_with("sub")));
}

#[tokio::test]
async fn glob_roots_filter_real_events() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = format!("{}/*.rs", dir.path().to_string_lossy().replace('\\', "/"));

    let (watcher, mut rx) = watch([pattern], quick_polling()).unwrap();
    until_ready(&mut rx).await;

    fs::write(dir.path().join("notes.md"), "n").unwrap();
    fs::write(dir.path().join("lib.rs"), "l").unwrap();

    with_timeout(async {
        while let Some(event) = rx.recv().await {
            if let Some(ev) = event.as_fs() {
                assert!(!ev.path.ends_with("notes.md"), "glob leaked {ev:?}");
                if ev.path.ends_with("lib.rs") {
                    break;
                }
            }
        }
    })
    .await;

    watcher.close().await.unwrap();
}
