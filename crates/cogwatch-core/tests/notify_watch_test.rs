//! End-to-end test against the real filesystem watcher.

mod common;

use std::sync::Arc;
use std::time::Duration;

use cogwatch_core::extension::{watch, ExtensionHost, HostOperation, MemoryHost};
use cogwatch_core::{ExtensionStatus, WatcherConfig};
use common::{id, wait_for_status};

#[tokio::test]
async fn test_file_changes_drive_the_host() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("cmds");
    std::fs::create_dir_all(&root).unwrap();

    let config = WatcherConfig::new("cmds")
        .with_base_dir(dir.path())
        .with_debug(false)
        .with_file_extension("ext")
        .with_debounce_ms(50);
    let host = Arc::new(MemoryHost::new());
    let (manager, handle) = watch(host.clone(), config).await.unwrap();
    let handle = handle.expect("watch loop not started");

    // Let the platform watcher settle before touching files.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let file = root.join("ping.ext");
    std::fs::write(&file, "v1").unwrap();
    assert!(wait_for_status(&manager, "cmds.ping", Some(ExtensionStatus::Loaded)).await);
    assert!(host.call_count(HostOperation::Load, &id("cmds.ping")) >= 1);

    // Non-extension files are ignored.
    std::fs::write(root.join("notes.txt"), "x").unwrap();

    std::fs::remove_file(&file).unwrap();
    assert!(wait_for_status(&manager, "cmds.ping", None).await);
    assert!(!host.is_loaded(&id("cmds.ping")).await);
    assert_eq!(manager.status(&id("cmds.notes")).await, None);

    // Renaming a directory moves every extension inside it.
    let admin = root.join("admin");
    std::fs::create_dir_all(&admin).unwrap();
    std::fs::write(admin.join("ban.ext"), "v1").unwrap();
    assert!(wait_for_status(&manager, "cmds.admin.ban", Some(ExtensionStatus::Loaded)).await);

    std::fs::rename(&admin, root.join("mod")).unwrap();
    assert!(wait_for_status(&manager, "cmds.mod.ban", Some(ExtensionStatus::Loaded)).await);
    assert!(wait_for_status(&manager, "cmds.admin.ban", None).await);
    assert!(!host.is_loaded(&id("cmds.admin.ban")).await);

    handle.shutdown().await.unwrap();
}
