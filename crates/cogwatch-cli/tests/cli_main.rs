//! Basic CLI tests for the cogwatch command-line interface.

use assert_cmd::Command;
use predicates::prelude::*;

fn cogwatch() -> Command {
    let mut cmd = Command::cargo_bin("cogwatch").unwrap();
    // Keep the developer's environment out of the tests.
    for var in [
        "COGWATCH_ROOT",
        "COGWATCH_BASE_DIR",
        "COGWATCH_DEBUG",
        "COGWATCH_PRELOAD",
        "COGWATCH_FILE_EXTENSION",
        "COGWATCH_DEBOUNCE_MS",
        "COGWATCH_LOG",
        "COGWATCH_LOG_JSON",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Test that the CLI binary exists and shows help.
#[test]
fn test_cli_help() {
    let mut cmd = cogwatch();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Hot-reload lifecycle manager"))
        .stdout(predicate::str::contains("resolve"))
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("watch"));
}

/// Test that the CLI shows version information.
#[test]
fn test_cli_version() {
    let mut cmd = cogwatch();
    cmd.arg("--version");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("cogwatch"));
}

/// Test that providing no subcommand shows an error.
#[test]
fn test_no_subcommand_shows_error() {
    let mut cmd = cogwatch();

    // Clap's error code for a missing required subcommand
    cmd.assert().failure().code(2);
}

#[test]
fn test_resolve_nested_path() {
    let mut cmd = cogwatch();
    cmd.args(["--root", "cogs", "resolve", "project/cogs/sub/extA.ext"]);

    cmd.assert()
        .success()
        .stdout(predicate::eq("cogs.sub.extA\n"));
}

#[test]
fn test_resolve_uses_first_root_component() {
    let mut cmd = cogwatch();
    cmd.args(["--root", "bot/cogs", "resolve", "srv/bot/cogs/ping.rs"]);

    cmd.assert()
        .success()
        .stdout(predicate::eq("bot.cogs.ping\n"));
}

#[test]
fn test_resolve_path_outside_root_fails() {
    let mut cmd = cogwatch();
    cmd.args(["--root", "cogs", "resolve", "project/commands/ping.rs"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_backslash_root_is_rejected() {
    let mut cmd = cogwatch();
    cmd.args(["--root", "bot\\cogs", "resolve", "bot/cogs/ping.rs"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("forward slashes"));
}

#[test]
fn test_scan_lists_extensions() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("cogs");
    std::fs::create_dir_all(root.join("admin")).unwrap();
    std::fs::write(root.join("ping.rs"), "").unwrap();
    std::fs::write(root.join("admin/ban.rs"), "").unwrap();
    std::fs::write(root.join("README.md"), "").unwrap();

    let mut cmd = cogwatch();
    cmd.args(["--root", "cogs", "scan"]).arg("--dir").arg(dir.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("cogs.admin.ban"))
        .stdout(predicate::str::contains("cogs.ping"))
        .stdout(predicate::str::contains("README").not());
}

#[test]
fn test_scan_json() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("cmds");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("ping.ext"), "").unwrap();

    let mut cmd = cogwatch();
    cmd.args(["--root", "cmds", "--ext", "ext", "scan", "--json"])
        .arg("--dir")
        .arg(dir.path());

    let output = cmd.assert().success().get_output().stdout.clone();
    let entries: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(entries[0]["id"], "cmds.ping");
}

#[test]
fn test_scan_missing_root_fails() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = cogwatch();
    cmd.args(["--root", "cogs", "scan"]).arg("--dir").arg(dir.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Watched root not found"));
}

#[test]
fn test_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("cogwatch.toml");
    std::fs::write(&config, "root = \"plugins\"\n").unwrap();

    let mut cmd = cogwatch();
    cmd.arg("--config")
        .arg(&config)
        .args(["resolve", "app/plugins/ping.rs"]);

    cmd.assert()
        .success()
        .stdout(predicate::eq("plugins.ping\n"));
}
