use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fixture_package() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures/packages/my/first/1.1.3")
}

#[allow(deprecated)]
fn gren_cmd(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("gren").unwrap();
    cmd.env("GREN_HOME", home).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cache_add_stats_clean() {
    let home = TempDir::new().unwrap();

    gren_cmd(home.path())
        .args(["cache", "add"])
        .arg(fixture_package())
        .assert()
        .success()
        .stderr(predicate::str::contains("Cached"))
        .stderr(predicate::str::contains("my/first 1.1.3"));

    assert!(home
        .path()
        .join("packages/my/first/1.1.3/gren.json")
        .is_file());
    assert!(!home.path().join(".lock").exists());

    gren_cmd(home.path())
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Packages: 1"));

    gren_cmd(home.path())
        .args(["cache", "clean"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Cleaned"));

    gren_cmd(home.path())
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Packages: 0"));
}

#[test]
fn test_cache_add_while_locked_fails() {
    let home = TempDir::new().unwrap();
    fs::write(
        home.path().join("config.toml"),
        "[lock]\nretry-attempts = 1\nretry-interval-ms = 10\n",
    )
    .unwrap();
    // A freshly created marker belongs to a live holder.
    fs::create_dir(home.path().join(".lock")).unwrap();

    gren_cmd(home.path())
        .args(["cache", "add"])
        .arg(fixture_package())
        .assert()
        .failure()
        .stderr(predicate::str::contains("locked"));

    assert!(!home.path().join("packages").exists());
    assert!(home.path().join(".lock").is_dir());
}

#[cfg(unix)]
#[test]
fn test_cache_add_takes_over_stale_lock() {
    let home = TempDir::new().unwrap();
    let marker = home.path().join(".lock");
    fs::create_dir(&marker).unwrap();
    let past = std::time::SystemTime::now() - std::time::Duration::from_secs(30);
    fs::File::open(&marker)
        .unwrap()
        .set_times(fs::FileTimes::new().set_accessed(past).set_modified(past))
        .unwrap();

    gren_cmd(home.path())
        .args(["cache", "add"])
        .arg(fixture_package())
        .assert()
        .success();

    assert!(!marker.exists());
}

#[test]
fn test_cache_add_application_fails() {
    let home = TempDir::new().unwrap();
    let app = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures/app");

    gren_cmd(home.path())
        .args(["cache", "add"])
        .arg(app)
        .assert()
        .failure()
        .stderr(predicate::str::contains("application"));
}

#[test]
fn test_verbose_enables_debug_logging() {
    let home = TempDir::new().unwrap();

    gren_cmd(home.path())
        .args(["--verbose", "cache", "add"])
        .arg(fixture_package())
        .assert()
        .success()
        .stderr(predicate::str::contains("DEBUG"));
}
