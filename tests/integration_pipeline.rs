//! End-to-end tests driving the built `photo-archivist` binary against a
//! real filesystem tree. The sandbox this test suite runs in has no
//! `exiftool` binary, so every group's capture time resolves to `None`
//! and lands in the "unrecognized" quarantine -- that path is exercised
//! thoroughly here. `build-index` needs no capture time at all, so it's
//! the vehicle for exercising the duplicate-detection and placement
//! machinery end-to-end.

use assert_fs::fixture::{FileWriteStr, PathChild};
use assert_fs::TempDir;
use predicates::prelude::*;
use std::process::Command;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_photo-archivist"))
}

#[test]
fn init_writes_config_and_archive_layout() {
    let root = TempDir::new().unwrap();
    let source = root.child("source");
    let dest = root.child("dest");
    source.create_dir_all().unwrap();
    let config_path = root.child("photox.toml");

    let status = bin()
        .current_dir(root.path())
        .args([
            "init",
            "--source",
            source.path().to_str().unwrap(),
            "--dest",
            dest.path().to_str().unwrap(),
            "--config",
            config_path.path().to_str().unwrap(),
        ])
        .status()
        .unwrap();

    assert!(status.success());
    config_path.assert(predicate::path::exists());
    dest.child(".photox").assert(predicate::path::is_dir());
    dest.child(".photox/quarantine/duplicates")
        .assert(predicate::path::is_dir());
    dest.child(".photox/quarantine/unrecognized")
        .assert(predicate::path::is_dir());
}

#[test]
fn run_without_resolvable_capture_time_quarantines_as_unrecognized() {
    let root = TempDir::new().unwrap();
    let source = root.child("source");
    let dest = root.child("dest");
    source.create_dir_all().unwrap();
    dest.create_dir_all().unwrap();
    source.child("IMG_0001.JPG").write_str("not a real jpeg").unwrap();

    let status = bin()
        .current_dir(root.path())
        .args([
            "run",
            "--source",
            source.path().to_str().unwrap(),
            "--dest",
            dest.path().to_str().unwrap(),
        ])
        .status()
        .unwrap();

    assert!(status.success());
    dest.child(".photox/quarantine/unrecognized/IMG_0001.JPG")
        .assert(predicate::path::exists());
    source.child("IMG_0001.JPG").assert(predicate::path::missing());
}

#[test]
fn run_dry_run_leaves_source_and_archive_untouched() {
    let root = TempDir::new().unwrap();
    let source = root.child("source");
    let dest = root.child("dest");
    source.create_dir_all().unwrap();
    dest.create_dir_all().unwrap();
    source.child("IMG_0002.JPG").write_str("not a real jpeg").unwrap();

    let status = bin()
        .current_dir(root.path())
        .args([
            "run",
            "--source",
            source.path().to_str().unwrap(),
            "--dest",
            dest.path().to_str().unwrap(),
            "--dry-run",
        ])
        .status()
        .unwrap();

    assert!(status.success());
    source.child("IMG_0002.JPG").assert(predicate::path::exists());
    dest.child(".photox/quarantine/unrecognized/IMG_0002.JPG")
        .assert(predicate::path::missing());
}

#[test]
fn build_index_quarantines_within_archive_duplicate() {
    let root = TempDir::new().unwrap();
    let source = root.child("source");
    let dest = root.child("dest");
    source.create_dir_all().unwrap();
    dest.child("2024/03").create_dir_all().unwrap();
    dest.child("2024/04").create_dir_all().unwrap();
    dest.child("2024/03/a.jpg").write_str("identical bytes").unwrap();
    dest.child("2024/04/b.jpg").write_str("identical bytes").unwrap();

    let status = bin()
        .current_dir(root.path())
        .args([
            "build-index",
            "--dest",
            dest.path().to_str().unwrap(),
            "--config",
            root.child("photox.toml").path().to_str().unwrap(),
        ])
        .status();

    // build-index needs a source configured even though it never reads it;
    // without a prior `init` run, resolution fails with a config error.
    assert!(status.is_err() || !status.unwrap().success());

    // Re-run after establishing a config via init, which does carry a source.
    let init_status = bin()
        .current_dir(root.path())
        .args([
            "init",
            "--source",
            source.path().to_str().unwrap(),
            "--dest",
            dest.path().to_str().unwrap(),
        ])
        .status()
        .unwrap();
    assert!(init_status.success());

    let status = bin()
        .current_dir(root.path())
        .args(["build-index"])
        .status()
        .unwrap();

    assert!(status.success());
    dest.child("2024/03/a.jpg").assert(predicate::path::exists());
    dest.child("2024/04/b.jpg").assert(predicate::path::missing());
    dest.child(".photox/quarantine/duplicates/2024/04/b.jpg")
        .assert(predicate::path::exists());
}

#[test]
fn status_reports_last_run_after_one_completes() {
    let root = TempDir::new().unwrap();
    let source = root.child("source");
    let dest = root.child("dest");
    source.create_dir_all().unwrap();
    dest.create_dir_all().unwrap();
    source.child("IMG_0003.JPG").write_str("not a real jpeg").unwrap();

    bin()
        .current_dir(root.path())
        .args([
            "init",
            "--source",
            source.path().to_str().unwrap(),
            "--dest",
            dest.path().to_str().unwrap(),
        ])
        .status()
        .unwrap();

    bin().current_dir(root.path()).args(["run"]).status().unwrap();

    let output = bin().current_dir(root.path()).args(["status"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Last run"));
}
