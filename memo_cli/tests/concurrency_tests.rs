//! Concurrency tests for the memo binary.
//!
//! These tests verify that multiple processes can safely:
//! - Add cards to the same store simultaneously (file locking)
//! - Append to the study log simultaneously

use assert_cmd::Command;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("memo"))
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_concurrent_adds_lose_nothing() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let data_dir = data_dir.clone();
            thread::spawn(move || {
                let front = format!("word {}", i);
                cli()
                    .arg("add")
                    .arg("--data-dir")
                    .arg(&data_dir)
                    .args(["--deck", "english"])
                    .arg("--front")
                    .arg(&front)
                    .args(["--back", "meaning"])
                    .timeout(Duration::from_secs(10))
                    .assert()
                    .success();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let contents =
        std::fs::read_to_string(data_dir.join("cards.json")).expect("Failed to read cards");
    let doc: serde_json::Value = serde_json::from_str(&contents).expect("cards.json is valid JSON");
    assert_eq!(doc["cards"].as_object().unwrap().len(), 8);
}

#[test]
fn test_no_study_log_corruption_under_load() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let data_dir = data_dir.clone();
            thread::spawn(move || {
                // Small stagger to reduce thundering herd
                thread::sleep(Duration::from_millis(i * 5));
                cli()
                    .arg("review")
                    .arg("--data-dir")
                    .arg(&data_dir)
                    .arg("--grades")
                    .arg("4")
                    .timeout(Duration::from_secs(10))
                    .assert()
                    .success();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let log =
        std::fs::read_to_string(data_dir.join("study_log.jsonl")).expect("Failed to read log");

    let mut valid_count = 0;
    for line in log.lines() {
        if line.is_empty() {
            continue;
        }
        let parsed: Result<serde_json::Value, _> = serde_json::from_str(line);
        assert!(parsed.is_ok(), "Study log contains invalid JSON line: {}", line);
        valid_count += 1;
    }

    assert_eq!(valid_count, 10, "Expected 10 valid entries in study log");
}
