use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn quick_config() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create config file");
    writeln!(
        file,
        "workers = 2\niterations = 3\nmin_delay_us = 0\nmax_delay_us = 100\nseed = 5\n\
         completion_timeout_ms = 2000\nshutdown_timeout_ms = 500"
    )
    .expect("Failed to write config file");
    file
}

fn tally() -> Command {
    Command::cargo_bin("tally").unwrap()
}

#[test]
fn test_default_mode_runs_both_pools() {
    let config = quick_config();

    tally()
        .arg("--config")
        .arg(config.path())
        .args(["--trace", "off"])
        .assert()
        .success()
        .stdout(predicate::str::contains("naive ends free=0"))
        .stdout(predicate::str::contains("lock cleared free=5"))
        .stdout(predicate::str::contains("wait ends free="))
        .stdout(predicate::str::contains("monitor ends free="))
        .stdout(predicate::str::contains("Done."));
}

#[test]
fn test_waiting_mode_skips_monitor() {
    let config = quick_config();

    tally()
        .arg("waiting")
        .arg("--config")
        .arg(config.path())
        .args(["--trace", "off"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wait ends free="))
        .stdout(predicate::str::contains("monitor ends free=").not());
}

#[test]
fn test_flags_override_config() {
    let config = quick_config();

    // Mismatched releases can still drain the pool, so only the shape of the
    // run is checked, not that every iteration completed
    tally()
        .arg("monitor")
        .arg("--config")
        .arg(config.path())
        .args(["--workers", "3", "--iterations", "2", "--seed", "11"])
        .args(["--min-delay-us", "0", "--max-delay-us", "50"])
        .args(["--trace", "off"])
        .assert()
        .success()
        .stdout(predicate::str::contains("monitor ends free="))
        .stdout(predicate::str::contains("3 workers,"))
        .stdout(predicate::str::contains("wait ends free=").not());
}

#[test]
fn test_small_capacity_shrinks_request_range() {
    let config = quick_config();

    tally()
        .arg("--config")
        .arg(config.path())
        .args(["--capacity", "2", "--trace", "off"])
        .assert()
        .success()
        .stdout(predicate::str::contains("naive not enough for 3"))
        .stdout(predicate::str::contains("lock cleared free=2"))
        .stdout(predicate::str::contains("monitor ends free="));
}

#[test]
fn test_request_range_flags() {
    let config = quick_config();

    tally()
        .arg("waiting")
        .arg("--config")
        .arg(config.path())
        .args(["--capacity", "4", "--min-request", "2", "--max-request", "4"])
        .args(["--trace", "off"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wait ends free="));

    tally()
        .arg("--config")
        .arg(config.path())
        .args(["--capacity", "2", "--max-request", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_request 3 exceeds capacity 2"));
}

#[test]
fn test_json_trace_on_stdout() {
    let config = quick_config();

    tally()
        .arg("monitor")
        .arg("--config")
        .arg(config.path())
        .args(["--trace", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"operation\":\"acquire\""))
        .stdout(predicate::str::contains("\"pool\":\"monitor\""));
}

#[test]
fn test_unknown_mode_runs_both_pools() {
    let config = quick_config();

    tally()
        .arg("fastest")
        .arg("--config")
        .arg(config.path())
        .args(["--trace", "off"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wait ends free="))
        .stdout(predicate::str::contains("monitor ends free="))
        .stderr(predicate::str::contains("unknown mode 'fastest'"));
}

#[test]
fn test_invalid_config_fails() {
    let mut file = NamedTempFile::new().expect("Failed to create config file");
    writeln!(file, "workers = 0").expect("Failed to write config file");

    tally()
        .arg("--config")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("workers must be at least 1"));
}

#[test]
fn test_missing_config_fails() {
    tally()
        .args(["--config", "/nonexistent/tally.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading /nonexistent/tally.toml"));
}
