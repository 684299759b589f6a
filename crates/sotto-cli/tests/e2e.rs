//! E2E tests for the `sotto` binary.
//!
//! Each test runs one demo script as a real subprocess and asserts on
//! the lines the demo peers print.

mod common;

use std::io::Write;

use common::sotto_cmd;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

#[test]
fn happy_script_delivers_a_transcript() {
    sotto_cmd()
        .args(["demo", "--script", "happy"])
        .assert()
        .success()
        .stdout(contains("started toward ctx1"))
        .stdout(contains("[ctx1] preparing session"))
        .stdout(contains("[ctx1] loading"))
        .stdout(contains("[ctx1] active"))
        .stdout(contains("[ctx1] processing"))
        .stdout(contains("[ctx1] done: transcript of audio from mic-0"))
        .stdout(contains("all sessions settled"));
}

#[test]
fn supersede_script_switches_targets_silently() {
    sotto_cmd()
        .args(["demo", "--script", "supersede"])
        .assert()
        .success()
        .stdout(contains("superseding: ctx2 queued behind ctx1"))
        .stdout(contains("[ctx2] done: transcript of"))
        .stdout(contains("[ctx1] done:").not())
        .stdout(contains("[ctx1] error").not())
        // The queued session reuses the warm device.
        .stdout(contains("mic-1").not());
}

#[test]
fn finish_script_cuts_the_capture_short() {
    sotto_cmd()
        .args(["demo", "--script", "finish"])
        .assert()
        .success()
        .stdout(contains("finishing early"))
        .stdout(contains("[ctx1] done: transcript of audio from mic-0"));
}

#[test]
fn refused_script_reports_the_peer_error() {
    sotto_cmd()
        .args(["demo", "--script", "refused"])
        .assert()
        .success()
        .stdout(contains(
            "[void] error: NoTargetError: no valid destination selected",
        ))
        .stdout(contains("[void] done:").not());
}

#[test]
fn relaunch_script_revives_a_dead_target() {
    sotto_cmd()
        .args(["demo", "--script", "relaunch"])
        .assert()
        .success()
        .stdout(contains("(launcher) relaunching ctx3"))
        .stdout(contains("[ctx3] preparing session"))
        .stdout(contains("[ctx3] done: transcript of audio from mic-0"))
        .stdout(contains("all sessions settled"));
}

#[test]
fn version_prints_the_binary_name() {
    sotto_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains("sotto"));
}

#[test]
fn a_missing_config_file_fails_loudly() {
    sotto_cmd()
        .args(["--config", "definitely-not-here.toml", "demo"])
        .assert()
        .failure()
        .stderr(contains("definitely-not-here.toml"));
}

#[test]
fn config_file_and_flag_are_accepted() {
    let mut file = tempfile::NamedTempFile::new().expect("temp config");
    writeln!(file, "keep_alive_grace_secs = 1").expect("write config");

    sotto_cmd()
        .args(["--verbose", "--config"])
        .arg(file.path())
        .args(["--grace-secs", "2", "demo", "--script", "happy"])
        .assert()
        .success()
        .stdout(contains("all sessions settled"));
}

#[test]
fn a_malformed_grace_env_var_is_rejected() {
    sotto_cmd()
        .env("SOTTO_GRACE_SECS", "soon")
        .args(["demo", "--script", "happy"])
        .assert()
        .failure()
        .stderr(contains("SOTTO_GRACE_SECS"));
}
