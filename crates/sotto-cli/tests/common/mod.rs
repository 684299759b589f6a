//! Shared E2E helpers for `sotto` binary tests.

use assert_cmd::cargo::cargo_bin_cmd;
use std::time::Duration;

/// Generous ceiling; the demo scripts settle in well under a second.
pub const TIMEOUT: Duration = Duration::from_secs(20);

/// Build a Command for the `sotto` binary with a clean environment.
pub fn sotto_cmd() -> assert_cmd::Command {
    let mut cmd: assert_cmd::Command = cargo_bin_cmd!("sotto");
    cmd.timeout(TIMEOUT);
    cmd.env_remove("SOTTO_GRACE_SECS");
    cmd.env_remove("RUST_LOG");
    cmd
}
