//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn cli_without_arguments_prints_usage() {
    let mut cmd = cargo_bin_cmd!("imago");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn cli_help_lists_the_provision_subcommand() {
    let mut cmd = cargo_bin_cmd!("imago");
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("provision"));
}
