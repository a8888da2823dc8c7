use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_describes_the_tunnel() {
    Command::cargo_bin("hopbox")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("jump host"))
        .stdout(predicate::str::contains("--vm-ip"));
}

#[test]
fn version_prints_the_package_version() {
    Command::cargo_bin("hopbox")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn rejects_a_malformed_target_address() {
    Command::cargo_bin("hopbox")
        .unwrap()
        .args(["--vm-ip", "not-an-address"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
