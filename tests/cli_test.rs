use assert_cmd::cargo;
use predicates::prelude::*;

#[tokio::test]
async fn test_cli_help() {
    let mut cmd = cargo::cargo_bin_cmd!("aeocheck");
    let assert = cmd.arg("--help").assert();

    // On Windows, the binary name in help might be "aeocheck.exe"
    let expected_pattern = if cfg!(windows) {
        "aeocheck.exe [OPTIONS] <URL>"
    } else {
        "aeocheck [OPTIONS] <URL>"
    };

    assert
        .success()
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains(expected_pattern))
        .stdout(predicate::str::contains("--redacted"));
}

#[test]
fn test_cli_requires_url() {
    let mut cmd = cargo::cargo_bin_cmd!("aeocheck");
    cmd.assert().failure().stderr(predicate::str::contains("<URL>"));
}

#[test]
fn test_invalid_url_fails_with_user_message() {
    let mut cmd = cargo::cargo_bin_cmd!("aeocheck");
    cmd.args(["not a valid url", "--no-progress"])
        .env_remove("RUST_LOG")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("The URL you entered is not valid"))
        .stderr(predicate::str::contains("invalid URL"));
}
