use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

#[test]
fn help_describes_the_server() {
    Command::cargo_bin("mandelserver")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--passes"));
}

#[test]
fn pass_count_out_of_range_is_refused() {
    Command::cargo_bin("mandelserver")
        .unwrap()
        .args(&["--passes", "9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Pass count must be between 1 and 8"));
}

#[test]
fn unparseable_pass_count_is_refused() {
    Command::cargo_bin("mandelserver")
        .unwrap()
        .args(&["-p", "many"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not parse pass count"));
}

#[test]
fn missing_config_file_exits_with_one() {
    Command::cargo_bin("mandelserver")
        .unwrap()
        .args(&["--config", "/nonexistent/mandelserver.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration failure"));
}

#[test]
fn bad_config_file_exits_with_one() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{{\"listening_ip\": \"not an address\"}}").unwrap();
    Command::cargo_bin("mandelserver")
        .unwrap()
        .arg("-c")
        .arg(file.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Could not parse listening address"));
}

#[test]
fn bad_address_flag_exits_with_one() {
    Command::cargo_bin("mandelserver")
        .unwrap()
        .args(&["--address", "300.1.1.1"])
        .assert()
        .code(1);
}
