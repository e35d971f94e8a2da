use std::fs::File;
use std::io::{self, BufReader};
use std::process::{Command, Stdio};

use assert_cmd::cargo::CommandCargoExt;
use pretty_assertions::assert_eq;

const INPUT_FILE: &str = "./tests/data/calltree/example.folded";

const EXPECTED: &str = "\
main 6 (— self, 100.0%)
  run 4 (— self, 66.7%)
    render 3 (3 self, 50.0%)
    io_wait 1 (1 self, 16.7%)
  idle 2 (2 self, 33.3%)
";

fn stdout_of(args: &[&str]) -> String {
    let output = Command::cargo_bin("smolder-calltree")
        .unwrap()
        .args(args)
        .arg(INPUT_FILE)
        .output()
        .expect("failed to execute process");
    assert!(output.status.success());
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn prints_the_call_tree_of_a_file() {
    assert_eq!(stdout_of(&[]), EXPECTED);
}

#[test]
fn reads_from_stdin_when_no_file_is_given() {
    let mut child = Command::cargo_bin("smolder-calltree")
        .unwrap()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("failed to spawn child process");
    let mut input = BufReader::new(File::open(INPUT_FILE).unwrap());
    let stdin = child.stdin.as_mut().expect("failed to open stdin");
    io::copy(&mut input, stdin).unwrap();
    let output = child.wait_with_output().expect("failed to read stdout");
    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), EXPECTED);
}

#[test]
fn depth_limits_the_printed_rows() {
    assert_eq!(
        stdout_of(&["--depth", "1"]),
        "\
main 6 (— self, 100.0%)
  run 4 (— self, 66.7%)
  idle 2 (2 self, 33.3%)
"
    );
}

#[test]
fn transforms_apply_before_printing() {
    // func 1 is `run`; merging it reattaches its children to main
    assert_eq!(
        stdout_of(&["--transforms", "mf-1"]),
        "\
main 6 (— self, 100.0%)
  render 3 (3 self, 50.0%)
  idle 2 (2 self, 33.3%)
  io_wait 1 (1 self, 16.7%)
"
    );
}

#[test]
fn search_keeps_only_matching_samples() {
    assert_eq!(
        stdout_of(&["--search", "render"]),
        "\
main 3 (— self, 100.0%)
  run 3 (— self, 100.0%)
    render 3 (3 self, 100.0%)
"
    );
}

#[test]
fn reverse_inverts_the_stacks() {
    assert_eq!(
        stdout_of(&["--reverse", "--search", "render"]),
        "\
render 3 (3 self, 100.0%)
  run 3 (— self, 100.0%)
    main 3 (— self, 100.0%)
"
    );
}
