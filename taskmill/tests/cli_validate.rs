//! End-to-end CLI tests over the compiled binary: `init` state creation and
//! clobber refusal, `validate` exit codes with and without installed schemas,
//! and the no-work `step` path. Everything runs inside a temp directory since
//! the CLI resolves its paths relative to the working directory.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use taskmill::exit_codes;

fn taskmill(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_taskmill"))
        .args(args)
        .current_dir(dir)
        .output()
        .expect("run taskmill")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn init_creates_state_then_refuses_to_clobber() {
    let temp = tempfile::tempdir().expect("tempdir");

    let first = taskmill(temp.path(), &["init"]);
    assert_eq!(first.status.code(), Some(exit_codes::OK));
    assert!(temp.path().join(".taskmill/config.toml").is_file());
    for schema in ["tasks.v1.schema.json", "summary.v1.schema.json"] {
        let path = temp.path().join(".taskmill/schemas").join(schema);
        let raw = fs::read_to_string(&path).expect("schema installed");
        serde_json::from_str::<serde_json::Value>(&raw).expect("schema is JSON");
    }

    let second = taskmill(temp.path(), &["init"]);
    assert_eq!(second.status.code(), Some(exit_codes::ERROR));
    assert!(stderr(&second).contains("already exists"));

    let forced = taskmill(temp.path(), &["init", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
}

#[test]
fn validate_passes_a_clean_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    assert_eq!(taskmill(temp.path(), &["init"]).status.code(), Some(exit_codes::OK));
    fs::write(
        temp.path().join("tasks.json"),
        concat!(
            r#"{"schema_version":1,"source_files":["README.md"],"tasks":["#,
            r#"{"id":"T1","title":"First","priority":3,"status":"todo"}"#,
            r#"]}"#,
        ),
    )
    .expect("write tasks");

    let output = taskmill(temp.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("tasks.json is valid"));
}

#[test]
fn validate_reports_schema_violations_with_paths() {
    let temp = tempfile::tempdir().expect("tempdir");
    assert_eq!(taskmill(temp.path(), &["init"]).status.code(), Some(exit_codes::OK));
    fs::write(
        temp.path().join("tasks.json"),
        concat!(
            r#"{"schema_version":1,"source_files":[],"tasks":["#,
            r#"{"id":"","title":"Broken","priority":9,"status":"todo"}"#,
            r#"]}"#,
        ),
    )
    .expect("write tasks");

    let output = taskmill(temp.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
    assert!(stderr(&output).contains("tasks[0]"), "stderr: {}", stderr(&output));
}

#[test]
fn validate_falls_back_to_minimal_rules_without_schemas() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("tasks.json"),
        concat!(
            r#"{"schema_version":1,"source_files":[],"tasks":["#,
            r#"{"id":"T1","title":"One","priority":1,"status":"todo"},"#,
            r#"{"id":"T1","title":"Two","priority":1,"status":"todo"}"#,
            r#"]}"#,
        ),
    )
    .expect("write tasks");

    let output = taskmill(temp.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
    assert!(stderr(&output).contains("duplicate id"), "stderr: {}", stderr(&output));
}

#[test]
fn validate_errors_when_the_file_is_missing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = taskmill(temp.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
    assert!(stderr(&output).contains("tasks.json"));
}

#[test]
fn step_reports_no_todo_tasks() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("tasks.json"),
        concat!(
            r#"{"schema_version":1,"source_files":[],"tasks":["#,
            r#"{"id":"T1","title":"Finished","priority":1,"status":"done"}"#,
            r#"]}"#,
        ),
    )
    .expect("write tasks");

    let output = taskmill(temp.path(), &["step"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("no todo tasks"));
}
