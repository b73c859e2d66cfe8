use serde_json::Value;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn run_cli(args: &[&str], cwd: &Path) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_weft"))
        .args(args)
        .current_dir(cwd)
        .env_remove("OPENAI_API_KEY")
        .env_remove("OPENAI_BASE_URL")
        .output()
        .expect("cli process should start")
}

fn assert_success(output: &std::process::Output) {
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn tools_json_lists_the_full_catalog() {
    let temp = TempDir::new().expect("tempdir should create");
    let output = run_cli(&["tools", "--json"], temp.path());
    assert_success(&output);

    let value: Value = serde_json::from_slice(&output.stdout).expect("json output should parse");
    let names: Vec<&str> = value
        .as_array()
        .expect("catalog should be an array")
        .iter()
        .filter_map(|tool| tool.get("name").and_then(Value::as_str))
        .collect();
    assert_eq!(names.len(), 17);
    for expected in ["create_file", "patch_file", "delete_file", "run_command", "analyze_project"] {
        assert!(names.contains(&expected), "missing {expected}");
    }
}

#[test]
fn analyze_reports_manifests_and_dependencies() {
    let temp = TempDir::new().expect("tempdir should create");
    std::fs::write(
        temp.path().join("package.json"),
        r#"{"dependencies": {"react": "^18"}, "devDependencies": {"vitest": "^1"}}"#,
    )
    .expect("package.json write should succeed");
    std::fs::create_dir(temp.path().join("node_modules")).expect("node_modules should create");
    std::fs::write(temp.path().join("node_modules/ignored.js"), "x")
        .expect("ignored file write should succeed");

    let dir = temp.path().to_str().expect("temp path should be utf8");
    let output = run_cli(&["analyze", "--dir", dir], temp.path());
    assert_success(&output);

    let value: Value = serde_json::from_slice(&output.stdout).expect("json output should parse");
    assert_eq!(value["has_package_json"], true);
    assert_eq!(value["has_cargo_toml"], false);
    assert_eq!(value["dependencies"], serde_json::json!(["react", "vitest"]));
    assert_eq!(value["file_count"], 1);
}

#[test]
fn run_without_backend_credentials_fails_cleanly() {
    let temp = TempDir::new().expect("tempdir should create");
    let dir = temp.path().to_str().expect("temp path should be utf8");
    let output = run_cli(
        &["run", "--goal", "add a readme", "--dir", dir, "--finish", "reject"],
        temp.path(),
    );

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no reasoning backend configured"), "stderr:\n{stderr}");
}

#[test]
fn run_rejects_a_missing_explicit_config() {
    let temp = TempDir::new().expect("tempdir should create");
    let dir = temp.path().to_str().expect("temp path should be utf8");
    let output = run_cli(
        &["run", "--goal", "noop", "--dir", dir, "--config", "absent.toml"],
        temp.path(),
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("absent.toml"));
}
