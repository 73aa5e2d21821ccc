use {
    std::{fs, path::Path, process::{Command, Output}},
    visitor_counter::config::{CONFIG_PATH_ENV, ERROR_POLICY_ENV, LISTEN_ENV, LOG_LEVEL_ENV, TABLE_ENV},
};

fn run_invoke(config_path: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_visitor-counter"))
        .arg("--config")
        .arg(config_path)
        .arg("invoke")
        .env_remove(CONFIG_PATH_ENV)
        .env_remove(ERROR_POLICY_ENV)
        .env_remove(LISTEN_ENV)
        .env_remove(LOG_LEVEL_ENV)
        .env_remove(TABLE_ENV)
        .output()
        .unwrap()
}

#[test]
fn invoke_prints_envelope_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, "store:\n  in_memory: true\n  path: null\n").unwrap();

    let output = run_invoke(&config_path);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let envelope: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope["statusCode"], 200);
    assert_eq!(envelope["headers"]["access-control-allow-origin"], "*");
    assert_eq!(envelope["headers"]["access-control-allow-methods"], "GET");
    let body: serde_json::Value = serde_json::from_str(envelope["body"].as_str().unwrap()).unwrap();
    assert_eq!(body, serde_json::json!({ "count": 1 }));
}

#[test]
fn invoke_counts_across_runs_with_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    let db_path = dir.path().join("counter.sqlite");
    fs::write(&config_path, format!("store:\n  path: {}\n", db_path.display())).unwrap();

    for expected in 1..=3 {
        let output = run_invoke(&config_path);
        assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
        let envelope: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(envelope["body"], format!(r#"{{"count":{expected}}}"#));
    }
}

#[test]
fn unguarded_invoke_exits_with_failure_when_store_is_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, "\
error_policy: unguarded
store:
  driver: redis
  url: redis://127.0.0.1:1/
  connect_timeout_ms: 200
").unwrap();

    let output = run_invoke(&config_path);
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty(), "stdout: {}", String::from_utf8_lossy(&output.stdout));
}

#[test]
fn guarded_invoke_prints_error_envelope_when_store_is_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, "\
store:
  driver: redis
  url: redis://127.0.0.1:1/
  connect_timeout_ms: 200
").unwrap();

    let output = run_invoke(&config_path);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let envelope: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope["statusCode"], 500);
    assert_eq!(envelope["headers"]["access-control-allow-origin"], "*");
}
