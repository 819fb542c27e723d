use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn concierge_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("concierge");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_content = format!(
        r#"[routing]
index_dir = "{}/indexes"

[calendars]
appraisal = "cal-appraisal-test"

[logging]
level = "warn"
"#,
        root.display()
    );
    let config_path = root.join("concierge.toml");
    fs::write(&config_path, config_content).unwrap();

    fs::write(
        root.join("chat.json"),
        r#"[
  {"role": "user", "text": "Hi, I'm Jane Doe and I'd like an appraisal for my grandmother's ring"},
  {"role": "assistant", "text": "Lovely! How can our team reach you?"},
  {"role": "user", "text": "you can reach me at jane@example.com or 314-555-0199"}
]"#,
    )
    .unwrap();
    fs::write(
        root.join("no_contact.txt"),
        "I want to book a custom design consultation\nsometime next week\n",
    )
    .unwrap();

    (tmp, config_path)
}

fn run_concierge(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = concierge_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run concierge binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn run_json(config_path: &Path, args: &[&str]) -> Value {
    let (stdout, stderr, success) = run_concierge(config_path, args);
    assert!(success, "concierge {:?} failed: {}", args, stderr);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({}): {}", e, stdout))
}

#[test]
fn test_route_pattern_fallback_without_index() {
    let (_tmp, config) = setup_test_env();
    let result = run_json(&config, &["route", "how much does a lab grown diamond cost?"]);
    assert_eq!(result["source"], "pattern");
    assert_eq!(result["category"], "products");
    assert!(result["url"].as_str().unwrap().ends_with("/diamonds"));
    assert!(result.get("confidence").is_none());
}

#[test]
fn test_route_no_match() {
    let (_tmp, config) = setup_test_env();
    let result = run_json(&config, &["route", "tell me a joke"]);
    assert_eq!(result["source"], "none");
    assert!(result["url"].is_null());
}

#[test]
fn test_route_deterministic() {
    let (_tmp, config) = setup_test_env();
    let a = run_json(&config, &["route", "can you polish my bracelet"]);
    let b = run_json(&config, &["route", "can you polish my bracelet"]);
    assert_eq!(a, b);
}

#[test]
fn test_calendar_priority_and_configured_id() {
    let (_tmp, config) = setup_test_env();
    let result = run_json(
        &config,
        &["calendar", "what would my custom design ring be worth?"],
    );
    assert_eq!(result["calendar"], "appraisal");
    assert_eq!(result["calendar_id"], "cal-appraisal-test");

    let default = run_json(&config, &["calendar", "just browsing"]);
    assert_eq!(default["calendar"], "demo");
}

#[test]
fn test_extract_from_transcript() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("chat.json");
    let contact = run_json(&config, &["extract", "--file", file.to_str().unwrap()]);
    assert_eq!(contact["name"], "Jane Doe");
    assert_eq!(contact["email"], "jane@example.com");
    assert_eq!(contact["phone"], "3145550199");
    assert!(contact["summary"].as_str().unwrap().contains("appraisal"));
}

#[test]
fn test_schedule_offline_degrades() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("chat.json");
    let outcome = run_json(&config, &["schedule", "--file", file.to_str().unwrap()]);
    assert_eq!(outcome["outcome"], "degraded");
    assert_eq!(outcome["status"], "gateway_unavailable");
    assert!(!outcome["message"].as_str().unwrap().is_empty());
}

#[test]
fn test_schedule_without_contact_is_invalid() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("no_contact.txt");
    let outcome = run_json(&config, &["schedule", "--file", file.to_str().unwrap()]);
    assert_eq!(outcome["status"], "invalid_contact");
}

#[test]
fn test_schedule_contact_override() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("no_contact.txt");
    let outcome = run_json(
        &config,
        &[
            "schedule",
            "--file",
            file.to_str().unwrap(),
            "--phone",
            "(555) 123-4567",
            "--start",
            "2025-03-04T14:00:00-06:00",
        ],
    );
    // Contact is now valid; the unconfigured gateway is what stops it.
    assert_eq!(outcome["status"], "gateway_unavailable");
}

#[test]
fn test_tools_list_and_unknown_call() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_concierge(&config, &["tools", "list"]);
    assert!(success);
    assert_eq!(stdout.lines().count(), 9);
    assert!(stdout.contains("create_contact_add_notes_schedule_appointment"));

    let (_, stderr, success) = run_concierge(&config, &["tools", "call", "drop_tables"]);
    assert!(!success);
    assert!(stderr.contains("unsupported gateway tool"));
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "[routing]\nconfidence_threshold = 2.0\n").unwrap();
    let (_, _, success) = run_concierge(&config, &["calendar", "hello"]);
    assert!(!success);
}

#[test]
fn test_missing_config_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("absent.toml");
    let (stdout, stderr, success) = run_concierge(&missing, &["route", "do you resize rings?"]);
    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("Failed to read config file"));

    // No --config and no ./config/concierge.toml in the working directory.
    let output = Command::new(concierge_binary())
        .args(["route", "do you resize rings?"])
        .current_dir(tmp.path())
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("config/concierge.toml"));
}
