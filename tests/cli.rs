use std::fs;
use std::path::{Path, PathBuf};

use axum::http::{Method, StatusCode, Uri};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;

fn xflow_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("xflow");
    path
}

/// Minimal extraction service: every retrieve yields one concept, and any
/// prompt containing FAIL is rejected.
async fn handle(method: Method, uri: Uri, body: String) -> (StatusCode, String) {
    let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    match uri.path() {
        "/input_data" => (StatusCode::OK, json!({ "status": "ok" }).to_string()),
        "/apply_prompt" => {
            if parsed["prompt_string"].as_str().unwrap_or_default().contains("FAIL") {
                (StatusCode::BAD_GATEWAY, "upstream model error".to_string())
            } else {
                (StatusCode::OK, json!({ "status": "ok" }).to_string())
            }
        }
        "/return_data" => match parsed["return_type"].as_str() {
            Some("raw_text") => (
                StatusCode::OK,
                json!({ "value": format!("raw:{}", parsed["object_name"].as_str().unwrap_or("")) })
                    .to_string(),
            ),
            Some("pretty_html") => (
                StatusCode::OK,
                json!({ "value": "<h1>Summary</h1>" }).to_string(),
            ),
            _ => (
                StatusCode::OK,
                json!({ "value": r#"[{"concept":"overtime, unpaid"}]"# }).to_string(),
            ),
        },
        path if method == Method::DELETE && path == "/objects/stuck" => {
            (StatusCode::INTERNAL_SERVER_ERROR, "locked".to_string())
        }
        path if method == Method::DELETE && path.starts_with("/objects/") => {
            (StatusCode::OK, String::new())
        }
        _ => (StatusCode::NOT_FOUND, String::new()),
    }
}

async fn spawn_service() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, Router::new().fallback(handle))
            .await
            .unwrap();
    });
    format!("http://{}", addr)
}

fn setup_files() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("A.txt"), "The employer withheld overtime pay.").unwrap();
    fs::write(tmp.path().join("B.txt"), "Nothing of legal interest.").unwrap();
    tmp
}

async fn run_xflow(config: &Path, args: &[&str]) -> (String, String, bool) {
    let (stdout, stderr, code) = run_xflow_with_code(config, args).await;
    (stdout, stderr, code == Some(0))
}

async fn run_xflow_with_code(config: &Path, args: &[&str]) -> (String, String, Option<i32>) {
    let binary = xflow_binary();
    let output = tokio::process::Command::new(&binary)
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .await
        .unwrap_or_else(|e| panic!("Failed to run xflow binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.code())
}

#[tokio::test]
async fn test_suggestions_need_no_config() {
    let tmp = TempDir::new().unwrap();
    let (stdout, stderr, success) =
        run_xflow(&tmp.path().join("absent.toml"), &["suggestions"]).await;
    assert!(success, "suggestions failed: {}", stderr);
    assert_eq!(stdout.lines().count(), 5);
    assert!(stdout.starts_with("1. Summarize the key legal arguments"));
}

#[tokio::test]
async fn test_missing_config_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, code) = run_xflow_with_code(
        &tmp.path().join("absent.toml"),
        &["extract", "whatever.txt"],
    )
    .await;
    assert_eq!(code, Some(1));
    assert!(stderr.contains("Failed to read config file"));
}

#[tokio::test]
async fn test_extract_writes_csv() {
    let base_url = spawn_service().await;
    let tmp = setup_files();
    let out = tmp.path().join("export").join("result.csv");

    let (stdout, stderr, success) = run_xflow(
        &tmp.path().join("absent.toml"),
        &[
            "--base-url",
            &base_url,
            "extract",
            tmp.path().join("A.txt").to_str().unwrap(),
            tmp.path().join("B.txt").to_str().unwrap(),
            "--output",
            out.to_str().unwrap(),
            "--progress",
            "off",
        ],
    )
    .await;
    assert!(success, "extract failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Processed 2 file(s)"));
    assert!(stdout.contains("A.txt  1 item(s)"));

    let csv = fs::read_to_string(&out).unwrap();
    assert_eq!(
        csv,
        "fileName,concept\n\"A.txt\",\"overtime, unpaid\"\n\"B.txt\",\"overtime, unpaid\""
    );
}

#[tokio::test]
async fn test_extract_to_stdout_with_json_progress() {
    let base_url = spawn_service().await;
    let tmp = setup_files();

    let (stdout, stderr, success) = run_xflow(
        &tmp.path().join("absent.toml"),
        &[
            "--base-url",
            &base_url,
            "extract",
            tmp.path().join("A.txt").to_str().unwrap(),
            "--output",
            "-",
            "--progress",
            "json",
        ],
    )
    .await;
    assert!(success, "extract failed: {}", stderr);
    assert_eq!(stdout.trim_end(), "fileName,concept\n\"A.txt\",\"overtime, unpaid\"");

    let percents: Vec<f64> = stderr
        .lines()
        .filter_map(|l| serde_json::from_str::<Value>(l).ok())
        .filter(|v| v["event"] == "progress")
        .filter_map(|v| v["percent"].as_f64())
        .collect();
    assert_eq!(percents, vec![50.0, 75.0, 90.0, 100.0]);
}

#[tokio::test]
async fn test_extract_failure_exits_nonzero() {
    let base_url = spawn_service().await;
    let tmp = setup_files();
    let config = tmp.path().join("xflow.toml");
    fs::write(
        &config,
        format!(
            r#"[service]
base_url = "{}"

[extraction]
prompt = "FAIL on {{legal_documents}}"

[export]
file_name = "{}/never.csv"
"#,
            base_url,
            tmp.path().display()
        ),
    )
    .unwrap();

    let (_, stderr, code) = run_xflow_with_code(
        &config,
        &[
            "extract",
            tmp.path().join("A.txt").to_str().unwrap(),
            "--progress",
            "off",
        ],
    )
    .await;
    assert_eq!(code, Some(3));
    assert!(
        stderr.contains("A.txt: extract step failed"),
        "stderr={}",
        stderr
    );
    assert!(!tmp.path().join("never.csv").exists());
}

#[tokio::test]
async fn test_analyze_prints_summary() {
    let base_url = spawn_service().await;
    let tmp = setup_files();
    let (stdout, stderr, success) = run_xflow(
        &tmp.path().join("absent.toml"),
        &[
            "--base-url",
            &base_url,
            "analyze",
            tmp.path().join("A.txt").to_str().unwrap(),
            "--prompt",
            "Identify the parties",
        ],
    )
    .await;
    assert!(success, "analyze failed: {}", stderr);
    assert_eq!(stdout.trim(), "<h1>Summary</h1>");
}

#[tokio::test]
async fn test_objects_dump_and_delete() {
    let base_url = spawn_service().await;
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("absent.toml");

    let (stdout, _, success) = run_xflow(
        &config,
        &["--base-url", &base_url, "objects", "dump", "legal_documents"],
    )
    .await;
    assert!(success);
    assert!(stdout.contains("== legal_documents =="));
    assert!(stdout.contains("raw:legal_documents"));

    let (stdout, stderr, success) = run_xflow(
        &config,
        &["--base-url", &base_url, "objects", "delete", "a", "stuck", "b"],
    )
    .await;
    assert!(!success);
    assert!(stdout.contains("deleted a"));
    assert!(stdout.contains("deleted b"));
    assert!(stderr.contains("failed to delete stuck"));
    assert!(stderr.contains("1 of 3 deletes failed"));
}

#[tokio::test]
async fn test_blank_instruction_is_rejected_before_any_call() {
    let tmp = setup_files();
    // Nothing listens here; a remote call would fail with a transport error.
    let (_, stderr, code) = run_xflow_with_code(
        &tmp.path().join("absent.toml"),
        &[
            "--base-url",
            "http://127.0.0.1:9",
            "analyze",
            tmp.path().join("A.txt").to_str().unwrap(),
            "--prompt",
            "   ",
        ],
    )
    .await;
    assert_eq!(code, Some(2), "stderr={}", stderr);
    assert!(stderr.contains("an analysis instruction is required"));
}

#[tokio::test]
async fn test_extract_cleanup_deletes_created_objects() {
    let base_url = spawn_service().await;
    let tmp = setup_files();

    let (stdout, stderr, success) = run_xflow(
        &tmp.path().join("absent.toml"),
        &[
            "--base-url",
            &base_url,
            "extract",
            tmp.path().join("A.txt").to_str().unwrap(),
            "--output",
            "-",
            "--progress",
            "off",
            "--cleanup",
        ],
    )
    .await;
    assert!(success, "extract failed: {}", stderr);
    assert!(stdout.starts_with("fileName,concept"));
    assert!(stderr.contains("Cleaned up 2 object(s)"), "stderr={}", stderr);
}
