use rusqlite::Connection;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_technosd");
    let mut child = Command::new(exe)
        .env_remove("TECHNOS_WORKSPACE")
        .env_remove("TECHNOS_CREDENTIALS_FILE")
        .env_remove("TECHNOS_ADMIN_USER")
        .env_remove("TECHNOS_ADMIN_PASSWORD")
        .env_remove("TECHNOS_RECORD_SCHEMA")
        .env("TECHNOS_PROJECT_ID", "technos-test")
        .env("TECHNOS_CLIENT_EMAIL", "svc@technos-test.iam")
        .env("TECHNOS_PRIVATE_KEY_ID", "test-key")
        .env("TECHNOS_PRIVATE_KEY", "-----BEGIN KEY-----\\ntest\\n-----END KEY-----")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn technosd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "{}", value);
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
}

fn open_logged_in(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) {
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        stdin,
        reader,
        "login",
        "session.login",
        json!({ "user": "staff", "password": "pw" }),
    );
}

fn record_count(workspace: &Path) -> i64 {
    let conn = Connection::open(workspace.join("technos-test.sqlite3")).expect("open db");
    conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
        .expect("count users")
}

fn ticket(number: &str) -> serde_json::Value {
    json!({
        "name": "Ana Souza",
        "email": "ana.souza@technos.com.br",
        "number": number,
        "issue": "strap broken",
        "code": "RH"
    })
}

#[test]
fn valid_submission_creates_exactly_one_record() {
    let workspace = temp_dir("technos-submit-valid");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_logged_in(&mut stdin, &mut reader, &workspace);

    let created = request_ok(&mut stdin, &mut reader, "1", "records.submit", ticket("5511"));
    let record_id = created
        .get("recordId")
        .and_then(|v| v.as_str())
        .expect("recordId")
        .to_string();
    assert!(!record_id.is_empty());

    let listed = request_ok(&mut stdin, &mut reader, "2", "records.list", json!({}));
    let records = listed
        .get("records")
        .and_then(|v| v.as_array())
        .expect("records array");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], json!(record_id));
    assert_eq!(records[0]["fields"]["number"], json!("5511"));
    assert_eq!(records[0]["fields"]["department_or_course"], json!("RH"));
    assert!(records[0]["createdAt"].as_str().is_some_and(|s| !s.is_empty()));

    drop(stdin);
    let _ = child.wait();
    assert_eq!(record_count(&workspace), 1);
}

#[test]
fn each_empty_field_is_rejected_without_mutation() {
    let workspace = temp_dir("technos-submit-incomplete");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_logged_in(&mut stdin, &mut reader, &workspace);

    for (i, field) in ["name", "email", "number", "issue", "code"].iter().enumerate() {
        let mut params = ticket("1");
        params[*field] = json!("   ");
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("inc-{i}"),
            "records.submit",
            params,
        );
        assert_eq!(error_code(&resp), "incomplete_fields", "{field}");
        let missing = resp["error"]["details"]["missing"]
            .as_array()
            .expect("missing list");
        assert_eq!(missing.len(), 1);
    }

    let resp = request(
        &mut stdin,
        &mut reader,
        "absent",
        "records.submit",
        json!({ "name": "Ana" }),
    );
    assert_eq!(error_code(&resp), "incomplete_fields");

    drop(stdin);
    let _ = child.wait();
    assert_eq!(record_count(&workspace), 0);
}

#[test]
fn invalid_email_and_trailing_garbage_are_rejected() {
    let workspace = temp_dir("technos-submit-email");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_logged_in(&mut stdin, &mut reader, &workspace);

    for (i, email) in ["ana.technos.com", "ana@technos", "a@b.c!!!"].iter().enumerate() {
        let mut params = ticket("1");
        params["email"] = json!(email);
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("email-{i}"),
            "records.submit",
            params,
        );
        assert_eq!(error_code(&resp), "invalid_email", "{email}");
    }

    drop(stdin);
    let _ = child.wait();
    assert_eq!(record_count(&workspace), 0);
}

#[test]
fn duplicate_number_is_rejected_and_first_record_kept() {
    let workspace = temp_dir("technos-submit-duplicate");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_logged_in(&mut stdin, &mut reader, &workspace);

    request_ok(&mut stdin, &mut reader, "1", "records.submit", ticket("123"));
    let mut second = ticket("123");
    second["name"] = json!("Someone Else");
    second["email"] = json!("else@technos.com");
    let resp = request(&mut stdin, &mut reader, "2", "records.submit", second);
    assert_eq!(error_code(&resp), "duplicate_number");

    request_ok(&mut stdin, &mut reader, "3", "records.submit", ticket("999"));

    drop(stdin);
    let _ = child.wait();
    assert_eq!(record_count(&workspace), 2);
}

#[test]
fn submit_without_workspace_reports_no_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "login",
        "session.login",
        json!({ "user": "staff", "password": "pw" }),
    );
    let resp = request(&mut stdin, &mut reader, "1", "records.submit", ticket("1"));
    assert_eq!(error_code(&resp), "no_workspace");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn list_without_workspace_reports_no_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "login",
        "session.login",
        json!({ "user": "staff", "password": "pw" }),
    );
    let resp = request(&mut stdin, &mut reader, "1", "records.list", json!({}));
    assert_eq!(error_code(&resp), "no_workspace");

    drop(stdin);
    let _ = child.wait();
}
