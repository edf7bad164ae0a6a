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

fn spawn_sidecar(root: &Path) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let config = root.join("schoold.toml");
    std::fs::write(&config, "[auth]\nbcrypt_cost = 4\n").expect("write config");
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut child = Command::new(exe)
        .current_dir(root)
        .env("SCHOOLD_CONFIG", &config)
        .env_remove("SCHOOLD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
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
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded",
        method
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

/// Opens a fresh workspace, bootstraps `admin` and logs in as principal.
fn open_as_principal(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) {
    request_ok(
        stdin,
        reader,
        "setup-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        stdin,
        reader,
        "setup-boot",
        "auth.bootstrap",
        json!({ "username": "admin", "password": "secret" }),
    );
    login(stdin, reader, "admin", "secret");
}

fn login(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    username: &str,
    password: &str,
) {
    request_ok(
        stdin,
        reader,
        &format!("login-{}", username),
        "auth.login",
        json!({ "username": username, "password": password }),
    );
}

fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    name: &str,
    class_name: &str,
    section: &str,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        &format!("student-{}", name),
        "students.create",
        json!({ "name": name, "age": 12, "class": class_name, "section": section }),
    );
    created["studentId"].as_str().expect("studentId").to_string()
}

#[test]
fn marks_sheet_save_derives_grades_and_replaces() {
    let root = temp_dir("schoold-marks-save");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&root);
    open_as_principal(&mut stdin, &mut reader, &root.join("ws"));

    for (name, subject) in [("Mr Smith", "Math"), ("Ms Jones", "Science")] {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("teacher-{}", subject),
            "teachers.create",
            json!({ "name": name, "subject": subject }),
        );
    }
    let amy = create_student(&mut stdin, &mut reader, "Amy", "7", "A");
    let ben = create_student(&mut stdin, &mut reader, "Ben", "7", "A");
    let cal = create_student(&mut stdin, &mut reader, "Cal", "7", "B");
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "users.create",
        json!({ "username": "tina", "password": "pw", "role": "teacher" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "users.create",
        json!({ "username": "amy", "password": "pw", "role": "student", "studentId": amy }),
    );

    // Principals do not enter marks.
    assert_eq!(
        request_err(&mut stdin, &mut reader, "3", "marks.classOptions", json!({})),
        "forbidden"
    );

    login(&mut stdin, &mut reader, "tina", "pw");
    let options = request_ok(&mut stdin, &mut reader, "4", "marks.classOptions", json!({}));
    assert_eq!(options["classes"], json!(["7"]));
    assert_eq!(options["sections"], json!(["A", "B"]));

    let sheet = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "marks.sheetOpen",
        json!({ "class": "7", "section": "A" }),
    );
    assert_eq!(sheet["subjects"], json!(["Math", "Science"]));
    assert_eq!(sheet["rows"].as_array().map(|a| a.len()), Some(2));

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "marks.save",
        json!({
            "class": "7",
            "section": "A",
            "entries": {
                amy.clone(): { "Math": 95, "Science": "72", "English": 50 },
                ben.clone(): { "Math": "abc", "Science": null },
                cal.clone(): { "Math": 80 }
            }
        }),
    );
    assert_eq!(saved["updatedStudents"], json!(1));
    let skipped = saved["skipped"].as_array().expect("skipped");
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0]["studentId"], json!(ben));
    assert_eq!(skipped[0]["subject"], json!("Math"));

    let sheet = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "marks.sheetOpen",
        json!({ "class": "7", "section": "A" }),
    );
    let amy_row = &sheet["rows"][0];
    assert_eq!(amy_row["student"]["id"], json!(amy));
    assert_eq!(amy_row["marks"], json!({ "Math": 95, "Science": 72 }));
    assert_eq!(amy_row["grades"], json!({ "Math": "A", "Science": "C" }));
    assert_eq!(sheet["rows"][1]["marks"], json!({}));

    // Other sections are untouched by a 7/A save.
    let other = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "marks.sheetOpen",
        json!({ "class": "7", "section": "B" }),
    );
    assert_eq!(other["rows"][0]["marks"], json!({}));

    // A second save replaces the student's whole mark set.
    request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "marks.save",
        json!({
            "class": "7",
            "section": "A",
            "entries": {
                amy.clone(): { "Math": 59 },
                ben.clone(): { "Math": 90, "Science": 39 }
            }
        }),
    );
    let sheet = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "marks.sheetOpen",
        json!({ "class": "7", "section": "A" }),
    );
    assert_eq!(sheet["rows"][0]["marks"], json!({ "Math": 59 }));
    assert_eq!(sheet["rows"][0]["grades"], json!({ "Math": "E" }));
    assert_eq!(sheet["rows"][1]["grades"], json!({ "Math": "A", "Science": "F" }));

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "11",
            "marks.save",
            json!({ "class": "7", "section": "A", "entries": [] })
        ),
        "bad_params"
    );

    login(&mut stdin, &mut reader, "amy", "pw");
    let dash = request_ok(&mut stdin, &mut reader, "12", "dashboard.student", json!({}));
    assert_eq!(dash["marks"], json!({ "Math": 59 }));
    assert_eq!(dash["grades"], json!({ "Math": "E" }));
    assert_eq!(dash["attendance"], json!([]));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(root);
}
