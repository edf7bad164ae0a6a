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
fn student_crud_validates_and_updates() {
    let root = temp_dir("schoold-students-crud");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&root);
    open_as_principal(&mut stdin, &mut reader, &root.join("ws"));

    let zed = create_student(&mut stdin, &mut reader, "Zed", "7", "A");
    let amy = create_student(&mut stdin, &mut reader, "Amy", "7", "B");

    let list = request_ok(&mut stdin, &mut reader, "1", "students.list", json!({}));
    let names: Vec<&str> = list["students"]
        .as_array()
        .expect("students")
        .iter()
        .filter_map(|s| s["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Amy", "Zed"]);
    assert_eq!(list["students"][0]["hasFaceData"], json!(false));

    for (id, params) in [
        ("2", json!({ "name": "X", "age": "abc", "class": "7", "section": "A" })),
        ("3", json!({ "name": "X", "age": -1, "class": "7", "section": "A" })),
        ("4", json!({ "name": "  ", "age": 10, "class": "7", "section": "A" })),
        ("5", json!({ "name": "X", "age": 10, "section": "A" })),
    ] {
        assert_eq!(
            request_err(&mut stdin, &mut reader, id, "students.create", params),
            "bad_params"
        );
    }

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.update",
        json!({ "studentId": zed, "name": "Zed Z", "age": 14, "class": "8", "section": "C" }),
    );
    assert_eq!(updated["student"]["name"], json!("Zed Z"));
    assert_eq!(updated["student"]["class"], json!("8"));

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.get",
        json!({ "studentId": zed }),
    );
    assert_eq!(fetched["student"]["age"], json!(14));
    assert_eq!(fetched["student"]["section"], json!("C"));

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "8",
            "students.update",
            json!({ "studentId": "missing", "name": "Q", "age": 1, "class": "1", "section": "A" })
        ),
        "not_found"
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "students.delete",
        json!({ "studentId": amy }),
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "10",
            "students.get",
            json!({ "studentId": amy })
        ),
        "not_found"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "11",
            "students.delete",
            json!({ "studentId": amy })
        ),
        "not_found"
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn teacher_crud_is_principal_only() {
    let root = temp_dir("schoold-teachers-crud");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&root);
    open_as_principal(&mut stdin, &mut reader, &root.join("ws"));

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "teachers.create",
        json!({ "name": "Mr Smith", "subject": "Math" }),
    );
    let teacher_id = created["teacherId"].as_str().expect("teacherId").to_string();
    assert_eq!(created["teacher"]["subject"], json!("Math"));

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "teachers.create",
        json!({ "name": "Ms Jones", "subject": "Science" }),
    );
    let list = request_ok(&mut stdin, &mut reader, "3", "teachers.list", json!({}));
    assert_eq!(list["teachers"].as_array().map(|a| a.len()), Some(2));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.update",
        json!({ "teacherId": teacher_id, "name": "Mr Smith", "subject": "Physics" }),
    );
    assert_eq!(updated["teacher"]["subject"], json!("Physics"));
    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.get",
        json!({ "teacherId": teacher_id }),
    );
    assert_eq!(fetched["teacher"]["subject"], json!("Physics"));

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "6",
            "teachers.create",
            json!({ "name": "No Subject" })
        ),
        "bad_params"
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "teachers.delete",
        json!({ "teacherId": teacher_id }),
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "8",
            "teachers.get",
            json!({ "teacherId": teacher_id })
        ),
        "not_found"
    );

    let dash = request_ok(&mut stdin, &mut reader, "9", "dashboard.principal", json!({}));
    assert_eq!(dash["username"], json!("admin"));
    assert_eq!(dash["teachers"].as_array().map(|a| a.len()), Some(1));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn deleting_a_student_removes_dependent_rows() {
    let root = temp_dir("schoold-students-cascade");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&root);
    open_as_principal(&mut stdin, &mut reader, &root.join("ws"));

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "teachers.create",
        json!({ "name": "Mr Smith", "subject": "Math" }),
    );
    let student_id = create_student(&mut stdin, &mut reader, "Lee", "9", "A");
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "users.create",
        json!({ "username": "tina", "password": "pw", "role": "teacher" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "users.create",
        json!({ "username": "lee", "password": "pw", "role": "student", "studentId": student_id }),
    );

    login(&mut stdin, &mut reader, "tina", "pw");
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "marks.save",
        json!({ "class": "9", "section": "A", "entries": { student_id.clone(): { "Math": 88 } } }),
    );

    login(&mut stdin, &mut reader, "lee", "pw");
    let face = format!("data:image/png;base64,{}", "Q".repeat(200));
    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.mark",
        json!({ "faceData": face }),
    );

    login(&mut stdin, &mut reader, "admin", "secret");
    let overview = request_ok(&mut stdin, &mut reader, "6", "reports.overview", json!({}));
    assert_eq!(overview["totalAttendanceRecords"], json!(1));

    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    let overview = request_ok(&mut stdin, &mut reader, "8", "reports.overview", json!({}));
    assert_eq!(overview["totalStudents"], json!(0));
    assert_eq!(overview["totalAttendanceRecords"], json!(0));
    assert_eq!(overview["totalUsers"], json!(3));

    let users = request_ok(&mut stdin, &mut reader, "9", "users.list", json!({}));
    let lee = users["users"]
        .as_array()
        .expect("users")
        .iter()
        .find(|u| u["username"] == json!("lee"))
        .cloned()
        .expect("lee account kept");
    assert!(lee["studentId"].is_null());

    login(&mut stdin, &mut reader, "lee", "pw");
    let dash = request(&mut stdin, &mut reader, "10", "dashboard.student", json!({}));
    assert_eq!(dash["error"]["code"], json!("not_found"));
    assert_eq!(dash["error"]["message"], json!("Student data not found."));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(root);
}
