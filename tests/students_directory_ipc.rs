use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
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
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
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

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value.pointer("/error/code").and_then(|v| v.as_str())
}

fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
    roll: &str,
    department: &str,
    semester: &str,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        id,
        "students.create",
        json!({ "name": name, "roll": roll, "department": department, "semester": semester }),
    );
    created
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string()
}

fn names(list: &serde_json::Value) -> Vec<String> {
    list.get("students")
        .and_then(|v| v.as_array())
        .expect("students")
        .iter()
        .map(|s| s.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string())
        .collect()
}

#[test]
fn directory_crud_with_unique_rolls() {
    let workspace = temp_dir("gradebook-students");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let zoe = create_student(&mut stdin, &mut reader, "2", "Zoe", "CSE-003", "CSE", "3rd");
    let adam = create_student(&mut stdin, &mut reader, "3", "Adam", "CSE-001", "CSE", "1st");
    let mia = create_student(&mut stdin, &mut reader, "4", "Mia", "EEE-002", "EEE", "3rd");

    let dup = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({ "name": "Other", "roll": "cse-001", "department": "CSE", "semester": 1 }),
    );
    assert_eq!(error_code(&dup), Some("duplicate_roll"));

    let bad_sem = request(
        &mut stdin,
        &mut reader,
        "6",
        "students.create",
        json!({ "name": "Other", "roll": "X-1", "department": "CSE", "semester": "9th" }),
    );
    assert_eq!(error_code(&bad_sem), Some("validation_failed"));
    assert_eq!(
        bad_sem.pointer("/error/details/kind").and_then(|v| v.as_str()),
        Some("unknown_semester")
    );
    assert_eq!(
        bad_sem.pointer("/error/details/field").and_then(|v| v.as_str()),
        Some("semester")
    );

    let missing = request(
        &mut stdin,
        &mut reader,
        "7",
        "students.create",
        json!({ "name": " ", "roll": "X-1", "department": "CSE", "semester": 1 }),
    );
    assert_eq!(error_code(&missing), Some("bad_params"));

    let by_roll = request_ok(&mut stdin, &mut reader, "8", "students.list", json!({}));
    assert_eq!(names(&by_roll), vec!["Adam", "Zoe", "Mia"]);
    assert_eq!(by_roll.get("sortBy").and_then(|v| v.as_str()), Some("roll"));

    let by_name = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "students.list",
        json!({ "sortBy": "name" }),
    );
    assert_eq!(names(&by_name), vec!["Adam", "Mia", "Zoe"]);

    let cse = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.list",
        json!({ "department": "cse", "semester": "3rd" }),
    );
    assert_eq!(names(&cse), vec!["Zoe"]);

    let search = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "students.list",
        json!({ "search": "eee" }),
    );
    assert_eq!(names(&search), vec!["Mia"]);

    let collision = request(
        &mut stdin,
        &mut reader,
        "12",
        "students.update",
        json!({ "studentId": zoe, "patch": { "roll": "EEE-002" } }),
    );
    assert_eq!(error_code(&collision), Some("duplicate_roll"));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "students.update",
        json!({ "studentId": adam, "patch": { "semester": 2, "name": "Adam K" } }),
    );
    assert_eq!(
        updated.pointer("/student/semester").and_then(|v| v.as_str()),
        Some("2nd")
    );
    assert_eq!(
        updated.pointer("/student/roll").and_then(|v| v.as_str()),
        Some("CSE-001")
    );

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "students.get",
        json!({ "studentId": mia }),
    );
    assert_eq!(
        got.pointer("/student/department").and_then(|v| v.as_str()),
        Some("EEE")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "results.submit",
        json!({
            "studentId": mia,
            "semester": "3rd",
            "subjects": [{ "subjectName": "Circuits", "marks": 66 }]
        }),
    );
    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "students.delete",
        json!({ "studentId": mia }),
    );
    assert_eq!(deleted.get("resultsDeleted").and_then(|v| v.as_u64()), Some(1));

    let results = request_ok(&mut stdin, &mut reader, "17", "results.list", json!({}));
    assert_eq!(
        results.get("results").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "18",
        "students.get",
        json!({ "studentId": mia }),
    );
    assert_eq!(error_code(&gone), Some("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
