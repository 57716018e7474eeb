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
    roll: &str,
) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "students.create",
        json!({ "name": format!("Student {}", roll), "roll": roll, "department": "CSE", "semester": "1st" }),
    );
}

fn result_cgpa_for(results: &serde_json::Value, student_id: &str) -> Option<f64> {
    results
        .get("results")
        .and_then(|v| v.as_array())?
        .iter()
        .find(|r| r.get("studentId").and_then(|v| v.as_str()) == Some(student_id))
        .and_then(|r| r.get("cgpa"))
        .and_then(|v| v.as_f64())
}

#[test]
fn csv_sheet_preview_then_apply_with_credit_row() {
    let workspace = temp_dir("gradebook-import");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    create_student(&mut stdin, &mut reader, "2", "CSE-1");
    create_student(&mut stdin, &mut reader, "3", "CSE-2");
    create_student(&mut stdin, &mut reader, "4", "CSE-3");

    let sheet = workspace.join("semester1.csv");
    std::fs::write(
        &sheet,
        "roll,name,Math,Physics\n\
         credit,,3,1\n\
         cse-1,Anika,85,70\n\
         CSE-2,Bashir,60,\n\
         ghost,Nobody,70,70\n\
         CSE-3,Chaity,,\n",
    )
    .expect("write sheet");

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "import.preview",
        json!({ "path": sheet.to_string_lossy() }),
    );
    assert_eq!(preview.pointer("/summary/rows").and_then(|v| v.as_u64()), Some(4));
    assert_eq!(
        preview.pointer("/summary/importable").and_then(|v| v.as_u64()),
        Some(2)
    );
    assert_eq!(
        preview.pointer("/summary/unknownRoll").and_then(|v| v.as_u64()),
        Some(1)
    );
    assert_eq!(preview.pointer("/summary/noMarks").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(
        preview.pointer("/columns/0/credit").and_then(|v| v.as_f64()),
        Some(3.0)
    );
    let rows = preview.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows[0].get("line").and_then(|v| v.as_u64()), Some(3));
    assert!(rows[0].get("studentId").and_then(|v| v.as_str()).is_some());
    assert_eq!(rows[0].get("cgpa").and_then(|v| v.as_f64()), Some(3.75));
    assert_eq!(rows[1].get("issue"), Some(&json!(null)));
    assert_eq!(rows[2].get("issue").and_then(|v| v.as_str()), Some("unknown_roll"));
    assert_eq!(rows[3].get("issue").and_then(|v| v.as_str()), Some("no_marks"));
    assert_eq!(rows[3].get("cgpa").and_then(|v| v.as_str()), Some("-"));

    let applied = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "import.apply",
        json!({ "path": sheet.to_string_lossy(), "semester": "1st" }),
    );
    assert_eq!(applied.get("created").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(applied.get("skipped").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        applied.pointer("/errors/0/code").and_then(|v| v.as_str()),
        Some("unknown_roll")
    );
    assert_eq!(applied.pointer("/errors/0/line").and_then(|v| v.as_u64()), Some(5));
    assert_eq!(
        applied.pointer("/errors/1/code").and_then(|v| v.as_str()),
        Some("no_marks")
    );

    let cse1 = rows[0]
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "results.list",
        json!({ "semester": "1st" }),
    );
    assert_eq!(result_cgpa_for(&listed, &cse1), Some(3.75));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "setup.update",
        json!({ "section": "grading", "patch": { "weightByCredit": true } }),
    );
    let reapplied = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "import.apply",
        json!({ "path": sheet.to_string_lossy(), "semester": "1st" }),
    );
    assert_eq!(reapplied.get("created").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(reapplied.get("updated").and_then(|v| v.as_u64()), Some(2));
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "results.list",
        json!({ "semester": "1st" }),
    );
    assert_eq!(result_cgpa_for(&listed, &cse1), Some(3.88));

    let missing = request(
        &mut stdin,
        &mut reader,
        "11",
        "import.preview",
        json!({ "path": workspace.join("nope.csv").to_string_lossy() }),
    );
    assert_eq!(error_code(&missing), Some("import_failed"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
