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

fn draft_field<'a>(value: &'a serde_json::Value, field: &str) -> Option<&'a serde_json::Value> {
    value.get("draft").and_then(|d| d.get(field))
}

fn draft_state(value: &serde_json::Value) -> Option<&str> {
    draft_field(value, "state").and_then(|v| v.as_str())
}

fn draft_id(value: &serde_json::Value) -> String {
    draft_field(value, "draftId")
        .and_then(|v| v.as_str())
        .expect("draftId")
        .to_string()
}

#[test]
fn draft_walks_from_empty_to_submitted_and_back_through_reopen() {
    let workspace = temp_dir("gradebook-drafts");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "name": "Karim", "roll": "EEE-7", "department": "EEE", "semester": "1st" }),
    );
    let student_id = student
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    let opened = request_ok(&mut stdin, &mut reader, "3", "drafts.open", json!({}));
    assert_eq!(draft_state(&opened), Some("empty"));
    assert_eq!(
        draft_field(&opened, "status").and_then(|v| v.as_str()),
        Some("-")
    );
    let id = draft_id(&opened);

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "drafts.addSubject",
        json!({ "draftId": id, "subjectName": "Circuits", "marks": 85 }),
    );
    assert_eq!(draft_state(&added), Some("partial"));
    assert_eq!(
        added.pointer("/subject/grade").and_then(|v| v.as_str()),
        Some("A+")
    );

    let dup = request(
        &mut stdin,
        &mut reader,
        "5",
        "drafts.addSubject",
        json!({ "draftId": id, "subjectName": "circuits", "marks": 50 }),
    );
    assert_eq!(error_code(&dup), Some("validation_failed"));
    assert_eq!(
        dup.pointer("/error/details/kind").and_then(|v| v.as_str()),
        Some("duplicate_subject")
    );

    let no_marks = request(
        &mut stdin,
        &mut reader,
        "6",
        "drafts.addSubject",
        json!({ "draftId": id, "subjectName": "Signals", "marks": "" }),
    );
    assert_eq!(
        no_marks.pointer("/error/details/kind").and_then(|v| v.as_str()),
        Some("missing_marks")
    );

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "drafts.addSubject",
        json!({ "draftId": id, "subjectName": "Signals", "marks": 30 }),
    );
    assert_eq!(
        draft_field(&added, "cgpa").and_then(|v| v.as_f64()),
        Some(2.0)
    );
    assert_eq!(
        draft_field(&added, "status").and_then(|v| v.as_str()),
        Some("Failed")
    );

    let missing_student = request(
        &mut stdin,
        &mut reader,
        "8",
        "drafts.submit",
        json!({ "draftId": id }),
    );
    assert_eq!(
        missing_student
            .pointer("/error/details/kind")
            .and_then(|v| v.as_str()),
        Some("missing_student")
    );

    let unknown = request(
        &mut stdin,
        &mut reader,
        "9",
        "drafts.update",
        json!({ "draftId": id, "studentId": "ghost" }),
    );
    assert_eq!(error_code(&unknown), Some("not_found"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "drafts.update",
        json!({ "draftId": id, "studentId": student_id, "semester": "1st" }),
    );
    let edited = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "drafts.updateSubject",
        json!({ "draftId": id, "index": 1, "marks": 70 }),
    );
    assert_eq!(
        draft_field(&edited, "cgpa").and_then(|v| v.as_f64()),
        Some(3.75)
    );
    let out_of_range = request(
        &mut stdin,
        &mut reader,
        "12",
        "drafts.updateSubject",
        json!({ "draftId": id, "index": 5, "marks": 70 }),
    );
    assert_eq!(error_code(&out_of_range), Some("bad_params"));

    let submitted = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "drafts.submit",
        json!({ "draftId": id }),
    );
    assert_eq!(draft_state(&submitted), Some("submitted"));
    assert_eq!(submitted.get("created").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(submitted.get("revision").and_then(|v| v.as_i64()), Some(1));
    let result_id = submitted
        .get("resultId")
        .and_then(|v| v.as_str())
        .expect("resultId")
        .to_string();

    let frozen = request(
        &mut stdin,
        &mut reader,
        "14",
        "drafts.addSubject",
        json!({ "draftId": id, "subjectName": "Power", "marks": 60 }),
    );
    assert_eq!(error_code(&frozen), Some("invalid_transition"));
    assert_eq!(
        frozen.pointer("/error/details/state").and_then(|v| v.as_str()),
        Some("submitted")
    );
    let resubmit = request(
        &mut stdin,
        &mut reader,
        "15",
        "drafts.submit",
        json!({ "draftId": id }),
    );
    assert_eq!(error_code(&resubmit), Some("invalid_transition"));

    let reopened = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "drafts.reopen",
        json!({ "resultId": result_id }),
    );
    assert_eq!(draft_state(&reopened), Some("editing"));
    assert_eq!(
        draft_field(&reopened, "cgpa").and_then(|v| v.as_f64()),
        Some(3.75)
    );
    let reopened_id = draft_id(&reopened);
    let idempotent = request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "drafts.submit",
        json!({ "draftId": reopened_id }),
    );
    assert_eq!(idempotent.get("changed").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(idempotent.get("revision").and_then(|v| v.as_i64()), Some(1));

    let first = draft_id(&request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "drafts.reopen",
        json!({ "resultId": result_id }),
    ));
    let second = draft_id(&request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "drafts.reopen",
        json!({ "resultId": result_id }),
    ));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "20",
        "drafts.removeSubject",
        json!({ "draftId": first, "index": 1 }),
    );
    let won = request_ok(
        &mut stdin,
        &mut reader,
        "21",
        "drafts.submit",
        json!({ "draftId": first }),
    );
    assert_eq!(won.get("revision").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(won.pointer("/result/cgpa").and_then(|v| v.as_f64()), Some(4.0));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "22",
        "drafts.updateSubject",
        json!({ "draftId": second, "index": 0, "marks": 40 }),
    );
    let lost = request(
        &mut stdin,
        &mut reader,
        "23",
        "drafts.submit",
        json!({ "draftId": second }),
    );
    assert_eq!(error_code(&lost), Some("revision_conflict"));
    assert_eq!(
        draft_state(&request_ok(
            &mut stdin,
            &mut reader,
            "24",
            "drafts.get",
            json!({ "draftId": second }),
        )),
        Some("editing")
    );

    let discarded = request_ok(
        &mut stdin,
        &mut reader,
        "25",
        "drafts.discard",
        json!({ "draftId": second }),
    );
    assert_eq!(discarded.get("ok").and_then(|v| v.as_bool()), Some(true));
    let gone = request(
        &mut stdin,
        &mut reader,
        "26",
        "drafts.get",
        json!({ "draftId": second }),
    );
    assert_eq!(error_code(&gone), Some("not_found"));

    let listed = request_ok(&mut stdin, &mut reader, "27", "drafts.list", json!({}));
    assert_eq!(
        listed.get("drafts").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(3)
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "28",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let cleared = request_ok(&mut stdin, &mut reader, "29", "drafts.list", json!({}));
    assert_eq!(
        cleared.get("drafts").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn reopened_draft_stays_with_its_student() {
    let workspace = temp_dir("gradebook-drafts-owner");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let mut ids = Vec::new();
    for (i, roll) in ["MEC-1", "MEC-2"].iter().enumerate() {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "students.create",
            json!({
                "name": format!("Student {}", roll),
                "roll": roll,
                "department": "MEC",
                "semester": "2nd"
            }),
        );
        ids.push(
            created
                .get("studentId")
                .and_then(|v| v.as_str())
                .expect("studentId")
                .to_string(),
        );
    }
    let submitted = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "results.submit",
        json!({
            "studentId": ids[0],
            "semester": "2nd",
            "subjects": [{ "subjectName": "Thermo", "marks": 66 }]
        }),
    );
    let result_id = submitted
        .get("resultId")
        .and_then(|v| v.as_str())
        .expect("resultId")
        .to_string();

    let reopened = draft_id(&request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "drafts.reopen",
        json!({ "resultId": result_id }),
    ));
    let moved = request(
        &mut stdin,
        &mut reader,
        "4",
        "drafts.update",
        json!({ "draftId": reopened, "studentId": ids[1] }),
    );
    assert_eq!(error_code(&moved), Some("student_mismatch"));
    assert_eq!(
        moved.pointer("/error/details/studentId").and_then(|v| v.as_str()),
        Some(ids[0].as_str())
    );
    let cleared = request(
        &mut stdin,
        &mut reader,
        "5",
        "drafts.update",
        json!({ "draftId": reopened, "studentId": null }),
    );
    assert_eq!(error_code(&cleared), Some("student_mismatch"));

    let text_credit = request(
        &mut stdin,
        &mut reader,
        "6",
        "drafts.addSubject",
        json!({ "draftId": reopened, "subjectName": "Fluids", "marks": 70, "credit": "3" }),
    );
    assert_eq!(error_code(&text_credit), Some("validation_failed"));
    assert_eq!(
        text_credit.pointer("/error/details/field").and_then(|v| v.as_str()),
        Some("credit")
    );

    let current = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "drafts.get",
        json!({ "draftId": reopened }),
    );
    assert_eq!(
        draft_field(&current, "studentId").and_then(|v| v.as_str()),
        Some(ids[0].as_str())
    );
    assert_eq!(
        draft_field(&current, "subjects")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
