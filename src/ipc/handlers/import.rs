use crate::bulk::{evaluate_row, BULK_MAX_COLUMNS, BULK_MAX_ROWS};
use crate::directory;
use crate::import::{parse_results_csv, ImportSheet};
use crate::ipc::handlers::bulk::{limit_exceeded, persist_row, row_json, Tally};
use crate::ipc::helpers::{
    grading_settings, require_conn, required_semester, required_str, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use log::{info, warn};
use serde_json::{json, Value};
use std::path::PathBuf;

fn load_sheet(req: &Request) -> Result<(PathBuf, ImportSheet), HandlerErr> {
    let path = PathBuf::from(required_str(&req.params, "path")?);
    let sheet = parse_results_csv(&path).map_err(|e| {
        warn!("import of {} failed: {:#}", path.to_string_lossy(), e);
        HandlerErr::new("import_failed", format!("{:#}", e))
            .with_details(json!({ "path": path.to_string_lossy() }))
    })?;
    Ok((path, sheet))
}

fn over_limit(sheet: &ImportSheet) -> Option<Value> {
    if sheet.rows.len() > BULK_MAX_ROWS || sheet.columns.len() > BULK_MAX_COLUMNS {
        return Some(limit_exceeded(sheet.rows.len(), sheet.columns.len()));
    }
    None
}

fn preview(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, _) = grading_settings(conn)?;
    let (path, sheet) = load_sheet(req)?;
    if let Some(limited) = over_limit(&sheet) {
        return Ok(limited);
    }

    let mut rows = Vec::with_capacity(sheet.rows.len());
    let (mut matched, mut unknown_roll, mut no_marks) = (0usize, 0usize, 0usize);
    for row in &sheet.rows {
        let student = directory::find_by_roll(conn, &row.roll)
            .map_err(|e| HandlerErr::db("db_query_failed", format!("{:#}", e)))?;
        let eval = evaluate_row(row.cells.clone(), &sheet.columns, &opts);
        let issue = if student.is_none() {
            unknown_roll += 1;
            Some("unknown_roll")
        } else if eval.valid_cells() == 0 {
            no_marks += 1;
            Some("no_marks")
        } else {
            matched += 1;
            None
        };
        let mut v = row_json(&eval, &sheet.columns, &opts);
        v["line"] = json!(row.line);
        v["roll"] = json!(row.roll);
        v["name"] = json!(row.name);
        v["studentId"] = json!(student.map(|s| s.id));
        v["issue"] = json!(issue);
        rows.push(v);
    }

    let columns: Vec<Value> = sheet
        .columns
        .iter()
        .map(|c| json!({ "name": c.name, "credit": c.credit }))
        .collect();
    Ok(json!({
        "path": path.to_string_lossy(),
        "limitExceeded": false,
        "columns": columns,
        "rows": rows,
        "summary": {
            "rows": sheet.rows.len(),
            "importable": matched,
            "unknownRoll": unknown_roll,
            "noMarks": no_marks,
        }
    }))
}

fn apply(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, policy) = grading_settings(conn)?;
    let semester = required_semester(&req.params, "semester")?;
    let (path, sheet) = load_sheet(req)?;
    if let Some(limited) = over_limit(&sheet) {
        return Ok(limited);
    }

    let mut tally = Tally::default();
    let mut errors: Vec<Value> = Vec::new();
    for row in &sheet.rows {
        let outcome = directory::find_by_roll(conn, &row.roll)
            .map_err(|e| HandlerErr::db("db_query_failed", format!("{:#}", e)))
            .and_then(|student| {
                student.ok_or_else(|| {
                    HandlerErr::new("unknown_roll", format!("no student with roll {}", row.roll))
                })
            })
            .and_then(|student| {
                let eval = evaluate_row(row.cells.clone(), &sheet.columns, &opts);
                persist_row(
                    conn,
                    &student.id,
                    semester,
                    &eval,
                    &sheet.columns,
                    &opts,
                    &policy,
                )
            });
        match outcome {
            Ok(receipt) => tally.record(&receipt),
            Err(e) => {
                warn!("import line {} (roll {}) skipped: {}", row.line, row.roll, e.message);
                errors.push(json!({
                    "line": row.line,
                    "roll": row.roll,
                    "code": e.code,
                    "message": e.message,
                }));
            }
        }
    }
    info!(
        "imported {} for {}: {} created, {} updated, {} unchanged, {} skipped",
        path.to_string_lossy(),
        semester,
        tally.created,
        tally.updated,
        tally.unchanged,
        errors.len()
    );
    Ok(json!({
        "ok": true,
        "limitExceeded": false,
        "created": tally.created,
        "updated": tally.updated,
        "unchanged": tally.unchanged,
        "skipped": errors.len(),
        "errors": errors,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "import.preview" => preview(state, req),
        "import.apply" => apply(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
