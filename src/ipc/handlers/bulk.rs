use crate::bulk::{
    evaluate_row, row_subjects, validate_columns, BulkColumn, RowEvaluation, BULK_MAX_COLUMNS,
    BULK_MAX_ROWS,
};
use crate::directory;
use crate::draft::Submission;
use crate::grading::{credit_from_json, CellMark, GradingOptions, Semester, ValidationError};
use crate::ipc::helpers::{grading_settings, require_conn, required_semester, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::results::{self, ClaimedDerived, SubmitPolicy, SubmitReceipt};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};

struct RowInput {
    student_id: Option<String>,
    roll: Option<String>,
    cells: Vec<CellMark>,
}

/// `limitExceeded` payload; nothing is evaluated or written.
pub(super) fn limit_exceeded(rows: usize, columns: usize) -> Value {
    let (code, message) = if columns > BULK_MAX_COLUMNS {
        (
            "too_many_columns",
            format!(
                "bulk payload exceeds max subject columns: {} > {}",
                columns, BULK_MAX_COLUMNS
            ),
        )
    } else {
        (
            "too_many_rows",
            format!("bulk payload exceeds max rows: {} > {}", rows, BULK_MAX_ROWS),
        )
    };
    json!({
        "ok": true,
        "created": 0,
        "updated": 0,
        "rejected": rows,
        "limitExceeded": true,
        "errors": [{
            "row": -1,
            "code": code,
            "message": message,
        }]
    })
}

fn parse_columns(params: &Value) -> Result<Vec<BulkColumn>, HandlerErr> {
    let Some(items) = params.get("subjects").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing subjects[]"));
    };
    let mut columns = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let (name, credit) = match item {
            Value::String(s) => (s.as_str(), None),
            Value::Object(o) => (
                o.get("name")
                    .or_else(|| o.get("subjectName"))
                    .and_then(|v| v.as_str())
                    .unwrap_or(""),
                credit_from_json(o.get("credit")).map_err(|e| column_error(i, e))?,
            ),
            _ => {
                return Err(HandlerErr::bad_params(format!(
                    "subject at index {} must be a string or an object",
                    i
                )))
            }
        };
        let column = BulkColumn::new(name, credit).map_err(|e| column_error(i, e))?;
        columns.push(column);
    }
    validate_columns(&columns).map_err(|(i, e)| column_error(i, e))?;
    Ok(columns)
}

fn column_error(column: usize, e: ValidationError) -> HandlerErr {
    let mut he = HandlerErr::from(e);
    if let Some(d) = he.details.as_mut() {
        d["column"] = json!(column);
    }
    he
}

fn parse_row(i: usize, item: &Value) -> Result<RowInput, HandlerErr> {
    let text = |o: &serde_json::Map<String, Value>, key: &str| {
        o.get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let (student_id, roll, marks) = match item {
        Value::Array(cells) => (None, None, cells.as_slice()),
        Value::Object(o) => (
            text(o, "studentId"),
            text(o, "roll"),
            o.get("marks")
                .and_then(|v| v.as_array())
                .map(|a| a.as_slice())
                .unwrap_or(&[]),
        ),
        _ => {
            return Err(HandlerErr::bad_params(format!(
                "row at index {} must be an array or an object",
                i
            )))
        }
    };
    Ok(RowInput {
        student_id,
        roll,
        cells: marks.iter().map(|c| CellMark::from_json(Some(c))).collect(),
    })
}

fn rows_param(params: &Value) -> Result<&Vec<Value>, HandlerErr> {
    params
        .get("rows")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("missing rows[]"))
}

fn subject_count(params: &Value) -> usize {
    params
        .get("subjects")
        .and_then(|v| v.as_array())
        .map(|a| a.len())
        .unwrap_or(0)
}

pub(super) fn row_json(
    eval: &RowEvaluation,
    columns: &[BulkColumn],
    opts: &GradingOptions,
) -> Value {
    json!({
        "cells": eval.cells_json(columns, opts),
        "cgpa": eval.outcome.cgpa,
        "hasFail": eval.outcome.has_fail,
        "gradedCount": eval.outcome.graded_count,
        "invalidCells": eval.invalid_cells,
        "extraCells": eval.extra_cells,
    })
}

/// Creates the (student, semester) result or replaces the one already there.
pub(super) fn persist_row(
    conn: &Connection,
    student_id: &str,
    semester: Semester,
    eval: &RowEvaluation,
    columns: &[BulkColumn],
    opts: &GradingOptions,
    policy: &SubmitPolicy,
) -> Result<SubmitReceipt, HandlerErr> {
    if eval.valid_cells() == 0 {
        return Err(HandlerErr::new("no_marks", "row has no valid marks"));
    }
    let subjects = row_subjects(eval, columns, opts)?;
    let result_id = results::find_result_id(conn, student_id, semester)
        .map_err(|e| HandlerErr::db("db_query_failed", format!("{:#}", e)))?;
    let submission = Submission {
        result_id,
        student_id: student_id.to_string(),
        semester,
        subjects,
        expected_revision: None,
    };
    Ok(results::submit(
        conn,
        &submission,
        &ClaimedDerived::default(),
        opts,
        policy,
    )?)
}

#[derive(Default)]
pub(super) struct Tally {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl Tally {
    pub fn record(&mut self, receipt: &SubmitReceipt) {
        if receipt.created {
            self.created += 1;
        } else if receipt.changed {
            self.updated += 1;
        } else {
            self.unchanged += 1;
        }
    }
}

fn resolve_student(conn: &Connection, row: &RowInput) -> Result<String, HandlerErr> {
    if let Some(id) = &row.student_id {
        let found = results::student_exists(conn, id)
            .map_err(|e| HandlerErr::db("db_query_failed", format!("{:#}", e)))?;
        if !found {
            return Err(HandlerErr::not_found("student not found"));
        }
        return Ok(id.clone());
    }
    let Some(roll) = &row.roll else {
        return Err(HandlerErr::bad_params("row needs studentId or roll"));
    };
    match directory::find_by_roll(conn, roll)
        .map_err(|e| HandlerErr::db("db_query_failed", format!("{:#}", e)))?
    {
        Some(s) => Ok(s.id),
        None => Err(HandlerErr::new("unknown_roll", format!("no student with roll {}", roll))),
    }
}

fn preview(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, _) = grading_settings(conn)?;
    let rows = rows_param(&req.params)?;
    let n_cols = subject_count(&req.params);
    if rows.len() > BULK_MAX_ROWS || n_cols > BULK_MAX_COLUMNS {
        return Ok(limit_exceeded(rows.len(), n_cols));
    }
    let columns = parse_columns(&req.params)?;

    let mut out = Vec::with_capacity(rows.len());
    let mut computable = 0usize;
    for (i, item) in rows.iter().enumerate() {
        let row = parse_row(i, item)?;
        let eval = evaluate_row(row.cells, &columns, &opts);
        if eval.outcome.cgpa.computed().is_some() {
            computable += 1;
        }
        let mut v = row_json(&eval, &columns, &opts);
        v["row"] = json!(i);
        v["studentId"] = json!(row.student_id);
        v["roll"] = json!(row.roll);
        out.push(v);
    }
    let columns_json: Vec<Value> = columns
        .iter()
        .map(|c| json!({ "name": c.name, "credit": c.credit }))
        .collect();
    Ok(json!({
        "limitExceeded": false,
        "columns": columns_json,
        "rows": out,
        "rowCount": rows.len(),
        "computable": computable,
    }))
}

fn submit(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, policy) = grading_settings(conn)?;
    let rows = rows_param(&req.params)?;
    let n_cols = subject_count(&req.params);
    if rows.len() > BULK_MAX_ROWS || n_cols > BULK_MAX_COLUMNS {
        return Ok(limit_exceeded(rows.len(), n_cols));
    }
    let semester = required_semester(&req.params, "semester")?;
    let columns = parse_columns(&req.params)?;

    let mut tally = Tally::default();
    let mut errors: Vec<Value> = Vec::new();
    let mut written: Vec<Value> = Vec::new();
    for (i, item) in rows.iter().enumerate() {
        let outcome = parse_row(i, item).and_then(|row| {
            let student_id = resolve_student(conn, &row)?;
            let eval = evaluate_row(row.cells, &columns, &opts);
            persist_row(conn, &student_id, semester, &eval, &columns, &opts, &policy)
        });
        match outcome {
            Ok(receipt) => {
                tally.record(&receipt);
                written.push(json!({
                    "row": i,
                    "studentId": receipt.result.student_id,
                    "resultId": receipt.result.id,
                    "revision": receipt.result.revision,
                    "cgpa": receipt.result.cgpa_hundredths as f64 / 100.0,
                    "status": receipt.result.status,
                }));
            }
            Err(e) => errors.push(json!({
                "row": i,
                "code": e.code,
                "message": e.message,
                "details": e.details,
            })),
        }
    }
    info!(
        "bulk submit ({}): {} created, {} updated, {} unchanged, {} rejected",
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
        "rejected": errors.len(),
        "errors": errors,
        "results": written,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "bulk.preview" => preview(state, req),
        "bulk.submit" => submit(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
