use crate::calc::{self, CalcContext};
use crate::ipc::helpers::{
    grading_settings, optional_str, require_conn, required_semester, required_str, respond,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde::Serialize;
use serde_json::Value;

fn to_value<T: Serialize>(model: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(model).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

fn semester_summary(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, _) = grading_settings(conn)?;
    let semester = required_semester(&req.params, "semester")?;
    let department = optional_str(&req.params, "department");
    let ctx = CalcContext { conn, opts: &opts };
    let model = calc::semester_summary(&ctx, semester, department.as_deref())?;
    to_value(&model)
}

fn transcript(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, _) = grading_settings(conn)?;
    let student_id = required_str(&req.params, "studentId")?;
    let ctx = CalcContext { conn, opts: &opts };
    let model = calc::transcript(&ctx, &student_id)?;
    to_value(&model)
}

fn dashboard(state: &AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, _) = grading_settings(conn)?;
    let ctx = CalcContext { conn, opts: &opts };
    let model = calc::dashboard(&ctx)?;
    to_value(&model)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "reports.semesterSummary" => semester_summary(state, req),
        "reports.transcript" => transcript(state, req),
        "reports.dashboard" => dashboard(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
