use crate::directory::{self, NewStudent, StudentPatch, StudentQuery, StudentSort};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    optional_semester, optional_str, require_conn, required_semester, required_str, respond,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn list(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let sort = match optional_str(&req.params, "sortBy") {
        Some(raw) => StudentSort::parse(&raw).ok_or_else(|| {
            HandlerErr::bad_params("sortBy must be one of: name, roll, department")
                .with_details(json!({ "sortBy": raw }))
        })?,
        None => setup::load_default_sort(conn)
            .map_err(|e| HandlerErr::db("db_query_failed", format!("{:#}", e)))?,
    };
    let query = StudentQuery {
        department: optional_str(&req.params, "department"),
        semester: optional_semester(&req.params, "semester")?,
        search: optional_str(&req.params, "search"),
        sort,
    };
    let students = directory::list_students(conn, &query)
        .map_err(|e| HandlerErr::db("db_query_failed", format!("{:#}", e)))?;
    Ok(json!({ "students": students, "sortBy": sort.as_str() }))
}

fn get(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let student_id = required_str(&req.params, "studentId")?;
    let student = directory::get_student(conn, &student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", format!("{:#}", e)))?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    Ok(json!({ "student": student }))
}

fn create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let new = NewStudent {
        name: required_str(&req.params, "name")?,
        roll: required_str(&req.params, "roll")?,
        department: required_str(&req.params, "department")?,
        semester: required_semester(&req.params, "semester")?,
    };
    let student = directory::create_student(conn, &new)?;
    Ok(json!({ "studentId": student.id, "student": student }))
}

fn update(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let student_id = required_str(&req.params, "studentId")?;
    let Some(raw) = req.params.get("patch").filter(|v| v.is_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    let text = |key: &str| -> Result<Option<String>, HandlerErr> {
        match raw.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(HandlerErr::bad_params(format!("{} must be string", key))),
        }
    };
    let patch = StudentPatch {
        name: text("name")?,
        roll: text("roll")?,
        department: text("department")?,
        semester: optional_semester(raw, "semester")?,
    };
    let student = directory::update_student(conn, &student_id, &patch)?;
    Ok(json!({ "student": student }))
}

fn delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let student_id = required_str(&req.params, "studentId")?;
    let results_deleted = directory::delete_student(conn, &student_id)?;
    Ok(json!({ "ok": true, "resultsDeleted": results_deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "students.list" => list(state, req),
        "students.get" => get(state, req),
        "students.create" => create(state, req),
        "students.update" => update(state, req),
        "students.delete" => delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
