use crate::draft::Submission;
use crate::grading::{has_failing_subject, is_below_passing_cgpa, ValidationError};
use crate::ipc::helpers::{
    grading_settings, optional_semester, optional_str, require_conn, required_semester,
    required_str, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::results::{self, ClaimedDerived, ResultFilter, VerifyReport};
use serde_json::{json, Value};

fn db_err(e: anyhow::Error) -> HandlerErr {
    HandlerErr::db("db_query_failed", format!("{:#}", e))
}

fn list(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let filter = ResultFilter {
        student_id: optional_str(&req.params, "studentId"),
        semester: optional_semester(&req.params, "semester")?,
        department: optional_str(&req.params, "department"),
    };
    let rows = results::list_results(conn, &filter).map_err(db_err)?;
    let rows: Vec<Value> = rows.iter().map(|r| r.to_json()).collect();
    Ok(json!({ "results": rows }))
}

fn get(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let result_id = required_str(&req.params, "resultId")?;
    let stored = results::load_result(conn, &result_id)
        .map_err(db_err)?
        .ok_or_else(|| HandlerErr::not_found("result not found"))?;
    Ok(json!({ "result": stored.to_json() }))
}

fn submit(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, policy) = grading_settings(conn)?;
    let p = &req.params;

    let student_id = optional_str(p, "studentId")
        .ok_or_else(|| HandlerErr::from(ValidationError::MissingStudent))?;
    let semester = required_semester(p, "semester")?;
    let items = match p.get("subjects") {
        Some(Value::Array(items)) => items.as_slice(),
        None | Some(Value::Null) => &[][..],
        Some(_) => return Err(HandlerErr::bad_params("subjects must be an array")),
    };
    let (subjects, subject_claims) = results::parse_subjects(items)?;
    let expected_revision = match p.get("expectedRevision") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_i64()
                .ok_or_else(|| HandlerErr::bad_params("expectedRevision must be an integer"))?,
        ),
    };

    let submission = Submission {
        result_id: optional_str(p, "resultId"),
        student_id,
        semester,
        subjects,
        expected_revision,
    };
    let claimed = ClaimedDerived {
        cgpa: p.get("cgpa").filter(|v| !v.is_null()).cloned(),
        status: optional_str(p, "status"),
        subjects: subject_claims,
    };
    let receipt = results::submit(conn, &submission, &claimed, &opts, &policy)?;
    Ok(json!({
        "resultId": receipt.result.id,
        "revision": receipt.result.revision,
        "created": receipt.created,
        "changed": receipt.changed,
        "derivedOverridden": !receipt.derived_overridden.is_empty(),
        "overrides": receipt.derived_overridden,
        "result": receipt.result.to_json(),
    }))
}

pub(crate) fn inconsistent(result_id: &str, report: &VerifyReport) -> HandlerErr {
    HandlerErr::new(
        "inconsistent_record",
        "stored result does not match a recomputation from its marks",
    )
    .with_details(json!({ "resultId": result_id, "issues": report.issues }))
}

fn verify(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, _) = grading_settings(conn)?;
    let result_id = required_str(&req.params, "resultId")?;
    let stored = results::load_result(conn, &result_id)
        .map_err(db_err)?
        .ok_or_else(|| HandlerErr::not_found("result not found"))?;
    let report = results::verify(&stored, &opts);
    if !report.is_consistent() {
        return Err(inconsistent(&result_id, &report));
    }
    let below = is_below_passing_cgpa(report.outcome.cgpa, opts.passing_cgpa);
    let any_f = has_failing_subject(&report.records);
    Ok(json!({
        "resultId": result_id,
        "consistent": true,
        "cgpa": report.outcome.cgpa,
        "status": report.outcome.status,
        "belowPassingCgpa": below,
        "rulesDisagree": any_f != below,
    }))
}

fn delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let result_id = required_str(&req.params, "resultId")?;
    let deleted = results::delete_result(conn, &result_id)
        .map_err(|e| HandlerErr::db("db_delete_failed", format!("{:#}", e)))?;
    if !deleted {
        return Err(HandlerErr::not_found("result not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "results.list" => list(state, req),
        "results.get" => get(state, req),
        "results.submit" => submit(state, req),
        "results.verify" => verify(state, req),
        "results.delete" => delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
