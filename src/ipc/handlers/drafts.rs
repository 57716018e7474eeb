use crate::draft::{prune_submitted, ResultDraft, MAX_SUBMITTED_DRAFTS};
use crate::grading::{credit_from_json, marks_from_json};
use crate::ipc::handlers::results::inconsistent;
use crate::ipc::helpers::{
    grading_settings, optional_semester, optional_str, require_conn, required_index, required_str,
    respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::results::{self, student_exists, ClaimedDerived};
use log::{debug, info};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

fn draft_mut<'a>(
    drafts: &'a mut HashMap<String, ResultDraft>,
    params: &Value,
) -> Result<&'a mut ResultDraft, HandlerErr> {
    let id = required_str(params, "draftId")?;
    drafts.get_mut(&id).ok_or_else(|| {
        HandlerErr::not_found("draft not found").with_details(json!({ "draftId": id }))
    })
}

fn ensure_student(conn: &Connection, student_id: &str) -> Result<(), HandlerErr> {
    let found = student_exists(conn, student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", format!("{:#}", e)))?;
    if !found {
        return Err(HandlerErr::not_found("student not found")
            .with_details(json!({ "studentId": student_id })));
    }
    Ok(())
}

fn next_seq(state: &mut AppState) -> u64 {
    let seq = state.next_draft_seq;
    state.next_draft_seq += 1;
    seq
}

fn open(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, _) = grading_settings(conn)?;
    let student_id = optional_str(&req.params, "studentId");
    if let Some(id) = &student_id {
        ensure_student(conn, id)?;
    }
    let semester = optional_semester(&req.params, "semester")?;

    let seq = next_seq(state);
    let mut draft = ResultDraft::new(Uuid::new_v4().to_string(), seq);
    draft.set_student(student_id)?;
    draft.set_semester(semester)?;
    let body = draft.to_json(&opts);
    debug!("draft {} opened", draft.id());
    state.drafts.insert(draft.id().to_string(), draft);
    Ok(json!({ "draft": body }))
}

fn reopen(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, _) = grading_settings(conn)?;
    let result_id = required_str(&req.params, "resultId")?;
    let stored = results::load_result(conn, &result_id)
        .map_err(|e| HandlerErr::db("db_query_failed", format!("{:#}", e)))?
        .ok_or_else(|| HandlerErr::not_found("result not found"))?;
    let report = results::verify(&stored, &opts);
    if !report.is_consistent() {
        return Err(inconsistent(&result_id, &report));
    }

    let seq = next_seq(state);
    let draft = ResultDraft::reopen(
        Uuid::new_v4().to_string(),
        seq,
        stored.id,
        stored.student_id,
        stored.semester,
        report.records,
        stored.revision,
    );
    let body = draft.to_json(&opts);
    debug!("draft {} reopened from result {}", draft.id(), result_id);
    state.drafts.insert(draft.id().to_string(), draft);
    Ok(json!({ "draft": body }))
}

fn get(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, _) = grading_settings(conn)?;
    let draft = draft_mut(&mut state.drafts, &req.params)?;
    Ok(json!({ "draft": draft.to_json(&opts) }))
}

fn list(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, _) = grading_settings(conn)?;
    let mut drafts: Vec<&ResultDraft> = state.drafts.values().collect();
    drafts.sort_by_key(|d| d.seq());
    let drafts: Vec<Value> = drafts.iter().map(|d| d.to_json(&opts)).collect();
    Ok(json!({ "drafts": drafts }))
}

fn update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, _) = grading_settings(conn)?;
    let p = &req.params;
    let student = match p.get("studentId") {
        None => None,
        Some(Value::Null) => Some(None),
        Some(Value::String(s)) if s.trim().is_empty() => Some(None),
        Some(Value::String(s)) => {
            ensure_student(conn, s.trim())?;
            Some(Some(s.trim().to_string()))
        }
        Some(_) => return Err(HandlerErr::bad_params("studentId must be string or null")),
    };
    let semester = if p.get("semester").is_some() {
        Some(optional_semester(p, "semester")?)
    } else {
        None
    };

    let draft = draft_mut(&mut state.drafts, p)?;
    if let Some(student) = student {
        draft.set_student(student)?;
    }
    if let Some(semester) = semester {
        draft.set_semester(semester)?;
    }
    Ok(json!({ "draft": draft.to_json(&opts) }))
}

fn add_subject(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, _) = grading_settings(conn)?;
    let p = &req.params;
    let name = p.get("subjectName").and_then(|v| v.as_str()).unwrap_or("");
    let marks = marks_from_json(p.get("marks"))?;
    let credit = credit_from_json(p.get("credit"))?;

    let draft = draft_mut(&mut state.drafts, p)?;
    let subject = serde_json::to_value(draft.add_subject(name, marks, credit)?)
        .map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    Ok(json!({ "subject": subject, "draft": draft.to_json(&opts) }))
}

fn update_subject(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, _) = grading_settings(conn)?;
    let p = &req.params;
    let index = required_index(p, "index")?;
    let marks = marks_from_json(p.get("marks"))?;

    let draft = draft_mut(&mut state.drafts, p)?;
    let subject = serde_json::to_value(draft.update_subject_marks(index, marks)?)
        .map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    Ok(json!({ "subject": subject, "draft": draft.to_json(&opts) }))
}

fn remove_subject(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, _) = grading_settings(conn)?;
    let index = required_index(&req.params, "index")?;
    let draft = draft_mut(&mut state.drafts, &req.params)?;
    let removed = draft.remove_subject(index)?;
    Ok(json!({
        "removed": removed.subject_name(),
        "draft": draft.to_json(&opts),
    }))
}

fn submit(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_conn(&state.db)?;
    let (opts, policy) = grading_settings(conn)?;
    let draft = draft_mut(&mut state.drafts, &req.params)?;
    let submission = draft.submission()?;
    let receipt = results::submit(conn, &submission, &ClaimedDerived::default(), &opts, &policy)?;
    draft.mark_submitted(receipt.result.id.clone(), receipt.result.revision);
    info!(
        "draft {} submitted as result {} (revision {})",
        draft.id(),
        receipt.result.id,
        receipt.result.revision
    );
    let draft_id = draft.id().to_string();
    let body = draft.to_json(&opts);
    let pruned = prune_submitted(&mut state.drafts, &draft_id, MAX_SUBMITTED_DRAFTS);
    if pruned > 0 {
        debug!("dropped {} older submitted drafts", pruned);
    }
    Ok(json!({
        "draft": body,
        "resultId": receipt.result.id,
        "revision": receipt.result.revision,
        "created": receipt.created,
        "changed": receipt.changed,
        "result": receipt.result.to_json(),
    }))
}

fn discard(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    require_conn(&state.db)?;
    let id = required_str(&req.params, "draftId")?;
    match state.drafts.remove(&id) {
        Some(d) => {
            debug!("draft {} discarded in state {}", id, d.state());
            Ok(json!({ "ok": true }))
        }
        None => {
            Err(HandlerErr::not_found("draft not found").with_details(json!({ "draftId": id })))
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "drafts.open" => open(state, req),
        "drafts.reopen" => reopen(state, req),
        "drafts.get" => get(state, req),
        "drafts.list" => list(state, req),
        "drafts.update" => update(state, req),
        "drafts.addSubject" => add_subject(state, req),
        "drafts.updateSubject" => update_subject(state, req),
        "drafts.removeSubject" => remove_subject(state, req),
        "drafts.submit" => submit(state, req),
        "drafts.discard" => discard(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
