use crate::calc::CalcError;
use crate::directory::DirectoryError;
use crate::draft::DraftError;
use crate::grading::{GradingOptions, Semester, ValidationError};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup;
use crate::results::{SubmitError, SubmitPolicy};
use log::error;
use rusqlite::Connection;
use serde_json::{json, Value};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn db(code: &'static str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", code, e);
        Self::new(code, e.to_string())
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<ValidationError> for HandlerErr {
    fn from(e: ValidationError) -> Self {
        HandlerErr::new("validation_failed", e.to_string()).with_details(json!({
            "kind": e.kind(),
            "field": e.field(),
        }))
    }
}

impl From<SubmitError> for HandlerErr {
    fn from(e: SubmitError) -> Self {
        if let SubmitError::Db(inner) = &e {
            return HandlerErr::db("db_update_failed", format!("{:#}", inner));
        }
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

impl From<DirectoryError> for HandlerErr {
    fn from(e: DirectoryError) -> Self {
        let details = match &e {
            DirectoryError::EmptyField(field) => Some(json!({ "field": field })),
            DirectoryError::DuplicateRoll(roll) => Some(json!({ "roll": roll })),
            DirectoryError::NotFound(id) => Some(json!({ "studentId": id })),
            DirectoryError::Db(inner) => {
                return HandlerErr::db("db_query_failed", format!("{:#}", inner));
            }
        };
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

impl From<DraftError> for HandlerErr {
    fn from(e: DraftError) -> Self {
        match &e {
            DraftError::Validation(v) => v.clone().into(),
            DraftError::InvalidTransition { from, action } => {
                HandlerErr::new("invalid_transition", e.to_string()).with_details(json!({
                    "state": from.as_str(),
                    "action": action,
                }))
            }
            DraftError::IndexOutOfRange { index, len } => HandlerErr::bad_params(e.to_string())
                .with_details(json!({ "index": index, "len": len })),
            DraftError::StudentFixed { stored, requested } => {
                HandlerErr::new("student_mismatch", e.to_string()).with_details(json!({
                    "studentId": stored,
                    "submittedStudentId": requested,
                }))
            }
        }
    }
}

impl From<CalcError> for HandlerErr {
    fn from(e: CalcError) -> Self {
        let code = match e.code.as_str() {
            "not_found" => "not_found",
            "bad_params" => "bad_params",
            _ => "db_query_failed",
        };
        HandlerErr {
            code,
            message: e.message,
            details: e.details,
        }
    }
}

pub fn respond(id: &str, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

/// Borrows only `db`; handlers keep mutable access to `drafts`.
pub fn require_conn(db: &Option<Connection>) -> Result<&Connection, HandlerErr> {
    db.as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn required_index(params: &Value, key: &str) -> Result<usize, HandlerErr> {
    match params.get(key).and_then(|v| v.as_u64()) {
        Some(n) => Ok(n as usize),
        None => Err(HandlerErr::bad_params(format!(
            "{} must be a non-negative integer",
            key
        ))),
    }
}

pub fn optional_semester(params: &Value, key: &str) -> Result<Option<Semester>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => Ok(Some(Semester::from_json(Some(v))?)),
    }
}

pub fn required_semester(params: &Value, key: &str) -> Result<Semester, HandlerErr> {
    Ok(Semester::from_json(params.get(key))?)
}

pub fn grading_settings(conn: &Connection) -> Result<(GradingOptions, SubmitPolicy), HandlerErr> {
    setup::load_grading_settings(conn)
        .map_err(|e| HandlerErr::db("db_query_failed", format!("{:#}", e)))
}

/// Workspace settings when a workspace is open, defaults otherwise.
pub fn grading_settings_or_default(
    db: &Option<Connection>,
) -> Result<(GradingOptions, SubmitPolicy), HandlerErr> {
    match db.as_ref() {
        Some(conn) => grading_settings(conn),
        None => Ok((GradingOptions::default(), SubmitPolicy::default())),
    }
}
