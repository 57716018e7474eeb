//! Persistence API for results.
//!
//! Every write re-runs the grading engine over the submitted marks; grade, point, CGPA and
//! status received from a client are only ever compared, never stored as-is.

use crate::draft::Submission;
use crate::grading::{
    aggregate, build_subject, credit_from_json, marks_from_json, Cgpa, Grade, GradingOptions,
    Outcome, ResultStatus, Semester, SubjectRecord, ValidationError,
};
use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use log::{info, warn};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DerivedFieldPolicy {
    #[default]
    Overwrite,
    Reject,
}

impl DerivedFieldPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Some(Self::Overwrite),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyPolicy {
    #[default]
    LastWriteWins,
    RequireRevision,
}

impl ConcurrencyPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last_write_wins" => Some(Self::LastWriteWins),
            "require_revision" => Some(Self::RequireRevision),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LastWriteWins => "last_write_wins",
            Self::RequireRevision => "require_revision",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubmitPolicy {
    pub derived: DerivedFieldPolicy,
    pub concurrency: ConcurrencyPolicy,
}

/// Derived values as computed by a client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimedDerived {
    pub cgpa: Option<serde_json::Value>,
    pub status: Option<String>,
    pub subjects: Vec<SubjectClaim>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectClaim {
    pub index: usize,
    pub grade: Option<String>,
    pub point: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMismatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_index: Option<usize>,
    pub field: &'static str,
    pub submitted: serde_json::Value,
    pub computed: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("{error}")]
    Validation {
        subject_index: Option<usize>,
        error: ValidationError,
    },
    #[error("student not found")]
    StudentNotFound(String),
    #[error("result not found")]
    ResultNotFound(String),
    #[error("a result already exists for this student and semester")]
    ResultExists { result_id: String },
    #[error("result {result_id} belongs to student {stored}, not {submitted}")]
    StudentMismatch {
        result_id: String,
        stored: String,
        submitted: String,
    },
    #[error("result was changed by another submission (expected revision {expected}, stored {actual})")]
    RevisionConflict { expected: i64, actual: i64 },
    #[error("replacing a result requires expectedRevision")]
    RevisionRequired { actual: i64 },
    #[error("submitted derived fields do not match the recomputed result")]
    DerivedMismatch(Vec<FieldMismatch>),
    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

impl From<ValidationError> for SubmitError {
    fn from(error: ValidationError) -> Self {
        SubmitError::Validation {
            subject_index: None,
            error,
        }
    }
}

impl SubmitError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_failed",
            Self::StudentNotFound(_) | Self::ResultNotFound(_) => "not_found",
            Self::ResultExists { .. } => "result_exists",
            Self::StudentMismatch { .. } => "student_mismatch",
            Self::RevisionConflict { .. } | Self::RevisionRequired { .. } => "revision_conflict",
            Self::DerivedMismatch(_) => "derived_mismatch",
            Self::Db(_) => "db_update_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation {
                subject_index,
                error,
            } => Some(json!({
                "kind": error.kind(),
                "field": error.field(),
                "subjectIndex": subject_index,
            })),
            Self::StudentNotFound(id) => Some(json!({ "studentId": id })),
            Self::ResultNotFound(id) => Some(json!({ "resultId": id })),
            Self::ResultExists { result_id } => Some(json!({ "resultId": result_id })),
            Self::StudentMismatch {
                result_id,
                stored,
                submitted,
            } => Some(json!({
                "resultId": result_id,
                "studentId": stored,
                "submittedStudentId": submitted,
            })),
            Self::RevisionConflict { expected, actual } => Some(json!({
                "expectedRevision": expected,
                "revision": actual,
            })),
            Self::RevisionRequired { actual } => Some(json!({ "revision": actual })),
            Self::DerivedMismatch(m) => Some(json!({ "mismatches": m })),
            Self::Db(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredSubject {
    pub subject_name: String,
    pub marks: i64,
    pub grade: String,
    pub point_hundredths: i64,
    pub credit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredResult {
    pub id: String,
    pub student_id: String,
    pub semester: Semester,
    pub subjects: Vec<StoredSubject>,
    pub cgpa_hundredths: i64,
    pub status: String,
    pub weighted: bool,
    pub revision: i64,
    pub checksum: String,
    pub submitted_at: String,
    pub updated_at: String,
}

impl StoredResult {
    pub fn to_json(&self) -> serde_json::Value {
        let subjects: Vec<serde_json::Value> = self
            .subjects
            .iter()
            .map(|s| {
                json!({
                    "subjectName": s.subject_name,
                    "marks": s.marks,
                    "grade": s.grade,
                    "point": s.point_hundredths as f64 / 100.0,
                    "credit": s.credit,
                })
            })
            .collect();
        json!({
            "resultId": self.id,
            "studentId": self.student_id,
            "semester": self.semester,
            "subjects": subjects,
            "cgpa": self.cgpa_hundredths as f64 / 100.0,
            "status": self.status,
            "weighted": self.weighted,
            "revision": self.revision,
            "checksum": self.checksum,
            "submittedAt": self.submitted_at,
            "updatedAt": self.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub result: StoredResult,
    pub created: bool,
    pub changed: bool,
    pub derived_overridden: Vec<FieldMismatch>,
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub records: Vec<SubjectRecord>,
    pub outcome: Outcome,
    pub issues: Vec<FieldMismatch>,
}

impl VerifyReport {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Reads `[{subjectName, marks, credit?, grade?, point?}]` through the Subject Record Builder.
pub fn parse_subjects(
    items: &[serde_json::Value],
) -> Result<(Vec<SubjectRecord>, Vec<SubjectClaim>), SubmitError> {
    let mut records: Vec<SubjectRecord> = Vec::with_capacity(items.len());
    let mut claims: Vec<SubjectClaim> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let at = |error: ValidationError| SubmitError::Validation {
            subject_index: Some(i),
            error,
        };
        let name = item
            .get("subjectName")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let marks = marks_from_json(item.get("marks")).map_err(at)?;
        let credit = credit_from_json(item.get("credit")).map_err(at)?;
        let record = build_subject(name, marks, &records)
            .and_then(|r| r.with_credit(credit))
            .map_err(at)?;
        records.push(record);

        let grade = item
            .get("grade")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let point = item.get("point").filter(|v| !v.is_null()).cloned();
        if grade.is_some() || point.is_some() {
            claims.push(SubjectClaim {
                index: i,
                grade,
                point,
            });
        }
    }
    Ok((records, claims))
}

/// Re-validates already built records, e.g. those held by a draft.
fn rebuild(subjects: &[SubjectRecord]) -> Result<Vec<SubjectRecord>, SubmitError> {
    if subjects.is_empty() {
        return Err(ValidationError::EmptySubjectList.into());
    }
    let mut out: Vec<SubjectRecord> = Vec::with_capacity(subjects.len());
    for (i, s) in subjects.iter().enumerate() {
        let record = build_subject(
            s.subject_name(),
            Some(i64::from(s.marks().value())),
            &out,
        )
        .and_then(|r| r.with_credit(s.credit()))
        .map_err(|error| SubmitError::Validation {
            subject_index: Some(i),
            error,
        })?;
        out.push(record);
    }
    Ok(out)
}

fn compare_claims(
    claimed: &ClaimedDerived,
    records: &[SubjectRecord],
    outcome: &Outcome,
) -> Vec<FieldMismatch> {
    let mut out: Vec<FieldMismatch> = Vec::new();
    if let Some(raw) = &claimed.cgpa {
        let matches = raw
            .as_f64()
            .and_then(Cgpa::from_f64)
            .map(|c| c == outcome.cgpa)
            .unwrap_or(false);
        if !matches {
            out.push(FieldMismatch {
                subject_index: None,
                field: "cgpa",
                submitted: raw.clone(),
                computed: json!(outcome.cgpa),
            });
        }
    }
    if let Some(status) = &claimed.status {
        if ResultStatus::parse(status) != Some(outcome.status) {
            out.push(FieldMismatch {
                subject_index: None,
                field: "status",
                submitted: json!(status),
                computed: json!(outcome.status),
            });
        }
    }
    for claim in &claimed.subjects {
        let Some(record) = records.get(claim.index) else {
            continue;
        };
        if let Some(grade) = &claim.grade {
            if Grade::parse(grade) != Some(record.grade()) {
                out.push(FieldMismatch {
                    subject_index: Some(claim.index),
                    field: "grade",
                    submitted: json!(grade),
                    computed: json!(record.grade()),
                });
            }
        }
        if let Some(point) = &claim.point {
            let matches = point
                .as_f64()
                .map(|p| (p * 100.0).round() as i64 == i64::from(record.point().hundredths()))
                .unwrap_or(false);
            if !matches {
                out.push(FieldMismatch {
                    subject_index: Some(claim.index),
                    field: "point",
                    submitted: point.clone(),
                    computed: json!(record.point()),
                });
            }
        }
    }
    out
}

pub fn content_checksum(
    student_id: &str,
    semester: Semester,
    subjects: &[SubjectRecord],
    weighted: bool,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(student_id.as_bytes());
    hasher.update(format!("\n{}\n{}\n", semester.ordinal(), weighted));
    for s in subjects {
        let credit = s.credit().map(|c| c.to_string()).unwrap_or_default();
        hasher.update(format!(
            "{}\t{}\t{}\n",
            s.subject_name(),
            s.marks().value(),
            credit
        ));
    }
    format!("{:x}", hasher.finalize())
}

pub fn student_exists(conn: &Connection, student_id: &str) -> anyhow::Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

pub fn find_result_id(
    conn: &Connection,
    student_id: &str,
    semester: Semester,
) -> anyhow::Result<Option<String>> {
    let id = conn
        .query_row(
            "SELECT id FROM results WHERE student_id = ? AND semester = ?",
            (student_id, semester.ordinal()),
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Create or replace a result. Returns the stored record after the write.
pub fn submit(
    conn: &Connection,
    submission: &Submission,
    claimed: &ClaimedDerived,
    opts: &GradingOptions,
    policy: &SubmitPolicy,
) -> Result<SubmitReceipt, SubmitError> {
    let student_id = submission.student_id.trim();
    if student_id.is_empty() {
        return Err(ValidationError::MissingStudent.into());
    }
    let records = rebuild(&submission.subjects)?;
    if !student_exists(conn, student_id).context("failed to look up student")? {
        return Err(SubmitError::StudentNotFound(student_id.to_string()));
    }

    let outcome = aggregate(&records, opts);
    let mismatches = compare_claims(claimed, &records, &outcome);
    if !mismatches.is_empty() {
        match policy.derived {
            DerivedFieldPolicy::Reject => return Err(SubmitError::DerivedMismatch(mismatches)),
            DerivedFieldPolicy::Overwrite => warn!(
                "overwriting {} client-derived field(s) for student {} semester {}",
                mismatches.len(),
                student_id,
                submission.semester
            ),
        }
    }

    let checksum = content_checksum(
        student_id,
        submission.semester,
        &records,
        opts.weight_by_credit,
    );
    let occupant = find_result_id(conn, student_id, submission.semester)
        .context("failed to look up existing result")?;

    let Some(result_id) = submission.result_id.as_deref() else {
        if let Some(existing) = occupant {
            return Err(SubmitError::ResultExists {
                result_id: existing,
            });
        }
        let id = Uuid::new_v4().to_string();
        write_result(
            conn,
            &id,
            student_id,
            submission.semester,
            &records,
            &outcome,
            opts,
            &checksum,
            1,
            None,
        )?;
        info!(
            "result {} created for student {} ({})",
            id, student_id, submission.semester
        );
        let result = load_result(conn, &id)?
            .ok_or_else(|| SubmitError::ResultNotFound(id.clone()))?;
        return Ok(SubmitReceipt {
            result,
            created: true,
            changed: true,
            derived_overridden: mismatches,
        });
    };

    let Some(stored) = load_result(conn, result_id)? else {
        return Err(SubmitError::ResultNotFound(result_id.to_string()));
    };
    if stored.student_id != student_id {
        warn!(
            "refusing to move result {} from student {} to {}",
            result_id, stored.student_id, student_id
        );
        return Err(SubmitError::StudentMismatch {
            result_id: result_id.to_string(),
            stored: stored.student_id,
            submitted: student_id.to_string(),
        });
    }
    match (submission.expected_revision, policy.concurrency) {
        (Some(expected), _) if expected != stored.revision => {
            warn!(
                "revision conflict on result {}: expected {}, stored {}",
                result_id, expected, stored.revision
            );
            return Err(SubmitError::RevisionConflict {
                expected,
                actual: stored.revision,
            });
        }
        (None, ConcurrencyPolicy::RequireRevision) => {
            return Err(SubmitError::RevisionRequired {
                actual: stored.revision,
            });
        }
        _ => {}
    }
    if let Some(existing) = occupant.filter(|id| id != result_id) {
        return Err(SubmitError::ResultExists {
            result_id: existing,
        });
    }

    let unchanged = stored.checksum == checksum
        && stored.cgpa_hundredths == i64::from(outcome.cgpa.hundredths())
        && stored.status == outcome.status.label();
    if unchanged {
        return Ok(SubmitReceipt {
            result: stored,
            created: false,
            changed: false,
            derived_overridden: mismatches,
        });
    }

    let revision = stored.revision + 1;
    write_result(
        conn,
        result_id,
        student_id,
        submission.semester,
        &records,
        &outcome,
        opts,
        &checksum,
        revision,
        Some(&stored.submitted_at),
    )?;
    info!(
        "result {} replaced for student {} ({}), revision {}",
        result_id, student_id, submission.semester, revision
    );
    let result = load_result(conn, result_id)?
        .ok_or_else(|| SubmitError::ResultNotFound(result_id.to_string()))?;
    Ok(SubmitReceipt {
        result,
        created: false,
        changed: true,
        derived_overridden: mismatches,
    })
}

#[allow(clippy::too_many_arguments)]
fn write_result(
    conn: &Connection,
    result_id: &str,
    student_id: &str,
    semester: Semester,
    records: &[SubjectRecord],
    outcome: &Outcome,
    opts: &GradingOptions,
    checksum: &str,
    revision: i64,
    submitted_at: Option<&str>,
) -> anyhow::Result<()> {
    let now = now_rfc3339();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM result_subjects WHERE result_id = ?",
        [result_id],
    )?;
    tx.execute(
        "INSERT INTO results(
           id, student_id, semester, cgpa_hundredths, status, revision, checksum, weighted,
           submitted_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           student_id = excluded.student_id,
           semester = excluded.semester,
           cgpa_hundredths = excluded.cgpa_hundredths,
           status = excluded.status,
           revision = excluded.revision,
           checksum = excluded.checksum,
           weighted = excluded.weighted,
           updated_at = excluded.updated_at",
        (
            result_id,
            student_id,
            semester.ordinal(),
            i64::from(outcome.cgpa.hundredths()),
            outcome.status.label(),
            revision,
            checksum,
            i64::from(opts.weight_by_credit),
            submitted_at.unwrap_or(&now),
            &now,
        ),
    )
    .context("failed to write result")?;
    for (idx, s) in records.iter().enumerate() {
        tx.execute(
            "INSERT INTO result_subjects(
               result_id, idx, subject_name, marks, grade, point_hundredths, credit
             ) VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                result_id,
                idx as i64,
                s.subject_name(),
                i64::from(s.marks().value()),
                s.grade().label(),
                i64::from(s.point().hundredths()),
                s.credit(),
            ),
        )
        .context("failed to write result subject")?;
    }
    tx.commit()?;
    Ok(())
}

fn load_subjects(conn: &Connection, result_id: &str) -> anyhow::Result<Vec<StoredSubject>> {
    let mut stmt = conn.prepare(
        "SELECT subject_name, marks, grade, point_hundredths, credit
         FROM result_subjects
         WHERE result_id = ?
         ORDER BY idx",
    )?;
    let rows = stmt
        .query_map([result_id], |r| {
            Ok(StoredSubject {
                subject_name: r.get(0)?,
                marks: r.get(1)?,
                grade: r.get(2)?,
                point_hundredths: r.get(3)?,
                credit: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

const RESULT_COLUMNS: &str = "r.id, r.student_id, r.semester, r.cgpa_hundredths, r.status, r.weighted,
     r.revision, r.checksum, r.submitted_at, r.updated_at";

fn row_to_result(r: &rusqlite::Row<'_>) -> rusqlite::Result<(StoredResult, i64)> {
    let semester_raw: i64 = r.get(2)?;
    Ok((
        StoredResult {
            id: r.get(0)?,
            student_id: r.get(1)?,
            semester: Semester::from_ordinal(semester_raw).unwrap_or(Semester::First),
            subjects: Vec::new(),
            cgpa_hundredths: r.get(3)?,
            status: r.get(4)?,
            weighted: r.get::<_, i64>(5)? != 0,
            revision: r.get(6)?,
            checksum: r.get(7)?,
            submitted_at: r.get(8)?,
            updated_at: r.get(9)?,
        },
        semester_raw,
    ))
}

pub fn load_result(conn: &Connection, result_id: &str) -> anyhow::Result<Option<StoredResult>> {
    let sql = format!("SELECT {} FROM results r WHERE r.id = ?", RESULT_COLUMNS);
    let row = conn
        .query_row(&sql, [result_id], row_to_result)
        .optional()
        .context("failed to load result")?;
    let Some((mut result, semester_raw)) = row else {
        return Ok(None);
    };
    if Semester::from_ordinal(semester_raw).is_none() {
        anyhow::bail!("result {} has invalid semester {}", result_id, semester_raw);
    }
    result.subjects = load_subjects(conn, result_id)?;
    Ok(Some(result))
}

#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub student_id: Option<String>,
    pub semester: Option<Semester>,
    pub department: Option<String>,
}

pub fn list_results(conn: &Connection, filter: &ResultFilter) -> anyhow::Result<Vec<StoredResult>> {
    let mut sql = format!(
        "SELECT {} FROM results r JOIN students s ON s.id = r.student_id WHERE 1 = 1",
        RESULT_COLUMNS
    );
    let mut binds: Vec<Value> = Vec::new();
    if let Some(id) = &filter.student_id {
        sql.push_str(" AND r.student_id = ?");
        binds.push(Value::Text(id.clone()));
    }
    if let Some(sem) = filter.semester {
        sql.push_str(" AND r.semester = ?");
        binds.push(Value::Integer(sem.ordinal()));
    }
    if let Some(dept) = &filter.department {
        sql.push_str(" AND s.department = ? COLLATE NOCASE");
        binds.push(Value::Text(dept.clone()));
    }
    sql.push_str(" ORDER BY s.sort_order, r.semester DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), row_to_result)?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(rows.len());
    for (mut result, _) in rows {
        result.subjects = load_subjects(conn, &result.id)?;
        out.push(result);
    }
    Ok(out)
}

pub fn delete_result(conn: &Connection, result_id: &str) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM result_subjects WHERE result_id = ?",
        [result_id],
    )?;
    let n = tx.execute("DELETE FROM results WHERE id = ?", [result_id])?;
    tx.commit()?;
    if n > 0 {
        info!("result {} deleted", result_id);
    }
    Ok(n > 0)
}

/// Recompute a stored result from its marks alone and list every stored field that disagrees.
pub fn verify(stored: &StoredResult, opts: &GradingOptions) -> VerifyReport {
    let opts = GradingOptions {
        weight_by_credit: stored.weighted,
        ..*opts
    };
    let mut records: Vec<SubjectRecord> = Vec::with_capacity(stored.subjects.len());
    let mut issues: Vec<FieldMismatch> = Vec::new();

    for (i, s) in stored.subjects.iter().enumerate() {
        let built = build_subject(&s.subject_name, Some(s.marks), &records)
            .and_then(|r| r.with_credit(s.credit));
        let record = match built {
            Ok(r) => r,
            Err(e) => {
                issues.push(FieldMismatch {
                    subject_index: Some(i),
                    field: e.field(),
                    submitted: json!({ "subjectName": s.subject_name, "marks": s.marks }),
                    computed: json!(e.to_string()),
                });
                continue;
            }
        };
        if s.grade != record.grade().label() {
            issues.push(FieldMismatch {
                subject_index: Some(i),
                field: "grade",
                submitted: json!(s.grade),
                computed: json!(record.grade()),
            });
        }
        if s.point_hundredths != i64::from(record.point().hundredths()) {
            issues.push(FieldMismatch {
                subject_index: Some(i),
                field: "point",
                submitted: json!(s.point_hundredths as f64 / 100.0),
                computed: json!(record.point()),
            });
        }
        records.push(record);
    }

    let outcome = aggregate(&records, &opts);
    if stored.cgpa_hundredths != i64::from(outcome.cgpa.hundredths()) {
        issues.push(FieldMismatch {
            subject_index: None,
            field: "cgpa",
            submitted: json!(stored.cgpa_hundredths as f64 / 100.0),
            computed: json!(outcome.cgpa),
        });
    }
    if stored.status != outcome.status.label() {
        issues.push(FieldMismatch {
            subject_index: None,
            field: "status",
            submitted: json!(stored.status),
            computed: json!(outcome.status),
        });
    }

    VerifyReport {
        records,
        outcome,
        issues,
    }
}
