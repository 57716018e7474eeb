use crate::grading::{
    aggregate, build_subject, GradingOptions, Marks, Outcome, Semester, SubjectRecord,
    ValidationError,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;

/// Submitted drafts kept per session for inspection; older ones are dropped.
pub const MAX_SUBMITTED_DRAFTS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftState {
    Empty,
    Partial,
    Submitted,
    /// Reopened copy of a persisted result; behaves as `Partial`.
    Editing,
}

impl DraftState {
    pub fn as_str(self) -> &'static str {
        match self {
            DraftState::Empty => "empty",
            DraftState::Partial => "partial",
            DraftState::Submitted => "submitted",
            DraftState::Editing => "editing",
        }
    }
}

impl fmt::Display for DraftState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DraftError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("cannot {action} a draft in state {from}")]
    InvalidTransition { from: DraftState, action: &'static str },
    #[error("subject index {index} out of range (draft has {len} subjects)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("a reopened result stays with student {stored}")]
    StudentFixed {
        stored: String,
        requested: Option<String>,
    },
}

/// Everything the Persistence API needs to create or replace a result.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub result_id: Option<String>,
    pub student_id: String,
    pub semester: Semester,
    pub subjects: Vec<SubjectRecord>,
    pub expected_revision: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ResultDraft {
    id: String,
    seq: u64,
    student_id: Option<String>,
    semester: Option<Semester>,
    subjects: Vec<SubjectRecord>,
    state: DraftState,
    result_id: Option<String>,
    revision: Option<i64>,
    opened_at: DateTime<Utc>,
}

impl ResultDraft {
    pub fn new(id: String, seq: u64) -> Self {
        Self {
            id,
            seq,
            student_id: None,
            semester: None,
            subjects: Vec::new(),
            state: DraftState::Empty,
            result_id: None,
            revision: None,
            opened_at: Utc::now(),
        }
    }

    /// Editable copy of a persisted result.
    pub fn reopen(
        id: String,
        seq: u64,
        result_id: String,
        student_id: String,
        semester: Semester,
        subjects: Vec<SubjectRecord>,
        revision: i64,
    ) -> Self {
        Self {
            id,
            seq,
            student_id: Some(student_id),
            semester: Some(semester),
            subjects,
            state: DraftState::Editing,
            result_id: Some(result_id),
            revision: Some(revision),
            opened_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn state(&self) -> DraftState {
        self.state
    }

    fn ensure_mutable(&self, action: &'static str) -> Result<(), DraftError> {
        if self.state == DraftState::Submitted {
            return Err(DraftError::InvalidTransition {
                from: self.state,
                action,
            });
        }
        Ok(())
    }

    fn settle(&mut self) {
        if self.state == DraftState::Editing {
            return;
        }
        self.state = if self.subjects.is_empty() {
            DraftState::Empty
        } else {
            DraftState::Partial
        };
    }

    pub fn set_student(&mut self, student_id: Option<String>) -> Result<(), DraftError> {
        self.ensure_mutable("edit")?;
        let student_id = student_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if self.state == DraftState::Editing && student_id != self.student_id {
            return Err(DraftError::StudentFixed {
                stored: self.student_id.clone().unwrap_or_default(),
                requested: student_id,
            });
        }
        self.student_id = student_id;
        Ok(())
    }

    pub fn set_semester(&mut self, semester: Option<Semester>) -> Result<(), DraftError> {
        self.ensure_mutable("edit")?;
        self.semester = semester;
        Ok(())
    }

    pub fn add_subject(
        &mut self,
        name: &str,
        marks: Option<i64>,
        credit: Option<f64>,
    ) -> Result<&SubjectRecord, DraftError> {
        self.ensure_mutable("add a subject to")?;
        let record = build_subject(name, marks, &self.subjects)?.with_credit(credit)?;
        self.subjects.push(record);
        self.settle();
        Ok(&self.subjects[self.subjects.len() - 1])
    }

    pub fn update_subject_marks(
        &mut self,
        index: usize,
        marks: Option<i64>,
    ) -> Result<&SubjectRecord, DraftError> {
        self.ensure_mutable("edit a subject of")?;
        let len = self.subjects.len();
        let Some(current) = self.subjects.get(index) else {
            return Err(DraftError::IndexOutOfRange { index, len });
        };
        let Some(marks) = marks else {
            return Err(ValidationError::MissingMarks.into());
        };
        let updated = current.with_marks(Marks::new(marks)?);
        self.subjects[index] = updated;
        Ok(&self.subjects[index])
    }

    pub fn remove_subject(&mut self, index: usize) -> Result<SubjectRecord, DraftError> {
        self.ensure_mutable("remove a subject from")?;
        if index >= self.subjects.len() {
            return Err(DraftError::IndexOutOfRange {
                index,
                len: self.subjects.len(),
            });
        }
        let removed = self.subjects.remove(index);
        self.settle();
        Ok(removed)
    }

    /// Fresh on every call; never cached.
    pub fn outcome(&self, opts: &GradingOptions) -> Outcome {
        aggregate(&self.subjects, opts)
    }

    /// Guards `Partial/Editing -> Submitted`.
    pub fn submission(&self) -> Result<Submission, DraftError> {
        self.ensure_mutable("submit")?;
        let Some(student_id) = self.student_id.clone() else {
            return Err(ValidationError::MissingStudent.into());
        };
        let Some(semester) = self.semester else {
            return Err(ValidationError::MissingSemester.into());
        };
        if self.subjects.is_empty() {
            return Err(ValidationError::EmptySubjectList.into());
        }
        Ok(Submission {
            result_id: self.result_id.clone(),
            student_id,
            semester,
            subjects: self.subjects.clone(),
            expected_revision: self.revision,
        })
    }

    pub fn mark_submitted(&mut self, result_id: String, revision: i64) {
        self.result_id = Some(result_id);
        self.revision = Some(revision);
        self.state = DraftState::Submitted;
    }

    pub fn to_json(&self, opts: &GradingOptions) -> serde_json::Value {
        let outcome = self.outcome(opts);
        json!({
            "draftId": self.id,
            "state": self.state.as_str(),
            "studentId": self.student_id,
            "semester": self.semester,
            "resultId": self.result_id,
            "revision": self.revision,
            "subjects": self.subjects,
            "cgpa": outcome.cgpa,
            "status": outcome.status,
            "openedAt": self.opened_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }
}

/// Drops the oldest submitted drafts beyond `keep`, never `current`. Returns how many went.
pub fn prune_submitted(
    drafts: &mut HashMap<String, ResultDraft>,
    current: &str,
    keep: usize,
) -> usize {
    let mut submitted: Vec<(u64, String)> = drafts
        .values()
        .filter(|d| d.state == DraftState::Submitted && d.id != current)
        .map(|d| (d.seq, d.id.clone()))
        .collect();
    let limit = keep.saturating_sub(1);
    if submitted.len() <= limit {
        return 0;
    }
    submitted.sort();
    let excess = submitted.len() - limit;
    for (_, id) in submitted.into_iter().take(excess) {
        drafts.remove(&id);
    }
    excess
}
