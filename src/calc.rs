use crate::directory::{self, Student, StudentQuery};
use crate::grading::{
    aggregate, has_failing_subject, is_below_passing_cgpa, Cgpa, Grade, GradingOptions, RowCgpa,
    Semester, SubjectRecord,
};
use crate::results::{self, ResultFilter, StoredResult};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn db(e: anyhow::Error) -> Self {
        log::error!("report query failed: {:#}", e);
        Self::new("db_query_failed", e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CalcContext<'a> {
    pub conn: &'a Connection,
    pub opts: &'a GradingOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CgpaStats {
    pub count: usize,
    pub average: RowCgpa,
    pub highest: RowCgpa,
    pub lowest: RowCgpa,
}

pub fn cgpa_stats(values: &[Cgpa]) -> CgpaStats {
    if values.is_empty() {
        return CgpaStats {
            count: 0,
            average: RowCgpa::NotComputable,
            highest: RowCgpa::NotComputable,
            lowest: RowCgpa::NotComputable,
        };
    }
    let n = values.len() as u64;
    let sum: u64 = values.iter().map(|c| u64::from(c.hundredths())).sum();
    let avg = ((2 * sum + n) / (2 * n)) as u16;
    let highest = values.iter().copied().max().unwrap_or_default();
    let lowest = values.iter().copied().min().unwrap_or_default();
    CgpaStats {
        count: values.len(),
        average: RowCgpa::Computed(Cgpa::from_hundredths(avg)),
        highest: RowCgpa::Computed(highest),
        lowest: RowCgpa::Computed(lowest),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradeCount {
    pub grade: Grade,
    pub count: usize,
}

/// Counts per grade tier, highest tier first, zero counts included.
pub fn grade_distribution<'a, I>(records: I) -> Vec<GradeCount>
where
    I: IntoIterator<Item = &'a SubjectRecord>,
{
    let mut counts: HashMap<Grade, usize> = HashMap::new();
    for r in records {
        *counts.entry(r.grade()).or_insert(0) += 1;
    }
    Grade::ALL
        .iter()
        .map(|g| GradeCount {
            grade: *g,
            count: counts.get(g).copied().unwrap_or(0),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRow {
    pub student_id: String,
    pub name: String,
    pub roll: String,
    pub department: String,
    pub result_id: String,
    pub subject_count: usize,
    pub cgpa: Cgpa,
    pub status: String,
    pub has_failing_subject: bool,
    pub below_passing_cgpa: bool,
    /// The any-F rule and the CGPA threshold rule give different answers.
    pub rules_disagree: bool,
    pub consistent: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub result_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub below_passing_cgpa: usize,
    pub rules_disagree: usize,
    pub cgpa: CgpaStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterSummary {
    pub semester: Semester,
    pub department: Option<String>,
    pub passing_cgpa: Cgpa,
    pub rows: Vec<OutcomeRow>,
    pub stats: SummaryStats,
    pub grade_distribution: Vec<GradeCount>,
}

struct Evaluated {
    result: StoredResult,
    records: Vec<SubjectRecord>,
    cgpa: Cgpa,
    status: String,
    consistent: bool,
}

fn evaluate(stored: StoredResult, opts: &GradingOptions) -> Evaluated {
    let report = results::verify(&stored, opts);
    Evaluated {
        cgpa: report.outcome.cgpa,
        status: report.outcome.status.label().to_string(),
        consistent: report.is_consistent(),
        records: report.records,
        result: stored,
    }
}

fn students_by_id(conn: &Connection) -> Result<HashMap<String, Student>, CalcError> {
    let students = directory::list_students(conn, &StudentQuery::default()).map_err(CalcError::db)?;
    Ok(students.into_iter().map(|s| (s.id.clone(), s)).collect())
}

pub fn semester_summary(
    ctx: &CalcContext<'_>,
    semester: Semester,
    department: Option<&str>,
) -> Result<SemesterSummary, CalcError> {
    let students = students_by_id(ctx.conn)?;
    let stored = results::list_results(
        ctx.conn,
        &ResultFilter {
            student_id: None,
            semester: Some(semester),
            department: department.map(|d| d.to_string()),
        },
    )
    .map_err(CalcError::db)?;

    let evaluated: Vec<Evaluated> = stored.into_iter().map(|r| evaluate(r, ctx.opts)).collect();

    let mut rows: Vec<OutcomeRow> = Vec::with_capacity(evaluated.len());
    for e in &evaluated {
        let Some(student) = students.get(&e.result.student_id) else {
            continue;
        };
        let any_f = has_failing_subject(&e.records);
        let below = is_below_passing_cgpa(e.cgpa, ctx.opts.passing_cgpa);
        rows.push(OutcomeRow {
            student_id: student.id.clone(),
            name: student.name.clone(),
            roll: student.roll.clone(),
            department: student.department.clone(),
            result_id: e.result.id.clone(),
            subject_count: e.records.len(),
            cgpa: e.cgpa,
            status: e.status.clone(),
            has_failing_subject: any_f,
            below_passing_cgpa: below,
            rules_disagree: any_f != below,
            consistent: e.consistent,
        });
    }

    let cgpas: Vec<Cgpa> = rows.iter().map(|r| r.cgpa).collect();
    let stats = SummaryStats {
        result_count: rows.len(),
        passed: rows.iter().filter(|r| !r.has_failing_subject).count(),
        failed: rows.iter().filter(|r| r.has_failing_subject).count(),
        below_passing_cgpa: rows.iter().filter(|r| r.below_passing_cgpa).count(),
        rules_disagree: rows.iter().filter(|r| r.rules_disagree).count(),
        cgpa: cgpa_stats(&cgpas),
    };
    let grade_distribution = grade_distribution(evaluated.iter().flat_map(|e| e.records.iter()));

    Ok(SemesterSummary {
        semester,
        department: department.map(|d| d.to_string()),
        passing_cgpa: ctx.opts.passing_cgpa,
        rows,
        stats,
        grade_distribution,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSemester {
    pub semester: Semester,
    pub result_id: String,
    pub subjects: Vec<SubjectRecord>,
    pub cgpa: Cgpa,
    pub status: String,
    pub below_passing_cgpa: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub student: Student,
    pub semesters: Vec<TranscriptSemester>,
    /// Mean over every subject of every semester.
    pub cumulative_cgpa: RowCgpa,
    pub total_subjects: usize,
    pub failed_subjects: usize,
}

pub fn transcript(ctx: &CalcContext<'_>, student_id: &str) -> Result<Transcript, CalcError> {
    let student = directory::get_student(ctx.conn, student_id)
        .map_err(CalcError::db)?
        .ok_or_else(|| CalcError::new("not_found", "student not found"))?;
    let stored = results::list_results(
        ctx.conn,
        &ResultFilter {
            student_id: Some(student_id.to_string()),
            ..ResultFilter::default()
        },
    )
    .map_err(CalcError::db)?;

    let mut all: Vec<SubjectRecord> = Vec::new();
    let mut semesters: Vec<TranscriptSemester> = Vec::with_capacity(stored.len());
    for e in stored.into_iter().map(|r| evaluate(r, ctx.opts)) {
        all.extend(e.records.iter().cloned());
        semesters.push(TranscriptSemester {
            semester: e.result.semester,
            result_id: e.result.id.clone(),
            below_passing_cgpa: is_below_passing_cgpa(e.cgpa, ctx.opts.passing_cgpa),
            subjects: e.records,
            cgpa: e.cgpa,
            status: e.status,
        });
    }
    semesters.sort_by_key(|s| s.semester);

    let cumulative_cgpa = if all.is_empty() {
        RowCgpa::NotComputable
    } else {
        RowCgpa::Computed(aggregate(&all, ctx.opts).cgpa)
    };
    Ok(Transcript {
        student,
        semesters,
        cumulative_cgpa,
        total_subjects: all.len(),
        failed_subjects: all.iter().filter(|r| r.grade().is_fail()).count(),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentTotals {
    pub department: String,
    pub student_count: usize,
    pub result_count: usize,
    pub average_cgpa: RowCgpa,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub student_count: usize,
    pub result_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub below_passing_cgpa: usize,
    pub departments: Vec<DepartmentTotals>,
}

pub fn dashboard(ctx: &CalcContext<'_>) -> Result<Dashboard, CalcError> {
    let students = students_by_id(ctx.conn)?;
    let stored =
        results::list_results(ctx.conn, &ResultFilter::default()).map_err(CalcError::db)?;

    let mut per_dept: BTreeMap<String, (usize, Vec<Cgpa>)> = BTreeMap::new();
    for s in students.values() {
        per_dept.entry(s.department.clone()).or_default().0 += 1;
    }

    let mut passed = 0;
    let mut failed = 0;
    let mut below = 0;
    for e in stored.into_iter().map(|r| evaluate(r, ctx.opts)) {
        if has_failing_subject(&e.records) {
            failed += 1;
        } else {
            passed += 1;
        }
        if is_below_passing_cgpa(e.cgpa, ctx.opts.passing_cgpa) {
            below += 1;
        }
        if let Some(s) = students.get(&e.result.student_id) {
            per_dept
                .entry(s.department.clone())
                .or_default()
                .1
                .push(e.cgpa);
        }
    }

    let departments = per_dept
        .into_iter()
        .map(|(department, (student_count, cgpas))| DepartmentTotals {
            department,
            student_count,
            result_count: cgpas.len(),
            average_cgpa: cgpa_stats(&cgpas).average,
        })
        .collect();

    Ok(Dashboard {
        student_count: students.len(),
        result_count: passed + failed,
        passed,
        failed,
        below_passing_cgpa: below,
        departments,
    })
}
