//! Grading & CGPA engine.
//!
//! Every surface of the daemon (single-result drafts, direct submissions, the bulk grid,
//! CSV import, reports) classifies marks and aggregates results through this module only.
//! Grade points and CGPA values are carried as integer hundredths so that persisted and
//! recomputed values compare exactly.

use serde::{Serialize, Serializer};
use std::fmt;

pub const MARKS_MIN: i64 = 0;
pub const MARKS_MAX: i64 = 100;
pub const MAX_CREDIT: f64 = 30.0;

/// Descending thresholds: (minimum mark, grade, grade point in hundredths).
const SCALE: [(u8, Grade, u16); 10] = [
    (80, Grade::APlus, 400),
    (75, Grade::A, 375),
    (70, Grade::AMinus, 350),
    (65, Grade::BPlus, 325),
    (60, Grade::B, 300),
    (55, Grade::BMinus, 275),
    (50, Grade::CPlus, 250),
    (45, Grade::C, 225),
    (40, Grade::D, 200),
    (0, Grade::F, 0),
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("subject name must not be empty")]
    EmptyName,
    #[error("marks are required")]
    MissingMarks,
    #[error("marks must be between 0 and 100 (got {0})")]
    MarksOutOfRange(i64),
    #[error("marks must be a whole number (got {0})")]
    MarksNotInteger(f64),
    #[error("subject \"{0}\" already exists in this result")]
    DuplicateSubject(String),
    #[error("a result needs at least one subject")]
    EmptySubjectList,
    #[error("semester is required")]
    MissingSemester,
    #[error("student is required")]
    MissingStudent,
    #[error("unknown semester \"{0}\" (expected 1st..8th)")]
    UnknownSemester(String),
    #[error("credit must be greater than 0 and at most 30 (got {0})")]
    InvalidCredit(f64),
    #[error("credit must be a number (got {0})")]
    CreditNotNumber(String),
}

impl ValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyName => "empty_name",
            Self::MissingMarks => "missing_marks",
            Self::MarksOutOfRange(_) => "marks_out_of_range",
            Self::MarksNotInteger(_) => "marks_not_integer",
            Self::DuplicateSubject(_) => "duplicate_subject",
            Self::EmptySubjectList => "empty_subject_list",
            Self::MissingSemester => "missing_semester",
            Self::MissingStudent => "missing_student",
            Self::UnknownSemester(_) => "unknown_semester",
            Self::InvalidCredit(_) | Self::CreditNotNumber(_) => "invalid_credit",
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            Self::EmptyName | Self::DuplicateSubject(_) => "subjectName",
            Self::MissingMarks | Self::MarksOutOfRange(_) | Self::MarksNotInteger(_) => "marks",
            Self::EmptySubjectList => "subjects",
            Self::MissingSemester | Self::UnknownSemester(_) => "semester",
            Self::MissingStudent => "studentId",
            Self::InvalidCredit(_) | Self::CreditNotNumber(_) => "credit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Grade {
    F,
    D,
    C,
    CPlus,
    BMinus,
    B,
    BPlus,
    AMinus,
    A,
    APlus,
}

impl Grade {
    /// Highest tier first.
    pub const ALL: [Grade; 10] = [
        Grade::APlus,
        Grade::A,
        Grade::AMinus,
        Grade::BPlus,
        Grade::B,
        Grade::BMinus,
        Grade::CPlus,
        Grade::C,
        Grade::D,
        Grade::F,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Grade::ALL.into_iter().find(|g| g.label() == s.trim())
    }

    pub fn point(self) -> GradePoint {
        let hundredths = SCALE
            .iter()
            .find(|(_, g, _)| *g == self)
            .map(|(_, _, p)| *p)
            .unwrap_or(0);
        GradePoint(hundredths)
    }

    /// Lowest mark that earns this grade.
    pub fn min_marks(self) -> u8 {
        SCALE
            .iter()
            .find(|(_, g, _)| *g == self)
            .map(|(m, _, _)| *m)
            .unwrap_or(0)
    }

    pub fn is_fail(self) -> bool {
        self == Grade::F
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Grade {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// A mark already validated to lie in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Marks(u8);

impl Marks {
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if !(MARKS_MIN..=MARKS_MAX).contains(&value) {
            return Err(ValidationError::MarksOutOfRange(value));
        }
        Ok(Marks(value as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

/// Grade point in hundredths (`A = 375`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GradePoint(u16);

impl GradePoint {
    pub fn hundredths(self) -> u16 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl Serialize for GradePoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

/// CGPA in hundredths, already rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Cgpa(u16);

impl Cgpa {
    pub const ZERO: Cgpa = Cgpa(0);

    pub fn from_hundredths(hundredths: u16) -> Self {
        Cgpa(hundredths)
    }

    /// Rounds half-up to two decimals. `None` for values outside `0..=4`.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || !(0.0..=4.0).contains(&value) {
            return None;
        }
        Some(Cgpa(round_half_up(value * 100.0) as u16))
    }

    pub fn hundredths(self) -> u16 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl fmt::Display for Cgpa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Cgpa {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

fn round_half_up(x: f64) -> f64 {
    // Absorb representation error on exact halves (e.g. 312.49999999).
    (x + 0.5 + 1e-9).floor()
}

/// Map a validated mark to its grade tier.
pub fn classify(marks: Marks) -> Grade {
    SCALE
        .iter()
        .find(|(min, _, _)| marks.0 >= *min)
        .map(|(_, g, _)| *g)
        .unwrap_or(Grade::F)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Semester {
    First = 1,
    Second,
    Third,
    Fourth,
    Fifth,
    Sixth,
    Seventh,
    Eighth,
}

impl Semester {
    pub const ALL: [Semester; 8] = [
        Semester::First,
        Semester::Second,
        Semester::Third,
        Semester::Fourth,
        Semester::Fifth,
        Semester::Sixth,
        Semester::Seventh,
        Semester::Eighth,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Semester::First => "1st",
            Semester::Second => "2nd",
            Semester::Third => "3rd",
            Semester::Fourth => "4th",
            Semester::Fifth => "5th",
            Semester::Sixth => "6th",
            Semester::Seventh => "7th",
            Semester::Eighth => "8th",
        }
    }

    pub fn ordinal(self) -> i64 {
        self as i64
    }

    pub fn from_ordinal(n: i64) -> Option<Self> {
        Semester::ALL.into_iter().find(|s| s.ordinal() == n)
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let t = s.trim();
        if t.is_empty() {
            return Err(ValidationError::MissingSemester);
        }
        if let Some(sem) = Semester::ALL
            .into_iter()
            .find(|sem| sem.label().eq_ignore_ascii_case(t))
        {
            return Ok(sem);
        }
        t.parse::<i64>()
            .ok()
            .and_then(Semester::from_ordinal)
            .ok_or_else(|| ValidationError::UnknownSemester(t.to_string()))
    }

    /// Accepts a label (`"3rd"`) or an ordinal (`3`, `"3"`).
    pub fn from_json(value: Option<&serde_json::Value>) -> Result<Self, ValidationError> {
        match value {
            None | Some(serde_json::Value::Null) => Err(ValidationError::MissingSemester),
            Some(serde_json::Value::String(s)) => Semester::parse(s),
            Some(serde_json::Value::Number(n)) => n
                .as_i64()
                .and_then(Semester::from_ordinal)
                .ok_or_else(|| ValidationError::UnknownSemester(n.to_string())),
            Some(other) => Err(ValidationError::UnknownSemester(other.to_string())),
        }
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Semester {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingMarkPolicy {
    /// Blank or non-numeric marks stay unset and display as `-`.
    #[default]
    Ungraded,
    /// Blank or non-numeric marks count as `F`.
    Fail,
}

impl MissingMarkPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ungraded" => Some(Self::Ungraded),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ungraded => "ungraded",
            Self::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradingOptions {
    pub missing_mark_policy: MissingMarkPolicy,
    pub weight_by_credit: bool,
    pub passing_cgpa: Cgpa,
}

impl Default for GradingOptions {
    fn default() -> Self {
        Self {
            missing_mark_policy: MissingMarkPolicy::Ungraded,
            weight_by_credit: false,
            passing_cgpa: Cgpa(200),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRecord {
    subject_name: String,
    marks: Marks,
    grade: Grade,
    point: GradePoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    credit: Option<f64>,
}

impl SubjectRecord {
    fn derive(subject_name: String, marks: Marks, credit: Option<f64>) -> Self {
        let grade = classify(marks);
        Self {
            subject_name,
            marks,
            grade,
            point: grade.point(),
            credit,
        }
    }

    pub fn subject_name(&self) -> &str {
        &self.subject_name
    }

    pub fn marks(&self) -> Marks {
        self.marks
    }

    pub fn grade(&self) -> Grade {
        self.grade
    }

    pub fn point(&self) -> GradePoint {
        self.point
    }

    pub fn credit(&self) -> Option<f64> {
        self.credit
    }

    pub fn with_credit(mut self, credit: Option<f64>) -> Result<Self, ValidationError> {
        self.credit = validate_credit(credit)?;
        Ok(self)
    }

    /// Explicit edit flow: grade and point follow the new mark.
    pub fn with_marks(&self, marks: Marks) -> Self {
        Self::derive(self.subject_name.clone(), marks, self.credit)
    }

    fn same_name(&self, other: &str) -> bool {
        self.subject_name.to_lowercase() == other.to_lowercase()
    }
}

pub fn validate_credit(credit: Option<f64>) -> Result<Option<f64>, ValidationError> {
    match credit {
        None => Ok(None),
        Some(c) if c.is_finite() && c > 0.0 && c <= MAX_CREDIT => Ok(Some(c)),
        Some(c) => Err(ValidationError::InvalidCredit(c)),
    }
}

/// Subject Record Builder. Appending the record is the caller's job.
pub fn build_subject(
    name: &str,
    marks: Option<i64>,
    existing: &[SubjectRecord],
) -> Result<SubjectRecord, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let Some(marks) = marks else {
        return Err(ValidationError::MissingMarks);
    };
    let marks = Marks::new(marks)?;
    if existing.iter().any(|s| s.same_name(name)) {
        return Err(ValidationError::DuplicateSubject(name.to_string()));
    }
    Ok(SubjectRecord::derive(name.to_string(), marks, None))
}

/// Reads a mark from a JSON payload for the Subject Record Builder.
///
/// Null, blank and non-numeric text come back as `None` (missing); a fractional number is
/// rejected rather than truncated.
pub fn marks_from_json(value: Option<&serde_json::Value>) -> Result<Option<i64>, ValidationError> {
    let n = match value {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::Number(n)) => match n.as_i64() {
            Some(i) => return Ok(Some(i)),
            None => n.as_f64(),
        },
        Some(serde_json::Value::String(s)) => {
            let t = s.trim();
            if let Ok(i) = t.parse::<i64>() {
                return Ok(Some(i));
            }
            t.parse::<f64>().ok()
        }
        Some(_) => None,
    };
    match n {
        Some(f) if f.is_finite() && f.fract() == 0.0 => Ok(Some(f as i64)),
        Some(f) if f.is_finite() => Err(ValidationError::MarksNotInteger(f)),
        _ => Ok(None),
    }
}

/// Reads an optional `credit` parameter. Null or absent means no credit; anything else must
/// be a JSON number inside the credit range.
pub fn credit_from_json(value: Option<&serde_json::Value>) -> Result<Option<f64>, ValidationError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => validate_credit(n.as_f64()),
        Some(other) => Err(ValidationError::CreditNotNumber(other.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    Passed,
    Failed,
    /// Placeholder for a result with no subjects; never persisted.
    Ungraded,
}

impl ResultStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Passed => "Passed",
            Self::Failed => "Failed",
            Self::Ungraded => "-",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Passed" => Some(Self::Passed),
            "Failed" => Some(Self::Failed),
            "-" => Some(Self::Ungraded),
            _ => None,
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for ResultStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub cgpa: Cgpa,
    pub status: ResultStatus,
}

/// Any single `F` fails the result.
pub fn has_failing_subject(subjects: &[SubjectRecord]) -> bool {
    subjects.iter().any(|s| s.grade.is_fail())
}

/// Reporting rule: CGPA strictly below the threshold. Independent of [`has_failing_subject`].
pub fn is_below_passing_cgpa(cgpa: Cgpa, threshold: Cgpa) -> bool {
    cgpa < threshold
}

/// Result Aggregator.
pub fn aggregate(subjects: &[SubjectRecord], opts: &GradingOptions) -> Outcome {
    if subjects.is_empty() {
        return Outcome {
            cgpa: Cgpa::ZERO,
            status: ResultStatus::Ungraded,
        };
    }
    let cgpa = mean_points(
        subjects.iter().map(|s| (s.point, s.credit)),
        opts.weight_by_credit,
    );
    let status = if has_failing_subject(subjects) {
        ResultStatus::Failed
    } else {
        ResultStatus::Passed
    };
    Outcome { cgpa, status }
}

fn mean_points<I>(points: I, weighted: bool) -> Cgpa
where
    I: IntoIterator<Item = (GradePoint, Option<f64>)>,
{
    if weighted {
        let mut num = 0.0_f64;
        let mut den = 0.0_f64;
        for (p, credit) in points {
            let c = credit.unwrap_or(1.0);
            num += f64::from(p.0) * c;
            den += c;
        }
        if den <= 0.0 {
            return Cgpa::ZERO;
        }
        return Cgpa(round_half_up(num / den) as u16);
    }

    let mut sum: u64 = 0;
    let mut n: u64 = 0;
    for (p, _) in points {
        sum += u64::from(p.0);
        n += 1;
    }
    if n == 0 {
        return Cgpa::ZERO;
    }
    // Integer half-up: floor(sum / n + 1/2).
    Cgpa(((2 * sum + n) / (2 * n)) as u16)
}

/// One spreadsheet cell as typed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellMark {
    Blank,
    Valid(Marks),
    /// Non-numeric, fractional or out-of-range input; treated as unset.
    Invalid,
}

impl CellMark {
    pub fn parse_str(raw: &str) -> Self {
        let t = raw.trim();
        if t.is_empty() {
            return CellMark::Blank;
        }
        match t.parse::<f64>() {
            Ok(f) => Self::from_f64(f),
            Err(_) => CellMark::Invalid,
        }
    }

    pub fn from_json(value: Option<&serde_json::Value>) -> Self {
        match value {
            None | Some(serde_json::Value::Null) => CellMark::Blank,
            Some(serde_json::Value::String(s)) => Self::parse_str(s),
            Some(serde_json::Value::Number(n)) => n
                .as_f64()
                .map(Self::from_f64)
                .unwrap_or(CellMark::Invalid),
            Some(_) => CellMark::Invalid,
        }
    }

    fn from_f64(f: f64) -> Self {
        if !f.is_finite() || f.fract() != 0.0 {
            return CellMark::Invalid;
        }
        match Marks::new(f as i64) {
            Ok(m) => CellMark::Valid(m),
            Err(_) => CellMark::Invalid,
        }
    }

    /// Grade shown for the cell; `None` renders as `-`.
    pub fn grade(self, policy: MissingMarkPolicy) -> Option<Grade> {
        match (self, policy) {
            (CellMark::Valid(m), _) => Some(classify(m)),
            (_, MissingMarkPolicy::Fail) => Some(Grade::F),
            (_, MissingMarkPolicy::Ungraded) => None,
        }
    }

    /// Mark persisted for the cell; `None` means the cell is skipped.
    pub fn effective_marks(self, policy: MissingMarkPolicy) -> Option<Marks> {
        match (self, policy) {
            (CellMark::Valid(m), _) => Some(m),
            (_, MissingMarkPolicy::Fail) => Some(Marks(0)),
            (_, MissingMarkPolicy::Ungraded) => None,
        }
    }
}

/// Bulk row CGPA: `-` when nothing in the row could be graded, distinct from a computed 0.00.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCgpa {
    NotComputable,
    Computed(Cgpa),
}

impl RowCgpa {
    pub fn computed(self) -> Option<Cgpa> {
        match self {
            RowCgpa::Computed(c) => Some(c),
            RowCgpa::NotComputable => None,
        }
    }
}

impl fmt::Display for RowCgpa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowCgpa::NotComputable => f.write_str("-"),
            RowCgpa::Computed(c) => c.fmt(f),
        }
    }
}

impl Serialize for RowCgpa {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowCgpa::NotComputable => serializer.serialize_str("-"),
            RowCgpa::Computed(c) => c.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowOutcome {
    pub cgpa: RowCgpa,
    pub has_fail: bool,
    pub graded_count: usize,
}

/// Bulk Aggregator. `credits[i]` pairs with `row[i]`; a short or empty slice means credit 1.
pub fn aggregate_row(
    row: &[CellMark],
    credits: &[Option<f64>],
    opts: &GradingOptions,
) -> RowOutcome {
    let graded: Vec<(GradePoint, Option<f64>)> = row
        .iter()
        .enumerate()
        .filter_map(|(i, cell)| {
            cell.grade(opts.missing_mark_policy)
                .map(|g| (g.point(), credits.get(i).copied().flatten()))
        })
        .collect();
    if graded.is_empty() {
        return RowOutcome {
            cgpa: RowCgpa::NotComputable,
            has_fail: false,
            graded_count: 0,
        };
    }
    let has_fail = graded.iter().any(|(p, _)| p.0 == 0);
    RowOutcome {
        cgpa: RowCgpa::Computed(mean_points(graded.iter().copied(), opts.weight_by_credit)),
        has_fail,
        graded_count: graded.len(),
    }
}
