use crate::grading::{
    aggregate_row, build_subject, validate_credit, CellMark, GradingOptions, RowOutcome,
    SubjectRecord, ValidationError,
};
use serde_json::json;

pub const BULK_MAX_ROWS: usize = 2000;
pub const BULK_MAX_COLUMNS: usize = 64;

/// Subject column header of a bulk grid or import sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkColumn {
    pub name: String,
    pub credit: Option<f64>,
}

impl BulkColumn {
    pub fn new(name: &str, credit: Option<f64>) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(Self {
            name: name.to_string(),
            credit: validate_credit(credit)?,
        })
    }
}

/// Column headers must be non-empty and unique ignoring case.
pub fn validate_columns(columns: &[BulkColumn]) -> Result<(), (usize, ValidationError)> {
    for (i, c) in columns.iter().enumerate() {
        let lower = c.name.to_lowercase();
        if columns[..i].iter().any(|p| p.name.to_lowercase() == lower) {
            return Err((i, ValidationError::DuplicateSubject(c.name.clone())));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowEvaluation {
    pub cells: Vec<CellMark>,
    pub outcome: RowOutcome,
    /// Column indexes whose input was present but unusable.
    pub invalid_cells: Vec<usize>,
    /// Cells beyond the last column; ignored.
    pub extra_cells: usize,
}

impl RowEvaluation {
    /// Cells holding a usable mark, whatever the missing-mark policy.
    pub fn valid_cells(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| matches!(c, CellMark::Valid(_)))
            .count()
    }

    pub fn cells_json(&self, columns: &[BulkColumn], opts: &GradingOptions) -> serde_json::Value {
        let cells: Vec<serde_json::Value> = self
            .cells
            .iter()
            .zip(columns)
            .map(|(cell, col)| {
                let marks = match cell {
                    CellMark::Valid(m) => json!(m.value()),
                    _ => json!(null),
                };
                let grade = cell
                    .grade(opts.missing_mark_policy)
                    .map(|g| g.label())
                    .unwrap_or("-");
                json!({
                    "subjectName": col.name,
                    "marks": marks,
                    "grade": grade,
                })
            })
            .collect();
        serde_json::Value::Array(cells)
    }
}

/// Pads ragged rows with blanks and runs the Bulk Aggregator.
pub fn evaluate_row(
    mut cells: Vec<CellMark>,
    columns: &[BulkColumn],
    opts: &GradingOptions,
) -> RowEvaluation {
    let extra_cells = cells.len().saturating_sub(columns.len());
    cells.truncate(columns.len());
    cells.resize(columns.len(), CellMark::Blank);

    let invalid_cells = cells
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == CellMark::Invalid)
        .map(|(i, _)| i)
        .collect();
    let credits: Vec<Option<f64>> = columns.iter().map(|c| c.credit).collect();
    let outcome = aggregate_row(&cells, &credits, opts);
    RowEvaluation {
        cells,
        outcome,
        invalid_cells,
        extra_cells,
    }
}

/// Subject records to persist for a row: graded cells only, in column order.
pub fn row_subjects(
    eval: &RowEvaluation,
    columns: &[BulkColumn],
    opts: &GradingOptions,
) -> Result<Vec<SubjectRecord>, ValidationError> {
    let mut out: Vec<SubjectRecord> = Vec::new();
    for (cell, col) in eval.cells.iter().zip(columns) {
        let Some(marks) = cell.effective_marks(opts.missing_mark_policy) else {
            continue;
        };
        let record = build_subject(&col.name, Some(i64::from(marks.value())), &out)?
            .with_credit(col.credit)?;
        out.push(record);
    }
    if out.is_empty() {
        return Err(ValidationError::EmptySubjectList);
    }
    Ok(out)
}
