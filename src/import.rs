//! CSV result sheets.
//!
//! Layout: a header row `roll[,name],<subject>...`, an optional row whose first cell is
//! `credit` carrying per-subject credits, then one row per student. Rows may be ragged.

use crate::bulk::{validate_columns, BulkColumn};
use crate::grading::CellMark;
use anyhow::{anyhow, Context};
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct ImportRow {
    /// 1-based line number in the source file.
    pub line: u64,
    pub roll: String,
    pub name: Option<String>,
    pub cells: Vec<CellMark>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSheet {
    pub columns: Vec<BulkColumn>,
    pub rows: Vec<ImportRow>,
}

pub fn parse_results_csv(path: &Path) -> anyhow::Result<ImportSheet> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    parse_results_reader(file)
        .with_context(|| format!("failed to parse {}", path.to_string_lossy()))
}

pub fn parse_results_reader<R: Read>(reader: R) -> anyhow::Result<ImportSheet> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = rdr.records();

    let header = match records.next() {
        Some(rec) => rec?,
        None => return Err(anyhow!("empty file: missing header row")),
    };
    let first = header.get(0).unwrap_or("");
    if !first.eq_ignore_ascii_case("roll") {
        return Err(anyhow!("first header column must be 'roll' (got '{}')", first));
    }
    let has_name = header
        .get(1)
        .map(|h| h.eq_ignore_ascii_case("name"))
        .unwrap_or(false);
    let subject_start = if has_name { 2 } else { 1 };
    let subject_names: Vec<String> = header
        .iter()
        .skip(subject_start)
        .map(|s| s.to_string())
        .collect();
    if subject_names.is_empty() {
        return Err(anyhow!("header has no subject columns"));
    }

    let mut credits: Vec<Option<f64>> = vec![None; subject_names.len()];
    let mut rows: Vec<ImportRow> = Vec::new();
    let mut first_data_row = true;

    for rec in records {
        let rec = rec?;
        let line = rec.position().map(|p| p.line()).unwrap_or(0);
        let roll = rec.get(0).unwrap_or("").to_string();
        if rec.iter().all(|c| c.is_empty()) {
            continue;
        }

        if first_data_row && roll.eq_ignore_ascii_case("credit") {
            first_data_row = false;
            for (i, slot) in credits.iter_mut().enumerate() {
                let raw = rec.get(subject_start + i).unwrap_or("");
                if raw.is_empty() {
                    continue;
                }
                let c: f64 = raw
                    .parse()
                    .map_err(|_| anyhow!("line {}: credit '{}' is not a number", line, raw))?;
                *slot = Some(c);
            }
            continue;
        }
        first_data_row = false;

        let name = if has_name {
            rec.get(1).filter(|s| !s.is_empty()).map(|s| s.to_string())
        } else {
            None
        };
        let cells = rec
            .iter()
            .skip(subject_start)
            .map(CellMark::parse_str)
            .collect();
        rows.push(ImportRow {
            line,
            roll,
            name,
            cells,
        });
    }

    let mut columns: Vec<BulkColumn> = Vec::with_capacity(subject_names.len());
    for (i, name) in subject_names.iter().enumerate() {
        let col = BulkColumn::new(name, credits[i])
            .map_err(|e| anyhow!("subject column {}: {}", i + 1, e))?;
        columns.push(col);
    }
    validate_columns(&columns).map_err(|(i, e)| anyhow!("subject column {}: {}", i + 1, e))?;

    Ok(ImportSheet { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::Marks;

    #[test]
    fn parses_header_credit_row_and_ragged_rows() {
        let data = "roll,name,Math,Physics,Chemistry\n\
                    credit,,3,4,\n\
                    R-001,Ada,85,72,40\n\
                    R-002,Grace,55\n\
                    \n\
                    R-003,,abc,,99\n";
        let sheet = parse_results_reader(data.as_bytes()).expect("parse");
        assert_eq!(sheet.columns.len(), 3);
        assert_eq!(sheet.columns[0].credit, Some(3.0));
        assert_eq!(sheet.columns[2].credit, None);
        assert_eq!(sheet.rows.len(), 3);

        assert_eq!(sheet.rows[0].roll, "R-001");
        assert_eq!(sheet.rows[0].name.as_deref(), Some("Ada"));
        assert_eq!(sheet.rows[0].line, 3);
        assert_eq!(sheet.rows[1].cells.len(), 1);
        assert_eq!(sheet.rows[2].name, None);
        assert_eq!(sheet.rows[2].cells[0], CellMark::Invalid);
        assert_eq!(sheet.rows[2].cells[1], CellMark::Blank);
        assert_eq!(
            sheet.rows[2].cells[2],
            CellMark::Valid(Marks::new(99).expect("marks"))
        );
    }

    #[test]
    fn name_column_is_optional() {
        let data = "Roll,Math\nR-1,70\n";
        let sheet = parse_results_reader(data.as_bytes()).expect("parse");
        assert_eq!(sheet.columns[0].name, "Math");
        assert_eq!(sheet.rows[0].name, None);
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(parse_results_reader("".as_bytes()).is_err());
        assert!(parse_results_reader("id,Math\n".as_bytes()).is_err());
        assert!(parse_results_reader("roll,name\n".as_bytes()).is_err());
        assert!(parse_results_reader("roll,Math,math\n".as_bytes()).is_err());
        assert!(parse_results_reader("roll,Math\ncredit,x\n".as_bytes()).is_err());
    }
}
