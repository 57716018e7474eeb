//! Student Directory.

use crate::grading::Semester;
use anyhow::Context;
use log::info;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub roll: String,
    pub department: String,
    /// Current enrollment semester; unrelated to the semester of any result.
    pub semester: Semester,
    #[serde(skip)]
    pub sort_order: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StudentSort {
    Name,
    #[default]
    Roll,
    Department,
}

impl StudentSort {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "roll" => Some(Self::Roll),
            "department" => Some(Self::Department),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Roll => "roll",
            Self::Department => "department",
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            Self::Name => "name COLLATE NOCASE, roll COLLATE NOCASE",
            Self::Roll => "roll COLLATE NOCASE",
            Self::Department => "department COLLATE NOCASE, name COLLATE NOCASE",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StudentQuery {
    pub department: Option<String>,
    pub semester: Option<Semester>,
    /// Case-insensitive substring of name or roll.
    pub search: Option<String>,
    pub sort: StudentSort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStudent {
    pub name: String,
    pub roll: String,
    pub department: String,
    pub semester: Semester,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub roll: Option<String>,
    pub department: Option<String>,
    pub semester: Option<Semester>,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("roll '{0}' is already used by another student")]
    DuplicateRoll(String),
    #[error("student not found")]
    NotFound(String),
    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

impl DirectoryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyField(_) => "bad_params",
            Self::DuplicateRoll(_) => "duplicate_roll",
            Self::NotFound(_) => "not_found",
            Self::Db(_) => "db_query_failed",
        }
    }
}

fn row_to_student(r: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    let semester: i64 = r.get(4)?;
    Ok(Student {
        id: r.get(0)?,
        name: r.get(1)?,
        roll: r.get(2)?,
        department: r.get(3)?,
        semester: Semester::from_ordinal(semester).unwrap_or(Semester::First),
        sort_order: r.get(5)?,
    })
}

const STUDENT_COLUMNS: &str = "id, name, roll, department, semester, sort_order";

pub fn list_students(conn: &Connection, q: &StudentQuery) -> anyhow::Result<Vec<Student>> {
    let mut sql = format!("SELECT {} FROM students WHERE 1 = 1", STUDENT_COLUMNS);
    let mut binds: Vec<Value> = Vec::new();
    if let Some(dept) = &q.department {
        sql.push_str(" AND department = ? COLLATE NOCASE");
        binds.push(Value::Text(dept.clone()));
    }
    if let Some(sem) = q.semester {
        sql.push_str(" AND semester = ?");
        binds.push(Value::Integer(sem.ordinal()));
    }
    if let Some(search) = q.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        sql.push_str(" AND (instr(lower(name), ?) > 0 OR instr(lower(roll), ?) > 0)");
        let needle = search.to_lowercase();
        binds.push(Value::Text(needle.clone()));
        binds.push(Value::Text(needle));
    }
    sql.push_str(" ORDER BY ");
    sql.push_str(q.sort.order_by());

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), row_to_student)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_student(conn: &Connection, id: &str) -> anyhow::Result<Option<Student>> {
    let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
    Ok(conn.query_row(&sql, [id], row_to_student).optional()?)
}

pub fn find_by_roll(conn: &Connection, roll: &str) -> anyhow::Result<Option<Student>> {
    let sql = format!(
        "SELECT {} FROM students WHERE roll = ? COLLATE NOCASE",
        STUDENT_COLUMNS
    );
    Ok(conn.query_row(&sql, [roll.trim()], row_to_student).optional()?)
}

fn required(value: &str, field: &'static str) -> Result<String, DirectoryError> {
    let t = value.trim();
    if t.is_empty() {
        return Err(DirectoryError::EmptyField(field));
    }
    Ok(t.to_string())
}

fn ensure_roll_free(
    conn: &Connection,
    roll: &str,
    except_id: Option<&str>,
) -> Result<(), DirectoryError> {
    if let Some(existing) = find_by_roll(conn, roll)? {
        if Some(existing.id.as_str()) != except_id {
            return Err(DirectoryError::DuplicateRoll(roll.to_string()));
        }
    }
    Ok(())
}

pub fn create_student(conn: &Connection, new: &NewStudent) -> Result<Student, DirectoryError> {
    let name = required(&new.name, "name")?;
    let roll = required(&new.roll, "roll")?;
    let department = required(&new.department, "department")?;
    ensure_roll_free(conn, &roll, None)?;

    let sort_order: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students",
            [],
            |r| r.get(0),
        )
        .context("failed to compute sort order")?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, name, roll, department, semester, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &id,
            &name,
            &roll,
            &department,
            new.semester.ordinal(),
            sort_order,
        ),
    )
    .context("failed to insert student")?;
    info!("student {} created (roll {})", id, roll);

    Ok(Student {
        id,
        name,
        roll,
        department,
        semester: new.semester,
        sort_order,
    })
}

pub fn update_student(
    conn: &Connection,
    id: &str,
    patch: &StudentPatch,
) -> Result<Student, DirectoryError> {
    let Some(mut student) = get_student(conn, id)? else {
        return Err(DirectoryError::NotFound(id.to_string()));
    };
    if let Some(name) = &patch.name {
        student.name = required(name, "name")?;
    }
    if let Some(roll) = &patch.roll {
        let roll = required(roll, "roll")?;
        ensure_roll_free(conn, &roll, Some(id))?;
        student.roll = roll;
    }
    if let Some(department) = &patch.department {
        student.department = required(department, "department")?;
    }
    if let Some(semester) = patch.semester {
        student.semester = semester;
    }
    conn.execute(
        "UPDATE students
         SET name = ?, roll = ?, department = ?, semester = ?,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (
            &student.name,
            &student.roll,
            &student.department,
            student.semester.ordinal(),
            id,
        ),
    )
    .context("failed to update student")?;
    Ok(student)
}

/// Removes the student and every result that references them. Returns the number of results removed.
pub fn delete_student(conn: &Connection, id: &str) -> Result<usize, DirectoryError> {
    if get_student(conn, id)?.is_none() {
        return Err(DirectoryError::NotFound(id.to_string()));
    }
    let tx = conn.unchecked_transaction().context("failed to begin")?;
    tx.execute(
        "DELETE FROM result_subjects
         WHERE result_id IN (SELECT id FROM results WHERE student_id = ?)",
        [id],
    )
    .context("failed to delete result subjects")?;
    let results = tx
        .execute("DELETE FROM results WHERE student_id = ?", [id])
        .context("failed to delete results")?;
    tx.execute("DELETE FROM students WHERE id = ?", [id])
        .context("failed to delete student")?;
    tx.commit().context("failed to commit")?;
    info!("student {} deleted with {} result(s)", id, results);
    Ok(results)
}
