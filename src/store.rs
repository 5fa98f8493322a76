use crate::attendance::{AttendanceRecord, AttendanceStatus, Session};
use crate::matcher::{self, ClassCandidate};
use chrono::NaiveDate;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

/// Coded store-layer error, mapped 1:1 onto the IPC error envelope. The
/// attempted filters go in `details` so failed fetches stay diagnosable.
#[derive(Debug, Clone, Serialize)]
pub struct StoreError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl StoreError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn query(e: rusqlite::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub id: String,
    pub class_id: String,
    pub display_name: String,
    pub grade_level: String,
    pub gender: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct GradeEntryRow {
    pub student_id: String,
    pub subject: String,
    pub score: f64,
    pub period_tag: String,
    pub semester: String,
    pub academic_year: String,
}

#[derive(Debug, Clone)]
pub struct ClassRow {
    pub id: String,
    pub name: String,
    pub grade_level: String,
}

fn in_placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(",")
}

fn text_values(ids: &[String]) -> Vec<Value> {
    ids.iter().map(|s| Value::Text(s.clone())).collect()
}

/// Resolves a loosely formatted class label to concrete class rows: each
/// matcher candidate is tried in order and the first with a hit wins.
pub fn resolve_class_label(conn: &Connection, label: &str) -> Result<Vec<ClassRow>, StoreError> {
    for candidate in matcher::candidates(label) {
        let (sql, value) = match &candidate {
            ClassCandidate::Name(name) => (
                "SELECT id, name, grade_level FROM classes WHERE name = ?",
                name.clone(),
            ),
            ClassCandidate::GradeLevel(level) => (
                "SELECT id, name, grade_level FROM classes WHERE grade_level = ?",
                level.clone(),
            ),
        };
        let mut stmt = conn.prepare(sql).map_err(StoreError::query)?;
        let rows: Vec<ClassRow> = stmt
            .query_map([&value], |r| {
                Ok(ClassRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    grade_level: r.get(2)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(StoreError::query)?;
        if !rows.is_empty() {
            return Ok(rows);
        }
    }
    Ok(Vec::new())
}

pub fn classes_by_grade(conn: &Connection, grade_level: &str) -> Result<Vec<ClassRow>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT id, name, grade_level FROM classes WHERE grade_level = ?")
        .map_err(StoreError::query)?;
    stmt.query_map([grade_level], |r| {
        Ok(ClassRow {
            id: r.get(0)?,
            name: r.get(1)?,
            grade_level: r.get(2)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(StoreError::query)
}

pub fn class_names(conn: &Connection) -> Result<HashMap<String, String>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT id, name FROM classes")
        .map_err(StoreError::query)?;
    let rows: Vec<(String, String)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(StoreError::query)?;
    Ok(rows.into_iter().collect())
}

pub fn students_in_classes(
    conn: &Connection,
    class_ids: &[String],
) -> Result<Vec<StudentRow>, StoreError> {
    if class_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, class_id, display_name, grade_level, gender, active
         FROM students
         WHERE class_id IN ({})
         ORDER BY display_name",
        in_placeholders(class_ids.len())
    );
    let mut stmt = conn.prepare(&sql).map_err(StoreError::query)?;
    stmt.query_map(params_from_iter(text_values(class_ids)), map_student)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(StoreError::query)
}

pub fn students_by_grade(
    conn: &Connection,
    grade_level: &str,
) -> Result<Vec<StudentRow>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, class_id, display_name, grade_level, gender, active
             FROM students
             WHERE grade_level = ?
             ORDER BY display_name",
        )
        .map_err(StoreError::query)?;
    stmt.query_map([grade_level], map_student)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(StoreError::query)
}

pub fn all_students(conn: &Connection) -> Result<Vec<StudentRow>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, class_id, display_name, grade_level, gender, active
             FROM students
             ORDER BY display_name",
        )
        .map_err(StoreError::query)?;
    stmt.query_map([], map_student)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(StoreError::query)
}

pub fn setting(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    conn.query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
        r.get(0)
    })
    .optional()
    .map_err(StoreError::query)
}

fn map_student(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: r.get(0)?,
        class_id: r.get(1)?,
        display_name: r.get(2)?,
        grade_level: r.get(3)?,
        gender: r.get(4)?,
        active: r.get::<_, i64>(5)? != 0,
    })
}

/// All grade entries for a student set, unfiltered by period. Period and
/// semester scoping happens in memory on parsed tags, so inconsistent tag
/// padding in historical rows cannot split a month in two.
pub fn grade_entries_for_students(
    conn: &Connection,
    student_ids: &[String],
) -> Result<Vec<GradeEntryRow>, StoreError> {
    if student_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT student_id, subject, score, period_tag, semester, academic_year
         FROM grade_entries
         WHERE student_id IN ({})",
        in_placeholders(student_ids.len())
    );
    let mut stmt = conn.prepare(&sql).map_err(StoreError::query)?;
    stmt.query_map(params_from_iter(text_values(student_ids)), |r| {
        Ok(GradeEntryRow {
            student_id: r.get(0)?,
            subject: r.get(1)?,
            score: r.get(2)?,
            period_tag: r.get(3)?,
            semester: r.get(4)?,
            academic_year: r.get(5)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(StoreError::query)
}

/// Attendance rows for a date range, optionally scoped to a class set.
/// Rows with unparseable dates, sessions, or statuses are skipped rather
/// than failing the whole report.
pub fn attendance_in_range(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
    class_ids: Option<&[String]>,
) -> Result<Vec<AttendanceRecord>, StoreError> {
    let mut sql = String::from(
        "SELECT student_id, class_id, date, session, status, reason
         FROM attendance_entries
         WHERE date >= ? AND date <= ?",
    );
    let mut binds: Vec<Value> = vec![
        Value::Text(start.to_string()),
        Value::Text(end.to_string()),
    ];
    if let Some(ids) = class_ids {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        sql.push_str(&format!(" AND class_id IN ({})", in_placeholders(ids.len())));
        binds.extend(text_values(ids));
    }

    let mut stmt = conn.prepare(&sql).map_err(StoreError::query)?;
    let raw: Vec<(String, String, String, String, String, Option<String>)> = stmt
        .query_map(params_from_iter(binds), |r| {
            Ok((
                r.get(0)?,
                r.get(1)?,
                r.get(2)?,
                r.get(3)?,
                r.get(4)?,
                r.get(5)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(StoreError::query)?;

    let mut out = Vec::with_capacity(raw.len());
    for (student_id, class_id, date, session, status, reason) in raw {
        let Ok(date) = NaiveDate::parse_from_str(&date, "%Y-%m-%d") else {
            continue;
        };
        let Some(session) = Session::parse(&session) else {
            continue;
        };
        let Some(status) = AttendanceStatus::parse(&status) else {
            continue;
        };
        out.push(AttendanceRecord {
            student_id,
            class_id,
            date,
            session,
            status,
            reason,
        });
    }
    Ok(out)
}

/// Most recent attendance date in scope, for academic-year auto-detection.
pub fn latest_attendance_date(
    conn: &Connection,
    class_ids: Option<&[String]>,
) -> Result<Option<NaiveDate>, StoreError> {
    let mut sql = String::from("SELECT MAX(date) FROM attendance_entries");
    let mut binds: Vec<Value> = Vec::new();
    if let Some(ids) = class_ids {
        if ids.is_empty() {
            return Ok(None);
        }
        sql.push_str(&format!(" WHERE class_id IN ({})", in_placeholders(ids.len())));
        binds.extend(text_values(ids));
    }
    let raw: Option<String> = conn
        .query_row(&sql, params_from_iter(binds), |r| r.get(0))
        .map_err(StoreError::query)?;
    Ok(raw.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()))
}

/// Distinct "YYYY-MM" months that actually carry attendance data, used in
/// the no-data report to suggest periods worth requesting.
pub fn attendance_months_with_data(
    conn: &Connection,
    class_ids: Option<&[String]>,
) -> Result<Vec<String>, StoreError> {
    let mut sql = String::from("SELECT DISTINCT substr(date, 1, 7) FROM attendance_entries");
    let mut binds: Vec<Value> = Vec::new();
    if let Some(ids) = class_ids {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        sql.push_str(&format!(" WHERE class_id IN ({})", in_placeholders(ids.len())));
        binds.extend(text_values(ids));
    }
    sql.push_str(" ORDER BY 1");
    let mut stmt = conn.prepare(&sql).map_err(StoreError::query)?;
    stmt.query_map(params_from_iter(binds), |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(StoreError::query)
}

/// Students with a dropped enrollment in the given class scope, paired
/// with their gender string for the female-dropped tally.
pub fn dropped_students(
    conn: &Connection,
    class_ids: &[String],
) -> Result<Vec<(String, Option<String>)>, StoreError> {
    if class_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT e.student_id, s.gender
         FROM enrollments e
         JOIN students s ON s.id = e.student_id
         WHERE e.dropped != 0 AND e.class_id IN ({})",
        in_placeholders(class_ids.len())
    );
    let mut stmt = conn.prepare(&sql).map_err(StoreError::query)?;
    stmt.query_map(params_from_iter(text_values(class_ids)), |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(StoreError::query)
}

/// Configured per-subject maximum scores for a grade level.
pub fn subject_max_scores(
    conn: &Connection,
    grade_level: &str,
) -> Result<HashMap<String, f64>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT subject, max_score FROM subject_config WHERE grade_level = ?")
        .map_err(StoreError::query)?;
    let rows: Vec<(String, f64)> = stmt
        .query_map([grade_level], |r| Ok((r.get(0)?, r.get(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(StoreError::query)?;
    Ok(rows.into_iter().collect())
}
