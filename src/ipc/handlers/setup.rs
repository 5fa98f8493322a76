use crate::attendance::{AttendanceStatus, Session};
use crate::grades::PeriodTag;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn bad(message: impl Into<String>) -> HandlerErr {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    fn db_query(e: rusqlite::Error) -> HandlerErr {
        HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
    }

    fn db_update(e: rusqlite::Error, table: &str) -> HandlerErr {
        HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": table })),
        }
    }

    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad(format!("missing {}", key)))
}

fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn get_or_new_id(params: &serde_json::Value) -> String {
    get_optional_str(params, "id").unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// When semesters are configured for an academic year, recorded codes must
/// be one of them. Years with no configured semesters accept any code.
fn semester_code_allowed(
    conn: &Connection,
    academic_year: &str,
    code: &str,
) -> Result<bool, HandlerErr> {
    let configured: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM semesters WHERE academic_year = ?",
            [academic_year],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    if configured == 0 {
        return Ok(true);
    }
    conn.query_row(
        "SELECT 1 FROM semesters WHERE academic_year = ? AND code = ?",
        (academic_year, code),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}

fn student_exists(conn: &Connection, student_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}

fn class_exists(conn: &Connection, class_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}

fn school_configure(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    conn.execute(
        "INSERT INTO settings(key, value) VALUES('school.name', ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [&name],
    )
    .map_err(|e| HandlerErr::db_update(e, "settings"))?;
    Ok(json!({ "name": name }))
}

fn classes_upsert(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_or_new_id(params);
    let name = get_required_str(params, "name")?;
    let grade_level = get_required_str(params, "gradeLevel")?;
    let academic_year = get_required_str(params, "academicYear")?;
    let section = get_optional_str(params, "section");

    conn.execute(
        "INSERT INTO classes(id, name, grade_level, section, academic_year)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           grade_level = excluded.grade_level,
           section = excluded.section,
           academic_year = excluded.academic_year",
        (&id, &name, &grade_level, &section, &academic_year),
    )
    .map_err(|e| HandlerErr::db_update(e, "classes"))?;
    Ok(json!({ "classId": id }))
}

fn students_upsert(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_or_new_id(params);
    let class_id = get_required_str(params, "classId")?;
    let display_name = get_required_str(params, "displayName")?;
    let grade_level = get_required_str(params, "gradeLevel")?;
    let gender = get_optional_str(params, "gender");
    let active = params
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr {
            code: "not_found",
            message: "class not found".to_string(),
            details: None,
        });
    }

    conn.execute(
        "INSERT INTO students(id, class_id, display_name, grade_level, gender, active)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           class_id = excluded.class_id,
           display_name = excluded.display_name,
           grade_level = excluded.grade_level,
           gender = excluded.gender,
           active = excluded.active",
        (&id, &class_id, &display_name, &grade_level, &gender, active as i64),
    )
    .map_err(|e| HandlerErr::db_update(e, "students"))?;
    Ok(json!({ "studentId": id }))
}

fn semesters_upsert(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let code = get_required_str(params, "code")?;
    let academic_year = get_required_str(params, "academicYear")?;
    let label = get_required_str(params, "label")?;
    conn.execute(
        "INSERT INTO semesters(code, academic_year, label)
         VALUES(?, ?, ?)
         ON CONFLICT(code, academic_year) DO UPDATE SET label = excluded.label",
        (&code, &academic_year, &label),
    )
    .map_err(|e| HandlerErr::db_update(e, "semesters"))?;
    Ok(json!({ "ok": true }))
}

/// Replaces the configured subject set for one grade level.
fn subjects_configure(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let grade_level = get_required_str(params, "gradeLevel")?;
    let Some(subjects) = params.get("subjects").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad("missing subjects"));
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(HandlerErr::db_query)?;
    tx.execute(
        "DELETE FROM subject_config WHERE grade_level = ?",
        [&grade_level],
    )
    .map_err(|e| HandlerErr::db_update(e, "subject_config"))?;

    let mut count = 0usize;
    for s in subjects {
        let name = s
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::bad("subject entries need a name"))?;
        let max_score = s
            .get("maxScore")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| HandlerErr::bad("subject entries need a numeric maxScore"))?;
        if max_score <= 0.0 {
            return Err(HandlerErr::bad("maxScore must be positive"));
        }
        tx.execute(
            "INSERT INTO subject_config(grade_level, subject, max_score) VALUES(?, ?, ?)",
            (&grade_level, name, max_score),
        )
        .map_err(|e| HandlerErr::db_update(e, "subject_config"))?;
        count += 1;
    }
    tx.commit().map_err(HandlerErr::db_query)?;
    Ok(json!({ "gradeLevel": grade_level, "subjectCount": count }))
}

/// Batch-records grade entries. Scores must fall inside the configured
/// per-subject maximum for the student's grade level when one exists.
fn grades_record(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(entries) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad("missing entries"));
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(HandlerErr::db_query)?;
    let mut recorded = 0usize;
    for entry in entries {
        let student_id = get_required_str(entry, "studentId")?;
        let subject = get_required_str(entry, "subject")?;
        let period_tag = get_required_str(entry, "periodTag")?;
        let semester = get_required_str(entry, "semester")?;
        let academic_year = get_required_str(entry, "academicYear")?;
        let score = entry
            .get("score")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| HandlerErr::bad("entries need a numeric score"))?;

        if PeriodTag::parse(&period_tag).is_none() {
            return Err(HandlerErr::bad(format!(
                "periodTag must be month/2-digit-year, got {}",
                period_tag
            )));
        }
        if !student_exists(&tx, &student_id)? {
            return Err(HandlerErr {
                code: "not_found",
                message: format!("student not found: {}", student_id),
                details: None,
            });
        }
        if score < 0.0 {
            return Err(HandlerErr::bad("score must not be negative"));
        }
        if !semester_code_allowed(&tx, &academic_year, &semester)? {
            return Err(HandlerErr::bad(format!(
                "semester {} is not configured for {}",
                semester, academic_year
            )));
        }
        let max: Option<f64> = tx
            .query_row(
                "SELECT sc.max_score
                 FROM subject_config sc
                 JOIN students s ON s.grade_level = sc.grade_level
                 WHERE s.id = ? AND sc.subject = ?",
                (&student_id, &subject),
                |r| r.get(0),
            )
            .optional()
            .map_err(HandlerErr::db_query)?;
        if let Some(max) = max {
            if score > max {
                return Err(HandlerErr::bad(format!(
                    "score {} exceeds configured maximum {} for {}",
                    score, max, subject
                )));
            }
        }

        tx.execute(
            "INSERT INTO grade_entries(id, student_id, subject, score, period_tag, semester, academic_year)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &student_id,
                &subject,
                score,
                &period_tag,
                &semester,
                &academic_year,
            ),
        )
        .map_err(|e| HandlerErr::db_update(e, "grade_entries"))?;
        recorded += 1;
    }
    tx.commit().map_err(HandlerErr::db_query)?;
    Ok(json!({ "recorded": recorded }))
}

/// Batch-records attendance. One row per (student, class, date, session);
/// re-recording the same slot overwrites its status and reason.
fn attendance_record(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(entries) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad("missing entries"));
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(HandlerErr::db_query)?;
    let mut recorded = 0usize;
    for entry in entries {
        let student_id = get_required_str(entry, "studentId")?;
        let class_id = get_required_str(entry, "classId")?;
        let date = get_required_str(entry, "date")?;
        let session_raw = get_required_str(entry, "session")?;
        let status_raw = get_required_str(entry, "status")?;
        let reason = get_optional_str(entry, "reason");

        if chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_err() {
            return Err(HandlerErr::bad("date must be YYYY-MM-DD"));
        }
        let Some(session) = Session::parse(&session_raw) else {
            return Err(HandlerErr::bad("session must be AM, PM, or FULL"));
        };
        let Some(status) = AttendanceStatus::parse(&status_raw) else {
            return Err(HandlerErr::bad(
                "status must be present, absent, late, or excused",
            ));
        };
        if !student_exists(&tx, &student_id)? {
            return Err(HandlerErr {
                code: "not_found",
                message: format!("student not found: {}", student_id),
                details: None,
            });
        }

        tx.execute(
            "INSERT INTO attendance_entries(id, student_id, class_id, date, session, status, reason)
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, class_id, date, session) DO UPDATE SET
               status = excluded.status,
               reason = excluded.reason",
            (
                Uuid::new_v4().to_string(),
                &student_id,
                &class_id,
                &date,
                session.as_str(),
                status.as_str(),
                &reason,
            ),
        )
        .map_err(|e| HandlerErr::db_update(e, "attendance_entries"))?;
        recorded += 1;
    }
    tx.commit().map_err(HandlerErr::db_query)?;
    Ok(json!({ "recorded": recorded }))
}

fn enrollments_upsert(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let class_id = get_required_str(params, "classId")?;
    let dropped = params
        .get("dropped")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let drop_date = get_optional_str(params, "dropDate");
    let drop_semester = get_optional_str(params, "dropSemester");

    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr {
            code: "not_found",
            message: "student not found".to_string(),
            details: None,
        });
    }

    conn.execute(
        "INSERT INTO enrollments(id, student_id, class_id, dropped, drop_date, drop_semester)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, class_id) DO UPDATE SET
           dropped = excluded.dropped,
           drop_date = excluded.drop_date,
           drop_semester = excluded.drop_semester",
        (
            Uuid::new_v4().to_string(),
            &student_id,
            &class_id,
            dropped as i64,
            &drop_date,
            &drop_semester,
        ),
    )
    .map_err(|e| HandlerErr::db_update(e, "enrollments"))?;
    Ok(json!({ "ok": true }))
}

fn dispatch(
    state: &mut AppState,
    req: &Request,
    f: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "school.configure" => Some(dispatch(state, req, school_configure)),
        "classes.upsert" => Some(dispatch(state, req, classes_upsert)),
        "students.upsert" => Some(dispatch(state, req, students_upsert)),
        "semesters.upsert" => Some(dispatch(state, req, semesters_upsert)),
        "subjects.configure" => Some(dispatch(state, req, subjects_configure)),
        "grades.record" => Some(dispatch(state, req, grades_record)),
        "attendance.record" => Some(dispatch(state, req, attendance_record)),
        "enrollments.upsert" => Some(dispatch(state, req, enrollments_upsert)),
        _ => None,
    }
}
