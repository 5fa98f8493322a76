use crate::attendance::{self, MonthUnits, StatusUnits};
use crate::grades::{self, PeriodTag, ScoreEntry, SemesterAverage, SubjectScore, YearlyAverage};
use crate::periods::{self, AcademicYear, DateRange, PeriodType};
use crate::store::{self, GradeEntryRow, StoreError, StudentRow};
use crate::summary::{self, DroppedStudent, GradeSummary, PASS_THRESHOLD};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub report_type: String,
    pub academic_year: Option<String>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub semester: Option<String>,
    pub date: Option<String>,
    pub class: Option<String>,
    pub grade: Option<String>,
}

fn bad_params(message: &str) -> StoreError {
    StoreError::new("bad_params", message)
}

/// The student scope a report runs over: either one matched class label,
/// one grade level, or the whole school.
struct Scope {
    students: Vec<StudentRow>,
    /// None means "no class filter" (grade-wide or school-wide scope).
    class_ids: Option<Vec<String>>,
    label: Option<String>,
}

fn resolve_scope(conn: &Connection, req: &ReportRequest) -> Result<Scope, StoreError> {
    let mut scope = if let Some(class_label) = req.class.as_deref() {
        let classes = store::resolve_class_label(conn, class_label)?;
        let class_ids: Vec<String> = classes.iter().map(|c| c.id.clone()).collect();
        let students = store::students_in_classes(conn, &class_ids)?;
        Scope {
            students,
            class_ids: Some(class_ids),
            label: Some(class_label.to_string()),
        }
    } else if let Some(grade) = req.grade.as_deref() {
        let classes = store::classes_by_grade(conn, grade)?;
        let class_ids: Vec<String> = classes.iter().map(|c| c.id.clone()).collect();
        Scope {
            students: store::students_by_grade(conn, grade)?,
            class_ids: Some(class_ids),
            label: Some(format!("Grade {}", grade)),
        }
    } else {
        Scope {
            students: store::all_students(conn)?,
            class_ids: None,
            label: None,
        }
    };
    // Deactivated students keep their rows but stay out of reports.
    scope.students.retain(|s| s.active);
    Ok(scope)
}

fn date_range_json(range: &DateRange) -> (String, String) {
    (range.start.to_string(), range.end.to_string())
}

// ---------------------------------------------------------------------------
// Grade reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStats {
    pub month: String,
    pub subject_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterStats {
    #[serde(flatten)]
    pub averages: SemesterAverage,
    pub monthly_breakdown: Vec<grades::MonthBreakdown>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGradeModel {
    pub student_id: String,
    pub display_name: String,
    pub class_id: String,
    pub gender: Option<String>,
    pub subjects: Vec<SubjectScore>,
    pub total_grade: f64,
    pub average_grade: f64,
    pub rank: usize,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_stats: Option<MonthlyStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semester_stats: Option<SemesterStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yearly_stats: Option<YearlyAverage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReportModel {
    pub report_type: &'static str,
    pub title: String,
    pub start_date: String,
    pub end_date: String,
    pub academic_year: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    pub total_students: usize,
    pub pass_count: usize,
    pub fail_count: usize,
    pub students: Vec<StudentGradeModel>,
    pub summary: GradeSummary,
}

/// Per-student grade entries with tags already parsed; rows with
/// unparseable tags are dropped.
fn score_entries_by_student(rows: &[GradeEntryRow]) -> HashMap<String, Vec<ScoreEntry>> {
    let mut out: HashMap<String, Vec<ScoreEntry>> = HashMap::new();
    for row in rows {
        let Some(tag) = PeriodTag::parse(&row.period_tag) else {
            continue;
        };
        out.entry(row.student_id.clone()).or_default().push(ScoreEntry {
            subject: row.subject.clone(),
            score: row.score,
            tag,
        });
    }
    out
}

fn entry_matches_semester(row: &GradeEntryRow, semester: u8, year: AcademicYear) -> bool {
    periods::parse_semester(&row.semester) == Some(semester)
        && AcademicYear::parse(&row.academic_year) == Some(year)
}

fn latest_tag(rows: &[GradeEntryRow]) -> Option<PeriodTag> {
    rows.iter()
        .filter_map(|r| PeriodTag::parse(&r.period_tag))
        .max()
}

/// Academic year inferred from the most recent grade entry. Tags carry no
/// day, so the first of the month stands in for the record date.
fn infer_year_from_entries(rows: &[GradeEntryRow]) -> Option<AcademicYear> {
    let tag = latest_tag(rows)?;
    let date = NaiveDate::from_ymd_opt(tag.year, tag.month, 1)?;
    Some(AcademicYear::containing(date))
}

fn requested_academic_year(req: &ReportRequest) -> Result<Option<AcademicYear>, StoreError> {
    match req.academic_year.as_deref() {
        None => Ok(None),
        Some(raw) => AcademicYear::parse(raw)
            .map(Some)
            .ok_or_else(|| bad_params("academicYear must look like \"2024-2025\"")),
    }
}

pub fn build_grade_report(
    conn: &Connection,
    req: &ReportRequest,
) -> Result<GradeReportModel, StoreError> {
    let period_type = PeriodType::parse(&req.report_type)
        .ok_or_else(|| bad_params("reportType must be daily, monthly, semester, or yearly"))?;
    if period_type == PeriodType::Daily {
        return Err(bad_params(
            "grade entries are recorded per month; daily grade reports are not defined",
        ));
    }

    let scope = resolve_scope(conn, req)?;
    let student_ids: Vec<String> = scope.students.iter().map(|s| s.id.clone()).collect();
    let all_rows = store::grade_entries_for_students(conn, &student_ids)?;
    let school = store::setting(conn, "school.name")?;

    match period_type {
        PeriodType::Monthly => build_monthly_grade_report(conn, req, &scope, &all_rows, school),
        PeriodType::Semester => build_semester_grade_report(conn, req, &scope, &all_rows, school),
        PeriodType::Yearly => build_yearly_grade_report(conn, req, &scope, &all_rows, school),
        PeriodType::Daily => unreachable!(),
    }
}

/// Shared tail of every grade report: rank, summarize, assemble.
fn finish_grade_report(
    conn: &Connection,
    scope: &Scope,
    mut students: Vec<StudentGradeModel>,
    report_type: &'static str,
    title: String,
    range: DateRange,
    academic_year: AcademicYear,
    school: Option<String>,
) -> Result<GradeReportModel, StoreError> {
    summary::assign_ranks(
        &mut students,
        |s| s.average_grade,
        |s, rank| s.rank = rank,
    );

    let averages: Vec<f64> = students.iter().map(|s| s.average_grade).collect();
    let dropped: Vec<DroppedStudent> = match &scope.class_ids {
        Some(ids) => store::dropped_students(conn, ids)?
            .into_iter()
            .map(|(student_id, gender)| DroppedStudent { student_id, gender })
            .collect(),
        None => Vec::new(),
    };
    let summary = summary::build_summary(&averages, &dropped);

    let (start_date, end_date) = date_range_json(&range);
    Ok(GradeReportModel {
        report_type,
        title,
        start_date,
        end_date,
        academic_year: academic_year.label(),
        scope: scope.label.clone(),
        school,
        total_students: students.len(),
        pass_count: summary.pass_count,
        fail_count: summary.fail_count,
        students,
        summary,
    })
}

fn pass_status(average: f64) -> &'static str {
    if average >= PASS_THRESHOLD {
        "pass"
    } else {
        "fail"
    }
}

fn build_monthly_grade_report(
    conn: &Connection,
    req: &ReportRequest,
    scope: &Scope,
    all_rows: &[GradeEntryRow],
    school: Option<String>,
) -> Result<GradeReportModel, StoreError> {
    let month = req.month.ok_or_else(|| bad_params("missing month"))?;
    if !(1..=12).contains(&month) {
        return Err(bad_params("month must be between 1 and 12"));
    }

    let requested_year = match (req.year, requested_academic_year(req)?) {
        (Some(y), _) => Some(y),
        (None, Some(ay)) => Some(ay.calendar_year_of_month(month)),
        (None, None) => None,
    };

    // When the requested month has no rows (or no year was given at all),
    // fall back to the academic year of the most recent entry. An explicit
    // request with data is never overridden.
    let mut target = requested_year.map(|y| PeriodTag::new(y, month));
    let has_rows = |tag: PeriodTag| {
        all_rows
            .iter()
            .any(|r| PeriodTag::parse(&r.period_tag) == Some(tag))
    };
    if target.map(&has_rows) != Some(true) {
        if let Some(inferred) = infer_year_from_entries(all_rows) {
            let fallback = PeriodTag::new(inferred.calendar_year_of_month(month), month);
            if target.is_none() || has_rows(fallback) {
                target = Some(fallback);
            }
        }
    }
    let target = target.ok_or_else(|| bad_params("missing year or academicYear"))?;

    let range = periods::month_range(target.year, target.month)
        .ok_or_else(|| bad_params("month out of range"))?;
    let academic_year =
        AcademicYear::containing(NaiveDate::from_ymd_opt(target.year, target.month, 1).unwrap_or(range.start));

    let monthly_rows: Vec<GradeEntryRow> = all_rows
        .iter()
        .filter(|r| PeriodTag::parse(&r.period_tag) == Some(target))
        .cloned()
        .collect();
    let by_student = score_entries_by_student(&monthly_rows);

    let mut students = Vec::with_capacity(scope.students.len());
    for s in &scope.students {
        let entries = by_student.get(&s.id).cloned().unwrap_or_default();
        let level = grades::parse_grade_level(&s.grade_level).unwrap_or(0);
        let max_scores = store::subject_max_scores(conn, &s.grade_level)?;
        let result = grades::monthly_result(&entries, level, |subject| {
            max_scores.get(subject).copied()
        });
        students.push(StudentGradeModel {
            student_id: s.id.clone(),
            display_name: s.display_name.clone(),
            class_id: s.class_id.clone(),
            gender: s.gender.clone(),
            status: pass_status(result.average_grade),
            total_grade: result.total_grade,
            average_grade: result.average_grade,
            rank: 0,
            monthly_stats: Some(MonthlyStats {
                month: target.display(),
                subject_count: result.subjects.len(),
            }),
            semester_stats: None,
            yearly_stats: None,
            subjects: result.subjects,
        });
    }

    let title = format!("Monthly Grade Report {}", target.display());
    finish_grade_report(
        conn,
        scope,
        students,
        "monthly",
        title,
        range,
        academic_year,
        school,
    )
}

fn build_semester_grade_report(
    conn: &Connection,
    req: &ReportRequest,
    scope: &Scope,
    all_rows: &[GradeEntryRow],
    school: Option<String>,
) -> Result<GradeReportModel, StoreError> {
    let semester_raw = req
        .semester
        .as_deref()
        .ok_or_else(|| bad_params("missing semester"))?;
    let semester =
        periods::parse_semester(semester_raw).ok_or_else(|| bad_params("semester must be 1 or 2"))?;

    let requested = requested_academic_year(req)?;
    let select = |year: AcademicYear| -> Vec<GradeEntryRow> {
        all_rows
            .iter()
            .filter(|r| entry_matches_semester(r, semester, year))
            .cloned()
            .collect()
    };

    let mut academic_year = requested;
    let mut rows = academic_year.map(&select).unwrap_or_default();
    if rows.is_empty() {
        if let Some(inferred) = infer_year_from_entries(all_rows) {
            let fallback_rows = select(inferred);
            if academic_year.is_none() || !fallback_rows.is_empty() {
                academic_year = Some(inferred);
                rows = fallback_rows;
            }
        }
    }
    let academic_year = academic_year.ok_or_else(|| bad_params("missing academicYear"))?;
    let range = periods::semester_range(academic_year, semester)
        .ok_or_else(|| bad_params("semester out of range"))?;

    let by_student = score_entries_by_student(&rows);
    let mut students = Vec::with_capacity(scope.students.len());
    for s in &scope.students {
        let entries = by_student.get(&s.id).cloned().unwrap_or_default();
        let level = grades::parse_grade_level(&s.grade_level).unwrap_or(0);
        let max_scores = store::subject_max_scores(conn, &s.grade_level)?;

        let averages = grades::semester_average(&entries, level);
        let breakdown = grades::monthly_totals(&entries, level);

        // Subject lines reflect the semester's latest month of scores.
        let last_tag = entries.iter().map(|e| e.tag).max();
        let last_entries: Vec<ScoreEntry> = entries
            .iter()
            .filter(|e| Some(e.tag) == last_tag)
            .cloned()
            .collect();
        let last_month = grades::monthly_result(&last_entries, level, |subject| {
            max_scores.get(subject).copied()
        });

        students.push(StudentGradeModel {
            student_id: s.id.clone(),
            display_name: s.display_name.clone(),
            class_id: s.class_id.clone(),
            gender: s.gender.clone(),
            status: pass_status(averages.overall_average),
            total_grade: last_month.total_grade,
            average_grade: averages.overall_average,
            rank: 0,
            monthly_stats: None,
            semester_stats: Some(SemesterStats {
                averages,
                monthly_breakdown: breakdown,
            }),
            yearly_stats: None,
            subjects: last_month.subjects,
        });
    }

    let title = format!(
        "Semester {} Grade Report {}",
        semester,
        academic_year.label()
    );
    finish_grade_report(
        conn,
        scope,
        students,
        "semester",
        title,
        range,
        academic_year,
        school,
    )
}

fn build_yearly_grade_report(
    conn: &Connection,
    req: &ReportRequest,
    scope: &Scope,
    all_rows: &[GradeEntryRow],
    school: Option<String>,
) -> Result<GradeReportModel, StoreError> {
    let requested = requested_academic_year(req)?;
    let select = |year: AcademicYear| -> (Vec<GradeEntryRow>, Vec<GradeEntryRow>) {
        let sem1 = all_rows
            .iter()
            .filter(|r| entry_matches_semester(r, 1, year))
            .cloned()
            .collect();
        let sem2 = all_rows
            .iter()
            .filter(|r| entry_matches_semester(r, 2, year))
            .cloned()
            .collect();
        (sem1, sem2)
    };

    let mut academic_year = requested;
    let mut picked = academic_year.map(&select).unwrap_or_default();
    if picked.0.is_empty() && picked.1.is_empty() {
        if let Some(inferred) = infer_year_from_entries(all_rows) {
            let fallback = select(inferred);
            if academic_year.is_none() || !(fallback.0.is_empty() && fallback.1.is_empty()) {
                academic_year = Some(inferred);
                picked = fallback;
            }
        }
    }
    let academic_year = academic_year.ok_or_else(|| bad_params("missing academicYear"))?;
    let range =
        periods::year_range(academic_year).ok_or_else(|| bad_params("academicYear out of range"))?;

    let sem1_by_student = score_entries_by_student(&picked.0);
    let sem2_by_student = score_entries_by_student(&picked.1);

    let mut students = Vec::with_capacity(scope.students.len());
    for s in &scope.students {
        let sem1 = sem1_by_student.get(&s.id).cloned().unwrap_or_default();
        let sem2 = sem2_by_student.get(&s.id).cloned().unwrap_or_default();
        let level = grades::parse_grade_level(&s.grade_level).unwrap_or(0);
        let max_scores = store::subject_max_scores(conn, &s.grade_level)?;

        let yearly = grades::yearly_average(&sem1, &sem2, level);
        let subject_grades = grades::yearly_subject_grades(&sem1, &sem2);

        let mut total = 0.0;
        let subjects: Vec<SubjectScore> = subject_grades
            .into_iter()
            .map(|(name, score)| {
                total += score;
                let max = max_scores
                    .get(&name)
                    .copied()
                    .unwrap_or_else(|| grades::scale_max_for_level(level));
                SubjectScore {
                    percentage: if max > 0.0 { 100.0 * score / max } else { 0.0 },
                    letter_grade: grades::letter_grade(score, level),
                    name,
                    score,
                    max_score: max,
                }
            })
            .collect();

        students.push(StudentGradeModel {
            student_id: s.id.clone(),
            display_name: s.display_name.clone(),
            class_id: s.class_id.clone(),
            gender: s.gender.clone(),
            status: pass_status(yearly.overall_average),
            total_grade: total,
            average_grade: yearly.overall_average,
            rank: 0,
            monthly_stats: None,
            semester_stats: None,
            yearly_stats: Some(yearly),
            subjects,
        });
    }

    let title = format!("Yearly Grade Report {}", academic_year.label());
    finish_grade_report(
        conn,
        scope,
        students,
        "yearly",
        title,
        range,
        academic_year,
        school,
    )
}

// ---------------------------------------------------------------------------
// Attendance reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendanceModel {
    pub student_id: String,
    pub display_name: String,
    pub class_id: String,
    #[serde(flatten)]
    pub units: StatusUnits,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAttendanceModel {
    pub class_id: String,
    pub class_name: String,
    #[serde(flatten)]
    pub units: StatusUnits,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub by_class: Vec<ClassAttendanceModel>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceReportModel {
    pub report_type: &'static str,
    pub title: String,
    pub start_date: String,
    pub end_date: String,
    pub academic_year: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    pub total_students: usize,
    pub totals: StatusUnits,
    pub attendance_rate: f64,
    pub students: Vec<StudentAttendanceModel>,
    pub summary: AttendanceSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_breakdown: Option<Vec<MonthUnits>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_periods: Option<Vec<String>>,
}

/// `explicit_year` is the request's literal calendar year; the fallback
/// pass omits it so the inferred academic year decides the month's year.
fn attendance_range(
    req: &ReportRequest,
    period_type: PeriodType,
    academic_year: Option<AcademicYear>,
    explicit_year: Option<i32>,
) -> Result<DateRange, StoreError> {
    match period_type {
        PeriodType::Daily => {
            let raw = req.date.as_deref().ok_or_else(|| bad_params("missing date"))?;
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| bad_params("date must be YYYY-MM-DD"))?;
            Ok(DateRange {
                start: date,
                end: date,
            })
        }
        PeriodType::Monthly => {
            let month = req.month.ok_or_else(|| bad_params("missing month"))?;
            let year = explicit_year
                .or_else(|| academic_year.map(|ay| ay.calendar_year_of_month(month)))
                .ok_or_else(|| bad_params("missing year or academicYear"))?;
            periods::month_range(year, month).ok_or_else(|| bad_params("month out of range"))
        }
        PeriodType::Semester => {
            let raw = req
                .semester
                .as_deref()
                .ok_or_else(|| bad_params("missing semester"))?;
            let semester =
                periods::parse_semester(raw).ok_or_else(|| bad_params("semester must be 1 or 2"))?;
            let year = academic_year.ok_or_else(|| bad_params("missing academicYear"))?;
            periods::semester_range(year, semester)
                .ok_or_else(|| bad_params("semester out of range"))
        }
        PeriodType::Yearly => {
            let year = academic_year.ok_or_else(|| bad_params("missing academicYear"))?;
            periods::year_range(year).ok_or_else(|| bad_params("academicYear out of range"))
        }
    }
}

fn attendance_title(period_type: PeriodType, range: &DateRange, year: AcademicYear) -> String {
    match period_type {
        PeriodType::Daily => format!("Daily Attendance Report {}", range.start),
        PeriodType::Monthly => format!(
            "Monthly Attendance Report {}",
            range.start.format("%Y-%m")
        ),
        PeriodType::Semester => format!("Semester Attendance Report {}", year.label()),
        PeriodType::Yearly => format!("Yearly Attendance Report {}", year.label()),
    }
}

pub fn build_attendance_report(
    conn: &Connection,
    req: &ReportRequest,
) -> Result<AttendanceReportModel, StoreError> {
    let period_type = PeriodType::parse(&req.report_type)
        .ok_or_else(|| bad_params("reportType must be daily, monthly, semester, or yearly"))?;

    let scope = resolve_scope(conn, req)?;
    let class_scope = scope.class_ids.as_deref();
    let school = store::setting(conn, "school.name")?;

    // Resolve the requested range; when no academic year was supplied at
    // all, start from the latest record so the first pass already lands on
    // a plausible year.
    let requested_year = requested_academic_year(req)?;
    let latest = store::latest_attendance_date(conn, class_scope)?;
    let guess = requested_year.or_else(|| latest.map(AcademicYear::containing));

    let mut range = attendance_range(req, period_type, guess, req.year)?;
    let mut records = store::attendance_in_range(conn, range.start, range.end, class_scope)?;

    // Auto-detection: only when the requested range came back empty, and
    // never for a daily request, which names one literal date. The fallback
    // drops the request's literal year so an empty explicit year can still
    // land on the year that has records.
    if records.is_empty() && period_type != PeriodType::Daily {
        if let Some(date) = latest {
            let fallback_range =
                attendance_range(req, period_type, Some(AcademicYear::containing(date)), None)?;
            if fallback_range != range {
                let fallback = store::attendance_in_range(
                    conn,
                    fallback_range.start,
                    fallback_range.end,
                    class_scope,
                )?;
                if !fallback.is_empty() {
                    range = fallback_range;
                    records = fallback;
                }
            }
        }
    }

    let academic_year = AcademicYear::containing(range.start);
    let (start_date, end_date) = date_range_json(&range);
    let title = attendance_title(period_type, &range, academic_year);

    if records.is_empty() {
        // NoDataFound is not an error: emit a structurally complete report
        // with an explanation and the periods that do carry data.
        let available = store::attendance_months_with_data(conn, class_scope)?;
        let scope_note = scope
            .label
            .as_deref()
            .map(|l| format!(" for {}", l))
            .unwrap_or_default();
        return Ok(AttendanceReportModel {
            report_type: period_type.as_str(),
            title,
            start_date: start_date.clone(),
            end_date,
            academic_year: academic_year.label(),
            scope: scope.label.clone(),
            school,
            total_students: 0,
            totals: StatusUnits::default(),
            attendance_rate: 0.0,
            students: Vec::new(),
            summary: AttendanceSummary {
                by_class: Vec::new(),
            },
            monthly_breakdown: None,
            error_message: Some(format!(
                "No attendance records{} between {} and {}",
                scope_note, start_date, range.end
            )),
            available_periods: Some(available),
        });
    }

    let per_student = attendance::tally_by_student(&records);
    let students: Vec<StudentAttendanceModel> = scope
        .students
        .iter()
        .map(|s| {
            let units = per_student.get(&s.id).copied().unwrap_or_default();
            StudentAttendanceModel {
                student_id: s.id.clone(),
                display_name: s.display_name.clone(),
                class_id: s.class_id.clone(),
                attendance_rate: units.attendance_rate(),
                units,
            }
        })
        .collect();

    let names = store::class_names(conn)?;
    let by_class: Vec<ClassAttendanceModel> = attendance::tally_by_class(&records)
        .into_iter()
        .map(|(class_id, units)| ClassAttendanceModel {
            class_name: names.get(&class_id).cloned().unwrap_or_default(),
            class_id,
            attendance_rate: units.attendance_rate(),
            units,
        })
        .collect();

    let totals = attendance::overall_units(&records);
    let monthly_breakdown = match period_type {
        PeriodType::Monthly | PeriodType::Semester | PeriodType::Yearly => {
            Some(attendance::monthly_breakdown(&records))
        }
        PeriodType::Daily => None,
    };

    Ok(AttendanceReportModel {
        report_type: period_type.as_str(),
        title,
        start_date,
        end_date,
        academic_year: academic_year.label(),
        scope: scope.label.clone(),
        school,
        total_students: students.len(),
        attendance_rate: totals.attendance_rate(),
        totals,
        students,
        summary: AttendanceSummary { by_class },
        monthly_breakdown,
        error_message: None,
        available_periods: None,
    })
}
