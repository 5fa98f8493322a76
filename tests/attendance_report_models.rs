use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_classreportd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classreportd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u32,
}

impl Sidecar {
    fn start(workspace_prefix: &str) -> Sidecar {
        let workspace = temp_dir(workspace_prefix);
        let (child, stdin, reader) = spawn_sidecar();
        let mut s = Sidecar {
            child,
            stdin,
            reader,
            next_id: 0,
        };
        s.call(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        s
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn f64_at(value: &serde_json::Value, pointer: &str) -> f64 {
    value
        .pointer(pointer)
        .and_then(|v| v.as_f64())
        .unwrap_or_else(|| panic!("missing number at {}: {}", pointer, value))
}

fn str_at<'a>(value: &'a serde_json::Value, pointer: &str) -> &'a str {
    value
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing string at {}: {}", pointer, value))
}

/// March 2024 attendance for two grade-9 students: Kosal has a full
/// present day plus an absent and a late half-day; Maly has two present
/// half-days plus a full excused day.
fn seed_attendance(s: &mut Sidecar) {
    s.call(
        "classes.upsert",
        json!({
            "id": "c1",
            "name": "9A",
            "gradeLevel": "9",
            "academicYear": "2023-2024"
        }),
    );
    for (id, name) in [("a1", "Kosal"), ("a2", "Maly")] {
        s.call(
            "students.upsert",
            json!({
                "id": id,
                "classId": "c1",
                "displayName": name,
                "gradeLevel": "9"
            }),
        );
    }
    s.call(
        "attendance.record",
        json!({
            "entries": [
                { "studentId": "a1", "classId": "c1", "date": "2024-03-04",
                  "session": "FULL", "status": "present" },
                { "studentId": "a1", "classId": "c1", "date": "2024-03-05",
                  "session": "AM", "status": "absent" },
                { "studentId": "a1", "classId": "c1", "date": "2024-03-05",
                  "session": "PM", "status": "late" },
                { "studentId": "a2", "classId": "c1", "date": "2024-03-04",
                  "session": "AM", "status": "present" },
                { "studentId": "a2", "classId": "c1", "date": "2024-03-04",
                  "session": "PM", "status": "present" },
                { "studentId": "a2", "classId": "c1", "date": "2024-03-06",
                  "session": "FULL", "status": "excused", "reason": "sick" }
            ]
        }),
    );
}

#[test]
fn monthly_attendance_counts_day_units() {
    let mut s = Sidecar::start("classreport-att-monthly");
    seed_attendance(&mut s);

    let report = s.call(
        "reports.attendanceReportModel",
        json!({
            "reportType": "monthly",
            "month": 3,
            "year": 2024,
            "class": "9A"
        }),
    );

    assert_eq!(str_at(&report, "/reportType"), "monthly");
    assert_eq!(str_at(&report, "/startDate"), "2024-03-01");
    assert_eq!(str_at(&report, "/endDate"), "2024-03-31");
    assert_eq!(str_at(&report, "/academicYear"), "2023-2024");
    assert_eq!(report.pointer("/totalStudents"), Some(&json!(2)));

    assert_eq!(report.pointer("/totals/present"), Some(&json!(4)));
    assert_eq!(report.pointer("/totals/absent"), Some(&json!(1)));
    assert_eq!(report.pointer("/totals/late"), Some(&json!(1)));
    assert_eq!(report.pointer("/totals/excused"), Some(&json!(2)));
    assert_eq!(report.pointer("/totals/total"), Some(&json!(8)));
    assert!((f64_at(&report, "/attendanceRate") - 50.0).abs() < 1e-9);

    // Kosal: FULL present (2 units), one absent and one late half-day.
    assert_eq!(str_at(&report, "/students/0/displayName"), "Kosal");
    assert_eq!(report.pointer("/students/0/present"), Some(&json!(2)));
    assert_eq!(report.pointer("/students/0/absent"), Some(&json!(1)));
    assert_eq!(report.pointer("/students/0/late"), Some(&json!(1)));
    assert_eq!(report.pointer("/students/0/total"), Some(&json!(4)));
    assert!((f64_at(&report, "/students/0/attendanceRate") - 50.0).abs() < 1e-9);

    assert_eq!(report.pointer("/students/1/excused"), Some(&json!(2)));

    assert_eq!(str_at(&report, "/summary/byClass/0/className"), "9A");
    assert_eq!(report.pointer("/summary/byClass/0/total"), Some(&json!(8)));

    assert_eq!(
        report.pointer("/monthlyBreakdown/0/month"),
        Some(&json!("2024-03"))
    );
    assert_eq!(report.pointer("/errorMessage"), None);
}

#[test]
fn daily_attendance_reports_one_literal_date() {
    let mut s = Sidecar::start("classreport-att-daily");
    seed_attendance(&mut s);

    let report = s.call(
        "reports.attendanceReportModel",
        json!({
            "reportType": "daily",
            "date": "2024-03-04",
            "class": "9A"
        }),
    );

    assert_eq!(str_at(&report, "/startDate"), "2024-03-04");
    assert_eq!(str_at(&report, "/endDate"), "2024-03-04");
    assert_eq!(report.pointer("/totals/present"), Some(&json!(4)));
    assert_eq!(report.pointer("/totals/total"), Some(&json!(4)));
    assert!((f64_at(&report, "/attendanceRate") - 100.0).abs() < 1e-9);
    // Daily reports carry no per-month breakdown.
    assert_eq!(report.pointer("/monthlyBreakdown"), None);
}

#[test]
fn semester_window_spans_the_configured_school_calendar() {
    let mut s = Sidecar::start("classreport-att-semester");
    seed_attendance(&mut s);

    // Semester 1 of 2023-2024 has no records; the report still comes back
    // structurally complete with the semester window dates.
    let report = s.call(
        "reports.attendanceReportModel",
        json!({
            "reportType": "semester",
            "semester": "1",
            "academicYear": "2023-2024",
            "class": "9A"
        }),
    );
    assert_eq!(str_at(&report, "/startDate"), "2023-09-01");
    assert_eq!(str_at(&report, "/endDate"), "2023-12-31");
    assert_eq!(report.pointer("/totalStudents"), Some(&json!(0)));
    assert!(!str_at(&report, "/errorMessage").is_empty());
    assert_eq!(
        report.pointer("/availablePeriods"),
        Some(&json!(["2024-03"]))
    );

    // Semester 2 covers January through June and finds the March data.
    let report = s.call(
        "reports.attendanceReportModel",
        json!({
            "reportType": "semester",
            "semester": "2",
            "academicYear": "2023-2024",
            "class": "9A"
        }),
    );
    assert_eq!(str_at(&report, "/startDate"), "2024-01-01");
    assert_eq!(str_at(&report, "/endDate"), "2024-06-30");
    assert_eq!(report.pointer("/totals/total"), Some(&json!(8)));
    assert_eq!(
        report.pointer("/monthlyBreakdown/0/month"),
        Some(&json!("2024-03"))
    );
}

#[test]
fn leap_year_february_ends_on_the_twenty_ninth() {
    let mut s = Sidecar::start("classreport-att-leap");
    seed_attendance(&mut s);

    let report = s.call(
        "reports.attendanceReportModel",
        json!({
            "reportType": "monthly",
            "month": 2,
            "year": 2024,
            "class": "9A"
        }),
    );
    assert_eq!(str_at(&report, "/endDate"), "2024-02-29");
    // Explicitly requested month with no data stays put and explains itself.
    assert_eq!(report.pointer("/totalStudents"), Some(&json!(0)));
    assert!(!str_at(&report, "/errorMessage").is_empty());

    let report = s.call(
        "reports.attendanceReportModel",
        json!({
            "reportType": "monthly",
            "month": 2,
            "year": 2023,
            "class": "9A"
        }),
    );
    assert_eq!(str_at(&report, "/endDate"), "2023-02-28");
}

#[test]
fn missing_year_is_inferred_from_the_latest_record() {
    let mut s = Sidecar::start("classreport-att-infer");
    seed_attendance(&mut s);

    // No year or academicYear: the latest record (March 2024) puts the
    // request in school year 2023-2024, so month 3 lands on March 2024.
    let report = s.call(
        "reports.attendanceReportModel",
        json!({
            "reportType": "monthly",
            "month": 3,
            "class": "9A"
        }),
    );
    assert_eq!(str_at(&report, "/startDate"), "2024-03-01");
    assert_eq!(report.pointer("/totals/total"), Some(&json!(8)));

    // An explicitly requested year with no data falls back to the year
    // that does have records.
    let report = s.call(
        "reports.attendanceReportModel",
        json!({
            "reportType": "semester",
            "semester": "2",
            "academicYear": "2020-2021",
            "class": "9A"
        }),
    );
    assert_eq!(str_at(&report, "/academicYear"), "2023-2024");
    assert_eq!(str_at(&report, "/startDate"), "2024-01-01");
    assert_eq!(report.pointer("/totals/total"), Some(&json!(8)));
}

#[test]
fn explicit_empty_year_falls_back_to_the_year_with_records() {
    let mut s = Sidecar::start("classreport-att-explicit-year");
    seed_attendance(&mut s);

    // The literal year 2020 has no records at all; the report lands on
    // March of the school year the latest record belongs to.
    let report = s.call(
        "reports.attendanceReportModel",
        json!({
            "reportType": "monthly",
            "month": 3,
            "year": 2020,
            "class": "9A"
        }),
    );
    assert_eq!(str_at(&report, "/startDate"), "2024-03-01");
    assert_eq!(str_at(&report, "/academicYear"), "2023-2024");
    assert_eq!(report.pointer("/totals/total"), Some(&json!(8)));
    assert_eq!(report.pointer("/errorMessage"), None);
}

#[test]
fn yearly_attendance_covers_september_through_june() {
    let mut s = Sidecar::start("classreport-att-yearly");
    seed_attendance(&mut s);
    s.call(
        "attendance.record",
        json!({
            "entries": [
                { "studentId": "a1", "classId": "c1", "date": "2023-10-09",
                  "session": "FULL", "status": "present" }
            ]
        }),
    );

    let report = s.call(
        "reports.attendanceReportModel",
        json!({
            "reportType": "yearly",
            "academicYear": "2023-2024",
            "class": "9A"
        }),
    );
    assert_eq!(str_at(&report, "/startDate"), "2023-09-01");
    assert_eq!(str_at(&report, "/endDate"), "2024-06-30");
    assert_eq!(report.pointer("/totals/total"), Some(&json!(10)));
    assert_eq!(
        report.pointer("/monthlyBreakdown/0/month"),
        Some(&json!("2023-10"))
    );
    assert_eq!(
        report.pointer("/monthlyBreakdown/1/month"),
        Some(&json!("2024-03"))
    );
}

#[test]
fn rerecording_a_session_overwrites_instead_of_duplicating() {
    let mut s = Sidecar::start("classreport-att-upsert");
    seed_attendance(&mut s);
    s.call(
        "attendance.record",
        json!({
            "entries": [
                { "studentId": "a1", "classId": "c1", "date": "2024-03-05",
                  "session": "AM", "status": "excused", "reason": "clinic" }
            ]
        }),
    );

    let report = s.call(
        "reports.attendanceReportModel",
        json!({
            "reportType": "monthly",
            "month": 3,
            "year": 2024,
            "class": "9A"
        }),
    );
    assert_eq!(report.pointer("/totals/total"), Some(&json!(8)));
    assert_eq!(report.pointer("/totals/absent"), Some(&json!(0)));
    assert_eq!(report.pointer("/totals/excused"), Some(&json!(4)));
}
