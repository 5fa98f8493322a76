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

/// One grade-9 class stored under the hyphenated name "9-A" with a single
/// graded student. Requests then probe it under other label spellings.
fn seed_hyphenated_class(s: &mut Sidecar) {
    s.call(
        "classes.upsert",
        json!({
            "id": "c1",
            "name": "9-A",
            "gradeLevel": "9",
            "academicYear": "2023-2024"
        }),
    );
    s.call(
        "subjects.configure",
        json!({
            "gradeLevel": "9",
            "subjects": [{ "name": "Math", "maxScore": 50.0 }]
        }),
    );
    s.call(
        "students.upsert",
        json!({
            "id": "m1",
            "classId": "c1",
            "displayName": "Vanna",
            "gradeLevel": "9"
        }),
    );
    s.call(
        "grades.record",
        json!({
            "entries": [
                { "studentId": "m1", "subject": "Math", "score": 42.0,
                  "periodTag": "11/23", "semester": "1", "academicYear": "2023-2024" }
            ]
        }),
    );
}

fn monthly_report(s: &mut Sidecar, class: &str) -> serde_json::Value {
    s.call(
        "reports.gradeReportModel",
        json!({
            "reportType": "monthly",
            "month": 11,
            "academicYear": "2023-2024",
            "class": class
        }),
    )
}

#[test]
fn compact_label_reaches_the_hyphenated_class() {
    let mut s = Sidecar::start("classreport-match-compact");
    seed_hyphenated_class(&mut s);

    let report = monthly_report(&mut s, "9A");
    assert_eq!(report.pointer("/totalStudents"), Some(&json!(1)));
    assert_eq!(
        report.pointer("/students/0/displayName"),
        Some(&json!("Vanna"))
    );
    // Grade 9 band: 42 / 8.4 = 5.0, letter B on the 0-50 scale.
    let average = report
        .pointer("/students/0/averageGrade")
        .and_then(|v| v.as_f64())
        .expect("averageGrade");
    assert!((average - 5.0).abs() < 1e-9);
    assert_eq!(
        report.pointer("/students/0/subjects/0/letterGrade"),
        Some(&json!("B"))
    );
}

#[test]
fn grade_worded_label_falls_back_to_the_grade_level() {
    let mut s = Sidecar::start("classreport-match-grade");
    seed_hyphenated_class(&mut s);

    // "grade 9" matches no stored name; its digits match the grade level.
    let report = monthly_report(&mut s, "grade 9");
    assert_eq!(report.pointer("/totalStudents"), Some(&json!(1)));
    assert_eq!(report.pointer("/scope"), Some(&json!("grade 9")));
}

#[test]
fn exact_name_wins_before_any_transform() {
    let mut s = Sidecar::start("classreport-match-exact");
    seed_hyphenated_class(&mut s);

    let report = monthly_report(&mut s, "9-A");
    assert_eq!(report.pointer("/totalStudents"), Some(&json!(1)));
}

#[test]
fn unknown_label_yields_an_empty_scope_not_an_error() {
    let mut s = Sidecar::start("classreport-match-none");
    seed_hyphenated_class(&mut s);

    let report = monthly_report(&mut s, "Blue");
    assert_eq!(report.pointer("/totalStudents"), Some(&json!(0)));
    assert_eq!(report.pointer("/students"), Some(&json!([])));
    assert_eq!(report.pointer("/summary/totalStudents"), Some(&json!(0)));
}

#[test]
fn grade_filter_spans_every_section_of_that_grade() {
    let mut s = Sidecar::start("classreport-match-gradewide");
    seed_hyphenated_class(&mut s);
    s.call(
        "classes.upsert",
        json!({
            "id": "c2",
            "name": "9-B",
            "gradeLevel": "9",
            "academicYear": "2023-2024"
        }),
    );
    s.call(
        "students.upsert",
        json!({
            "id": "m2",
            "classId": "c2",
            "displayName": "Rith",
            "gradeLevel": "9"
        }),
    );
    s.call(
        "grades.record",
        json!({
            "entries": [
                { "studentId": "m2", "subject": "Math", "score": 21.0,
                  "periodTag": "11/23", "semester": "1", "academicYear": "2023-2024" }
            ]
        }),
    );

    let report = s.call(
        "reports.gradeReportModel",
        json!({
            "reportType": "monthly",
            "month": 11,
            "academicYear": "2023-2024",
            "grade": "9"
        }),
    );
    assert_eq!(report.pointer("/totalStudents"), Some(&json!(2)));
    assert_eq!(report.pointer("/scope"), Some(&json!("Grade 9")));
    // Ranked across sections: 42/8.4 beats 21/8.4.
    assert_eq!(
        report.pointer("/students/0/displayName"),
        Some(&json!("Vanna"))
    );
    assert_eq!(report.pointer("/students/0/rank"), Some(&json!(1)));
    assert_eq!(
        report.pointer("/students/1/displayName"),
        Some(&json!("Rith"))
    );
    assert_eq!(report.pointer("/students/1/rank"), Some(&json!(2)));
}
