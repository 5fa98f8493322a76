use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

/// Attendance sub-unit of a day. Half-day sessions count one day-unit,
/// a full-day session counts two; every tally below is in day-units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {
    Am,
    Pm,
    Full,
}

impl Session {
    pub fn parse(raw: &str) -> Option<Session> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "AM" => Some(Session::Am),
            "PM" => Some(Session::Pm),
            "FULL" => Some(Session::Full),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Session::Am => "AM",
            Session::Pm => "PM",
            Session::Full => "FULL",
        }
    }

    pub fn units(self) -> u32 {
        match self {
            Session::Am | Session::Pm => 1,
            Session::Full => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn parse(raw: &str) -> Option<AttendanceStatus> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "late" => Some(AttendanceStatus::Late),
            "excused" => Some(AttendanceStatus::Excused),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
        }
    }
}

/// One attendance record, already decoded from the store.
#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub student_id: String,
    pub class_id: String,
    pub date: NaiveDate,
    pub session: Session,
    pub status: AttendanceStatus,
    pub reason: Option<String>,
}

/// Day-unit tallies per status plus the overall total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUnits {
    pub present: u32,
    pub absent: u32,
    pub late: u32,
    pub excused: u32,
    pub total: u32,
}

impl StatusUnits {
    pub fn add(&mut self, status: AttendanceStatus, units: u32) {
        match status {
            AttendanceStatus::Present => self.present += units,
            AttendanceStatus::Absent => self.absent += units,
            AttendanceStatus::Late => self.late += units,
            AttendanceStatus::Excused => self.excused += units,
        }
        self.total += units;
    }

    pub fn merge(&mut self, other: &StatusUnits) {
        self.present += other.present;
        self.absent += other.absent;
        self.late += other.late;
        self.excused += other.excused;
        self.total += other.total;
    }

    /// Present day-units as a percentage of all day-units; 0 when empty.
    pub fn attendance_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.present as f64 / self.total as f64
        }
    }
}

/// Per-student tallies, keyed by student id. BTreeMap keeps rollup order
/// deterministic across runs.
pub fn tally_by_student(records: &[AttendanceRecord]) -> BTreeMap<String, StatusUnits> {
    let mut out: BTreeMap<String, StatusUnits> = BTreeMap::new();
    for r in records {
        out.entry(r.student_id.clone())
            .or_default()
            .add(r.status, r.session.units());
    }
    out
}

pub fn tally_by_class(records: &[AttendanceRecord]) -> BTreeMap<String, StatusUnits> {
    let mut out: BTreeMap<String, StatusUnits> = BTreeMap::new();
    for r in records {
        out.entry(r.class_id.clone())
            .or_default()
            .add(r.status, r.session.units());
    }
    out
}

pub fn overall_units(records: &[AttendanceRecord]) -> StatusUnits {
    let mut out = StatusUnits::default();
    for r in records {
        out.add(r.status, r.session.units());
    }
    out
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthUnits {
    /// Calendar month in "YYYY-MM" form.
    pub month: String,
    #[serde(flatten)]
    pub units: StatusUnits,
    pub attendance_rate: f64,
}

/// Month-by-month breakdown grouped by the calendar month of each record's
/// date, chronological. Used by semester and yearly reports.
pub fn monthly_breakdown(records: &[AttendanceRecord]) -> Vec<MonthUnits> {
    let mut grouped: BTreeMap<(i32, u32), StatusUnits> = BTreeMap::new();
    for r in records {
        grouped
            .entry((r.date.year(), r.date.month()))
            .or_default()
            .add(r.status, r.session.units());
    }
    grouped
        .into_iter()
        .map(|((year, month), units)| MonthUnits {
            month: format!("{:04}-{:02}", year, month),
            attendance_rate: units.attendance_rate(),
            units,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(student: &str, date: (i32, u32, u32), session: Session, status: &str) -> AttendanceRecord {
        AttendanceRecord {
            student_id: student.to_string(),
            class_id: "c1".to_string(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            session,
            status: AttendanceStatus::parse(status).unwrap(),
            reason: None,
        }
    }

    #[test]
    fn full_sessions_count_two_units() {
        let records = vec![record("s1", (2024, 3, 4), Session::Full, "present")];
        let units = overall_units(&records);
        assert_eq!(units.present, 2);
        assert_eq!(units.total, 2);

        let records = vec![record("s1", (2024, 3, 4), Session::Am, "present")];
        let units = overall_units(&records);
        assert_eq!(units.present, 1);
        assert_eq!(units.total, 1);
    }

    #[test]
    fn attendance_rate_is_present_over_total() {
        let records = vec![
            record("s1", (2024, 3, 4), Session::Full, "present"),
            record("s1", (2024, 3, 5), Session::Am, "absent"),
            record("s1", (2024, 3, 5), Session::Pm, "late"),
        ];
        let per_student = tally_by_student(&records);
        let units = per_student.get("s1").unwrap();
        assert_eq!(units.total, 4);
        assert!((units.attendance_rate() - 50.0).abs() < 1e-9);
        assert_eq!(StatusUnits::default().attendance_rate(), 0.0);
    }

    #[test]
    fn breakdown_groups_by_calendar_month() {
        let records = vec![
            record("s1", (2023, 9, 12), Session::Full, "present"),
            record("s1", (2023, 10, 2), Session::Am, "present"),
            record("s2", (2023, 10, 2), Session::Am, "excused"),
        ];
        let months = monthly_breakdown(&records);
        assert_eq!(months.len(), 2);
        assert_eq!(months[0].month, "2023-09");
        assert_eq!(months[0].units.present, 2);
        assert_eq!(months[1].month, "2023-10");
        assert_eq!(months[1].units.excused, 1);
        assert!((months[1].attendance_rate - 50.0).abs() < 1e-9);
    }

    #[test]
    fn session_and_status_parse_case_insensitively() {
        assert_eq!(Session::parse("full"), Some(Session::Full));
        assert_eq!(Session::parse("am "), Some(Session::Am));
        assert_eq!(Session::parse("evening"), None);
        assert_eq!(
            AttendanceStatus::parse("Present"),
            Some(AttendanceStatus::Present)
        );
        assert_eq!(AttendanceStatus::parse("sick"), None);
    }
}
