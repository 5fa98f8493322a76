use chrono::{Datelike, NaiveDate};

/// Month that opens the school year. Semester 1 runs from here to the end of
/// the calendar year, Semester 2 from January to June of the next one.
pub const SCHOOL_YEAR_START_MONTH: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodType {
    Daily,
    Monthly,
    Semester,
    Yearly,
}

impl PeriodType {
    pub fn parse(raw: &str) -> Option<PeriodType> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily" => Some(PeriodType::Daily),
            "monthly" => Some(PeriodType::Monthly),
            "semester" => Some(PeriodType::Semester),
            "yearly" => Some(PeriodType::Yearly),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PeriodType::Daily => "daily",
            PeriodType::Monthly => "monthly",
            PeriodType::Semester => "semester",
            PeriodType::Yearly => "yearly",
        }
    }
}

/// An academic year such as "2024-2025". `start` is the calendar year the
/// school year opens in; `end` is always `start + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcademicYear {
    pub start: i32,
    pub end: i32,
}

impl AcademicYear {
    pub fn starting(start: i32) -> AcademicYear {
        AcademicYear {
            start,
            end: start + 1,
        }
    }

    /// Accepts "2024-2025" or a bare "2024".
    pub fn parse(label: &str) -> Option<AcademicYear> {
        let t = label.trim();
        if let Some((a, b)) = t.split_once('-') {
            let start = a.trim().parse::<i32>().ok()?;
            let end = b.trim().parse::<i32>().ok()?;
            if end != start + 1 {
                return None;
            }
            return Some(AcademicYear { start, end });
        }
        t.parse::<i32>().ok().map(AcademicYear::starting)
    }

    pub fn label(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }

    /// Calendar year a given month of this academic year falls in.
    pub fn calendar_year_of_month(&self, month: u32) -> i32 {
        if month >= SCHOOL_YEAR_START_MONTH {
            self.start
        } else {
            self.end
        }
    }

    /// Academic year a calendar date belongs to: September onward opens a
    /// new school year, earlier months belong to the one before.
    pub fn containing(date: NaiveDate) -> AcademicYear {
        if date.month() >= SCHOOL_YEAR_START_MONTH {
            AcademicYear::starting(date.year())
        } else {
            AcademicYear::starting(date.year() - 1)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// First through last calendar day of `(year, month)`. The end is computed
/// as day 0 of the following month, which keeps leap years correct.
pub fn month_range(year: i32, month: u32) -> Option<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let (next_y, next_m) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let end = NaiveDate::from_ymd_opt(next_y, next_m, 1)?.pred_opt()?;
    Some(DateRange { start, end })
}

/// Semester 1: Sep 1 - Dec 31 of the opening year.
/// Semester 2: Jan 1 - Jun 30 of the closing year.
pub fn semester_range(year: AcademicYear, semester: u8) -> Option<DateRange> {
    match semester {
        1 => Some(DateRange {
            start: NaiveDate::from_ymd_opt(year.start, 9, 1)?,
            end: NaiveDate::from_ymd_opt(year.start, 12, 31)?,
        }),
        2 => Some(DateRange {
            start: NaiveDate::from_ymd_opt(year.end, 1, 1)?,
            end: NaiveDate::from_ymd_opt(year.end, 6, 30)?,
        }),
        _ => None,
    }
}

/// Whole school year: Sep 1 through Jun 30.
pub fn year_range(year: AcademicYear) -> Option<DateRange> {
    Some(DateRange {
        start: NaiveDate::from_ymd_opt(year.start, 9, 1)?,
        end: NaiveDate::from_ymd_opt(year.end, 6, 30)?,
    })
}

/// "1", "2", "Semester 1", "semester2" all resolve; anything else is None.
pub fn parse_semester(raw: &str) -> Option<u8> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.parse::<u8>().ok()? {
        n @ (1 | 2) => Some(n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn month_range_handles_leap_years() {
        let leap = month_range(2024, 2).unwrap();
        assert_eq!(leap.start, d(2024, 2, 1));
        assert_eq!(leap.end, d(2024, 2, 29));

        let plain = month_range(2023, 2).unwrap();
        assert_eq!(plain.end, d(2023, 2, 28));

        let december = month_range(2024, 12).unwrap();
        assert_eq!(december.end, d(2024, 12, 31));
    }

    #[test]
    fn semester_windows_match_school_calendar() {
        let ay = AcademicYear::parse("2024-2025").unwrap();

        let s1 = semester_range(ay, 1).unwrap();
        assert_eq!(s1.start, d(2024, 9, 1));
        assert_eq!(s1.end, d(2024, 12, 31));

        let s2 = semester_range(ay, 2).unwrap();
        assert_eq!(s2.start, d(2025, 1, 1));
        assert_eq!(s2.end, d(2025, 6, 30));

        let full = year_range(ay).unwrap();
        assert_eq!(full.start, d(2024, 9, 1));
        assert_eq!(full.end, d(2025, 6, 30));
    }

    #[test]
    fn academic_year_inference_splits_on_september() {
        assert_eq!(
            AcademicYear::containing(d(2024, 9, 1)),
            AcademicYear::starting(2024)
        );
        assert_eq!(
            AcademicYear::containing(d(2024, 8, 31)),
            AcademicYear::starting(2023)
        );
        assert_eq!(
            AcademicYear::containing(d(2025, 1, 15)),
            AcademicYear::starting(2024)
        );
    }

    #[test]
    fn academic_year_labels_round_trip() {
        let ay = AcademicYear::parse("2023-2024").unwrap();
        assert_eq!(ay.label(), "2023-2024");
        assert_eq!(ay.calendar_year_of_month(11), 2023);
        assert_eq!(ay.calendar_year_of_month(3), 2024);
        assert!(AcademicYear::parse("2023-2025").is_none());
        assert_eq!(AcademicYear::parse("2023"), Some(AcademicYear::starting(2023)));
    }

    #[test]
    fn semester_labels_parse_loosely() {
        assert_eq!(parse_semester("1"), Some(1));
        assert_eq!(parse_semester("Semester 2"), Some(2));
        assert_eq!(parse_semester("semester3"), None);
        assert_eq!(parse_semester("spring"), None);
    }
}
