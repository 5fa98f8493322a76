use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// How a grade band turns a score total into an average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Divisor {
    /// Divide by the number of distinct subjects present (0 subjects -> 0).
    SubjectCount,
    /// Curriculum-fixed divisor, independent of the actual subject count.
    Fixed(f64),
}

/// Scoring rules for a contiguous range of grade levels.
#[derive(Debug, Clone, Copy)]
pub struct GradeBand {
    pub min_level: u8,
    pub max_level: u8,
    pub divisor: Divisor,
    /// Nominal per-subject score ceiling, used when a subject has no
    /// configured maximum.
    pub scale_max: f64,
    /// Letter thresholds, highest first. Scores below the last entry are F.
    pub thresholds: &'static [(f64, &'static str)],
}

const PRIMARY_THRESHOLDS: &[(f64, &'static str)] = &[
    (9.0, "A"),
    (8.0, "B"),
    (7.0, "C"),
    (6.0, "D"),
    (5.0, "E"),
];

const SECONDARY_THRESHOLDS: &[(f64, &'static str)] = &[
    (45.0, "A"),
    (40.0, "B"),
    (35.0, "C"),
    (30.0, "D"),
    (25.0, "E"),
];

/// The band table is the single place scoring rules live; adding a band is
/// a data change, not a code change. No band is defined above level 9.
static GRADE_BANDS: &[GradeBand] = &[
    GradeBand {
        min_level: 1,
        max_level: 6,
        divisor: Divisor::SubjectCount,
        scale_max: 10.0,
        thresholds: PRIMARY_THRESHOLDS,
    },
    GradeBand {
        min_level: 7,
        max_level: 8,
        divisor: Divisor::Fixed(14.0),
        scale_max: 50.0,
        thresholds: SECONDARY_THRESHOLDS,
    },
    GradeBand {
        min_level: 9,
        max_level: 9,
        divisor: Divisor::Fixed(8.4),
        scale_max: 50.0,
        thresholds: SECONDARY_THRESHOLDS,
    },
];

pub fn band_for_level(level: u8) -> Option<&'static GradeBand> {
    GRADE_BANDS
        .iter()
        .find(|b| level >= b.min_level && level <= b.max_level)
}

/// Grade levels are stored as strings ("9", "Grade 9"); only the digits
/// matter for band lookup.
pub fn parse_grade_level(raw: &str) -> Option<u8> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse::<u8>().ok()
}

/// Letter for a score on the band's own scale. Levels without a band
/// (above 9) have no defined letters and yield None.
pub fn letter_grade(score: f64, level: u8) -> Option<&'static str> {
    let band = band_for_level(level)?;
    for (min, letter) in band.thresholds {
        if score >= *min {
            return Some(letter);
        }
    }
    Some("F")
}

/// Band average rule: primary levels divide by the distinct subject count,
/// lower-secondary bands use their fixed curriculum divisor, and unknown
/// levels fall back to the subject count.
pub fn grade_average(total: f64, level: u8, distinct_subjects: usize) -> f64 {
    match band_for_level(level).map(|b| b.divisor) {
        Some(Divisor::Fixed(d)) => total / d,
        _ => {
            if distinct_subjects > 0 {
                total / distinct_subjects as f64
            } else {
                0.0
            }
        }
    }
}

pub fn scale_max_for_level(level: u8) -> f64 {
    band_for_level(level).map(|b| b.scale_max).unwrap_or(100.0)
}

/// A "month/2-digit-year" grade period tag. Ordering is chronological:
/// year first, then month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PeriodTag {
    pub year: i32,
    pub month: u32,
}

impl PeriodTag {
    pub fn new(year: i32, month: u32) -> PeriodTag {
        PeriodTag { year, month }
    }

    /// Accepts "11/23" and "11/2023"; rejects out-of-range months.
    pub fn parse(raw: &str) -> Option<PeriodTag> {
        let (m, y) = raw.trim().split_once('/')?;
        let month = m.trim().parse::<u32>().ok()?;
        if !(1..=12).contains(&month) {
            return None;
        }
        let year_raw = y.trim().parse::<i32>().ok()?;
        let year = if y.trim().len() <= 2 {
            2000 + year_raw
        } else {
            year_raw
        };
        Some(PeriodTag { year, month })
    }

    pub fn display(&self) -> String {
        format!("{}/{:02}", self.month, self.year % 100)
    }
}

/// One raw score entry, already scoped to a single student.
#[derive(Debug, Clone)]
pub struct ScoreEntry {
    pub subject: String,
    pub score: f64,
    pub tag: PeriodTag,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScore {
    pub name: String,
    pub score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub letter_grade: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyResult {
    pub subjects: Vec<SubjectScore>,
    pub total_grade: f64,
    pub average_grade: f64,
}

/// Aggregates one student's entries for a single month. `max_score` is the
/// curriculum lookup for the subject's configured maximum.
pub fn monthly_result<F>(entries: &[ScoreEntry], level: u8, max_score: F) -> MonthlyResult
where
    F: Fn(&str) -> Option<f64>,
{
    let mut subjects: Vec<SubjectScore> = Vec::with_capacity(entries.len());
    let mut distinct: BTreeSet<&str> = BTreeSet::new();
    let mut total = 0.0;

    for e in entries {
        let max = max_score(&e.subject).unwrap_or_else(|| scale_max_for_level(level));
        let percentage = if max > 0.0 { 100.0 * e.score / max } else { 0.0 };
        subjects.push(SubjectScore {
            name: e.subject.clone(),
            score: e.score,
            max_score: max,
            percentage,
            letter_grade: letter_grade(e.score, level),
        });
        distinct.insert(e.subject.as_str());
        total += e.score;
    }

    MonthlyResult {
        subjects,
        total_grade: total,
        average_grade: grade_average(total, level, distinct.len()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterAverage {
    pub last_month_average: f64,
    pub previous_months_average: f64,
    pub overall_average: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthBreakdown {
    pub month: String,
    pub total_grade: f64,
    pub average_grade: f64,
}

fn by_month(entries: &[ScoreEntry]) -> BTreeMap<PeriodTag, (f64, BTreeSet<&str>)> {
    let mut grouped: BTreeMap<PeriodTag, (f64, BTreeSet<&str>)> = BTreeMap::new();
    for e in entries {
        let slot = grouped.entry(e.tag).or_default();
        slot.0 += e.score;
        slot.1.insert(e.subject.as_str());
    }
    grouped
}

/// Semester rule: the chronologically latest month stands alone, every
/// earlier month is averaged as a block of monthly totals, and both halves
/// share the last month's distinct-subject count.
pub fn semester_average(entries: &[ScoreEntry], level: u8) -> SemesterAverage {
    let grouped = by_month(entries);
    let Some((_, (last_total, last_subjects))) = grouped.iter().next_back() else {
        return SemesterAverage::default();
    };
    let subject_count = last_subjects.len();

    let prior_totals: Vec<f64> = grouped
        .iter()
        .rev()
        .skip(1)
        .map(|(_, (total, _))| *total)
        .collect();
    let prior_mean = if prior_totals.is_empty() {
        0.0
    } else {
        prior_totals.iter().sum::<f64>() / prior_totals.len() as f64
    };

    let last_month_average = grade_average(*last_total, level, subject_count);
    let previous_months_average = grade_average(prior_mean, level, subject_count);
    SemesterAverage {
        last_month_average,
        previous_months_average,
        overall_average: (last_month_average + previous_months_average) / 2.0,
    }
}

/// Per-month totals and averages, chronological, for report breakdowns.
pub fn monthly_totals(entries: &[ScoreEntry], level: u8) -> Vec<MonthBreakdown> {
    by_month(entries)
        .iter()
        .map(|(tag, (total, subjects))| MonthBreakdown {
            month: tag.display(),
            total_grade: *total,
            average_grade: grade_average(*total, level, subjects.len()),
        })
        .collect()
}

/// A subject's semester half: latest-month score plus the mean of its
/// earlier monthly scores, halved. Missing subjects contribute 0.
fn subject_semester_half(entries: &[ScoreEntry], subject: &str) -> f64 {
    let mut by_tag: BTreeMap<PeriodTag, f64> = BTreeMap::new();
    for e in entries.iter().filter(|e| e.subject == subject) {
        *by_tag.entry(e.tag).or_insert(0.0) += e.score;
    }
    let Some((_, last)) = by_tag.iter().next_back() else {
        return 0.0;
    };
    let prior: Vec<f64> = by_tag.iter().rev().skip(1).map(|(_, v)| *v).collect();
    let prior_mean = if prior.is_empty() {
        0.0
    } else {
        prior.iter().sum::<f64>() / prior.len() as f64
    };
    (*last + prior_mean) / 2.0
}

/// Per-subject yearly grades: each semester contributes its own
/// last/previous-month split for the subject, and the two halves average.
pub fn yearly_subject_grades(sem1: &[ScoreEntry], sem2: &[ScoreEntry]) -> Vec<(String, f64)> {
    let mut subjects: BTreeSet<&str> = BTreeSet::new();
    for e in sem1.iter().chain(sem2) {
        subjects.insert(e.subject.as_str());
    }
    subjects
        .into_iter()
        .map(|s| {
            let h1 = subject_semester_half(sem1, s);
            let h2 = subject_semester_half(sem2, s);
            (s.to_string(), (h1 + h2) / 2.0)
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyAverage {
    pub semester1: SemesterAverage,
    pub semester2: SemesterAverage,
    pub overall_average: f64,
}

/// Yearly overall average is the mean of the two semester overall
/// averages. It is intentionally not recomputed from the per-subject
/// yearly grades; the two figures can differ and both are reported.
pub fn yearly_average(sem1: &[ScoreEntry], sem2: &[ScoreEntry], level: u8) -> YearlyAverage {
    let semester1 = semester_average(sem1, level);
    let semester2 = semester_average(sem2, level);
    let overall_average = (semester1.overall_average + semester2.overall_average) / 2.0;
    YearlyAverage {
        semester1,
        semester2,
        overall_average,
    }
}
