use serde::Serialize;

/// Pass threshold on the 0-100 scale. Applied literally to every band, so
/// it is unreachable for the 0-10 primary averages; callers needing a
/// meaningful primary pass rate must normalize first.
pub const PASS_THRESHOLD: f64 = 50.0;

/// Sorts by average descending (stable) and writes `index + 1` into each
/// rank slot. Ties intentionally get distinct, sequential ranks; tie
/// grouping would change reports and is deliberately not done here.
pub fn assign_ranks<T, A, R>(items: &mut [T], average: A, mut set_rank: R)
where
    A: Fn(&T) -> f64,
    R: FnMut(&mut T, usize),
{
    items.sort_by(|a, b| {
        average(b)
            .partial_cmp(&average(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for (i, item) in items.iter_mut().enumerate() {
        set_rank(item, i + 1);
    }
}

/// Gender strings are free-form and bilingual; these are the recognized
/// female markers.
pub fn is_female(gender: &str) -> bool {
    let t = gender.trim();
    t.eq_ignore_ascii_case("female") || t.eq_ignore_ascii_case("f") || t == "ស្រី" || t == "ស"
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeDistribution {
    /// >= 90
    pub excellent: usize,
    /// 80 - 89
    pub good: usize,
    /// 70 - 79
    pub fair: usize,
    /// < 70
    pub poor: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSummary {
    pub total_students: usize,
    pub average_grade: f64,
    pub highest_grade: f64,
    pub lowest_grade: f64,
    pub pass_count: usize,
    pub fail_count: usize,
    pub pass_rate: f64,
    pub distribution: GradeDistribution,
    pub dropped_count: usize,
    pub female_dropped_count: usize,
}

/// A student flagged as having dropped an enrollment, with the gender
/// string needed for the female-dropped tally.
#[derive(Debug, Clone)]
pub struct DroppedStudent {
    pub student_id: String,
    pub gender: Option<String>,
}

pub fn build_summary(averages: &[f64], dropped: &[DroppedStudent]) -> GradeSummary {
    let mut summary = GradeSummary {
        total_students: averages.len(),
        dropped_count: dropped.len(),
        female_dropped_count: dropped
            .iter()
            .filter(|d| d.gender.as_deref().map(is_female).unwrap_or(false))
            .count(),
        ..GradeSummary::default()
    };
    if averages.is_empty() {
        return summary;
    }

    let mut sum = 0.0;
    let mut highest = f64::MIN;
    let mut lowest = f64::MAX;
    for &avg in averages {
        sum += avg;
        highest = highest.max(avg);
        lowest = lowest.min(avg);
        if avg >= PASS_THRESHOLD {
            summary.pass_count += 1;
        }
        if avg >= 90.0 {
            summary.distribution.excellent += 1;
        } else if avg >= 80.0 {
            summary.distribution.good += 1;
        } else if avg >= 70.0 {
            summary.distribution.fair += 1;
        } else {
            summary.distribution.poor += 1;
        }
    }

    summary.average_grade = sum / averages.len() as f64;
    summary.highest_grade = highest;
    summary.lowest_grade = lowest;
    summary.fail_count = summary.total_students - summary.pass_count;
    summary.pass_rate = 100.0 * summary.pass_count as f64 / summary.total_students as f64;
    summary
}
