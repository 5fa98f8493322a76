//! Fallback matching for loosely formatted class labels.
//!
//! Historical data mixes forms like "9A", "9 A", "9-A", "Grade 9", and
//! "class 9a" for the same class. Matching is an ordered chain of literal
//! transforms, not fuzzy matching: each candidate is tried against the
//! store in turn and the first one with at least one hit wins.

/// How a candidate label should be matched against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassCandidate {
    /// Compare against the class display name.
    Name(String),
    /// Compare against the grade-level field (digits-only last resort).
    GradeLevel(String),
}

/// Ordered candidates for a requested class label. Duplicates are removed
/// while preserving first occurrence, so match priority stays deterministic.
pub fn candidates(label: &str) -> Vec<ClassCandidate> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    let mut names: Vec<String> = vec![
        trimmed.to_string(),
        trimmed.to_lowercase(),
        trimmed.to_uppercase(),
    ];
    if !digits.is_empty() {
        names.push(format!("Grade {}", digits));
        names.push(format!("Class {}", digits));
    }
    if let Some((num, rest)) = split_digit_letter(trimmed) {
        names.push(format!("{} {}", num, rest));
        names.push(format!("{}-{}", num, rest));
    }

    let mut out: Vec<ClassCandidate> = Vec::new();
    for name in names {
        let c = ClassCandidate::Name(name);
        if !out.contains(&c) {
            out.push(c);
        }
    }
    if !digits.is_empty() {
        let c = ClassCandidate::GradeLevel(digits);
        if !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

/// Splits a compact "9A"-style label into its digit prefix and the
/// remainder. Returns None when the label is not digits-then-letters.
fn split_digit_letter(label: &str) -> Option<(&str, &str)> {
    let idx = label.find(|c: char| !c.is_ascii_digit())?;
    if idx == 0 {
        return None;
    }
    let (num, rest) = label.split_at(idx);
    let rest = rest.trim_start_matches(['-', ' ']);
    if rest.is_empty() || !rest.chars().all(|c| c.is_alphanumeric()) {
        return None;
    }
    Some((num, rest))
}
