use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Rejection of a value that is not a JSON number. Numeric strings are not
/// coerced.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{what} must be a number, got {found}")]
pub struct ScoringError {
    pub what: String,
    pub found: String,
}

impl ScoringError {
    pub(crate) fn not_numeric(what: impl Into<String>, v: &Value) -> Self {
        Self {
            what: what.into(),
            found: json_kind(v).to_string(),
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn require_number(what: &str, v: &Value) -> Result<f64, ScoringError> {
    v.as_f64().ok_or_else(|| ScoringError::not_numeric(what, v))
}

/// Arithmetic mean with no rounding. An empty slice yields 0.
pub fn compute_mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let n = scores.len() as f64;
    let sum: f64 = scores.iter().sum();
    if sum.is_finite() {
        sum / n
    } else {
        // Large finite inputs can overflow the plain sum.
        scores.iter().map(|x| x / n).sum()
    }
}

/// `compute_mean` over untyped input; every element must be a JSON number.
pub fn compute_mean_checked(scores: &[Value]) -> Result<f64, ScoringError> {
    let nums = scores
        .iter()
        .enumerate()
        .map(|(i, v)| require_number(&format!("scores[{i}]"), v))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(compute_mean(&nums))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RubricBand {
    ExceedsExpectations,
    MeetsExpectations,
    ApproachingExpectations,
    BelowExpectations,
}

/// Inclusive lower bounds, highest first. The last entry is the catch-all.
const RUBRIC_THRESHOLDS: [(f64, RubricBand); 4] = [
    (80.0, RubricBand::ExceedsExpectations),
    (65.0, RubricBand::MeetsExpectations),
    (50.0, RubricBand::ApproachingExpectations),
    (0.0, RubricBand::BelowExpectations),
];

impl RubricBand {
    /// First band whose lower bound the mean meets, scanning top down.
    /// Anything below every bound (negatives, NaN) is Below Expectations.
    pub fn classify(mean: f64) -> Self {
        RUBRIC_THRESHOLDS
            .iter()
            .find(|(lower, _)| mean >= *lower)
            .map(|(_, band)| *band)
            .unwrap_or(RubricBand::BelowExpectations)
    }

    pub fn code(self) -> &'static str {
        match self {
            RubricBand::ExceedsExpectations => "E.E",
            RubricBand::MeetsExpectations => "M.E",
            RubricBand::ApproachingExpectations => "A.E",
            RubricBand::BelowExpectations => "B.E",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RubricBand::ExceedsExpectations => "Exceeds Expectations (E.E)",
            RubricBand::MeetsExpectations => "Meets Expectations (M.E)",
            RubricBand::ApproachingExpectations => "Approaching Expectations (A.E)",
            RubricBand::BelowExpectations => "Below Expectations (B.E)",
        }
    }

    /// Short remark printed next to a single subject score.
    pub fn subject_remark(self) -> &'static str {
        match self {
            RubricBand::ExceedsExpectations => "Excellent",
            RubricBand::MeetsExpectations => "Outstanding",
            RubricBand::ApproachingExpectations => "You can do better",
            RubricBand::BelowExpectations => "Needs improved study habits",
        }
    }

    /// Closing remark on the individual report.
    pub fn overall_remark(self) -> &'static str {
        match self {
            RubricBand::ExceedsExpectations => {
                "An exemplary learner; continues to set the bar for others."
            }
            RubricBand::MeetsExpectations => {
                "Has a good grasp of concepts and shows steady improvement."
            }
            RubricBand::ApproachingExpectations => {
                "Beginning to understand core ideas; would benefit from targeted support."
            }
            RubricBand::BelowExpectations => {
                "Can do better with increased effort and a structured learning plan."
            }
        }
    }
}

pub fn classify_rubric(mean: f64) -> RubricBand {
    RubricBand::classify(mean)
}

pub fn classify_rubric_checked(mean: &Value) -> Result<RubricBand, ScoringError> {
    Ok(RubricBand::classify(require_number("mean", mean)?))
}

/// Exam sittings within a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExamType {
    Opener,
    Midterm,
    Endterm,
}

impl ExamType {
    pub const ALL: [ExamType; 3] = [ExamType::Opener, ExamType::Midterm, ExamType::Endterm];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opener" => Some(ExamType::Opener),
            "midterm" => Some(ExamType::Midterm),
            "endterm" => Some(ExamType::Endterm),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExamType::Opener => "opener",
            ExamType::Midterm => "midterm",
            ExamType::Endterm => "endterm",
        }
    }

    /// Contribution to the weighted overall across a term's sittings.
    pub fn weight(self) -> f64 {
        match self {
            ExamType::Opener => 0.3,
            ExamType::Midterm => 0.3,
            ExamType::Endterm => 0.4,
        }
    }
}

impl std::fmt::Display for ExamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ExamType {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

/// Cross-sitting aggregate: opener 30%, midterm 30%, endterm 40%.
/// Independent of the per-sitting mean and never a substitute for it.
pub fn compute_weighted_overall(opener: f64, midterm: f64, endterm: f64) -> f64 {
    ExamType::Opener.weight() * opener
        + ExamType::Midterm.weight() * midterm
        + ExamType::Endterm.weight() * endterm
}

pub fn compute_weighted_overall_checked(
    opener: &Value,
    midterm: &Value,
    endterm: &Value,
) -> Result<f64, ScoringError> {
    Ok(compute_weighted_overall(
        require_number("opener", opener)?,
        require_number("midterm", midterm)?,
        require_number("endterm", endterm)?,
    ))
}

/// Rounding for display. Never applied to stored or ranked values.
pub fn round_to(x: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (x * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(compute_mean(&[]), 0.0);
        assert_eq!(compute_mean_checked(&[]), Ok(0.0));
    }

    #[test]
    fn mean_is_plain_average_without_rounding() {
        assert!(close(compute_mean(&[90.0, 80.0, 70.0, 60.0]), 75.0));
        assert!(close(compute_mean(&[1.0, 2.0, 2.0]), 5.0 / 3.0));
    }

    #[test]
    fn mean_of_huge_values_stays_finite() {
        assert_eq!(compute_mean(&[1e308, 1e308]), 1e308);
    }

    #[test]
    fn mean_is_permutation_invariant() {
        let a = [12.5, 99.0, 40.25, 0.0, 67.0];
        let mut b = a;
        b.reverse();
        let c = [40.25, 0.0, 99.0, 67.0, 12.5];
        assert!(close(compute_mean(&a), compute_mean(&b)));
        assert!(close(compute_mean(&a), compute_mean(&c)));
    }

    #[test]
    fn checked_mean_rejects_non_numbers() {
        let e = compute_mean_checked(&[json!(50), json!("80")]).unwrap_err();
        assert_eq!(e.what, "scores[1]");
        assert_eq!(e.found, "string");
        assert!(compute_mean_checked(&[json!(null)]).is_err());
        assert!(compute_mean_checked(&[json!(true), json!(1)]).is_err());
        assert!(close(
            compute_mean_checked(&[json!(50), json!(100.0)]).unwrap(),
            75.0
        ));
    }

    #[test]
    fn rubric_boundaries() {
        use RubricBand::*;
        assert_eq!(classify_rubric(100.0), ExceedsExpectations);
        assert_eq!(classify_rubric(80.0), ExceedsExpectations);
        assert_eq!(classify_rubric(79.999), MeetsExpectations);
        assert_eq!(classify_rubric(79.9), MeetsExpectations);
        assert_eq!(classify_rubric(65.0), MeetsExpectations);
        assert_eq!(classify_rubric(64.9), ApproachingExpectations);
        assert_eq!(classify_rubric(50.0), ApproachingExpectations);
        assert_eq!(classify_rubric(49.9), BelowExpectations);
        assert_eq!(classify_rubric(0.0), BelowExpectations);
        assert_eq!(classify_rubric(-5.0), BelowExpectations);
        assert_eq!(classify_rubric(f64::NAN), BelowExpectations);
    }

    #[test]
    fn rubric_labels_and_remarks() {
        assert_eq!(RubricBand::MeetsExpectations.label(), "Meets Expectations (M.E)");
        assert_eq!(RubricBand::ApproachingExpectations.code(), "A.E");
        assert_eq!(RubricBand::ExceedsExpectations.subject_remark(), "Excellent");
    }

    #[test]
    fn checked_rubric_rejects_strings() {
        assert!(classify_rubric_checked(&json!("80")).is_err());
        assert_eq!(
            classify_rubric_checked(&json!(80)),
            Ok(RubricBand::ExceedsExpectations)
        );
    }

    #[test]
    fn weighted_overall() {
        assert!(close(compute_weighted_overall(100.0, 100.0, 100.0), 100.0));
        assert!(close(compute_weighted_overall(0.0, 0.0, 100.0), 40.0));
        assert!(close(compute_weighted_overall(50.0, 70.0, 80.0), 68.0));
        let weights: f64 = ExamType::ALL.iter().map(|t| t.weight()).sum();
        assert!(close(weights, 1.0));
        let e = compute_weighted_overall_checked(&json!(1), &json!("2"), &json!(3)).unwrap_err();
        assert_eq!(e.what, "midterm");
    }

    #[test]
    fn exam_type_parse() {
        assert_eq!(ExamType::parse("Opener"), Some(ExamType::Opener));
        assert_eq!(ExamType::parse("endterm"), Some(ExamType::Endterm));
        assert_eq!(ExamType::parse("final"), None);
        assert_eq!(ExamType::Midterm.to_string(), "midterm");
    }

    #[test]
    fn round_for_display() {
        assert_eq!(round_to(72.3456, 2), 72.35);
        assert_eq!(round_to(72.3449, 2), 72.34);
        assert_eq!(round_to(72.5, 0), 73.0);
    }
}
