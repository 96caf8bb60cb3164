use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::registry::SubjectRegistry;
use crate::scoring::{compute_mean, ExamType, RubricBand, ScoringError};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecordError {
    #[error("subject {subject:?} is not scored in class {class:?}")]
    SubjectNotInClass { subject: String, class: String },

    #[error("score for {subject:?} must be within 0..=100, got {value}")]
    ScoreOutOfRange { subject: String, value: f64 },

    #[error(transparent)]
    NotNumeric(#[from] ScoringError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectScore {
    pub subject: String,
    pub value: Option<f64>,
}

/// Whether the derived mean/rubric are populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    Incomplete,
    Complete,
}

/// One student's marks for one (class, exam type) sitting.
///
/// `mean` and `rubric` have no setters: they are recomputed from `scores`
/// whenever a score changes, and only once every subject of the class has
/// a mark.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentRecord {
    id: Option<String>,
    name: String,
    class_name: String,
    exam_type: ExamType,
    scores: Vec<SubjectScore>,
    mean: Option<f64>,
    rubric: Option<RubricBand>,
}

impl StudentRecord {
    /// A fresh entry row: every subject of the class unset.
    pub fn new(
        registry: &SubjectRegistry,
        name: impl Into<String>,
        class_name: impl Into<String>,
        exam_type: ExamType,
    ) -> Self {
        let class_name = class_name.into();
        let scores = registry
            .subjects_for_class(&class_name)
            .iter()
            .map(|code| SubjectScore {
                subject: code.to_string(),
                value: None,
            })
            .collect();
        Self {
            id: None,
            name: name.into(),
            class_name,
            exam_type,
            scores,
            mean: None,
            rubric: None,
        }
    }

    /// Rebuild a record from persisted scores. Stored mean/rubric are not
    /// consulted; they are derived again here.
    pub fn restore<I>(
        registry: &SubjectRegistry,
        id: impl Into<String>,
        name: impl Into<String>,
        class_name: impl Into<String>,
        exam_type: ExamType,
        stored: I,
    ) -> Self
    where
        I: IntoIterator<Item = (String, Option<f64>)>,
    {
        let mut rec = Self::new(registry, name, class_name, exam_type);
        let id = id.into();
        for (subject, value) in stored {
            let Some(slot) = rec.scores.iter_mut().find(|s| s.subject == subject) else {
                warn!(record = %id, %subject, class = %rec.class_name, "dropping stored score for subject outside class set");
                continue;
            };
            match value {
                Some(v) if !(MIN_SCORE..=MAX_SCORE).contains(&v) => {
                    warn!(record = %id, %subject, value = v, "dropping out-of-range stored score");
                }
                _ => slot.value = value,
            }
        }
        rec.id = Some(id);
        rec.recompute();
        rec
    }

    /// The single entry point for changing marks. Validation happens before
    /// anything is written, so a rejected edit leaves the record untouched.
    pub fn apply_score_edit(
        &mut self,
        registry: &SubjectRegistry,
        subject: &str,
        value: Option<f64>,
    ) -> Result<(), RecordError> {
        if !registry.subjects_for_class(&self.class_name).contains(subject) {
            return Err(RecordError::SubjectNotInClass {
                subject: subject.to_string(),
                class: self.class_name.clone(),
            });
        }
        if let Some(v) = value {
            if !(MIN_SCORE..=MAX_SCORE).contains(&v) {
                return Err(RecordError::ScoreOutOfRange {
                    subject: subject.to_string(),
                    value: v,
                });
            }
        }
        let Some(slot) = self.scores.iter_mut().find(|s| s.subject == subject) else {
            return Err(RecordError::SubjectNotInClass {
                subject: subject.to_string(),
                class: self.class_name.clone(),
            });
        };
        slot.value = value;
        self.recompute();
        Ok(())
    }

    fn recompute(&mut self) {
        let values: Option<Vec<f64>> = self.scores.iter().map(|s| s.value).collect();
        match values {
            Some(v) if !v.is_empty() => {
                let mean = compute_mean(&v);
                self.mean = Some(mean);
                self.rubric = Some(RubricBand::classify(mean));
            }
            _ => {
                self.mean = None;
                self.rubric = None;
            }
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn exam_type(&self) -> ExamType {
        self.exam_type
    }

    /// Scores in registry order for the record's class.
    pub fn scores(&self) -> &[SubjectScore] {
        &self.scores
    }

    pub fn score(&self, subject: &str) -> Option<f64> {
        self.scores
            .iter()
            .find(|s| s.subject == subject)
            .and_then(|s| s.value)
    }

    pub fn mean(&self) -> Option<f64> {
        self.mean
    }

    pub fn rubric(&self) -> Option<RubricBand> {
        self.rubric
    }

    pub fn completeness(&self) -> Completeness {
        if self.mean.is_some() {
            Completeness::Complete
        } else {
            Completeness::Incomplete
        }
    }

    pub fn to_json(&self) -> Value {
        let mut scores = Map::new();
        for s in &self.scores {
            scores.insert(s.subject.clone(), json!(s.value));
        }
        json!({
            "id": self.id,
            "name": self.name,
            "class": self.class_name,
            "examType": self.exam_type.as_str(),
            "scores": scores,
            "mean": self.mean,
            "rubric": self.rubric.map(|r| r.label()),
        })
    }
}

/// Functional form of [`StudentRecord::apply_score_edit`]: the input is left
/// as it was and the edited copy is returned.
pub fn apply_score_edit(
    registry: &SubjectRegistry,
    record: &StudentRecord,
    subject: &str,
    value: Option<f64>,
) -> Result<StudentRecord, RecordError> {
    let mut next = record.clone();
    next.apply_score_edit(registry, subject, value)?;
    Ok(next)
}

/// Read a score cell from untyped input: `null` clears it, a number sets it,
/// anything else is refused.
pub fn score_from_json(subject: &str, v: &Value) -> Result<Option<f64>, ScoringError> {
    if v.is_null() {
        return Ok(None);
    }
    v.as_f64()
        .map(Some)
        .ok_or_else(|| ScoringError::not_numeric(format!("score for {subject}"), v))
}
