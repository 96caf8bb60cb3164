//! Exam results engine: subject registry, scoring, ranking and the record
//! orchestration that ties them together, plus the SQLite-backed JSON-lines
//! sidecar that serves them.

pub mod config;
pub mod db;
pub mod ipc;
pub mod ranking;
pub mod record;
pub mod registry;
pub mod report;
pub mod scoring;

pub use ranking::{rank, Position, Rankable, Ranked};
pub use record::{apply_score_edit, Completeness, RecordError, StudentRecord};
pub use registry::{SubjectRegistry, SubjectSet};
pub use scoring::{
    classify_rubric, compute_mean, compute_weighted_overall, ExamType, RubricBand, ScoringError,
};
