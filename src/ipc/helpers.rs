use rusqlite::Connection;
use serde_json::json;

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::record::RecordError;
use crate::scoring::{ExamType, ScoringError};

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Absent or null is `None`; any other non-string is a bad parameter.
pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_str().map(|s| Some(s.to_string())).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be a string", key),
                None,
            )
        }),
    }
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn parse_exam_type(req: &Request, key: &str, raw: &str) -> Result<ExamType, serde_json::Value> {
    ExamType::parse(raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("{} must be one of: opener, midterm, endterm", key),
            Some(json!({ key: raw })),
        )
    })
}

pub fn required_exam_type(req: &Request, key: &str) -> Result<ExamType, serde_json::Value> {
    let raw = required_str(req, key)?;
    parse_exam_type(req, key, &raw)
}

pub fn optional_exam_type(req: &Request, key: &str) -> Result<Option<ExamType>, serde_json::Value> {
    match optional_str(req, key)? {
        Some(raw) => parse_exam_type(req, key, &raw).map(Some),
        None => Ok(None),
    }
}

/// A class id that must be present and non-blank.
pub fn required_class(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    let raw = required_str(req, key)?;
    let t = raw.trim();
    if t.is_empty() {
        return Err(err(&req.id, "bad_params", format!("{} must not be empty", key), None));
    }
    Ok(t.to_string())
}

/// Trimmed class id; absent, null or blank is `None`.
pub fn optional_class(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    Ok(optional_str(req, key)?
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

pub fn scoring_err(req: &Request, e: ScoringError) -> serde_json::Value {
    err(
        &req.id,
        "type_error",
        e.to_string(),
        Some(json!({ "field": e.what, "found": e.found })),
    )
}

pub fn record_err(req: &Request, e: RecordError) -> serde_json::Value {
    match e {
        RecordError::SubjectNotInClass {
            ref subject,
            ref class,
        } => err(
            &req.id,
            "subject_not_in_class",
            e.to_string(),
            Some(json!({ "subject": subject, "class": class })),
        ),
        RecordError::ScoreOutOfRange { ref subject, value } => err(
            &req.id,
            "score_out_of_range",
            e.to_string(),
            Some(json!({ "subject": subject, "value": value, "min": 0, "max": 100 })),
        ),
        RecordError::NotNumeric(inner) => scoring_err(req, inner),
    }
}
