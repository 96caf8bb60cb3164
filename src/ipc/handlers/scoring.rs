use crate::ipc::error::{err, ok};
use crate::ipc::helpers::scoring_err;
use crate::ipc::types::{AppState, Request};
use crate::scoring;
use serde_json::{json, Value};

static MISSING: Value = Value::Null;

fn param<'a>(req: &'a Request, key: &str) -> &'a Value {
    req.params.get(key).unwrap_or(&MISSING)
}

fn handle_mean(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(scores) = req.params.get("scores").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "scores must be an array", None);
    };
    match scoring::compute_mean_checked(scores) {
        Ok(mean) => ok(&req.id, json!({ "mean": mean })),
        Err(e) => scoring_err(req, e),
    }
}

fn handle_rubric(_state: &mut AppState, req: &Request) -> serde_json::Value {
    match scoring::classify_rubric_checked(param(req, "mean")) {
        Ok(band) => ok(
            &req.id,
            json!({ "code": band.code(), "label": band.label() }),
        ),
        Err(e) => scoring_err(req, e),
    }
}

fn handle_weighted_overall(_state: &mut AppState, req: &Request) -> serde_json::Value {
    match scoring::compute_weighted_overall_checked(
        param(req, "opener"),
        param(req, "midterm"),
        param(req, "endterm"),
    ) {
        Ok(overall) => ok(&req.id, json!({ "overall": overall })),
        Err(e) => scoring_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scoring.mean" => Some(handle_mean(state, req)),
        "scoring.rubric" => Some(handle_rubric(state, req)),
        "scoring.weightedOverall" => Some(handle_weighted_overall(state, req)),
        _ => None,
    }
}
