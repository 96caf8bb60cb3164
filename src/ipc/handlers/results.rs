use crate::db::{self, ResultFilter};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, optional_class, optional_exam_type, optional_str, record_err, required_class,
    required_exam_type, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::record::{score_from_json, StudentRecord};
use crate::registry::SubjectRegistry;
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

fn load_record(
    conn: &Connection,
    registry: &SubjectRegistry,
    req: &Request,
    id: &str,
) -> Result<StudentRecord, serde_json::Value> {
    match db::get_result(conn, registry, id) {
        Ok(Some(r)) => Ok(r),
        Ok(None) => Err(err(
            &req.id,
            "not_found",
            "result not found",
            Some(json!({ "id": id })),
        )),
        Err(e) => Err(err(&req.id, "db_query_failed", format!("{e:#}"), None)),
    }
}

fn save_record(conn: &Connection, req: &Request, rec: &StudentRecord) -> serde_json::Value {
    match db::update_result(conn, rec) {
        Ok(true) => ok(&req.id, json!({ "result": rec.to_json() })),
        Ok(false) => err(
            &req.id,
            "not_found",
            "result not found",
            Some(json!({ "id": rec.id() })),
        ),
        Err(e) => err(&req.id, "db_update_failed", format!("{e:#}"), None),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_name = match required_class(req, "class") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let exam_type = match required_exam_type(req, "examType") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match optional_str(req, "name") {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return e,
    };

    let registry = &state.registry;
    let mut rec = StudentRecord::new(registry, name, class_name, exam_type);

    match req.params.get("scores") {
        None => {}
        Some(v) if v.is_null() => {}
        Some(v) => {
            let Some(cells) = v.as_object() else {
                return err(&req.id, "bad_params", "scores must be an object", None);
            };
            for (subject, raw) in cells {
                let value = match score_from_json(subject, raw) {
                    Ok(v) => v,
                    Err(e) => return record_err(req, e.into()),
                };
                if let Err(e) = rec.apply_score_edit(registry, subject, value) {
                    return record_err(req, e);
                }
            }
        }
    }

    match db::insert_result(conn, &mut rec) {
        Ok(id) => {
            info!(%id, class = rec.class_name(), exam = %rec.exam_type(), "result row added");
            ok(&req.id, json!({ "result": rec.to_json() }))
        }
        Err(e) => err(&req.id, "db_insert_failed", format!("{e:#}"), None),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match load_record(conn, &state.registry, req, &id) {
        Ok(rec) => ok(&req.id, json!({ "result": rec.to_json() })),
        Err(e) => e,
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let exam_type = match optional_exam_type(req, "examType") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_name = match optional_class(req, "class") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let filter = ResultFilter {
        exam_type,
        class_name,
    };
    match db::list_results(conn, &state.registry, &filter) {
        Ok(rows) => ok(
            &req.id,
            json!({ "results": rows.iter().map(StudentRecord::to_json).collect::<Vec<_>>() }),
        ),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn handle_edit_score(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject = match required_str(req, "subject") {
        Ok(v) => v,
        Err(e) => return e,
    };
    // `value: null` clears the cell; a missing key is a mistake.
    let Some(raw) = req.params.get("value") else {
        return err(&req.id, "bad_params", "missing value", None);
    };
    let value = match score_from_json(&subject, raw) {
        Ok(v) => v,
        Err(e) => return record_err(req, e.into()),
    };

    let registry = &state.registry;
    let mut rec = match load_record(conn, registry, req, &id) {
        Ok(r) => r,
        Err(e) => return e,
    };
    if let Err(e) = rec.apply_score_edit(registry, &subject, value) {
        return record_err(req, e);
    }
    save_record(conn, req, &rec)
}

fn handle_rename(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut rec = match load_record(conn, &state.registry, req, &id) {
        Ok(r) => r,
        Err(e) => return e,
    };
    rec.rename(name.trim());
    save_record(conn, req, &rec)
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::delete_result(conn, &id) {
        Ok(true) => {
            info!(%id, "result deleted");
            ok(&req.id, json!({ "deleted": true }))
        }
        Ok(false) => err(
            &req.id,
            "not_found",
            "result not found",
            Some(json!({ "id": id })),
        ),
        Err(e) => err(&req.id, "db_delete_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.create" => Some(handle_create(state, req)),
        "results.get" => Some(handle_get(state, req)),
        "results.list" => Some(handle_list(state, req)),
        "results.editScore" => Some(handle_edit_score(state, req)),
        "results.rename" => Some(handle_rename(state, req)),
        "results.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
