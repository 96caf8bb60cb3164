use crate::db::{self, ResultFilter};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::load_report_settings;
use crate::ipc::helpers::{db_conn, required_class, required_exam_type, required_str};
use crate::ipc::types::{AppState, Request};
use crate::record::StudentRecord;
use crate::report::{self, Marklist, ReportSettings};
use crate::scoring::ExamType;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn report_settings(conn: &Connection, req: &Request) -> Result<ReportSettings, serde_json::Value> {
    load_report_settings(conn)
        .map_err(|e| err(&req.id, "db_query_failed", format!("{e:#}"), None))
}

fn group(
    state: &AppState,
    conn: &Connection,
    req: &Request,
    class_name: &str,
    exam_type: Option<ExamType>,
) -> Result<Vec<StudentRecord>, serde_json::Value> {
    let filter = ResultFilter {
        exam_type,
        class_name: Some(class_name.to_string()),
    };
    db::list_results(conn, &state.registry, &filter)
        .map_err(|e| err(&req.id, "db_query_failed", format!("{e:#}"), None))
}

fn to_value<T: serde::Serialize>(req: &Request, v: &T) -> serde_json::Value {
    match serde_json::to_value(v) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

fn marklist_for(state: &AppState, req: &Request) -> Result<(Marklist, ReportSettings), serde_json::Value> {
    let conn = db_conn(state, req)?;
    let class_name = required_class(req, "class")?;
    let exam_type = required_exam_type(req, "examType")?;
    let settings = report_settings(conn, req)?;
    let records = group(state, conn, req, &class_name, Some(exam_type))?;
    let marklist = report::build_marklist(
        &state.registry,
        &settings,
        &class_name,
        exam_type,
        &records,
    );
    Ok((marklist, settings))
}

fn handle_marklist(state: &mut AppState, req: &Request) -> serde_json::Value {
    match marklist_for(state, req) {
        Ok((marklist, _)) => to_value(req, &marklist),
        Err(e) => e,
    }
}

fn handle_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rec = match db::get_result(conn, &state.registry, &id) {
        Ok(Some(r)) => r,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "result not found",
                Some(json!({ "id": id })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };
    let settings = match report_settings(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let members = match group(state, conn, req, rec.class_name(), Some(rec.exam_type())) {
        Ok(g) => g,
        Err(e) => return e,
    };
    let Some(index) = members.iter().position(|r| r.id() == Some(id.as_str())) else {
        return err(&req.id, "not_found", "result not found", Some(json!({ "id": id })));
    };
    match report::build_student_report(&state.registry, &settings, &members, index) {
        Some(rep) => to_value(req, &rep),
        None => err(&req.id, "not_found", "result not found", Some(json!({ "id": id }))),
    }
}

fn handle_overall(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_name = match required_class(req, "class") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let settings = match report_settings(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let records = match group(state, conn, req, &class_name, None) {
        Ok(g) => g,
        Err(e) => return e,
    };
    let rep = report::build_overall_report(&settings, &name, &class_name, &records);
    to_value(req, &rep)
}

fn handle_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out = match required_str(req, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let (marklist, settings) = match marklist_for(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let contents = report::marklist_csv(&marklist, &settings);
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": parent.to_string_lossy() })),
            );
        }
    }
    if let Err(e) = std::fs::write(&out, contents) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out.to_string_lossy() })),
        );
    }
    info!(path = %out.to_string_lossy(), rows = marklist.rows.len(), "marklist exported");
    ok(
        &req.id,
        json!({
            "rowsExported": marklist.rows.len(),
            "path": out.to_string_lossy(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.marklist" => Some(handle_marklist(state, req)),
        "reports.student" => Some(handle_student(state, req)),
        "reports.overall" => Some(handle_overall(state, req)),
        "reports.exportMarklistCsv" => Some(handle_export_csv(state, req)),
        _ => None,
    }
}
