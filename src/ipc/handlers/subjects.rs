use crate::ipc::error::ok;
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::registry::{SubjectRegistry, SubjectSet};
use serde_json::json;
use tracing::debug;

fn subjects_json(registry: &SubjectRegistry, set: &SubjectSet) -> serde_json::Value {
    json!(set
        .iter()
        .map(|code| json!({ "code": code, "displayName": registry.display_name(code) }))
        .collect::<Vec<_>>())
}

fn handle_classes(state: &mut AppState, req: &Request) -> serde_json::Value {
    let reg = &state.registry;
    let classes: Vec<serde_json::Value> = reg
        .classes()
        .map(|(name, set)| json!({ "class": name, "subjects": subjects_json(reg, set) }))
        .collect();
    ok(
        &req.id,
        json!({ "defaultClass": reg.default_class(), "classes": classes }),
    )
}

fn handle_for_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    // Missing or non-string class resolves like an unknown one.
    let class = req
        .params
        .get("class")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let reg = &state.registry;
    let (resolved, is_default) = reg.resolve(class);
    if is_default {
        debug!(class, resolved, "unknown class resolved to default subject set");
    }
    ok(
        &req.id,
        json!({
            "class": class,
            "resolvedClass": resolved,
            "isDefault": is_default,
            "subjects": subjects_json(reg, reg.subjects_for_class(class)),
        }),
    )
}

fn handle_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "subjects": state.registry.all_subjects() }))
}

fn handle_display_name(state: &mut AppState, req: &Request) -> serde_json::Value {
    let code = match required_str(req, "code") {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({ "code": code, "displayName": state.registry.display_name(&code) }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.classes" => Some(handle_classes(state, req)),
        "subjects.forClass" => Some(handle_for_class(state, req)),
        "subjects.all" => Some(handle_all(state, req)),
        "subjects.displayName" => Some(handle_display_name(state, req)),
        _ => None,
    }
}
