use crate::diag::LogLevel;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_diag_log(state: &mut AppState, req: &Request) -> serde_json::Value {
    let level_raw = match required_str(req, "level") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(level) = LogLevel::parse(&level_raw) else {
        return err(
            &req.id,
            "bad_params",
            format!("unknown log level: {}", level_raw),
            None,
        );
    };
    let source = match required_str(req, "source") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let message = match required_str(req, "message") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let seq = state.diag.append(level, &source, &message);
    ok(&req.id, json!({ "seq": seq }))
}

fn handle_diag_logs(state: &mut AppState, req: &Request) -> serde_json::Value {
    let limit = req
        .params
        .get("limit")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize);

    let entries = state.diag.entries(limit);
    let entries_json = match serde_json::to_value(&entries) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "internal", e.to_string(), None),
    };
    let metrics = match serde_json::to_value(state.diag.metrics()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "internal", e.to_string(), None),
    };
    ok(&req.id, json!({ "entries": entries_json, "metrics": metrics }))
}

fn handle_diag_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    let cleared = state.diag.clear();
    ok(&req.id, json!({ "cleared": cleared }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "diag.log" => Some(handle_diag_log(state, req)),
        "diag.logs" => Some(handle_diag_logs(state, req)),
        "diag.clear" => Some(handle_diag_clear(state, req)),
        _ => None,
    }
}
