use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user = req.params.get("user").and_then(|v| v.as_str()).unwrap_or("");
    let password = req
        .params
        .get("password")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    match state.session.login(&state.config, user, password) {
        Ok(()) => {
            tracing::info!(user = %user.trim(), "logged in");
            ok(&req.id, json!({ "user": user.trim() }))
        }
        Err(message) => {
            tracing::warn!(user = %user.trim(), "login refused");
            err(&req.id, "login_failed", message, None)
        }
    }
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.session.logout();
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.login" => Some(handle_login(state, req)),
        "session.logout" => Some(handle_logout(state, req)),
        _ => None,
    }
}
