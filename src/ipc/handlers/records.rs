use crate::error::StoreError;
use crate::ingest::{self, Rejection};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::record::RecordInput;
use crate::store::RecordStore;
use serde_json::json;

/// First string among `keys`; absent or non-string params read as empty so the
/// pipeline reports them as incomplete.
fn param_str(req: &Request, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| req.params.get(*k).and_then(|v| v.as_str()))
        .unwrap_or("")
        .to_string()
}

fn rejection_response(id: &str, reason: &Rejection) -> serde_json::Value {
    let details = match reason {
        Rejection::IncompleteFields(missing) => Some(json!({ "missing": missing })),
        _ => None,
    };
    err(id, reason.code(), reason.to_string(), details)
}

fn handle_records_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let schema = state.config.record_schema;
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let input = RecordInput {
        name: param_str(req, &["name"]),
        email: param_str(req, &["email"]),
        number: param_str(req, &["number"]),
        issue: param_str(req, &["issue", "problema"]),
        code: param_str(
            req,
            &["code", "departmentOrCourse", "registrationCode", schema.code_field()],
        ),
    };

    match ingest::submit(store, schema, &input) {
        Ok(record_id) => ok(&req.id, json!({ "recordId": record_id })),
        Err(reason) => {
            tracing::info!(code = reason.code(), "submission rejected");
            rejection_response(&req.id, &reason)
        }
    }
}

fn handle_records_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    match store.stream_all() {
        Ok(records) => {
            let records: Vec<serde_json::Value> = records
                .into_iter()
                .map(|r| {
                    json!({
                        "id": r.id,
                        "createdAt": r.created_at,
                        "fields": r.document
                    })
                })
                .collect();
            ok(&req.id, json!({ "records": records }))
        }
        Err(e) => err(&req.id, "store_error", e.to_string(), None),
    }
}

fn handle_records_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let record_id = match req.params.get("recordId").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing recordId", None),
    };

    match store.delete(&record_id) {
        Ok(()) => {
            tracing::info!(record_id = %record_id, "record deleted");
            ok(&req.id, json!({ "ok": true }))
        }
        Err(StoreError::NotFound(_)) => err(
            &req.id,
            "not_found",
            "record not found",
            Some(json!({ "recordId": record_id })),
        ),
        Err(e) => err(&req.id, "store_error", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "records.submit" => Some(handle_records_submit(state, req)),
        "records.list" => Some(handle_records_list(state, req)),
        "records.delete" => Some(handle_records_delete(state, req)),
        _ => None,
    }
}
