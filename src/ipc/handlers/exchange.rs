use crate::export::{export_records, ExportFormat};
use crate::ingest::{self, Rejection, RowRejection};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn rejection_rows(rejected: &[RowRejection]) -> Vec<serde_json::Value> {
    rejected
        .iter()
        .map(|r| {
            let mut v = json!({
                "row": r.row,
                "code": r.reason.code(),
                "message": r.reason.to_string()
            });
            if let Rejection::IncompleteFields(missing) = &r.reason {
                v["missing"] = json!(missing);
            }
            v
        })
        .collect()
}

/// Reads the uploaded file named by `inPath` and decodes it with the
/// configured schema. File-level failures come back as a ready response.
fn read_import_input(
    state: &AppState,
    req: &Request,
) -> Result<(String, Vec<ingest::ImportRow>), serde_json::Value> {
    let in_path = req
        .params
        .get("inPath")
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", "missing inPath", None))?;
    let bytes = match std::fs::read(&in_path) {
        Ok(b) => b,
        Err(e) => {
            return Err(err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": in_path })),
            ))
        }
    };
    match ingest::parse_import(&bytes, state.config.record_schema) {
        Ok(rows) => Ok((in_path, rows)),
        Err(e) => {
            tracing::warn!(path = %in_path, error = %e, "import file rejected");
            Err(err(
                &req.id,
                "import_parse_error",
                e.to_string(),
                Some(json!({ "path": in_path })),
            ))
        }
    }
}

fn handle_records_preview_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (in_path, rows) = match read_import_input(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let preview = ingest::preview_rows(store, state.config.record_schema, &rows);
    ok(
        &req.id,
        json!({
            "path": in_path,
            "rowsTotal": preview.total,
            "rowsAccepted": preview.accepted.len(),
            "rowsRejected": preview.rejected.len(),
            "acceptedRows": preview.accepted,
            "rejected": rejection_rows(&preview.rejected)
        }),
    )
}

fn handle_records_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.store.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }
    let (in_path, rows) = match read_import_input(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let schema = state.config.record_schema;
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let report = ingest::import_rows(store, schema, &rows);
    ok(
        &req.id,
        json!({
            "path": in_path,
            "rowsTotal": report.total,
            "inserted": report.inserted,
            "rejectedCount": report.rejected.len(),
            "rejected": rejection_rows(&report.rejected)
        }),
    )
}

fn handle_records_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let format = match req.params.get("format").and_then(|v| v.as_str()) {
        None => ExportFormat::default(),
        Some(f) => match f.parse::<ExportFormat>() {
            Ok(v) => v,
            Err(message) => return err(&req.id, "bad_params", message, None),
        },
    };
    let out_path = req
        .params
        .get("outPath")
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    if out_path.is_none() && format == ExportFormat::Xlsx {
        return err(
            &req.id,
            "bad_params",
            "outPath is required for xlsx exports",
            None,
        );
    }

    let file = match export_records(store, state.config.record_schema, format) {
        Ok(f) => f,
        Err(e) => return err(&req.id, "export_failed", e.to_string(), None),
    };

    let mut result = json!({
        "fileName": file.file_name,
        "contentType": file.content_type,
        "bytes": file.bytes.len()
    });

    match out_path {
        Some(out_path) => {
            let out = PathBuf::from(&out_path);
            if let Some(parent) = out.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    return err(
                        &req.id,
                        "io_failed",
                        e.to_string(),
                        Some(json!({ "path": out_path })),
                    );
                }
            }
            if let Err(e) = std::fs::write(&out, &file.bytes) {
                return err(
                    &req.id,
                    "io_failed",
                    e.to_string(),
                    Some(json!({ "path": out_path })),
                );
            }
            result["path"] = json!(out_path);
        }
        None => {
            result["content"] = json!(String::from_utf8_lossy(&file.bytes));
        }
    }

    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "records.previewImport" => Some(handle_records_preview_import(state, req)),
        "records.import" => Some(handle_records_import(state, req)),
        "records.export" => Some(handle_records_export(state, req)),
        _ => None,
    }
}
