use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::open_store;
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "loggedIn": state.session.is_logged_in()
        }),
    )
}

/// Opens the project database under `path` with the configured credentials.
pub fn select_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<String> {
    let creds = state.config.credentials()?;
    let store = open_store(path, &creds.project_id)?;
    tracing::info!(
        workspace = %path.to_string_lossy(),
        project_id = %creds.project_id,
        client_email = %creds.client_email,
        "workspace selected"
    );
    state.workspace = Some(path.to_path_buf());
    state.store = Some(store);
    Ok(creds.project_id)
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match select_workspace(state, &path) {
        Ok(project_id) => ok(
            &req.id,
            json!({
                "workspacePath": path.to_string_lossy(),
                "projectId": project_id,
                "databasePath": state.store.as_ref().map(|s| s.path().to_string_lossy().to_string())
            }),
        ),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "workspace open failed");
            err(&req.id, "db_open_failed", format!("{e:#}"), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
