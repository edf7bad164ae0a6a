use super::core::open_workspace;
use super::{require_roles, required_str, respond};
use crate::auth::Role;
use crate::backup;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn current_workspace(state: &AppState) -> Result<PathBuf, HandlerErr> {
    state
        .workspace
        .clone()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn export_bundle(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let workspace = current_workspace(state)?;
    let session = require_roles(state, &[Role::Principal])?;
    let out_path = required_str(params, "outPath")?;

    let export = backup::export_workspace_bundle(&workspace, &PathBuf::from(&out_path))
        .map_err(|e| {
            log::error!("bundle export failed: {e:?}");
            HandlerErr::new("backup_failed", e.to_string())
                .with_details(json!({ "path": out_path }))
        })?;
    log::info!("{} exported workspace bundle to {}", session.username, out_path);

    Ok(json!({
        "ok": true,
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "counts": export.counts,
    }))
}

/// Replaces the workspace database and reopens it. The session is always
/// cleared: a restored users table may not contain the current account, and
/// a rejected input still forces the caller to sign in again. When the input
/// is rejected the previous database is reopened untouched.
fn import_bundle(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let workspace = current_workspace(state)?;
    let session = require_roles(state, &[Role::Principal])?;
    let in_path = required_str(params, "inPath")?;

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::not_found("bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    state.session = None;
    // Release the handle before the file is replaced.
    state.db = None;

    let imported = backup::import_workspace_bundle(&src, &workspace);
    let reopened = open_workspace(state, &workspace);

    let import = imported.map_err(|e| {
        log::error!("bundle import failed: {e:?}");
        HandlerErr::new("backup_failed", e.to_string()).with_details(json!({ "path": in_path }))
    })?;
    reopened.map_err(|e| {
        log::error!("workspace reopen after import failed: {e:?}");
        HandlerErr::new("db_open_failed", e.to_string())
    })?;
    log::info!(
        "{} restored workspace from {} ({})",
        session.username,
        in_path,
        import.bundle_format_detected
    );

    Ok(json!({
        "ok": true,
        "workspacePath": workspace.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
        "counts": import.counts,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(respond(req, export_bundle(state, &req.params))),
        "backup.importWorkspaceBundle" => Some(respond(req, import_bundle(state, &req.params))),
        _ => None,
    }
}
