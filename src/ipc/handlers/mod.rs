pub mod attendance;
pub mod auth;
pub mod backup;
pub mod core;
pub mod dashboards;
pub mod faces;
pub mod marks;
pub mod reports;
pub mod students;
pub mod teachers;
pub mod users;

use crate::auth::{Role, Session};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;

pub(crate) fn respond(
    req: &Request,
    result: Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            log::debug!("{} rejected: {} ({})", req.method, e.code, e.message);
            e.response(&req.id)
        }
    }
}

pub(crate) fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// The current session, if its role is one of `roles`.
pub(crate) fn require_roles(state: &AppState, roles: &[Role]) -> Result<Session, HandlerErr> {
    let Some(session) = state.session.as_ref() else {
        return Err(HandlerErr::new("not_authenticated", "log in first"));
    };
    if !roles.contains(&session.role) {
        return Err(HandlerErr::new(
            "forbidden",
            format!("role {} may not perform this action", session.role),
        ));
    }
    Ok(session.clone())
}

/// Trimmed, non-empty string parameter.
pub(crate) fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let v = params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    let t = v.trim();
    if t.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(t.to_string())
}

/// Absent, null and blank strings are all `None`.
pub(crate) fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
