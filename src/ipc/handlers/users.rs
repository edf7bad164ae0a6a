use super::{db_conn, optional_str, require_roles, required_str, respond};
use crate::auth::{self, Role};
use crate::ipc::error::{DbResultExt, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn users_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    require_roles(state, &[Role::Principal])?;
    let users = store::list_users(conn)?;
    Ok(json!({ "users": users }))
}

fn users_create(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, &[Role::Principal])?;

    let username = required_str(params, "username")?;
    let password = params
        .get("password")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params("missing password"))?;
    let role: Role = required_str(params, "role")?
        .parse()
        .map_err(HandlerErr::bad_params)?;
    let student_id = optional_str(params, "studentId");

    if let Some(sid) = student_id.as_deref() {
        if role != Role::Student {
            return Err(HandlerErr::bad_params(
                "only student accounts can be linked to a student",
            ));
        }
        if store::get_student(conn, sid)?.is_none() {
            return Err(HandlerErr::not_found("student not found"));
        }
    }
    if store::get_user_by_username(conn, &username)?.is_some() {
        return Err(HandlerErr::new("conflict", "username already exists")
            .with_details(json!({ "username": username })));
    }

    let hash = auth::hash_password(password, state.config.bcrypt_cost)
        .map_err(|e| HandlerErr::new("hash_failed", e.to_string()))?;
    let user = store::create_user(conn, &username, &hash, role, student_id.as_deref())
        .db_ctx("db_insert_failed", "users")?;
    log::info!("{} created {} account {}", session.username, role, user.username);
    Ok(json!({ "user": user }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.list" => Some(respond(req, users_list(state))),
        "users.create" => Some(respond(req, users_create(state, &req.params))),
        _ => None,
    }
}
