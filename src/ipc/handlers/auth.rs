use super::{db_conn, required_str, respond};
use crate::auth::{self, Role, Session};
use crate::ipc::error::{DbResultExt, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn password_param(params: &serde_json::Value) -> Result<String, HandlerErr> {
    // Passwords are taken verbatim; only emptiness is rejected.
    let pw = params
        .get("password")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing password"))?;
    if pw.is_empty() {
        return Err(HandlerErr::bad_params("password must not be empty"));
    }
    Ok(pw.to_string())
}

fn auth_bootstrap(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let username = required_str(params, "username")?;
    let password = password_param(params)?;

    if store::count_users(conn)? > 0 {
        return Err(HandlerErr::new(
            "conflict",
            "workspace already has users; log in as a principal to add more",
        ));
    }
    let hash = auth::hash_password(&password, state.config.bcrypt_cost)
        .map_err(|e| HandlerErr::new("hash_failed", e.to_string()))?;
    let user = store::create_user(conn, &username, &hash, Role::Principal, None)
        .db_ctx("db_insert_failed", "users")?;
    log::info!("bootstrap principal created: {}", user.username);
    Ok(json!({ "user": user }))
}

fn auth_login(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let username = required_str(params, "username")?;
    let password = password_param(params)?;

    let user = store::get_user_by_username(conn, &username)?;
    let Some(user) = user.filter(|u| auth::verify_password(&password, &u.password_hash)) else {
        log::info!("login failed for {}", username);
        return Err(HandlerErr::new(
            "invalid_credentials",
            "Invalid username or password",
        ));
    };

    let session = Session {
        user_id: user.id.clone(),
        username: user.username.clone(),
        role: user.role,
        student_id: user.student_id.clone(),
    };
    state.session = Some(session);
    log::info!("{} logged in as {}", user.username, user.role);
    Ok(json!({
        "user": user,
        "dashboard": user.role.dashboard_method(),
    }))
}

fn auth_logout(state: &mut AppState) -> serde_json::Value {
    if let Some(s) = state.session.take() {
        log::info!("{} logged out", s.username);
    }
    json!({ "ok": true })
}

/// The current session plus the stored account behind it, which reflects
/// changes made since login such as a removed student link.
fn auth_whoami(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let Some(session) = state.session.as_ref() else {
        return Ok(json!({
            "session": null,
            "user": null,
            "dashboard": null,
        }));
    };
    let user = match state.db.as_ref() {
        Some(conn) => store::get_user(conn, &session.user_id)?,
        None => None,
    };
    Ok(json!({
        "session": session,
        "user": user,
        "dashboard": session.role.dashboard_method(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.bootstrap" => Some(respond(req, auth_bootstrap(state, &req.params))),
        "auth.login" => Some(respond(req, auth_login(state, &req.params))),
        "auth.logout" => Some(respond(req, Ok(auth_logout(state)))),
        "auth.whoami" => Some(respond(req, auth_whoami(state))),
        _ => None,
    }
}
