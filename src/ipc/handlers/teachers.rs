use super::{db_conn, require_roles, required_str, respond};
use crate::auth::Role;
use crate::ipc::error::{DbResultExt, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn teachers_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    require_roles(state, &[Role::Principal])?;
    Ok(json!({ "teachers": store::list_teachers(conn)? }))
}

fn teachers_get(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    require_roles(state, &[Role::Principal])?;
    let teacher_id = required_str(params, "teacherId")?;
    let teacher = store::get_teacher(conn, &teacher_id)?
        .ok_or_else(|| HandlerErr::not_found("Teacher not found."))?;
    Ok(json!({ "teacher": teacher }))
}

fn teachers_create(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, &[Role::Principal])?;
    let name = required_str(params, "name")?;
    let subject = required_str(params, "subject")?;
    let teacher =
        store::create_teacher(conn, &name, &subject).db_ctx("db_insert_failed", "teachers")?;
    log::info!("{} added teacher {} ({})", session.username, teacher.name, teacher.subject);
    Ok(json!({ "teacherId": teacher.id, "teacher": teacher }))
}

fn teachers_update(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, &[Role::Principal])?;
    let teacher_id = required_str(params, "teacherId")?;
    let name = required_str(params, "name")?;
    let subject = required_str(params, "subject")?;
    let teacher = store::update_teacher(conn, &teacher_id, &name, &subject)
        .db_ctx("db_update_failed", "teachers")?
        .ok_or_else(|| HandlerErr::not_found("Teacher not found."))?;
    log::info!("{} updated teacher {}", session.username, teacher.id);
    Ok(json!({ "teacher": teacher }))
}

fn teachers_delete(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, &[Role::Principal])?;
    let teacher_id = required_str(params, "teacherId")?;
    if !store::delete_teacher(conn, &teacher_id).db_ctx("db_delete_failed", "teachers")? {
        return Err(HandlerErr::not_found("Teacher not found."));
    }
    log::info!("{} deleted teacher {}", session.username, teacher_id);
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(respond(req, teachers_list(state))),
        "teachers.get" => Some(respond(req, teachers_get(state, &req.params))),
        "teachers.create" => Some(respond(req, teachers_create(state, &req.params))),
        "teachers.update" => Some(respond(req, teachers_update(state, &req.params))),
        "teachers.delete" => Some(respond(req, teachers_delete(state, &req.params))),
        _ => None,
    }
}
