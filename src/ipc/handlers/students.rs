use super::{db_conn, require_roles, required_str, respond};
use crate::auth::Role;
use crate::ipc::error::{DbResultExt, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, StudentInput};
use serde_json::json;

const STAFF: &[Role] = &[Role::Principal, Role::Teacher];

fn parse_age(params: &serde_json::Value) -> Result<i64, HandlerErr> {
    let raw = params
        .get("age")
        .ok_or_else(|| HandlerErr::bad_params("missing age"))?;
    let age = match raw {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| HandlerErr::bad_params("age must be an integer"))?;
    if age < 0 {
        return Err(HandlerErr::bad_params("age must not be negative"));
    }
    Ok(age)
}

pub(crate) fn student_input(params: &serde_json::Value) -> Result<StudentInput, HandlerErr> {
    Ok(StudentInput {
        name: required_str(params, "name")?,
        age: parse_age(params)?,
        class_name: required_str(params, "class")?,
        section: required_str(params, "section")?,
    })
}

fn students_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    require_roles(state, STAFF)?;
    let students = store::list_students(conn)?;
    Ok(json!({ "students": students }))
}

fn students_get(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    require_roles(state, STAFF)?;
    let student_id = required_str(params, "studentId")?;
    let student = store::get_student(conn, &student_id)?
        .ok_or_else(|| HandlerErr::not_found("Student not found."))?;
    Ok(json!({ "student": student }))
}

fn students_create(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, STAFF)?;
    let input = student_input(params)?;
    let student = store::create_student(conn, &input).db_ctx("db_insert_failed", "students")?;
    log::info!("{} added student {} ({})", session.username, student.name, student.id);
    Ok(json!({ "studentId": student.id, "student": student }))
}

fn students_update(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, STAFF)?;
    let student_id = required_str(params, "studentId")?;
    let input = student_input(params)?;
    let student = store::update_student(conn, &student_id, &input)
        .db_ctx("db_update_failed", "students")?
        .ok_or_else(|| HandlerErr::not_found("Student not found."))?;
    log::info!("{} updated student {}", session.username, student.id);
    Ok(json!({ "student": student }))
}

fn students_delete(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, STAFF)?;
    let student_id = required_str(params, "studentId")?;
    let deleted = store::delete_student(conn, &student_id).db_ctx("db_delete_failed", "students")?;
    if !deleted {
        return Err(HandlerErr::not_found("Student not found."));
    }
    log::info!("{} deleted student {}", session.username, student_id);
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(respond(req, students_list(state))),
        "students.get" => Some(respond(req, students_get(state, &req.params))),
        "students.create" => Some(respond(req, students_create(state, &req.params))),
        "students.update" => Some(respond(req, students_update(state, &req.params))),
        "students.delete" => Some(respond(req, students_delete(state, &req.params))),
        _ => None,
    }
}
