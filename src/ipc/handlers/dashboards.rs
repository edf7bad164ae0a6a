use super::attendance::linked_student;
use super::{db_conn, require_roles, respond};
use crate::auth::Role;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn dashboard_principal(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, &[Role::Principal])?;
    Ok(json!({
        "username": session.username,
        "students": store::list_students(conn)?,
        "teachers": store::list_teachers(conn)?,
    }))
}

fn dashboard_teacher(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, &[Role::Teacher])?;
    Ok(json!({
        "username": session.username,
        "students": store::list_students(conn)?,
    }))
}

fn dashboard_student(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, &[Role::Student])?;
    let student = linked_student(conn, &session)?;

    let marks: serde_json::Map<String, serde_json::Value> =
        store::student_marks(conn, &student.id)?
            .into_iter()
            .map(|(subject, mark)| (subject, json!(mark)))
            .collect();
    let grades: serde_json::Map<String, serde_json::Value> =
        store::student_grades(conn, &student.id)?
            .into_iter()
            .map(|(subject, grade)| (subject, json!(grade)))
            .collect();
    let attendance = store::student_attendance_dates(conn, &student.id)?;

    Ok(json!({
        "username": session.username,
        "student": student,
        "marks": marks,
        "grades": grades,
        "attendance": attendance,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.principal" => Some(respond(req, dashboard_principal(state))),
        "dashboard.teacher" => Some(respond(req, dashboard_teacher(state))),
        "dashboard.student" => Some(respond(req, dashboard_student(state))),
        _ => None,
    }
}
