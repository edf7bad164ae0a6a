use super::faces::image_digest;
use super::{db_conn, optional_str, require_roles, respond};
use crate::auth::{Role, Session};
use crate::ipc::error::{DbResultExt, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, Student};
use rusqlite::Connection;
use serde_json::json;

pub(crate) fn today() -> String {
    chrono::Local::now().date_naive().format("%Y-%m-%d").to_string()
}

/// The student record the logged-in student account is linked to.
pub(crate) fn linked_student(conn: &Connection, session: &Session) -> Result<Student, HandlerErr> {
    let Some(student_id) = session.student_id.as_deref() else {
        return Err(HandlerErr::not_found("Student data not found."));
    };
    store::get_student(conn, student_id)?
        .ok_or_else(|| HandlerErr::not_found("Student data not found."))
}

fn attendance_today(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, &[Role::Student])?;
    let student = linked_student(conn, &session)?;
    let today = today();
    let record = store::attendance_record(conn, &student.id, &today)?;
    Ok(json!({
        "student": student,
        "today": today,
        "alreadyMarked": record.is_some(),
        "record": record,
    }))
}

fn attendance_mark(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, &[Role::Student])?;
    let student = linked_student(conn, &session)?;

    let face_data = params.get("faceData").and_then(|v| v.as_str()).unwrap_or("");
    if face_data.len() <= state.config.min_face_data_len {
        log::debug!(
            "attendance rejected for {}: image data length {}",
            student.id,
            face_data.len()
        );
        return Err(HandlerErr::bad_params(
            "No valid face image captured. Please ensure your camera is working and try again.",
        )
        .with_details(json!({ "length": face_data.len() })));
    }

    let today = today();
    let record = store::upsert_attendance(conn, &student.id, &today, Some(face_data))
        .db_ctx("db_update_failed", "attendance")?;
    log::info!("attendance marked for {} on {}", student.name, today);
    Ok(json!({
        "record": record,
        "imageSha256": image_digest(face_data),
    }))
}

fn attendance_history(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, &[Role::Student])?;
    let student = linked_student(conn, &session)?;
    let dates = store::student_attendance_dates(conn, &student.id)?;
    Ok(json!({
        "studentId": student.id,
        "dates": dates,
    }))
}

fn attendance_by_date(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    require_roles(state, &[Role::Principal, Role::Teacher])?;
    let date = match optional_str(params, "date") {
        Some(d) => chrono::NaiveDate::parse_from_str(&d, "%Y-%m-%d")
            .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?
            .format("%Y-%m-%d")
            .to_string(),
        None => today(),
    };
    let records = store::attendance_on(conn, &date)?;
    Ok(json!({
        "date": date,
        "records": records,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.today" => Some(respond(req, attendance_today(state))),
        "attendance.mark" => Some(respond(req, attendance_mark(state, &req.params))),
        "attendance.history" => Some(respond(req, attendance_history(state))),
        "attendance.byDate" => Some(respond(req, attendance_by_date(state, &req.params))),
        _ => None,
    }
}
