use super::{db_conn, require_roles, required_str, respond};
use crate::auth::Role;
use crate::ipc::error::{DbResultExt, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;
use sha2::{Digest, Sha256};

/// Hex SHA-256 of a stored image blob, so the front-end can tell captures
/// apart without downloading them.
pub(crate) fn image_digest(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

fn faces_class_options(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    require_roles(state, &[Role::Teacher])?;
    let (classes, sections) = store::class_options(conn)?;
    Ok(json!({ "classes": classes, "sections": sections }))
}

fn faces_list(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    require_roles(state, &[Role::Teacher])?;
    let class_name = required_str(params, "class")?;
    let section = required_str(params, "section")?;
    let students = store::list_students_in(conn, Some(&class_name), Some(&section))?;
    Ok(json!({
        "class": class_name,
        "section": section,
        "students": students,
    }))
}

fn faces_get(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    require_roles(state, &[Role::Teacher])?;
    let student_id = required_str(params, "studentId")?;
    let student = store::get_student(conn, &student_id)?
        .ok_or_else(|| HandlerErr::not_found("Student not found."))?;
    let face_data = store::student_face(conn, &student_id)?.flatten();
    Ok(json!({
        "student": student,
        "faceData": face_data,
        "imageSha256": face_data.as_deref().map(image_digest),
    }))
}

fn faces_set(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, &[Role::Teacher])?;
    let student_id = required_str(params, "studentId")?;
    let face_data = params.get("faceData").and_then(|v| v.as_str()).unwrap_or("");
    if face_data.len() <= state.config.min_face_data_len {
        return Err(HandlerErr::bad_params("faceData does not look like an image")
            .with_details(json!({ "length": face_data.len() })));
    }
    if !store::set_student_face(conn, &student_id, Some(face_data))
        .db_ctx("db_update_failed", "students")?
    {
        return Err(HandlerErr::not_found("Student not found."));
    }
    log::info!("{} stored face image for {}", session.username, student_id);
    Ok(json!({ "ok": true, "imageSha256": image_digest(face_data) }))
}

fn faces_delete(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, &[Role::Teacher])?;
    let student_id = required_str(params, "studentId")?;
    if !store::set_student_face(conn, &student_id, None).db_ctx("db_update_failed", "students")? {
        return Err(HandlerErr::not_found("Student not found."));
    }
    log::info!("{} deleted face image for {}", session.username, student_id);
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "faces.classOptions" => Some(respond(req, faces_class_options(state))),
        "faces.list" => Some(respond(req, faces_list(state, &req.params))),
        "faces.get" => Some(respond(req, faces_get(state, &req.params))),
        "faces.set" => Some(respond(req, faces_set(state, &req.params))),
        "faces.delete" => Some(respond(req, faces_delete(state, &req.params))),
        _ => None,
    }
}
