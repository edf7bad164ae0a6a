use super::{db_conn, require_roles, required_str, respond};
use crate::auth::Role;
use crate::calc;
use crate::ipc::error::{DbResultExt, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn marks_class_options(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    require_roles(state, &[Role::Teacher])?;
    let (classes, sections) = store::class_options(conn)?;
    Ok(json!({ "classes": classes, "sections": sections }))
}

fn marks_sheet_open(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    require_roles(state, &[Role::Teacher])?;
    let class_name = required_str(params, "class")?;
    let section = required_str(params, "section")?;

    let students = store::list_students_in(conn, Some(&class_name), Some(&section))?;
    let subjects = store::subjects(conn)?;

    let mut rows = Vec::with_capacity(students.len());
    for s in &students {
        let marks: serde_json::Map<String, serde_json::Value> = store::student_marks(conn, &s.id)?
            .into_iter()
            .map(|(subject, mark)| (subject, json!(mark)))
            .collect();
        let grades: serde_json::Map<String, serde_json::Value> = store::student_grades(conn, &s.id)?
            .into_iter()
            .map(|(subject, grade)| (subject, json!(grade)))
            .collect();
        rows.push(json!({
            "student": s,
            "marks": marks,
            "grades": grades,
        }));
    }

    Ok(json!({
        "class": class_name,
        "section": section,
        "subjects": subjects,
        "rows": rows,
    }))
}

/// `entries` is `{studentId: {subject: value}}`. Only students in the
/// class/section and subjects someone teaches are considered.
fn marks_save(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, &[Role::Teacher])?;
    let class_name = required_str(params, "class")?;
    let section = required_str(params, "section")?;
    let entries = params
        .get("entries")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("entries must be an object"))?;

    let students = store::list_students_in(conn, Some(&class_name), Some(&section))?;
    let subjects = store::subjects(conn)?;

    let mut updated = 0usize;
    let mut skipped: Vec<serde_json::Value> = Vec::new();
    for s in &students {
        let Some(entry) = entries.get(&s.id).and_then(|v| v.as_object()) else {
            continue;
        };
        let mut marks: Vec<(String, i64)> = Vec::new();
        for subject in &subjects {
            let Some(raw) = entry.get(subject) else {
                continue;
            };
            if raw.is_null() || raw.as_str().map(|t| t.trim().is_empty()).unwrap_or(false) {
                continue;
            }
            match calc::parse_mark_value(raw) {
                Some(mark) => marks.push((subject.clone(), mark)),
                None => skipped.push(json!({
                    "studentId": s.id,
                    "subject": subject,
                    "value": raw,
                })),
            }
        }
        if marks.is_empty() {
            continue;
        }
        store::replace_marks_and_grades(conn, &s.id, &marks).db_ctx("db_update_failed", "marks")?;
        updated += 1;
    }

    log::info!(
        "{} saved marks for {} student(s) in {}/{}",
        session.username,
        updated,
        class_name,
        section
    );
    Ok(json!({
        "updatedStudents": updated,
        "skipped": skipped,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.classOptions" => Some(respond(req, marks_class_options(state))),
        "marks.sheetOpen" => Some(respond(req, marks_sheet_open(state, &req.params))),
        "marks.save" => Some(respond(req, marks_save(state, &req.params))),
        _ => None,
    }
}
