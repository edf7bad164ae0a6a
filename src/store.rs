//! Whole-row access to the workspace tables. Every function is one or a few
//! SQL statements; validation and role checks live in the IPC handlers.
use crate::auth::Role;
use crate::calc::grade_for_mark;
use rusqlite::types::{Type, Value};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub student_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub age: i64,
    #[serde(rename = "class")]
    pub class_name: String,
    pub section: String,
    pub has_face_data: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct StudentInput {
    pub name: String,
    pub age: i64,
    pub class_name: String,
    pub section: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub date: String,
    pub has_face_data: bool,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRow {
    pub student_id: String,
    pub subject: String,
    pub mark: i64,
}

// ---- users ----

const USER_COLUMNS: &str = "id, username, password_hash, role, student_id, created_at";

fn user_from_row(r: &Row<'_>) -> rusqlite::Result<User> {
    let role_raw: String = r.get(3)?;
    let role = role_raw
        .parse::<Role>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?;
    Ok(User {
        id: r.get(0)?,
        username: r.get(1)?,
        password_hash: r.get(2)?,
        role,
        student_id: r.get(4)?,
        created_at: r.get(5)?,
    })
}

pub fn create_user(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    role: Role,
    student_id: Option<&str>,
) -> rusqlite::Result<User> {
    let user = User {
        id: new_id(),
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        role,
        student_id: student_id.map(|s| s.to_string()),
        created_at: now(),
    };
    conn.execute(
        "INSERT INTO users(id, username, password_hash, role, student_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &user.id,
            &user.username,
            &user.password_hash,
            user.role.as_str(),
            &user.student_id,
            &user.created_at,
        ),
    )?;
    Ok(user)
}

pub fn get_user_by_username(conn: &Connection, username: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"),
        [username],
        user_from_row,
    )
    .optional()
}

pub fn get_user(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
        [user_id],
        user_from_row,
    )
    .optional()
}

pub fn list_users(conn: &Connection) -> rusqlite::Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY username"
    ))?;
    let rows = stmt.query_map([], user_from_row)?;
    rows.collect()
}

pub fn count_users(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
}

// ---- students ----

const STUDENT_COLUMNS: &str = "id, name, age, class_name, section,
    (face_data IS NOT NULL AND face_data <> '') AS has_face,
    created_at, updated_at";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        name: r.get(1)?,
        age: r.get(2)?,
        class_name: r.get(3)?,
        section: r.get(4)?,
        has_face_data: r.get::<_, i64>(5)? != 0,
        created_at: r.get(6)?,
        updated_at: r.get(7)?,
    })
}

pub fn create_student(conn: &Connection, input: &StudentInput) -> rusqlite::Result<Student> {
    let ts = now();
    let student = Student {
        id: new_id(),
        name: input.name.clone(),
        age: input.age,
        class_name: input.class_name.clone(),
        section: input.section.clone(),
        has_face_data: false,
        created_at: ts.clone(),
        updated_at: ts,
    };
    conn.execute(
        "INSERT INTO students(id, name, age, class_name, section, face_data, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, NULL, ?, ?)",
        (
            &student.id,
            &student.name,
            student.age,
            &student.class_name,
            &student.section,
            &student.created_at,
            &student.updated_at,
        ),
    )?;
    Ok(student)
}

pub fn get_student(conn: &Connection, student_id: &str) -> rusqlite::Result<Option<Student>> {
    conn.query_row(
        &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"),
        [student_id],
        student_from_row,
    )
    .optional()
}

pub fn list_students(conn: &Connection) -> rusqlite::Result<Vec<Student>> {
    list_students_in(conn, None, None)
}

/// Students ordered by name, optionally narrowed to a class and/or section.
pub fn list_students_in(
    conn: &Connection,
    class_name: Option<&str>,
    section: Option<&str>,
) -> rusqlite::Result<Vec<Student>> {
    let mut sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE 1 = 1");
    let mut bind: Vec<Value> = Vec::new();
    if let Some(c) = class_name {
        sql.push_str(" AND class_name = ?");
        bind.push(Value::Text(c.to_string()));
    }
    if let Some(s) = section {
        sql.push_str(" AND section = ?");
        bind.push(Value::Text(s.to_string()));
    }
    sql.push_str(" ORDER BY name, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(bind), student_from_row)?;
    rows.collect()
}

/// Returns `None` when the student does not exist.
pub fn update_student(
    conn: &Connection,
    student_id: &str,
    input: &StudentInput,
) -> rusqlite::Result<Option<Student>> {
    let changed = conn.execute(
        "UPDATE students SET name = ?, age = ?, class_name = ?, section = ?, updated_at = ?
         WHERE id = ?",
        (
            &input.name,
            input.age,
            &input.class_name,
            &input.section,
            now(),
            student_id,
        ),
    )?;
    if changed == 0 {
        return Ok(None);
    }
    get_student(conn, student_id)
}

/// Deletes the student and everything hanging off it in dependency order.
/// Linked users are kept but unlinked. Returns false when nothing was deleted.
pub fn delete_student(conn: &Connection, student_id: &str) -> rusqlite::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM marks WHERE student_id = ?", [student_id])?;
    tx.execute("DELETE FROM grades WHERE student_id = ?", [student_id])?;
    tx.execute("DELETE FROM attendance WHERE student_id = ?", [student_id])?;
    tx.execute(
        "UPDATE users SET student_id = NULL WHERE student_id = ?",
        [student_id],
    )?;
    let deleted = tx.execute("DELETE FROM students WHERE id = ?", [student_id])?;
    tx.commit()?;
    Ok(deleted > 0)
}

/// Outer `None`: no such student. Inner `None`: no image stored.
pub fn student_face(
    conn: &Connection,
    student_id: &str,
) -> rusqlite::Result<Option<Option<String>>> {
    conn.query_row(
        "SELECT face_data FROM students WHERE id = ?",
        [student_id],
        |r| r.get::<_, Option<String>>(0),
    )
    .optional()
}

/// `None` clears the stored image. Returns false when the student does not exist.
pub fn set_student_face(
    conn: &Connection,
    student_id: &str,
    face_data: Option<&str>,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE students SET face_data = ?, updated_at = ? WHERE id = ?",
        (face_data, now(), student_id),
    )?;
    Ok(changed > 0)
}

pub fn count_students_with_face(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM students WHERE face_data IS NOT NULL AND face_data <> ''",
        [],
        |r| r.get(0),
    )
}

/// Sorted distinct class names and sections across all students.
pub fn class_options(conn: &Connection) -> rusqlite::Result<(Vec<String>, Vec<String>)> {
    let mut stmt = conn.prepare("SELECT DISTINCT class_name FROM students ORDER BY class_name")?;
    let classes = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut stmt = conn.prepare("SELECT DISTINCT section FROM students ORDER BY section")?;
    let sections = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((classes, sections))
}

// ---- teachers ----

fn teacher_from_row(r: &Row<'_>) -> rusqlite::Result<Teacher> {
    Ok(Teacher {
        id: r.get(0)?,
        name: r.get(1)?,
        subject: r.get(2)?,
        created_at: r.get(3)?,
        updated_at: r.get(4)?,
    })
}

pub fn create_teacher(conn: &Connection, name: &str, subject: &str) -> rusqlite::Result<Teacher> {
    let ts = now();
    let teacher = Teacher {
        id: new_id(),
        name: name.to_string(),
        subject: subject.to_string(),
        created_at: ts.clone(),
        updated_at: ts,
    };
    conn.execute(
        "INSERT INTO teachers(id, name, subject, created_at, updated_at) VALUES(?, ?, ?, ?, ?)",
        (
            &teacher.id,
            &teacher.name,
            &teacher.subject,
            &teacher.created_at,
            &teacher.updated_at,
        ),
    )?;
    Ok(teacher)
}

pub fn get_teacher(conn: &Connection, teacher_id: &str) -> rusqlite::Result<Option<Teacher>> {
    conn.query_row(
        "SELECT id, name, subject, created_at, updated_at FROM teachers WHERE id = ?",
        [teacher_id],
        teacher_from_row,
    )
    .optional()
}

pub fn list_teachers(conn: &Connection) -> rusqlite::Result<Vec<Teacher>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, subject, created_at, updated_at FROM teachers ORDER BY name, id",
    )?;
    let rows = stmt.query_map([], teacher_from_row)?;
    rows.collect()
}

pub fn update_teacher(
    conn: &Connection,
    teacher_id: &str,
    name: &str,
    subject: &str,
) -> rusqlite::Result<Option<Teacher>> {
    let changed = conn.execute(
        "UPDATE teachers SET name = ?, subject = ?, updated_at = ? WHERE id = ?",
        (name, subject, now(), teacher_id),
    )?;
    if changed == 0 {
        return Ok(None);
    }
    get_teacher(conn, teacher_id)
}

pub fn delete_teacher(conn: &Connection, teacher_id: &str) -> rusqlite::Result<bool> {
    let deleted = conn.execute("DELETE FROM teachers WHERE id = ?", [teacher_id])?;
    Ok(deleted > 0)
}

/// Subjects taught, deduplicated, in teacher-name order.
pub fn subjects(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    for t in list_teachers(conn)? {
        if !out.contains(&t.subject) {
            out.push(t.subject);
        }
    }
    Ok(out)
}

// ---- marks & grades ----

/// Replaces the student's whole mark set and the grades derived from it in
/// one transaction, so stored grades always match stored marks.
pub fn replace_marks_and_grades(
    conn: &Connection,
    student_id: &str,
    marks: &[(String, i64)],
) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM marks WHERE student_id = ?", [student_id])?;
    tx.execute("DELETE FROM grades WHERE student_id = ?", [student_id])?;
    let ts = now();
    for (subject, mark) in marks {
        tx.execute(
            "INSERT INTO marks(id, student_id, subject, mark, created_at) VALUES(?, ?, ?, ?, ?)",
            (new_id(), student_id, subject, mark, &ts),
        )?;
        tx.execute(
            "INSERT INTO grades(id, student_id, subject, grade, created_at) VALUES(?, ?, ?, ?, ?)",
            (new_id(), student_id, subject, grade_for_mark(*mark).as_str(), &ts),
        )?;
    }
    tx.commit()
}

/// `(subject, mark)` ordered by subject.
pub fn student_marks(conn: &Connection, student_id: &str) -> rusqlite::Result<Vec<(String, i64)>> {
    let mut stmt =
        conn.prepare("SELECT subject, mark FROM marks WHERE student_id = ? ORDER BY subject")?;
    let rows = stmt.query_map([student_id], |r| Ok((r.get(0)?, r.get(1)?)))?;
    rows.collect()
}

/// `(subject, letter)` ordered by subject.
pub fn student_grades(
    conn: &Connection,
    student_id: &str,
) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt =
        conn.prepare("SELECT subject, grade FROM grades WHERE student_id = ? ORDER BY subject")?;
    let rows = stmt.query_map([student_id], |r| Ok((r.get(0)?, r.get(1)?)))?;
    rows.collect()
}

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(", ")
}

pub fn marks_for_students(
    conn: &Connection,
    student_ids: &[String],
) -> rusqlite::Result<Vec<MarkRow>> {
    if student_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT student_id, subject, mark FROM marks
         WHERE student_id IN ({})
         ORDER BY student_id, subject",
        placeholders(student_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(student_ids.iter()), |r| {
        Ok(MarkRow {
            student_id: r.get(0)?,
            subject: r.get(1)?,
            mark: r.get(2)?,
        })
    })?;
    rows.collect()
}

/// Number of grade rows per student, for the given students only.
pub fn grade_counts_for_students(
    conn: &Connection,
    student_ids: &[String],
) -> rusqlite::Result<HashMap<String, usize>> {
    if student_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let sql = format!(
        "SELECT student_id, COUNT(*) FROM grades
         WHERE student_id IN ({})
         GROUP BY student_id",
        placeholders(student_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(student_ids.iter()), |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as usize))
    })?;
    rows.collect()
}

// ---- attendance ----

fn attendance_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        date: r.get(2)?,
        has_face_data: r.get::<_, i64>(3)? != 0,
        created_at: r.get(4)?,
        updated_at: r.get(5)?,
    })
}

const ATTENDANCE_COLUMNS: &str = "id, student_id, date,
    (face_data IS NOT NULL AND face_data <> '') AS has_face,
    created_at, updated_at";

/// At most one record per (student, date): a second capture on the same day
/// replaces the stored image.
pub fn upsert_attendance(
    conn: &Connection,
    student_id: &str,
    date: &str,
    face_data: Option<&str>,
) -> rusqlite::Result<AttendanceRecord> {
    let ts = now();
    conn.execute(
        "INSERT INTO attendance(id, student_id, date, face_data, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, date) DO UPDATE SET
           face_data = excluded.face_data,
           updated_at = excluded.updated_at",
        (new_id(), student_id, date, face_data, &ts, &ts),
    )?;
    conn.query_row(
        &format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE student_id = ? AND date = ?"),
        (student_id, date),
        attendance_from_row,
    )
}

pub fn attendance_record(
    conn: &Connection,
    student_id: &str,
    date: &str,
) -> rusqlite::Result<Option<AttendanceRecord>> {
    conn.query_row(
        &format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE student_id = ? AND date = ?"),
        (student_id, date),
        attendance_from_row,
    )
    .optional()
}

/// Dates newest first.
pub fn student_attendance_dates(
    conn: &Connection,
    student_id: &str,
) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT date FROM attendance WHERE student_id = ? ORDER BY date DESC")?;
    let rows = stmt.query_map([student_id], |r| r.get::<_, String>(0))?;
    rows.collect()
}

pub fn attendance_on(conn: &Connection, date: &str) -> rusqlite::Result<Vec<AttendanceRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE date = ? ORDER BY student_id"
    ))?;
    let rows = stmt.query_map([date], attendance_from_row)?;
    rows.collect()
}

/// Attendance days per student; students without records are absent from the map.
pub fn attendance_counts(conn: &Connection) -> rusqlite::Result<HashMap<String, usize>> {
    let mut stmt = conn.prepare("SELECT student_id, COUNT(*) FROM attendance GROUP BY student_id")?;
    let rows = stmt.query_map([], |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as usize))
    })?;
    rows.collect()
}

pub fn count_attendance(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM attendance", [], |r| r.get(0))
}

pub fn count_students(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))
}

pub fn count_teachers(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM teachers", [], |r| r.get(0))
}
