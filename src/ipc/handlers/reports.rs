use super::{db_conn, optional_str, require_roles, required_str, respond};
use crate::auth::Role;
use crate::calc::{self, round2};
use crate::insights::{self, Insights};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::store::{self, Student};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

const STAFF: &[Role] = &[Role::Principal, Role::Teacher];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentReport {
    student: Student,
    attendance_percentage: f64,
    average_marks: f64,
    grade_distribution: BTreeMap<String, usize>,
    total_subjects: usize,
    total_attendance_days: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassReport {
    class_name: String,
    section: String,
    total_students: usize,
    students_with_face_data: usize,
    students_with_marks: usize,
    students_with_grades: usize,
    average_marks: f64,
    students: Vec<Student>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttendanceRow {
    student: Student,
    attendance_days: usize,
    attendance_percentage: f64,
    has_face_data: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcademicRow {
    student: Student,
    avg_marks: f64,
    total_subjects: usize,
    grade_count: usize,
    has_marks: bool,
    has_grades: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SelectedStudent {
    student: Student,
    avg_marks: f64,
    max_marks: i64,
    min_marks: i64,
    subject_performance: BTreeMap<String, i64>,
    attendance_days: usize,
    attendance_percentage: f64,
    grades: BTreeMap<String, String>,
    insights: Insights,
}

/// Only populated keys are emitted: an empty selection has no marks stats
/// and no attendance stats.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    avg_class_marks: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_class_marks: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_class_marks: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avg_attendance: Option<f64>,
}

struct Filter {
    class_name: Option<String>,
    section: Option<String>,
}

impl Filter {
    fn from_params(params: &serde_json::Value) -> Self {
        Self {
            class_name: optional_str(params, "class"),
            section: optional_str(params, "section"),
        }
    }

    fn students(&self, conn: &Connection) -> rusqlite::Result<Vec<Student>> {
        store::list_students_in(conn, self.class_name.as_deref(), self.section.as_deref())
    }
}

fn ids_of(students: &[Student]) -> Vec<String> {
    students.iter().map(|s| s.id.clone()).collect()
}

/// `student_id -> [mark]` for the given students.
fn marks_by_student(
    conn: &Connection,
    students: &[Student],
) -> rusqlite::Result<HashMap<String, Vec<i64>>> {
    let mut out: HashMap<String, Vec<i64>> = HashMap::new();
    for row in store::marks_for_students(conn, &ids_of(students))? {
        out.entry(row.student_id).or_default().push(row.mark);
    }
    Ok(out)
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

fn reports_overview(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let session = require_roles(state, STAFF)?;
    let (classes, sections) = store::class_options(conn)?;
    Ok(json!({
        "username": session.username,
        "totalStudents": store::count_students(conn)?,
        "totalTeachers": store::count_teachers(conn)?,
        "totalUsers": store::count_users(conn)?,
        "studentsWithFaceData": store::count_students_with_face(conn)?,
        "totalAttendanceRecords": store::count_attendance(conn)?,
        "totalClasses": classes.len(),
        "totalSections": sections.len(),
        "classes": classes,
        "sections": sections,
    }))
}

fn reports_student(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    require_roles(state, STAFF)?;
    let student_id = required_str(params, "studentId")?;
    let student = store::get_student(conn, &student_id)?
        .ok_or_else(|| HandlerErr::not_found("Student not found."))?;

    let marks: Vec<i64> = store::student_marks(conn, &student.id)?
        .into_iter()
        .map(|(_, m)| m)
        .collect();
    let grades = store::student_grades(conn, &student.id)?;
    let attendance_days = store::student_attendance_dates(conn, &student.id)?.len();

    let report = StudentReport {
        student,
        attendance_percentage: round2(calc::attendance_percentage(
            attendance_days,
            state.config.school_days,
        )),
        average_marks: round2(calc::mean(&marks)),
        grade_distribution: calc::grade_distribution(grades.iter().map(|(_, g)| g.as_str())),
        total_subjects: marks.len(),
        total_attendance_days: attendance_days,
    };
    Ok(json!({ "report": report }))
}

fn reports_class(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    require_roles(state, STAFF)?;
    let class_name = required_str(params, "class")?;
    let section = required_str(params, "section")?;

    let students = store::list_students_in(conn, Some(&class_name), Some(&section))?;
    if students.is_empty() {
        return Err(HandlerErr::not_found("No students found in this class."));
    }
    let ids = ids_of(&students);
    let mark_rows = store::marks_for_students(conn, &ids)?;
    let grade_counts = store::grade_counts_for_students(conn, &ids)?;

    let with_marks: HashSet<&str> = mark_rows.iter().map(|m| m.student_id.as_str()).collect();
    let all_marks: Vec<i64> = mark_rows.iter().map(|m| m.mark).collect();

    let report = ClassReport {
        class_name,
        section,
        total_students: students.len(),
        students_with_face_data: students.iter().filter(|s| s.has_face_data).count(),
        students_with_marks: with_marks.len(),
        students_with_grades: grade_counts.len(),
        average_marks: round2(calc::mean(&all_marks)),
        students,
    };
    Ok(json!({ "report": report }))
}

fn reports_attendance(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    require_roles(state, STAFF)?;
    let filter = Filter::from_params(params);
    let (classes, sections) = store::class_options(conn)?;
    let students = filter.students(conn)?;
    let counts = store::attendance_counts(conn)?;

    let mut rows: Vec<AttendanceRow> = students
        .into_iter()
        .map(|s| {
            let days = counts.get(&s.id).copied().unwrap_or(0);
            AttendanceRow {
                attendance_days: days,
                attendance_percentage: round2(calc::attendance_percentage(
                    days,
                    state.config.school_days,
                )),
                has_face_data: s.has_face_data,
                student: s,
            }
        })
        .collect();
    rows.sort_by(|a, b| descending(a.attendance_percentage, b.attendance_percentage));

    Ok(json!({
        "rows": rows,
        "classes": classes,
        "sections": sections,
        "selectedClass": filter.class_name,
        "selectedSection": filter.section,
    }))
}

fn reports_academic(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    require_roles(state, STAFF)?;
    let filter = Filter::from_params(params);
    let (classes, sections) = store::class_options(conn)?;
    let students = filter.students(conn)?;
    let marks = marks_by_student(conn, &students)?;
    let grade_counts = store::grade_counts_for_students(conn, &ids_of(&students))?;

    let mut rows: Vec<AcademicRow> = students
        .into_iter()
        .map(|s| {
            let m = marks.get(&s.id).map(|v| v.as_slice()).unwrap_or(&[]);
            let grade_count = grade_counts.get(&s.id).copied().unwrap_or(0);
            AcademicRow {
                avg_marks: round2(calc::mean(m)),
                total_subjects: m.len(),
                grade_count,
                has_marks: !m.is_empty(),
                has_grades: grade_count > 0,
                student: s,
            }
        })
        .collect();
    rows.sort_by(|a, b| descending(a.avg_marks, b.avg_marks));

    Ok(json!({
        "rows": rows,
        "classes": classes,
        "sections": sections,
        "selectedClass": filter.class_name,
        "selectedSection": filter.section,
    }))
}

fn selected_student(
    conn: &Connection,
    student_id: &str,
    school_days: u32,
) -> Result<SelectedStudent, HandlerErr> {
    let student = store::get_student(conn, student_id)?
        .ok_or_else(|| HandlerErr::not_found("Student not found."))?;
    let marks = store::student_marks(conn, &student.id)?;
    let grades = store::student_grades(conn, &student.id)?;
    let attendance_days = store::student_attendance_dates(conn, &student.id)?.len();

    let values: Vec<i64> = marks.iter().map(|(_, m)| *m).collect();
    let summary = calc::summarize_marks(&values);
    let attendance_pct = calc::attendance_percentage(attendance_days, school_days);
    let insights = insights::generate(&student.name, &marks, summary.average, attendance_pct);

    Ok(SelectedStudent {
        avg_marks: round2(summary.average),
        max_marks: summary.max,
        min_marks: summary.min,
        subject_performance: marks.into_iter().collect(),
        attendance_days,
        attendance_percentage: round2(attendance_pct),
        grades: grades.into_iter().collect(),
        insights,
        student,
    })
}

fn class_stats(conn: &Connection, students: &[Student]) -> rusqlite::Result<ClassStats> {
    let mut stats = ClassStats::default();
    if students.is_empty() {
        return Ok(stats);
    }
    let all_marks: Vec<i64> = store::marks_for_students(conn, &ids_of(students))?
        .into_iter()
        .map(|m| m.mark)
        .collect();
    if !all_marks.is_empty() {
        let summary = calc::summarize_marks(&all_marks);
        stats.avg_class_marks = Some(round2(summary.average));
        stats.max_class_marks = Some(summary.max);
        stats.min_class_marks = Some(summary.min);
    }

    // Students with no attendance at all do not pull the average down.
    let counts = store::attendance_counts(conn)?;
    let present: Vec<i64> = students
        .iter()
        .filter_map(|s| counts.get(&s.id).map(|c| *c as i64))
        .collect();
    if !present.is_empty() {
        stats.avg_attendance = Some(round2(calc::mean(&present)));
    }
    Ok(stats)
}

fn reports_insights(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    require_roles(state, STAFF)?;
    let filter = Filter::from_params(params);
    let (classes, sections) = store::class_options(conn)?;
    let students = filter.students(conn)?;

    let selected = match optional_str(params, "studentId") {
        Some(id) => Some(selected_student(conn, &id, state.config.school_days)?),
        None => None,
    };
    let stats = class_stats(conn, &students)?;

    Ok(json!({
        "students": students,
        "classes": classes,
        "sections": sections,
        "selectedClass": filter.class_name,
        "selectedSection": filter.section,
        "selectedStudent": selected,
        "classStats": stats,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.overview" => Some(respond(req, reports_overview(state))),
        "reports.student" => Some(respond(req, reports_student(state, &req.params))),
        "reports.class" => Some(respond(req, reports_class(state, &req.params))),
        "reports.attendance" => Some(respond(req, reports_attendance(state, &req.params))),
        "reports.academic" => Some(respond(req, reports_academic(state, &req.params))),
        "reports.insights" => Some(respond(req, reports_insights(state, &req.params))),
        _ => None,
    }
}
