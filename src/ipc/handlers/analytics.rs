use crate::analytics::{class_analytics, student_analytics};
use crate::ipc::handlers::setup::load_attendance_settings;
use crate::ipc::helpers::{get_required_month, get_required_str, to_json, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{AttendanceStore, RecordFilter, RosterProvider, SqliteStore};
use rusqlite::Connection;

fn analytics_class(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let month = get_required_month(params, "month")?;
    let settings = load_attendance_settings(conn)?;
    let records = SqliteStore::new(conn).get_records(&RecordFilter {
        month: Some(month),
        ..RecordFilter::default()
    })?;
    to_json(&class_analytics(&records, month, &settings.tiers))
}

fn analytics_student(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let month = get_required_month(params, "month")?;
    let store = SqliteStore::new(conn);
    if store.get_student(&student_id)?.is_none() {
        return Err(HandlerErr::not_found("student not found"));
    }
    let records = store.get_records(&RecordFilter {
        student_id: Some(student_id.clone()),
        month: Some(month),
        ..RecordFilter::default()
    })?;
    to_json(&student_analytics(&records, &student_id, month))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.class" => Some(with_conn(state, req, analytics_class)),
        "analytics.student" => Some(with_conn(state, req, analytics_student)),
        _ => None,
    }
}
