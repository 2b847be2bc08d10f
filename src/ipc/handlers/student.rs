use crate::ipc::helpers::{
    get_optional_str, get_required_month, get_required_str, to_json, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::{count_days, reconcile_calendar};
use crate::store::{AttendanceStore, RecordFilter, RosterProvider, SqliteStore};
use log::info;
use rusqlite::Connection;
use serde_json::json;

fn student_calendar(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let month = get_required_month(params, "month")?;
    let store = SqliteStore::new(conn);
    let Some(student) = store.get_student(&student_id)? else {
        return Err(HandlerErr::not_found("student not found"));
    };
    let records = store.get_records(&RecordFilter {
        student_id: Some(student.id.clone()),
        month: Some(month),
        ..RecordFilter::default()
    })?;

    let days = reconcile_calendar(&student, &records, month);
    let counts = count_days(&days);
    Ok(json!({
        "studentId": student.id,
        "month": month.to_string(),
        "days": to_json(&days)?,
        "counts": to_json(&counts)?
    }))
}

fn student_update_reason(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let record_id = get_required_str(params, "recordId")?;
    let reason = match params.get("reason") {
        None => return Err(HandlerErr::bad_params("missing reason")),
        Some(serde_json::Value::Null) => None,
        Some(v) => Some(
            v.as_str()
                .ok_or_else(|| HandlerErr::bad_params("reason must be a string or null"))?,
        ),
    };
    let store = SqliteStore::new(conn);

    // Callers acting for a student may only touch that student's records.
    if let Some(owner) = get_optional_str(params, "studentId") {
        match store.get_record(&record_id)? {
            Some(rec) if rec.student_id == owner => {}
            _ => return Err(HandlerErr::not_found("absence record not found")),
        }
    }

    let updated = store.update_reason(&record_id, reason)?;
    info!(
        "event=absence_reason_update date={} cleared={}",
        updated.date,
        updated.absence_reason.is_none()
    );
    Ok(json!({ "record": to_json(&updated)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "student.calendar" => Some(with_conn(state, req, student_calendar)),
        "student.updateReason" => Some(with_conn(state, req, student_update_reason)),
        _ => None,
    }
}
