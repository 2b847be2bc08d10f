use crate::bulk::{execute_plan, plan_bulk_fill, BulkFillRequest};
use crate::ipc::handlers::setup::load_attendance_settings;
use crate::ipc::helpers::{
    get_optional_bool, get_optional_str, get_required_day, get_required_str, to_json, with_conn,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{parse_day, AttendanceStatus, MonthKey, ReasonWrite, RecordWrite};
use crate::reconcile::reconcile_day;
use crate::store::{AttendanceStore, RecordFilter, RosterProvider, SqliteStore};
use chrono::{Local, NaiveDate};
use log::info;
use rusqlite::Connection;
use serde_json::json;
use std::collections::{HashMap, HashSet};

const DAY_SAVE_MAX_RECORDS: usize = 2000;

fn parse_status(params: &serde_json::Value, key: &str) -> Result<AttendanceStatus, HandlerErr> {
    let raw = get_required_str(params, key)?;
    AttendanceStatus::parse(&raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be one of: PRESENT, ABSENT", key)))
}

fn require_student(store: &SqliteStore<'_>, student_id: &str) -> Result<(), HandlerErr> {
    match store.get_student(student_id)? {
        Some(_) => Ok(()),
        None => Err(HandlerErr::not_found("student not found")),
    }
}

fn attendance_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = match get_optional_str(params, "date") {
        Some(raw) => Some(parse_day(&raw)?),
        None => None,
    };
    let month = match get_optional_str(params, "month") {
        Some(raw) => Some(MonthKey::parse(&raw)?),
        None => None,
    };
    let filter = RecordFilter {
        student_id: get_optional_str(params, "studentId"),
        date,
        month,
    };
    let records = SqliteStore::new(conn).get_records(&filter)?;
    Ok(json!({ "records": to_json(&records)? }))
}

fn attendance_day_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = get_required_day(params, "date")?;
    let settings = load_attendance_settings(conn)?;
    let store = SqliteStore::new(conn);
    let roster = store.list_students()?;
    let records = store.get_records(&RecordFilter {
        date: Some(date),
        ..RecordFilter::default()
    })?;

    let rows = reconcile_day(&roster, &records, date, settings.daily_policy());
    let defaulted = rows.iter().filter(|r| r.defaulted).count();
    Ok(json!({
        "date": date,
        "students": to_json(&roster)?,
        "rows": to_json(&rows)?,
        "defaultedCount": defaulted
    }))
}

fn attendance_day_save(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = get_required_day(params, "date")?;
    let marked_by = get_optional_str(params, "markedBy");
    let entries = match params.get("records") {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(v) => v
            .as_array()
            .cloned()
            .ok_or_else(|| HandlerErr::bad_params("records must be an array"))?,
    };
    if entries.len() > DAY_SAVE_MAX_RECORDS {
        return Err(HandlerErr::bad_params(format!(
            "records exceeds max entries: {} > {}",
            entries.len(),
            DAY_SAVE_MAX_RECORDS
        )));
    }

    // One write per student; a repeated studentId keeps its first position and last status.
    let mut writes: Vec<RecordWrite> = Vec::with_capacity(entries.len());
    let mut slot_by_student: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0usize;
    let mut merged = 0usize;
    for entry in &entries {
        let student_id = get_optional_str(entry, "studentId");
        let status = entry
            .get("status")
            .and_then(|v| v.as_str())
            .and_then(AttendanceStatus::parse);
        let (Some(student_id), Some(status)) = (student_id, status) else {
            skipped += 1;
            continue;
        };
        if let Some(&slot) = slot_by_student.get(&student_id) {
            writes[slot].status = status;
            merged += 1;
            continue;
        }
        slot_by_student.insert(student_id.clone(), writes.len());
        writes.push(RecordWrite {
            student_id,
            date,
            status,
            reason: ReasonWrite::KeepExisting,
            marked_by: marked_by.clone(),
        });
    }

    let store = SqliteStore::new(conn);
    let roster: HashSet<String> = store.list_students()?.into_iter().map(|s| s.id).collect();
    if let Some(unknown) = writes.iter().find(|w| !roster.contains(&w.student_id)) {
        let mut e = HandlerErr::not_found("student not found");
        e.details = Some(json!({ "studentId": unknown.student_id }));
        return Err(e);
    }

    let saved = if writes.is_empty() {
        Vec::new()
    } else {
        store.save_batch(&writes)?
    };
    info!(
        "event=attendance_day_save date={} saved={} skipped={} merged={}",
        date,
        saved.len(),
        skipped,
        merged
    );
    Ok(json!({
        "date": date,
        "records": to_json(&saved)?,
        "saved": saved.len(),
        "skipped": skipped,
        "merged": merged
    }))
}

fn attendance_mark(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let date = get_required_day(params, "date")?;
    let status = parse_status(params, "status")?;
    let store = SqliteStore::new(conn);
    require_student(&store, &student_id)?;

    let record = store.save_record(&RecordWrite {
        student_id,
        date,
        status,
        reason: ReasonWrite::KeepExisting,
        marked_by: get_optional_str(params, "markedBy"),
    })?;
    info!("event=attendance_mark date={} status={}", record.date, record.status);
    Ok(json!({ "record": to_json(&record)? }))
}

fn bulk_fill_cutoff(
    params: &serde_json::Value,
    cap_at_today: bool,
) -> Result<Option<NaiveDate>, HandlerErr> {
    if !cap_at_today {
        return Ok(None);
    }
    match get_optional_str(params, "today") {
        Some(raw) => Ok(Some(parse_day(&raw)?)),
        None => Ok(Some(Local::now().date_naive())),
    }
}

fn attendance_bulk_fill(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let request = BulkFillRequest {
        student_id: get_required_str(params, "studentId")?,
        month: get_required_str(params, "month")?,
        status: parse_status(params, "status")?,
        overwrite: get_optional_bool(params, "overwrite", false)?,
        cutoff: None,
    };
    let dry_run = get_optional_bool(params, "dryRun", false)?;
    let marked_by = get_optional_str(params, "markedBy");
    let (student_id, month) = request.validate()?;

    let settings = load_attendance_settings(conn)?;
    let request = BulkFillRequest {
        cutoff: bulk_fill_cutoff(params, settings.cap_bulk_fill_at_today)?,
        ..request
    };

    let store = SqliteStore::new(conn);
    require_student(&store, &student_id)?;
    let existing = store.get_records(&RecordFilter {
        student_id: Some(student_id.clone()),
        month: Some(month),
        ..RecordFilter::default()
    })?;

    let plan = plan_bulk_fill(&request, &existing)?;
    let written = if dry_run {
        0
    } else {
        execute_plan(&store, &plan, marked_by.as_deref())?.len()
    };
    info!(
        "event=attendance_bulk_fill month={} status={} overwrite={} dry_run={} written={} skipped={} future={}",
        plan.month,
        plan.status,
        plan.overwrite,
        dry_run,
        written,
        plan.conflict_skipped_count(),
        plan.future_skipped_count()
    );

    Ok(json!({
        "studentId": plan.student_id,
        "month": plan.month,
        "status": plan.status,
        "overwrite": plan.overwrite,
        "dryRun": dry_run,
        "planned": plan.write_count(),
        "written": written,
        "skipped": plan.conflict_skipped_count(),
        "skippedFuture": plan.future_skipped_count(),
        "days": to_json(&plan.days)?
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.list" => Some(with_conn(state, req, attendance_list)),
        "attendance.dayOpen" => Some(with_conn(state, req, attendance_day_open)),
        "attendance.daySave" => Some(with_conn(state, req, attendance_day_save)),
        "attendance.mark" => Some(with_conn(state, req, attendance_mark)),
        "attendance.bulkFill" => Some(with_conn(state, req, attendance_bulk_fill)),
        _ => None,
    }
}
