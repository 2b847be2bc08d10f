use crate::error::{CoreError, CoreResult};
use crate::model::{AttendanceRecord, AttendanceStatus, MonthKey, ReasonWrite, RecordWrite};
use crate::store::AttendanceStore;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

const MAX_STUDENT_ID_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct BulkFillRequest {
    pub student_id: String,
    pub month: String,
    pub status: AttendanceStatus,
    pub overwrite: bool,
    /// Last day that may be written; later days are skipped as future days.
    pub cutoff: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum DayAction {
    #[serde(rename_all = "camelCase")]
    Write {
        status: AttendanceStatus,
        replaces: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ConflictSkipped { existing_status: AttendanceStatus },
    FutureSkipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedDay {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub action: DayAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WritePlan {
    pub student_id: String,
    pub month: String,
    pub status: AttendanceStatus,
    pub overwrite: bool,
    pub days: Vec<PlannedDay>,
}

impl WritePlan {
    pub fn write_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days
            .iter()
            .filter(|d| matches!(d.action, DayAction::Write { .. }))
            .map(|d| d.date)
    }

    pub fn write_count(&self) -> usize {
        self.write_dates().count()
    }

    pub fn conflict_skipped_count(&self) -> usize {
        self.days
            .iter()
            .filter(|d| matches!(d.action, DayAction::ConflictSkipped { .. }))
            .count()
    }

    pub fn future_skipped_count(&self) -> usize {
        self.days
            .iter()
            .filter(|d| matches!(d.action, DayAction::FutureSkipped))
            .count()
    }

    /// Store writes for every planned write day, in date order.
    ///
    /// Bulk writes replace the whole record, so any earlier reason is dropped.
    pub fn to_writes(&self, marked_by: Option<&str>) -> Vec<RecordWrite> {
        self.write_dates()
            .map(|date| RecordWrite {
                student_id: self.student_id.clone(),
                date,
                status: self.status,
                reason: ReasonWrite::Replace(None),
                marked_by: marked_by.map(|s| s.to_string()),
            })
            .collect()
    }
}

fn validate_student_id(raw: &str) -> CoreResult<String> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(CoreError::Validation("missing studentId".to_string()));
    }
    if t.len() > MAX_STUDENT_ID_LEN || t.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CoreError::Validation("malformed studentId".to_string()));
    }
    Ok(t.to_string())
}

impl BulkFillRequest {
    /// Checks identifiers before anything touches the store.
    pub fn validate(&self) -> CoreResult<(String, MonthKey)> {
        let student_id = validate_student_id(&self.student_id)?;
        let month = MonthKey::parse(&self.month)?;
        Ok((student_id, month))
    }
}

/// Computes the writes a bulk fill would issue for one student and month.
///
/// Every calendar day of the month appears exactly once in the plan. With
/// `overwrite` each day is written; without it any day that already holds a
/// record is left untouched regardless of that record's status.
pub fn plan_bulk_fill(req: &BulkFillRequest, existing: &[AttendanceRecord]) -> CoreResult<WritePlan> {
    let (student_id, month) = req.validate()?;

    let existing_by_day: HashMap<NaiveDate, &AttendanceRecord> = existing
        .iter()
        .filter(|r| r.student_id == student_id && month.contains(r.date))
        .map(|r| (r.date, r))
        .collect();

    let days = month
        .range()
        .days()
        .map(|date| {
            let action = match (req.cutoff, existing_by_day.get(&date)) {
                (Some(cutoff), _) if date > cutoff => DayAction::FutureSkipped,
                (_, Some(rec)) if !req.overwrite => DayAction::ConflictSkipped {
                    existing_status: rec.status,
                },
                (_, rec) => DayAction::Write {
                    status: req.status,
                    replaces: rec.map(|r| r.id.clone()),
                },
            };
            PlannedDay { date, action }
        })
        .collect();

    Ok(WritePlan {
        student_id,
        month: month.to_string(),
        status: req.status,
        overwrite: req.overwrite,
        days,
    })
}

/// Issues the plan's writes as one batch. Store failures surface as-is.
pub fn execute_plan<S: AttendanceStore + ?Sized>(
    store: &S,
    plan: &WritePlan,
    marked_by: Option<&str>,
) -> CoreResult<Vec<AttendanceRecord>> {
    let writes = plan.to_writes(marked_by);
    if writes.is_empty() {
        return Ok(Vec::new());
    }
    store.save_batch(&writes)
}
