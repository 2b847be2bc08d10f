use crate::model::{AttendanceRecord, AttendanceStatus, DateRange, MonthKey, Student};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

/// Status assumed for a student nobody marked on the teacher's daily sheet.
pub const DEFAULT_UNMARKED_STATUS: AttendanceStatus = AttendanceStatus::Present;

/// What to report for a (student, day) pair that has no stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmarkedPolicy {
    /// Fill the gap with this status and flag the day as defaulted.
    Assume(AttendanceStatus),
    /// Leave the gap visible as "no record".
    ReportNoRecord,
}

pub const DAILY_UNMARKED_POLICY: UnmarkedPolicy = UnmarkedPolicy::Assume(DEFAULT_UNMARKED_STATUS);
pub const CALENDAR_UNMARKED_POLICY: UnmarkedPolicy = UnmarkedPolicy::ReportNoRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileScope {
    Day(NaiveDate),
    Range(DateRange),
}

impl ReconcileScope {
    pub fn month(month: MonthKey) -> Self {
        ReconcileScope::Range(month.range())
    }

    /// Daily sheets assume the default status; calendars keep gaps visible.
    pub fn default_policy(&self) -> UnmarkedPolicy {
        match self {
            ReconcileScope::Day(_) => DAILY_UNMARKED_POLICY,
            ReconcileScope::Range(_) => CALENDAR_UNMARKED_POLICY,
        }
    }

    fn days(&self) -> Vec<NaiveDate> {
        match self {
            ReconcileScope::Day(d) => vec![*d],
            ReconcileScope::Range(r) => r.days().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledDay {
    pub student_id: String,
    pub date: NaiveDate,
    /// `None` means no record exists and the policy kept the gap.
    pub status: Option<AttendanceStatus>,
    pub defaulted: bool,
    pub absence_reason: Option<String>,
    pub record_id: Option<String>,
}

/// Merges sparse records against the full roster x day grid of `scope`.
///
/// Output is ordered by roster position, then by day. Records outside the
/// roster or the scope are ignored. If the input holds two records for the
/// same pair the later one wins, matching the store's last-write-wins.
pub fn reconcile(
    roster: &[Student],
    records: &[AttendanceRecord],
    scope: ReconcileScope,
    policy: UnmarkedPolicy,
) -> Vec<ReconciledDay> {
    let mut by_key: HashMap<(&str, NaiveDate), &AttendanceRecord> = HashMap::new();
    for r in records {
        by_key.insert(r.key(), r);
    }

    let days = scope.days();
    let mut out = Vec::with_capacity(roster.len() * days.len());
    for student in roster {
        for day in &days {
            let reconciled = match by_key.get(&(student.id.as_str(), *day)) {
                Some(r) => ReconciledDay {
                    student_id: student.id.clone(),
                    date: *day,
                    status: Some(r.status),
                    defaulted: false,
                    absence_reason: match r.status {
                        AttendanceStatus::Absent => r.absence_reason.clone(),
                        AttendanceStatus::Present => None,
                    },
                    record_id: Some(r.id.clone()),
                },
                None => ReconciledDay {
                    student_id: student.id.clone(),
                    date: *day,
                    status: match policy {
                        UnmarkedPolicy::Assume(s) => Some(s),
                        UnmarkedPolicy::ReportNoRecord => None,
                    },
                    defaulted: matches!(policy, UnmarkedPolicy::Assume(_)),
                    absence_reason: None,
                    record_id: None,
                },
            };
            out.push(reconciled);
        }
    }
    out
}

/// Teacher's daily sheet: one row per rostered student.
pub fn reconcile_day(
    roster: &[Student],
    records: &[AttendanceRecord],
    date: NaiveDate,
    policy: UnmarkedPolicy,
) -> Vec<ReconciledDay> {
    reconcile(roster, records, ReconcileScope::Day(date), policy)
}

/// Student's calendar: one row per day of the month for a single student.
pub fn reconcile_calendar(
    student: &Student,
    records: &[AttendanceRecord],
    month: MonthKey,
) -> Vec<ReconciledDay> {
    let scope = ReconcileScope::month(month);
    reconcile(
        std::slice::from_ref(student),
        records,
        scope,
        scope.default_policy(),
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCounts {
    pub present: usize,
    pub absent: usize,
    pub no_record: usize,
}

pub fn count_days(days: &[ReconciledDay]) -> DayCounts {
    let mut counts = DayCounts::default();
    for d in days {
        match d.status {
            Some(AttendanceStatus::Present) => counts.present += 1,
            Some(AttendanceStatus::Absent) => counts.absent += 1,
            None => counts.no_record += 1,
        }
    }
    counts
}
