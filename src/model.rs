use crate::error::CoreError;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "PRESENT",
            AttendanceStatus::Absent => "ABSENT",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PRESENT" => Some(AttendanceStatus::Present),
            "ABSENT" => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Teacher => "TEACHER",
            Role::Student => "STUDENT",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "TEACHER" => Some(Role::Teacher),
            "STUDENT" => Some(Role::Student),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl Student {
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

/// One persisted attendance entry. At most one exists per (student_id, date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub absence_reason: Option<String>,
    pub marked_by: Option<String>,
}

impl AttendanceRecord {
    pub fn key(&self) -> (&str, NaiveDate) {
        (self.student_id.as_str(), self.date)
    }
}

/// How an upsert treats the reason already stored on an absent record.
/// A PRESENT write always clears it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReasonWrite {
    KeepExisting,
    Replace(Option<String>),
}

/// A write request for the store: the record identity plus the status to hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordWrite {
    pub student_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub reason: ReasonWrite,
    pub marked_by: Option<String>,
}

/// Calendar month addressed as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self, CoreError> {
        if !(1..=12).contains(&month) {
            return Err(CoreError::Validation(
                "month must be between 01 and 12".to_string(),
            ));
        }
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(CoreError::Validation("month year out of range".to_string()));
        }
        Ok(Self { year, month })
    }

    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let t = raw.trim();
        let Some((y, m)) = t.split_once('-') else {
            return Err(CoreError::Validation("month must be YYYY-MM".to_string()));
        };
        if y.len() != 4 || m.is_empty() || m.len() > 2 || !all_digits(y) || !all_digits(m) {
            return Err(CoreError::Validation("month must be YYYY-MM".to_string()));
        }
        let year = y
            .parse::<i32>()
            .map_err(|_| CoreError::Validation("month year must be numeric".to_string()))?;
        let month = m
            .parse::<u32>()
            .map_err(|_| CoreError::Validation("month must be YYYY-MM".to_string()))?;
        Self::new(year, month)
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        let first = self.first_day();
        let next = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
        };
        next.and_then(|d| d.pred_opt()).unwrap_or(first)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.first_day(),
            end: self.last_day(),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Inclusive day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

fn all_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

fn is_day_shape(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && all_digits(&s[..4])
        && all_digits(&s[5..7])
        && all_digits(&s[8..])
}

/// Parses a calendar day, ignoring any time component (`2024-02-01T08:30:00`).
pub fn parse_day(raw: &str) -> Result<NaiveDate, CoreError> {
    let t = raw.trim();
    let day_part = match t.char_indices().nth(10) {
        Some((idx, 'T')) | Some((idx, ' ')) => &t[..idx],
        _ => t,
    };
    let invalid = || CoreError::Validation(format!("date must be YYYY-MM-DD: {}", t));
    if !is_day_shape(day_part) {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(day_part, "%Y-%m-%d").map_err(|_| invalid())
}

pub fn format_day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_key_handles_leap_february() {
        let m = MonthKey::parse("2024-02").expect("month");
        assert_eq!(m.range().days().count(), 29);
        assert_eq!(format_day(m.last_day()), "2024-02-29");
        let m = MonthKey::parse("2023-02").expect("month");
        assert_eq!(m.range().days().count(), 28);
        let m = MonthKey::parse("1900-02").expect("month");
        assert_eq!(m.range().days().count(), 28);
    }

    #[test]
    fn month_key_rejects_malformed_input() {
        assert!(MonthKey::parse("").is_err());
        assert!(MonthKey::parse("2024").is_err());
        assert!(MonthKey::parse("2024-13").is_err());
        assert!(MonthKey::parse("2024-00").is_err());
        assert!(MonthKey::parse("24-02").is_err());
        assert!(MonthKey::parse("2024-ab").is_err());
        assert!(MonthKey::parse("2024-+2").is_err());
        assert!(MonthKey::parse("+024-02").is_err());
        assert!(MonthKey::parse("2024- 2").is_err());
    }

    #[test]
    fn december_rolls_into_next_year() {
        let m = MonthKey::parse("2023-12").expect("month");
        assert_eq!(format_day(m.last_day()), "2023-12-31");
        assert_eq!(m.range().days().count(), 31);
        assert_eq!(m.to_string(), "2023-12");
    }

    #[test]
    fn parse_day_drops_time_component() {
        let d = parse_day("2024-03-05T14:22:00Z").expect("day");
        assert_eq!(format_day(d), "2024-03-05");
        let d = parse_day("2024-03-05 07:00").expect("day");
        assert_eq!(format_day(d), "2024-03-05");
        assert!(parse_day("03/05/2024").is_err());
        assert!(parse_day("2024-3-5").is_err());
        assert!(parse_day("+2024-03-05").is_err());
        assert!(parse_day("2024-02-30").is_err());
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(AttendanceStatus::parse("present"), Some(AttendanceStatus::Present));
        assert_eq!(AttendanceStatus::parse(" ABSENT "), Some(AttendanceStatus::Absent));
        assert_eq!(AttendanceStatus::parse("late"), None);
    }
}
