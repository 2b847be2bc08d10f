use crate::error::{CoreError, CoreResult};
use crate::model::{
    format_day, AttendanceRecord, AttendanceStatus, MonthKey, ReasonWrite, RecordWrite, Role,
    Student,
};
use chrono::{NaiveDate, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

const MAX_REASON_CHARS: usize = 500;

const RECORD_SELECT_SQL: &str = "SELECT
    id,
    student_id,
    date,
    status,
    absence_reason,
    marked_by
FROM attendance_records";

const UPSERT_SQL: &str = "INSERT INTO attendance_records(
    id, student_id, date, status, absence_reason, marked_by, marked_at, updated_at
)
VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
ON CONFLICT(student_id, date) DO UPDATE SET
    status = excluded.status,
    marked_by = excluded.marked_by,
    updated_at = excluded.updated_at,
    absence_reason = CASE
        WHEN excluded.status = 'PRESENT' THEN NULL
        WHEN ?8 = 1 THEN attendance_records.absence_reason
        ELSE excluded.absence_reason
    END";

/// Narrows `get_records`. Unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub student_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub month: Option<MonthKey>,
}

/// Persistence boundary for attendance records keyed by (student, date).
pub trait AttendanceStore {
    fn get_records(&self, filter: &RecordFilter) -> CoreResult<Vec<AttendanceRecord>>;
    fn get_record(&self, record_id: &str) -> CoreResult<Option<AttendanceRecord>>;
    fn save_record(&self, write: &RecordWrite) -> CoreResult<AttendanceRecord>;
    /// All-or-nothing: either every write lands or none does.
    fn save_batch(&self, writes: &[RecordWrite]) -> CoreResult<Vec<AttendanceRecord>>;
    /// Fails with `NotFound` unless the record exists and is ABSENT.
    fn update_reason(&self, record_id: &str, reason: Option<&str>) -> CoreResult<AttendanceRecord>;
}

pub trait RosterProvider {
    fn list_students(&self) -> CoreResult<Vec<Student>>;
    fn get_student(&self, student_id: &str) -> CoreResult<Option<Student>>;
}

pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn create_user(
        &self,
        username: &str,
        first_name: &str,
        last_name: &str,
        role: Role,
    ) -> CoreResult<String> {
        let username = username.trim();
        let first_name = first_name.trim();
        let last_name = last_name.trim();
        if username.is_empty() || first_name.is_empty() || last_name.is_empty() {
            return Err(CoreError::Validation(
                "username/firstName/lastName must not be empty".to_string(),
            ));
        }
        let taken = self
            .conn
            .query_row("SELECT 1 FROM users WHERE username = ?", [username], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?
            .is_some();
        if taken {
            return Err(CoreError::Validation(format!(
                "username already exists: {}",
                username
            )));
        }
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO users(id, username, first_name, last_name, role) VALUES(?, ?, ?, ?, ?)",
            (&id, username, first_name, last_name, role.as_str()),
        )?;
        Ok(id)
    }

    fn upsert(conn: &Connection, write: &RecordWrite, now: &str) -> CoreResult<AttendanceRecord> {
        let (insert_reason, keep_existing) = match (&write.status, &write.reason) {
            (AttendanceStatus::Present, _) => (None, false),
            (AttendanceStatus::Absent, ReasonWrite::KeepExisting) => (None, true),
            (AttendanceStatus::Absent, ReasonWrite::Replace(r)) => {
                (normalize_reason(r.as_deref())?, false)
            }
        };
        let date = format_day(write.date);
        conn.execute(
            UPSERT_SQL,
            params![
                Uuid::new_v4().to_string(),
                write.student_id,
                date,
                write.status.as_str(),
                insert_reason,
                write.marked_by,
                now,
                keep_existing as i64,
            ],
        )?;
        let sql = format!("{RECORD_SELECT_SQL} WHERE student_id = ? AND date = ?");
        let rec = conn.query_row(&sql, (&write.student_id, &date), row_to_record)?;
        Ok(rec)
    }
}

impl AttendanceStore for SqliteStore<'_> {
    fn get_records(&self, filter: &RecordFilter) -> CoreResult<Vec<AttendanceRecord>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(student_id) = &filter.student_id {
            clauses.push("student_id = ?");
            values.push(Value::Text(student_id.clone()));
        }
        if let Some(date) = filter.date {
            clauses.push("date = ?");
            values.push(Value::Text(format_day(date)));
        }
        if let Some(month) = filter.month {
            clauses.push("date BETWEEN ? AND ?");
            values.push(Value::Text(format_day(month.first_day())));
            values.push(Value::Text(format_day(month.last_day())));
        }
        let mut sql = RECORD_SELECT_SQL.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY date, student_id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_record(&self, record_id: &str) -> CoreResult<Option<AttendanceRecord>> {
        let sql = format!("{RECORD_SELECT_SQL} WHERE id = ?");
        let rec = self
            .conn
            .query_row(&sql, [record_id], row_to_record)
            .optional()?;
        Ok(rec)
    }

    fn save_record(&self, write: &RecordWrite) -> CoreResult<AttendanceRecord> {
        let now = Utc::now().to_rfc3339();
        Self::upsert(self.conn, write, &now)
    }

    fn save_batch(&self, writes: &[RecordWrite]) -> CoreResult<Vec<AttendanceRecord>> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        let mut saved = Vec::with_capacity(writes.len());
        for w in writes {
            saved.push(Self::upsert(&tx, w, &now)?);
        }
        tx.commit()?;
        Ok(saved)
    }

    fn update_reason(&self, record_id: &str, reason: Option<&str>) -> CoreResult<AttendanceRecord> {
        let reason = normalize_reason(reason)?;
        let Some(existing) = self.get_record(record_id)? else {
            return Err(CoreError::NotFound("attendance record not found".to_string()));
        };
        if existing.status != AttendanceStatus::Absent {
            return Err(CoreError::NotFound(
                "absence reason can only be set on an absent record".to_string(),
            ));
        }
        self.conn.execute(
            "UPDATE attendance_records SET absence_reason = ?, updated_at = ? WHERE id = ? AND status = 'ABSENT'",
            (&reason, Utc::now().to_rfc3339(), record_id),
        )?;
        Ok(AttendanceRecord {
            absence_reason: reason,
            ..existing
        })
    }
}

impl RosterProvider for SqliteStore<'_> {
    fn list_students(&self) -> CoreResult<Vec<Student>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, first_name, last_name
             FROM users
             WHERE role = ?
             ORDER BY last_name, first_name, username",
        )?;
        let rows = stmt
            .query_map([Role::Student.as_str()], row_to_student)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_student(&self, student_id: &str) -> CoreResult<Option<Student>> {
        let s = self
            .conn
            .query_row(
                "SELECT id, username, first_name, last_name FROM users WHERE id = ? AND role = ?",
                (student_id, Role::Student.as_str()),
                row_to_student,
            )
            .optional()?;
        Ok(s)
    }
}

fn normalize_reason(reason: Option<&str>) -> CoreResult<Option<String>> {
    let Some(r) = reason.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    if r.chars().count() > MAX_REASON_CHARS {
        return Err(CoreError::Validation(format!(
            "reason length must be <= {}",
            MAX_REASON_CHARS
        )));
    }
    Ok(Some(r.to_string()))
}

fn row_to_student(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let date_raw: String = row.get(2)?;
    let date = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let status_raw: String = row.get(3)?;
    let status = AttendanceStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown attendance status: {status_raw}").into(),
        )
    })?;
    Ok(AttendanceRecord {
        id: row.get(0)?,
        student_id: row.get(1)?,
        date,
        status,
        absence_reason: row.get(4)?,
        marked_by: row.get(5)?,
    })
}
