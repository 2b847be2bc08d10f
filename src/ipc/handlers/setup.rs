use crate::analytics::{TierThresholds, EXCELLENT_RATE_THRESHOLD, GOOD_RATE_THRESHOLD};
use crate::db;
use crate::ipc::helpers::{with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::AttendanceStatus;
use crate::reconcile::{UnmarkedPolicy, DEFAULT_UNMARKED_STATUS};
use log::{info, warn};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

const ATTENDANCE_SETTINGS_KEY: &str = "setup.attendance";

/// Workspace-level knobs for the attendance engines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttendanceSettings {
    pub default_status: AttendanceStatus,
    pub tiers: TierThresholds,
    pub cap_bulk_fill_at_today: bool,
}

impl Default for AttendanceSettings {
    fn default() -> Self {
        Self {
            default_status: DEFAULT_UNMARKED_STATUS,
            tiers: TierThresholds::default(),
            cap_bulk_fill_at_today: true,
        }
    }
}

impl AttendanceSettings {
    pub fn daily_policy(&self) -> UnmarkedPolicy {
        UnmarkedPolicy::Assume(self.default_status)
    }

    fn from_json(v: &Value) -> Self {
        let mut s = Self::default();
        if let Some(status) = v
            .get("defaultStatus")
            .and_then(|x| x.as_str())
            .and_then(AttendanceStatus::parse)
        {
            s.default_status = status;
        }
        if let Some(x) = v.get("excellentThreshold").and_then(|x| x.as_f64()) {
            s.tiers.excellent = x;
        }
        if let Some(x) = v.get("goodThreshold").and_then(|x| x.as_f64()) {
            s.tiers.good = x;
        }
        if let Some(x) = v.get("capBulkFillAtToday").and_then(|x| x.as_bool()) {
            s.cap_bulk_fill_at_today = x;
        }
        s
    }
}

fn default_section() -> Value {
    json!({
        "defaultStatus": DEFAULT_UNMARKED_STATUS.as_str(),
        "excellentThreshold": EXCELLENT_RATE_THRESHOLD,
        "goodThreshold": GOOD_RATE_THRESHOLD,
        "capBulkFillAtToday": true
    })
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_fields(current: &mut Value, patch: &Map<String, Value>) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match k.as_str() {
            "defaultStatus" => {
                let status = v
                    .as_str()
                    .and_then(AttendanceStatus::parse)
                    .ok_or_else(|| "defaultStatus must be one of: PRESENT, ABSENT".to_string())?;
                obj.insert(k.clone(), Value::String(status.as_str().to_string()));
            }
            "excellentThreshold" | "goodThreshold" => {
                obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 0.0, 100.0)?));
            }
            "capBulkFillAtToday" => {
                obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
            }
            _ => return Err(format!("unknown attendance field: {}", k)),
        }
    }
    Ok(())
}

fn check_tier_order(current: &Value) -> Result<(), String> {
    let excellent = current.get("excellentThreshold").and_then(|x| x.as_f64());
    let good = current.get("goodThreshold").and_then(|x| x.as_f64());
    if let (Some(e), Some(g)) = (excellent, good) {
        if g >= e {
            return Err("goodThreshold must be below excellentThreshold".into());
        }
    }
    Ok(())
}

fn merge_section_patch(current: &mut Value, patch: &Map<String, Value>) -> Result<(), String> {
    let mut candidate = current.clone();
    merge_fields(&mut candidate, patch)?;
    check_tier_order(&candidate)?;
    *current = candidate;
    Ok(())
}

fn load_section(conn: &Connection) -> anyhow::Result<Value> {
    let defaults = default_section();
    let mut current = defaults.clone();
    let Some(saved) = db::settings_get_json(conn, ATTENDANCE_SETTINGS_KEY)? else {
        return Ok(current);
    };
    let Some(saved_obj) = saved.as_object() else {
        warn!("event=settings_load section=attendance status=not_an_object");
        return Ok(current);
    };
    // Stored fields are applied one at a time; invalid ones keep their default.
    for (k, v) in saved_obj {
        let mut one = Map::new();
        one.insert(k.clone(), v.clone());
        if merge_fields(&mut current, &one).is_err() {
            warn!("event=settings_load section=attendance status=field_ignored field={}", k);
        }
    }
    if check_tier_order(&current).is_err() {
        warn!("event=settings_load section=attendance status=tiers_reset");
        for key in ["excellentThreshold", "goodThreshold"] {
            if let (Some(obj), Some(d)) = (current.as_object_mut(), defaults.get(key)) {
                obj.insert(key.to_string(), d.clone());
            }
        }
    }
    Ok(current)
}

pub fn load_attendance_settings(conn: &Connection) -> anyhow::Result<AttendanceSettings> {
    Ok(AttendanceSettings::from_json(&load_section(conn)?))
}

fn require_attendance_section(params: &Value) -> Result<(), HandlerErr> {
    match params.get("section").and_then(|v| v.as_str()) {
        None | Some("attendance") => Ok(()),
        Some(_) => Err(HandlerErr::bad_params("unknown section")),
    }
}

fn setup_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    require_attendance_section(params)?;
    Ok(json!({ "attendance": load_section(conn)? }))
}

fn setup_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    require_attendance_section(params)?;
    let Some(patch_obj) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    let mut current = load_section(conn)?;
    merge_section_patch(&mut current, patch_obj).map_err(HandlerErr::bad_params)?;
    db::settings_set_json(conn, ATTENDANCE_SETTINGS_KEY, &current)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    info!("event=settings_update section=attendance fields={}", patch_obj.len());
    Ok(json!({ "ok": true, "attendance": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(with_conn(state, req, setup_get)),
        "setup.update" => Some(with_conn(state, req, setup_update)),
        _ => None,
    }
}
