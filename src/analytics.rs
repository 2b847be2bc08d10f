use crate::model::{AttendanceRecord, AttendanceStatus, MonthKey};
use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

pub const EXCELLENT_RATE_THRESHOLD: f64 = 90.0;
pub const GOOD_RATE_THRESHOLD: f64 = 75.0;

/// 1-decimal rounding shared by every rate: `Int(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// Present share of `total` as a percentage; 0 when there is nothing to count.
pub fn rate_percent(present: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_off_1_decimal(100.0 * (present as f64) / (total as f64))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateTier {
    Excellent,
    Good,
    NeedsAttention,
}

impl RateTier {
    pub fn label(self) -> &'static str {
        match self {
            RateTier::Excellent => "Excellent",
            RateTier::Good => "Good",
            RateTier::NeedsAttention => "Needs Attention",
        }
    }
}

impl Serialize for RateTier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierThresholds {
    pub excellent: f64,
    pub good: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            excellent: EXCELLENT_RATE_THRESHOLD,
            good: GOOD_RATE_THRESHOLD,
        }
    }
}

impl TierThresholds {
    pub fn tier_for(&self, rate: f64) -> RateTier {
        if rate >= self.excellent {
            RateTier::Excellent
        } else if rate >= self.good {
            RateTier::Good
        } else {
            RateTier::NeedsAttention
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassOverview {
    pub present: usize,
    pub absent: usize,
    pub total: usize,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayStat {
    pub date: NaiveDate,
    pub present: usize,
    pub absent: usize,
    pub rate: f64,
    pub tier: RateTier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAnalytics {
    pub month: String,
    pub overview: ClassOverview,
    pub daily: Vec<DayStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAnalytics {
    pub student_id: String,
    pub month: String,
    pub stats: StudentStats,
    pub absences: Vec<AttendanceRecord>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    present: usize,
    absent: usize,
}

impl Tally {
    fn add(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
        }
    }

    fn total(&self) -> usize {
        self.present + self.absent
    }
}

/// Class-wide month summary. Days without any record are not synthesized.
pub fn class_analytics(
    records: &[AttendanceRecord],
    month: MonthKey,
    thresholds: &TierThresholds,
) -> ClassAnalytics {
    let mut overall = Tally::default();
    let mut by_day: BTreeMap<NaiveDate, Tally> = BTreeMap::new();
    for r in records.iter().filter(|r| month.contains(r.date)) {
        overall.add(r.status);
        by_day.entry(r.date).or_default().add(r.status);
    }

    let daily = by_day
        .into_iter()
        .map(|(date, t)| {
            let rate = rate_percent(t.present, t.total());
            DayStat {
                date,
                present: t.present,
                absent: t.absent,
                rate,
                tier: thresholds.tier_for(rate),
            }
        })
        .collect();

    ClassAnalytics {
        month: month.to_string(),
        overview: ClassOverview {
            present: overall.present,
            absent: overall.absent,
            total: overall.total(),
            attendance_rate: rate_percent(overall.present, overall.total()),
        },
        daily,
    }
}

/// One student's month: counts, rate and absences ordered by date.
pub fn student_analytics(
    records: &[AttendanceRecord],
    student_id: &str,
    month: MonthKey,
) -> StudentAnalytics {
    let mut tally = Tally::default();
    let mut absences: Vec<AttendanceRecord> = Vec::new();
    for r in records
        .iter()
        .filter(|r| r.student_id == student_id && month.contains(r.date))
    {
        tally.add(r.status);
        if r.status == AttendanceStatus::Absent {
            absences.push(r.clone());
        }
    }
    absences.sort_by(|a, b| a.date.cmp(&b.date));

    StudentAnalytics {
        student_id: student_id.to_string(),
        month: month.to_string(),
        stats: StudentStats {
            total: tally.total(),
            present: tally.present,
            absent: tally.absent,
            rate: rate_percent(tally.present, tally.total()),
        },
        absences,
    }
}
