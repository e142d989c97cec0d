use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One row per driver per calendar day. `total_hours` and `is_overtime` are
/// filled in at check-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendance {
    pub attendance_id: i64,
    pub driver_id: i64,
    pub date: NaiveDate,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub total_hours: f64,
    pub is_absent: bool,
    pub is_overtime: bool,
    pub created_at: DateTime<Utc>,
}
