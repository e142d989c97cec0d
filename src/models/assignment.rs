use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Assigned,
    InProgress,
    Completed,
}

/// The binding of one load to one driver. `load_ref` and both scores are
/// snapshots taken at assignment time; they are never recomputed, so the
/// scoring rationale survives later edits to the driver or the load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftAssignment {
    pub assignment_id: i64,
    pub driver_id: i64,
    /// None once the referenced load has been deleted.
    pub load_id: Option<i64>,
    pub load_ref: String,
    pub assigned_date: DateTime<Utc>,
    pub status: AssignmentStatus,
    pub suitability_score: f64,
    pub overload_score: f64,
    pub is_override: bool,
    pub created_at: DateTime<Utc>,
}
