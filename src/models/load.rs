use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Dispatch order for bulk assignment: HIGH before MEDIUM before LOW.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadStatus::Pending => "PENDING",
            LoadStatus::Assigned => "ASSIGNED",
            LoadStatus::InProgress => "IN_PROGRESS",
            LoadStatus::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Load {
    pub load_id: i64,
    /// Human reference, `LD-YYYYMMDD-NNN`, unique per day.
    pub load_ref: String,
    pub region: String,
    pub stops: i64,
    pub estimated_hours: f64,
    pub estimated_distance: f64,
    pub priority: Priority,
    pub status: LoadStatus,
    pub assigned_driver_id: Option<i64>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
