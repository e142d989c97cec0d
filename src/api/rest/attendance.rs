use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;

use crate::engine::fatigue::update_consecutive_days;
use crate::engine::round2;
use crate::error::AppError;
use crate::models::attendance::Attendance;
use crate::state::AppState;

const OVERTIME_HOURS: f64 = 8.0;

fn late_cutoff() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).expect("09:00 is a valid time")
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers/:id/checkin", post(check_in))
        .route("/drivers/:id/checkout", post(check_out))
        .route("/drivers/:id/attendance/today", get(today_attendance))
        .route("/attendance", get(list_attendance))
        .route("/attendance/stats", get(attendance_stats))
        .route("/attendance/bulk-checkin", post(bulk_check_in))
}

#[derive(Serialize)]
pub struct CheckInResponse {
    pub message: &'static str,
    pub check_in_time: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct CheckOutResponse {
    pub message: &'static str,
    pub total_hours: f64,
    pub is_overtime: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum DayStatus {
    Present,
    Late,
    #[serde(rename = "Missing Checkout")]
    MissingCheckout,
    Absent,
}

#[derive(Serialize)]
pub struct AttendanceRow {
    #[serde(flatten)]
    pub attendance: Attendance,
    pub driver_name: String,
    pub region: String,
    pub day_status: DayStatus,
}

#[derive(Serialize)]
pub struct AttendanceStats {
    pub total_drivers: usize,
    pub present_count: usize,
    pub absent_count: usize,
    pub late_check_ins: usize,
    pub missing_check_outs: usize,
    pub overtime_count: usize,
}

#[derive(Serialize)]
pub struct BulkCheckInResponse {
    pub message: &'static str,
    pub checked_in_count: usize,
    pub already_checked_in: usize,
    pub total_drivers: usize,
}

fn day_status(attendance: &Attendance) -> DayStatus {
    if attendance.is_absent || attendance.check_in_time.is_none() {
        DayStatus::Absent
    } else if attendance.check_out_time.is_none() {
        DayStatus::MissingCheckout
    } else if is_late(attendance) {
        DayStatus::Late
    } else {
        DayStatus::Present
    }
}

fn is_late(attendance: &Attendance) -> bool {
    attendance
        .check_in_time
        .is_some_and(|t| t.time() > late_cutoff())
}

/// Opens (or completes) today's attendance row for the driver and refreshes
/// the consecutive-days streak. A second check-in the same day is refused.
async fn check_in(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<CheckInResponse>, AppError> {
    state
        .store
        .get_driver(id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    let now = state.clock.now();
    let today = state.clock.today();

    let mut attendance = match state.store.attendance_on(id, today) {
        Some(existing) if existing.check_in_time.is_some() => {
            return Err(AppError::InvalidState("Already checked in today".to_string()));
        }
        Some(existing) => existing,
        None => Attendance {
            attendance_id: state.store.allocate_attendance_id(),
            driver_id: id,
            date: today,
            check_in_time: None,
            check_out_time: None,
            total_hours: 0.0,
            is_absent: true,
            is_overtime: false,
            created_at: now,
        },
    };

    attendance.check_in_time = Some(now);
    attendance.is_absent = false;
    state.store.save_attendance(attendance);

    update_consecutive_days(&state.store, state.clock.as_ref(), id)?;

    Ok(Json(CheckInResponse {
        message: "Checked in successfully",
        check_in_time: now,
    }))
}

/// Closes today's row: requires a check-in, refuses a second check-out, and
/// derives `total_hours` and the overtime flag from the two stamps.
async fn check_out(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<CheckOutResponse>, AppError> {
    state
        .store
        .get_driver(id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    let now = state.clock.now();
    let today = state.clock.today();

    let mut attendance = state
        .store
        .attendance_on(id, today)
        .filter(|a| a.check_in_time.is_some())
        .ok_or_else(|| AppError::InvalidState("No check-in record found for today".to_string()))?;

    if attendance.check_out_time.is_some() {
        return Err(AppError::InvalidState("Already checked out today".to_string()));
    }

    let check_in_time = attendance
        .check_in_time
        .ok_or_else(|| AppError::Internal("attendance row lost its check-in".to_string()))?;

    let total_hours = round2((now - check_in_time).num_seconds() as f64 / 3600.0);
    attendance.check_out_time = Some(now);
    attendance.total_hours = total_hours;
    attendance.is_overtime = total_hours > OVERTIME_HOURS;
    let is_overtime = attendance.is_overtime;
    state.store.save_attendance(attendance);

    Ok(Json(CheckOutResponse {
        message: "Checked out successfully",
        total_hours,
        is_overtime,
    }))
}

async fn today_attendance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Option<Attendance>>, AppError> {
    state
        .store
        .get_driver(id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    Ok(Json(state.store.attendance_on(id, state.clock.today())))
}

async fn list_attendance(State(state): State<Arc<AppState>>) -> Json<Vec<AttendanceRow>> {
    let mut rows: Vec<AttendanceRow> = state
        .store
        .attendance_rows()
        .into_iter()
        .map(|attendance| {
            let driver = state.store.get_driver(attendance.driver_id);
            AttendanceRow {
                day_status: day_status(&attendance),
                driver_name: driver.as_ref().map(|d| d.name.clone()).unwrap_or_default(),
                region: driver.map(|d| d.region).unwrap_or_default(),
                attendance,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.attendance
            .date
            .cmp(&a.attendance.date)
            .then_with(|| a.attendance.driver_id.cmp(&b.attendance.driver_id))
    });

    Json(rows)
}

async fn attendance_stats(State(state): State<Arc<AppState>>) -> Json<AttendanceStats> {
    let rows = state.store.attendance_rows();
    let total_drivers = state.store.driver_count();

    let present_count = rows
        .iter()
        .filter(|a| !a.is_absent && a.check_in_time.is_some())
        .count();

    Json(AttendanceStats {
        total_drivers,
        present_count,
        absent_count: total_drivers.saturating_sub(present_count),
        late_check_ins: rows.iter().filter(|a| !a.is_absent && is_late(a)).count(),
        missing_check_outs: rows
            .iter()
            .filter(|a| !a.is_absent && a.check_in_time.is_some() && a.check_out_time.is_none())
            .count(),
        overtime_count: rows.iter().filter(|a| a.is_overtime).count(),
    })
}

/// Checks in every ACTIVE driver that has not checked in yet today.
async fn bulk_check_in(State(state): State<Arc<AppState>>) -> Json<BulkCheckInResponse> {
    let now = state.clock.now();
    let today = state.clock.today();
    let drivers = state.store.active_drivers();
    let total_drivers = drivers.len();

    let mut checked_in_count = 0;
    let mut already_checked_in = 0;

    for driver in drivers {
        match state.store.attendance_on(driver.driver_id, today) {
            Some(existing) if existing.check_in_time.is_some() => {
                already_checked_in += 1;
            }
            Some(mut existing) => {
                existing.check_in_time = Some(now);
                existing.is_absent = false;
                state.store.save_attendance(existing);
                checked_in_count += 1;
            }
            None => {
                state.store.save_attendance(Attendance {
                    attendance_id: state.store.allocate_attendance_id(),
                    driver_id: driver.driver_id,
                    date: today,
                    check_in_time: Some(now),
                    check_out_time: None,
                    total_hours: 0.0,
                    is_absent: false,
                    is_overtime: false,
                    created_at: now,
                });
                checked_in_count += 1;
            }
        }
    }

    Json(BulkCheckInResponse {
        message: "Bulk check-in completed",
        checked_in_count,
        already_checked_in,
        total_drivers,
    })
}
