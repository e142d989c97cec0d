use chrono::Datelike;
use serde::Serialize;

use crate::clock::Clock;
use crate::engine::overload::calculate_overload_score;
use crate::error::AppError;
use crate::models::driver::{DayOfWeek, DriverStatus};
use crate::store::Store;

/// Fatigue ceiling above which a driver is forced to rest.
pub const MAX_FATIGUE_SCORE: f64 = 85.0;
/// Open loads a driver may carry per day.
pub const MAX_DAILY_LOADS: usize = 3;
/// Overload ceiling beyond which an assignment is refused outright.
pub const MAX_OVERLOAD_SCORE: f64 = 0.90;

#[derive(Debug, Clone, Serialize)]
pub struct EligibilityResult {
    pub driver_id: i64,
    pub driver_name: String,
    pub is_eligible: bool,
    pub reason: String,
}

/// Runs every disqualification rule and reports all that fired, joined with
/// "; ", so the operator sees the whole picture instead of the first failure.
///
/// A missing driver is reported as ineligible rather than as an error; a
/// missing candidate load still fails, since the caller named it explicitly.
pub fn check_driver_eligibility(
    store: &Store,
    clock: &dyn Clock,
    driver_id: i64,
    load_id: Option<i64>,
) -> Result<EligibilityResult, AppError> {
    let Some(driver) = store.get_driver(driver_id) else {
        return Ok(EligibilityResult {
            driver_id,
            driver_name: String::new(),
            is_eligible: false,
            reason: "Driver not found".to_string(),
        });
    };

    let today = clock.today();
    let mut reasons = Vec::new();

    if driver.status != DriverStatus::Active {
        reasons.push("Driver is inactive".to_string());
    }

    if driver.weekly_off == DayOfWeek::from(today.weekday()) {
        reasons.push(format!("Today is driver's weekly off ({})", driver.weekly_off));
    }

    if driver.fatigue_score > MAX_FATIGUE_SCORE {
        reasons.push(format!(
            "Fatigue score too high ({}/100) - driver needs rest",
            driver.fatigue_score
        ));
    }

    let today_load_count = store.active_assignments_on(driver_id, today).len();
    if today_load_count >= MAX_DAILY_LOADS {
        reasons.push(format!(
            "Driver already has {today_load_count} active loads today (max {MAX_DAILY_LOADS})"
        ));
    }

    if let Some(load_id) = load_id {
        let overload = calculate_overload_score(store, clock, driver_id, load_id)?;
        if overload.overload_score > MAX_OVERLOAD_SCORE {
            reasons.push(format!(
                "Overload score too high ({:.0}%) - unsafe",
                overload.overload_score * 100.0
            ));
        }
    }

    let checked_in_today = store
        .attendance_on(driver_id, today)
        .is_some_and(|a| a.check_in_time.is_some());
    if !checked_in_today {
        reasons.push("Driver has not checked in today".to_string());
    }

    let is_eligible = reasons.is_empty();
    let reason = if is_eligible {
        "Eligible for assignment".to_string()
    } else {
        reasons.join("; ")
    };

    Ok(EligibilityResult {
        driver_id,
        driver_name: driver.name,
        is_eligible,
        reason,
    })
}
