use serde::Serialize;

use crate::clock::Clock;
use crate::engine::round4;
use crate::error::AppError;
use crate::store::Store;

const STOPS_WEIGHT: f64 = 0.50;
const HOURS_WEIGHT: f64 = 0.30;
const DISTANCE_WEIGHT: f64 = 0.20;

/// Projected daily totals at which each dimension saturates.
const MAX_STOPS: f64 = 60.0;
const MAX_HOURS: f64 = 10.0;
const MAX_DISTANCE_KM: f64 = 200.0;

const WARNING_THRESHOLD: f64 = 0.75;
const UNSAFE_THRESHOLD: f64 = 0.90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverloadStatus {
    Safe,
    Warning,
    Unsafe,
}

impl OverloadStatus {
    fn from_score(score: f64) -> Self {
        if score < WARNING_THRESHOLD {
            OverloadStatus::Safe
        } else if score < UNSAFE_THRESHOLD {
            OverloadStatus::Warning
        } else {
            OverloadStatus::Unsafe
        }
    }
}

/// Raw and normalized figures are both exposed so an operator can see why a
/// projection tipped into WARNING or UNSAFE.
#[derive(Debug, Clone, Serialize)]
pub struct OverloadResult {
    pub driver_id: i64,
    pub driver_name: String,
    pub load_id: i64,
    pub overload_score: f64,
    pub status: OverloadStatus,
    pub current_stops: i64,
    pub current_hours: f64,
    pub current_distance: f64,
    pub projected_stops: i64,
    pub projected_hours: f64,
    pub projected_distance: f64,
    pub stops_normalized: f64,
    pub hours_normalized: f64,
    pub distance_normalized: f64,
}

/// Projects the driver's workload for today as if the candidate load were
/// added, then scores it: 0.50*stops + 0.30*hours + 0.20*distance, each
/// capped at its saturation point.
pub fn calculate_overload_score(
    store: &Store,
    clock: &dyn Clock,
    driver_id: i64,
    load_id: i64,
) -> Result<OverloadResult, AppError> {
    let driver = store
        .get_driver(driver_id)
        .ok_or_else(|| AppError::NotFound("Driver not found".to_string()))?;
    let load = store
        .get_load(load_id)
        .ok_or_else(|| AppError::NotFound("Load not found".to_string()))?;

    let active = store.active_assignments_on(driver_id, clock.today());

    let mut current_stops = 0i64;
    let mut current_hours = 0.0;
    let mut current_distance = 0.0;
    for (_, assigned_load) in &active {
        if let Some(assigned) = assigned_load {
            current_stops += assigned.stops;
            current_hours += assigned.estimated_hours;
            current_distance += assigned.estimated_distance;
        }
    }

    let projected_stops = current_stops + load.stops;
    let projected_hours = current_hours + load.estimated_hours;
    let projected_distance = current_distance + load.estimated_distance;

    let stops_norm = (projected_stops as f64 / MAX_STOPS).min(1.0);
    let hours_norm = (projected_hours / MAX_HOURS).min(1.0);
    let distance_norm = (projected_distance / MAX_DISTANCE_KM).min(1.0);

    let overload_score = round4(
        STOPS_WEIGHT * stops_norm + HOURS_WEIGHT * hours_norm + DISTANCE_WEIGHT * distance_norm,
    );

    Ok(OverloadResult {
        driver_id,
        driver_name: driver.name,
        load_id,
        overload_score,
        status: OverloadStatus::from_score(overload_score),
        current_stops,
        current_hours,
        current_distance,
        projected_stops,
        projected_hours,
        projected_distance,
        stops_normalized: round4(stops_norm),
        hours_normalized: round4(hours_norm),
        distance_normalized: round4(distance_norm),
    })
}
