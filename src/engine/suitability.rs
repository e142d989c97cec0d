use serde::Serialize;

use crate::clock::Clock;
use crate::engine::round2;
use crate::error::AppError;
use crate::store::Store;

const REGION_WEIGHT: f64 = 0.30;
const WORKLOAD_WEIGHT: f64 = 0.25;
const FATIGUE_WEIGHT: f64 = 0.25;
const DISTANCE_WEIGHT: f64 = 0.10;
const ROTATION_WEIGHT: f64 = 0.10;

const REGION_MATCH_SCORE: f64 = 100.0;
const REGION_MISMATCH_SCORE: f64 = 50.0;

const MAX_DAY_HOURS: f64 = 10.0;
const MAX_DAY_DISTANCE_KM: f64 = 200.0;

/// Streak length at which the rotation fairness penalty kicks in.
const ROTATION_STREAK_DAYS: i64 = 5;
const ROTATION_PENALTY: f64 = -20.0;

/// Every sub-score is reported alongside the composite so a ranking can be
/// audited after the fact.
#[derive(Debug, Clone, Serialize)]
pub struct SuitabilityResult {
    pub driver_id: i64,
    pub driver_name: String,
    pub load_id: i64,
    pub suitability_score: f64,
    pub region_match: bool,
    pub region_score: f64,
    pub workload_score: f64,
    pub fatigue_score: f64,
    pub distance_score: f64,
    pub rotation_penalty: f64,
    pub consecutive_days: i64,
    pub current_fatigue_score: f64,
}

/// Scores how well a driver fits a load on a 0-100 scale:
/// 0.30*region + 0.25*workload + 0.25*fatigue + 0.10*distance
/// + 0.10*(100 + rotation penalty), clamped to [0, 100].
pub fn calculate_suitability_score(
    store: &Store,
    clock: &dyn Clock,
    driver_id: i64,
    load_id: i64,
) -> Result<SuitabilityResult, AppError> {
    let driver = store
        .get_driver(driver_id)
        .ok_or_else(|| AppError::NotFound("Driver not found".to_string()))?;
    let load = store
        .get_load(load_id)
        .ok_or_else(|| AppError::NotFound("Load not found".to_string()))?;

    let active = store.active_assignments_on(driver_id, clock.today());
    let mut current_hours = 0.0;
    let mut current_distance = 0.0;
    for (_, assigned_load) in &active {
        if let Some(assigned) = assigned_load {
            current_hours += assigned.estimated_hours;
            current_distance += assigned.estimated_distance;
        }
    }

    let region_match = driver.region.eq_ignore_ascii_case(&load.region);
    let region_score = if region_match {
        REGION_MATCH_SCORE
    } else {
        REGION_MISMATCH_SCORE
    };

    // The lighter today's committed hours and kilometres, the better the fit.
    let workload_score = 100.0 - (current_hours / MAX_DAY_HOURS).min(1.0) * 100.0;
    let fatigue_score = 100.0 - driver.fatigue_score;
    let distance_score = 100.0 - (current_distance / MAX_DAY_DISTANCE_KM).min(1.0) * 100.0;

    let rotation_penalty = if driver.consecutive_days >= ROTATION_STREAK_DAYS {
        ROTATION_PENALTY
    } else {
        0.0
    };

    let suitability_score = round2(
        REGION_WEIGHT * region_score
            + WORKLOAD_WEIGHT * workload_score
            + FATIGUE_WEIGHT * fatigue_score
            + DISTANCE_WEIGHT * distance_score
            + ROTATION_WEIGHT * (100.0 + rotation_penalty),
    )
    .clamp(0.0, 100.0);

    Ok(SuitabilityResult {
        driver_id,
        driver_name: driver.name,
        load_id,
        suitability_score,
        region_match,
        region_score,
        workload_score: round2(workload_score),
        fatigue_score: round2(fatigue_score),
        distance_score: round2(distance_score),
        rotation_penalty,
        consecutive_days: driver.consecutive_days,
        current_fatigue_score: driver.fatigue_score,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::calculate_suitability_score;
    use crate::clock::{Clock, FixedClock};
    use crate::models::assignment::{AssignmentStatus, ShiftAssignment};
    use crate::models::driver::{DayOfWeek, Driver, DriverStatus, VehicleType};
    use crate::models::load::{Load, LoadStatus, Priority};
    use crate::store::Store;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2025, 3, 12, 8, 0, 0).unwrap())
    }

    fn seed_driver(store: &Store, region: &str, fatigue: f64, consecutive_days: i64) -> i64 {
        let now = clock().now();
        let driver_id = store.allocate_driver_id();
        store.save_driver(Driver {
            driver_id,
            name: "Kavi".to_string(),
            phone: "9000000004".to_string(),
            email: None,
            region: region.to_string(),
            vehicle_type: VehicleType::Bike,
            weekly_off: DayOfWeek::Sunday,
            status: DriverStatus::Active,
            fatigue_score: fatigue,
            consecutive_days,
            last_assignment_date: None,
            created_at: now,
            updated_at: now,
        });
        driver_id
    }

    fn seed_load(store: &Store, region: &str, hours: f64, distance: f64) -> i64 {
        let load_id = store.allocate_load_id();
        store.save_load(Load {
            load_id,
            load_ref: format!("LD-20250312-{load_id:03}"),
            region: region.to_string(),
            stops: 10,
            estimated_hours: hours,
            estimated_distance: distance,
            priority: Priority::Medium,
            status: LoadStatus::Pending,
            assigned_driver_id: None,
            assigned_at: None,
            created_at: clock().now(),
        });
        load_id
    }

    #[test]
    fn rested_local_driver_on_a_long_streak_scores_90_5() {
        let store = Store::new();
        let driver_id = seed_driver(&store, "North", 30.0, 5);
        let load_id = seed_load(&store, "North", 4.0, 60.0);

        let result = calculate_suitability_score(&store, &clock(), driver_id, load_id).unwrap();

        // 0.30*100 + 0.25*100 + 0.25*70 + 0.10*100 + 0.10*80
        assert_eq!(result.suitability_score, 90.5);
        assert_eq!(result.rotation_penalty, -20.0);
        assert!(result.region_match);
    }

    #[test]
    fn region_comparison_ignores_case() {
        let store = Store::new();
        let driver_id = seed_driver(&store, "north", 0.0, 0);
        let load_id = seed_load(&store, "NORTH", 4.0, 60.0);

        let result = calculate_suitability_score(&store, &clock(), driver_id, load_id).unwrap();
        assert!(result.region_match);
        assert_eq!(result.region_score, 100.0);
    }

    #[test]
    fn out_of_region_driver_loses_half_the_region_score() {
        let store = Store::new();
        let driver_id = seed_driver(&store, "North", 0.0, 0);
        let load_id = seed_load(&store, "South", 4.0, 60.0);

        let result = calculate_suitability_score(&store, &clock(), driver_id, load_id).unwrap();

        assert!(!result.region_match);
        // 0.30*50 + 0.25*100 + 0.25*100 + 0.10*100 + 0.10*100
        assert_eq!(result.suitability_score, 85.0);
    }

    #[test]
    fn todays_open_assignments_drag_down_workload_and_distance() {
        let store = Store::new();
        let driver_id = seed_driver(&store, "North", 0.0, 0);
        let assigned = seed_load(&store, "North", 5.0, 100.0);
        store.save_assignment(ShiftAssignment {
            assignment_id: 1,
            driver_id,
            load_id: Some(assigned),
            load_ref: "LD-20250312-001".to_string(),
            assigned_date: clock().now(),
            status: AssignmentStatus::Assigned,
            suitability_score: 0.0,
            overload_score: 0.0,
            is_override: false,
            created_at: clock().now(),
        });
        let candidate = seed_load(&store, "North", 2.0, 30.0);

        let result = calculate_suitability_score(&store, &clock(), driver_id, candidate).unwrap();

        assert_eq!(result.workload_score, 50.0);
        assert_eq!(result.distance_score, 50.0);
        // 0.30*100 + 0.25*50 + 0.25*100 + 0.10*50 + 0.10*100
        assert_eq!(result.suitability_score, 82.5);
    }

    #[test]
    fn score_stays_within_bounds_for_an_exhausted_driver() {
        let store = Store::new();
        let driver_id = seed_driver(&store, "East", 100.0, 10);
        let load_id = seed_load(&store, "West", 4.0, 60.0);

        let result = calculate_suitability_score(&store, &clock(), driver_id, load_id).unwrap();

        assert!(result.suitability_score >= 0.0);
        assert!(result.suitability_score <= 100.0);
    }

    #[test]
    fn repeated_calls_are_idempotent() {
        let store = Store::new();
        let driver_id = seed_driver(&store, "North", 42.0, 2);
        let load_id = seed_load(&store, "North", 4.0, 60.0);

        let first = calculate_suitability_score(&store, &clock(), driver_id, load_id).unwrap();
        let second = calculate_suitability_score(&store, &clock(), driver_id, load_id).unwrap();

        assert_eq!(first.suitability_score, second.suitability_score);
        assert_eq!(first.workload_score, second.workload_score);
    }
}
