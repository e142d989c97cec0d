use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::warn;

use crate::clock::Clock;
use crate::engine::{round2, round4};
use crate::error::AppError;
use crate::store::Store;

const AVG_HOURS_WEIGHT: f64 = 0.40;
const OVERTIME_WEIGHT: f64 = 0.25;
const CONSECUTIVE_WEIGHT: f64 = 0.20;
const REST_GAP_WEIGHT: f64 = 0.10;
const HEAVY_STOPS_WEIGHT: f64 = 0.05;

/// A 10h daily average over the last three days saturates the hours term.
const MAX_AVG_HOURS: f64 = 10.0;
/// Five overtime days inside a week saturate the overtime term.
const MAX_OVERTIME_DAYS: f64 = 5.0;
/// Six consecutive working days saturate the streak term.
const MAX_CONSECUTIVE_DAYS: f64 = 6.0;
/// Twelve hours of rest fully discharges the rest-gap term.
const FULL_REST_HOURS: f64 = 12.0;
/// A 50-stop average across recent loads saturates the stop-density term.
const MAX_AVG_STOPS: f64 = 50.0;

const OVERTIME_HOURS: f64 = 8.0;

#[derive(Debug, Clone, Serialize)]
pub struct FatigueBreakdown {
    pub driver_id: i64,
    pub driver_name: String,
    pub fatigue_score: f64,
    pub avg_hours_last_3_days: f64,
    pub avg_hours_normalized: f64,
    pub overtime_days_last_7: i64,
    pub overtime_normalized: f64,
    pub consecutive_days: i64,
    pub consecutive_normalized: f64,
    pub rest_gap_hours: f64,
    pub rest_gap_normalized: f64,
    pub avg_stops_last_3_days: f64,
    pub heavy_stops_normalized: f64,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FatigueUpdateResult {
    pub driver_id: i64,
    pub driver_name: String,
    pub new_fatigue_score: Option<f64>,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FatigueSummary {
    pub total_active_drivers: usize,
    pub low_fatigue_count: usize,
    pub medium_fatigue_count: usize,
    pub high_fatigue_count: usize,
    pub drivers_needing_rest: usize,
    pub average_fatigue_score: f64,
}

/// Computes the fatigue breakdown for a driver without persisting anything.
///
/// FatigueScore = 100 * (0.40*avg_hours + 0.25*overtime + 0.20*consecutive
///                       + 0.10*rest_gap + 0.05*heavy_stops), each term
/// normalized into [0, 1] before weighting.
pub fn calculate_fatigue_score(
    store: &Store,
    clock: &dyn Clock,
    driver_id: i64,
) -> Result<FatigueBreakdown, AppError> {
    let driver = store
        .get_driver(driver_id)
        .ok_or_else(|| AppError::NotFound("Driver not found".to_string()))?;

    let today = clock.today();
    let three_days_ago = today - Duration::days(3);
    let seven_days_ago = today - Duration::days(7);

    let last_3_days = store.attendance_in_range(driver_id, three_days_ago, today);
    let avg_hours = if last_3_days.is_empty() {
        0.0
    } else {
        last_3_days.iter().map(|a| a.total_hours).sum::<f64>() / last_3_days.len() as f64
    };
    let avg_hours_norm = (avg_hours / MAX_AVG_HOURS).min(1.0);

    let last_7_days = store.attendance_in_range(driver_id, seven_days_ago, today);
    let overtime_days = last_7_days.iter().filter(|a| a.total_hours > OVERTIME_HOURS).count();
    let overtime_norm = (overtime_days as f64 / MAX_OVERTIME_DAYS).min(1.0);

    let consecutive_norm = (driver.consecutive_days as f64 / MAX_CONSECUTIVE_DAYS).min(1.0);

    // No check-out on record counts as a full day without rest credit.
    let rest_gap_hours = match store.last_checkout(driver_id) {
        Some(checkout) => (clock.now() - checkout).num_seconds() as f64 / 3600.0,
        None => 24.0,
    };
    let rest_gap_norm = (1.0 - rest_gap_hours / FULL_REST_HOURS).max(0.0);

    let recent = store.assignments_in_range(driver_id, three_days_ago, today, false);
    let stops: Vec<i64> = recent
        .iter()
        .filter_map(|(_, load)| load.as_ref().map(|l| l.stops))
        .collect();
    let avg_stops = if stops.is_empty() {
        0.0
    } else {
        stops.iter().sum::<i64>() as f64 / stops.len() as f64
    };
    let heavy_stops_norm = (avg_stops / MAX_AVG_STOPS).min(1.0);

    let fatigue_score = round2(
        100.0
            * (AVG_HOURS_WEIGHT * avg_hours_norm
                + OVERTIME_WEIGHT * overtime_norm
                + CONSECUTIVE_WEIGHT * consecutive_norm
                + REST_GAP_WEIGHT * rest_gap_norm
                + HEAVY_STOPS_WEIGHT * heavy_stops_norm),
    );

    Ok(FatigueBreakdown {
        driver_id,
        driver_name: driver.name,
        fatigue_score,
        avg_hours_last_3_days: round2(avg_hours),
        avg_hours_normalized: round4(avg_hours_norm),
        overtime_days_last_7: overtime_days as i64,
        overtime_normalized: round4(overtime_norm),
        consecutive_days: driver.consecutive_days,
        consecutive_normalized: round4(consecutive_norm),
        rest_gap_hours: round2(rest_gap_hours),
        rest_gap_normalized: round4(rest_gap_norm),
        avg_stops_last_3_days: round2(avg_stops),
        heavy_stops_normalized: round4(heavy_stops_norm),
        calculated_at: clock.now(),
    })
}

/// Recomputes and persists one driver's fatigue score.
pub fn update_driver_fatigue_score(
    store: &Store,
    clock: &dyn Clock,
    driver_id: i64,
) -> Result<f64, AppError> {
    let breakdown = calculate_fatigue_score(store, clock, driver_id)?;

    if let Some(mut driver) = store.get_driver(driver_id) {
        driver.fatigue_score = breakdown.fatigue_score;
        driver.updated_at = clock.now();
        store.save_driver(driver);
    }

    Ok(breakdown.fatigue_score)
}

/// Recomputes fatigue for every ACTIVE driver. One driver's failure is
/// recorded in that driver's entry and the batch keeps going.
pub fn update_all_driver_fatigue_scores(store: &Store, clock: &dyn Clock) -> Vec<FatigueUpdateResult> {
    let mut results = Vec::new();

    for driver in store.active_drivers() {
        match calculate_fatigue_score(store, clock, driver.driver_id) {
            Ok(breakdown) => {
                let mut updated = driver.clone();
                updated.fatigue_score = breakdown.fatigue_score;
                updated.updated_at = clock.now();
                store.save_driver(updated);

                results.push(FatigueUpdateResult {
                    driver_id: driver.driver_id,
                    driver_name: driver.name.clone(),
                    new_fatigue_score: Some(breakdown.fatigue_score),
                    success: true,
                    error: None,
                });
            }
            Err(err) => {
                warn!(driver_id = driver.driver_id, error = %err, "fatigue recompute failed");
                results.push(FatigueUpdateResult {
                    driver_id: driver.driver_id,
                    driver_name: driver.name.clone(),
                    new_fatigue_score: None,
                    success: false,
                    error: Some(err.to_string()),
                });
            }
        }
    }

    results
}

/// Called on check-in: extends the streak when the driver worked yesterday,
/// otherwise restarts it at 1 (today).
pub fn update_consecutive_days(store: &Store, clock: &dyn Clock, driver_id: i64) -> Result<(), AppError> {
    let mut driver = store
        .get_driver(driver_id)
        .ok_or_else(|| AppError::NotFound("Driver not found".to_string()))?;

    let yesterday = clock.today() - Duration::days(1);
    let worked_yesterday = store
        .attendance_on(driver_id, yesterday)
        .is_some_and(|a| !a.is_absent);

    driver.consecutive_days = if worked_yesterday {
        driver.consecutive_days + 1
    } else {
        1
    };
    driver.updated_at = clock.now();
    store.save_driver(driver);

    Ok(())
}

/// Fleet-wide fatigue bands for the admin dashboard.
pub fn fatigue_summary(store: &Store) -> FatigueSummary {
    let drivers = store.active_drivers();
    let average = if drivers.is_empty() {
        0.0
    } else {
        round2(drivers.iter().map(|d| d.fatigue_score).sum::<f64>() / drivers.len() as f64)
    };

    FatigueSummary {
        total_active_drivers: drivers.len(),
        low_fatigue_count: drivers.iter().filter(|d| d.fatigue_score <= 40.0).count(),
        medium_fatigue_count: drivers
            .iter()
            .filter(|d| d.fatigue_score > 40.0 && d.fatigue_score <= 70.0)
            .count(),
        high_fatigue_count: drivers.iter().filter(|d| d.fatigue_score > 70.0).count(),
        drivers_needing_rest: drivers.iter().filter(|d| d.fatigue_score > 85.0).count(),
        average_fatigue_score: average,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::{
        calculate_fatigue_score, fatigue_summary, update_all_driver_fatigue_scores,
        update_consecutive_days, update_driver_fatigue_score,
    };
    use crate::clock::{Clock, FixedClock};
    use crate::models::attendance::Attendance;
    use crate::models::driver::{DayOfWeek, Driver, DriverStatus, VehicleType};
    use crate::store::Store;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2025, 3, 12, 8, 0, 0).unwrap())
    }

    fn seed_driver(store: &Store, consecutive_days: i64) -> i64 {
        let now = clock().now();
        let driver_id = store.allocate_driver_id();
        store.save_driver(Driver {
            driver_id,
            name: "Meena".to_string(),
            phone: "9000000002".to_string(),
            email: None,
            region: "North".to_string(),
            vehicle_type: VehicleType::Truck,
            weekly_off: DayOfWeek::Sunday,
            status: DriverStatus::Active,
            fatigue_score: 0.0,
            consecutive_days,
            last_assignment_date: None,
            created_at: now,
            updated_at: now,
        });
        driver_id
    }

    fn seed_attendance(store: &Store, driver_id: i64, date: NaiveDate, total_hours: f64) {
        let attendance_id = store.allocate_attendance_id();
        store.save_attendance(Attendance {
            attendance_id,
            driver_id,
            date,
            check_in_time: Some(clock().now() - Duration::days(1)),
            check_out_time: None,
            total_hours,
            is_absent: false,
            is_overtime: total_hours > 8.0,
            created_at: clock().now(),
        });
    }

    #[test]
    fn fresh_driver_scores_zero() {
        let store = Store::new();
        let driver_id = seed_driver(&store, 0);

        let breakdown = calculate_fatigue_score(&store, &clock(), driver_id).unwrap();

        assert_eq!(breakdown.fatigue_score, 0.0);
        assert_eq!(breakdown.rest_gap_hours, 24.0);
        assert_eq!(breakdown.rest_gap_normalized, 0.0);
    }

    #[test]
    fn missing_driver_is_not_found() {
        let store = Store::new();
        assert!(calculate_fatigue_score(&store, &clock(), 999).is_err());
    }

    #[test]
    fn three_heavy_days_raise_hours_and_overtime_terms() {
        let store = Store::new();
        let driver_id = seed_driver(&store, 0);
        let today = clock().today();

        for days_ago in 1..=3 {
            seed_attendance(&store, driver_id, today - Duration::days(days_ago), 10.0);
        }

        let breakdown = calculate_fatigue_score(&store, &clock(), driver_id).unwrap();

        // avg 10h -> 1.0 * 0.40, three OT days -> 0.6 * 0.25, rest 0, stops 0.
        assert_eq!(breakdown.avg_hours_normalized, 1.0);
        assert_eq!(breakdown.overtime_days_last_7, 3);
        assert_eq!(breakdown.overtime_normalized, 0.6);
        assert_eq!(breakdown.fatigue_score, 55.0);
    }

    #[test]
    fn todays_attendance_is_outside_the_window() {
        let store = Store::new();
        let driver_id = seed_driver(&store, 0);

        seed_attendance(&store, driver_id, clock().today(), 12.0);

        let breakdown = calculate_fatigue_score(&store, &clock(), driver_id).unwrap();
        assert_eq!(breakdown.avg_hours_last_3_days, 0.0);
        assert_eq!(breakdown.overtime_days_last_7, 0);
    }

    #[test]
    fn recent_checkout_earns_rest_credit() {
        let store = Store::new();
        let driver_id = seed_driver(&store, 0);
        let yesterday = clock().today() - Duration::days(1);

        let attendance_id = store.allocate_attendance_id();
        store.save_attendance(Attendance {
            attendance_id,
            driver_id,
            date: yesterday,
            check_in_time: Some(clock().now() - Duration::hours(18)),
            // Checked out 6h before "now": rest gap norm = 1 - 6/12 = 0.5.
            check_out_time: Some(clock().now() - Duration::hours(6)),
            total_hours: 8.0,
            is_absent: false,
            is_overtime: false,
            created_at: clock().now(),
        });

        let breakdown = calculate_fatigue_score(&store, &clock(), driver_id).unwrap();
        assert_eq!(breakdown.rest_gap_hours, 6.0);
        assert_eq!(breakdown.rest_gap_normalized, 0.5);
        // avg hours 8/10 = 0.8 * 0.40 = 32, rest 0.5 * 0.10 = 5.
        assert_eq!(breakdown.fatigue_score, 37.0);
    }

    #[test]
    fn score_is_always_within_bounds() {
        let store = Store::new();
        let driver_id = seed_driver(&store, 30);
        let today = clock().today();

        for days_ago in 1..=7 {
            seed_attendance(&store, driver_id, today - Duration::days(days_ago), 16.0);
        }

        let breakdown = calculate_fatigue_score(&store, &clock(), driver_id).unwrap();
        assert!(breakdown.fatigue_score >= 0.0);
        assert!(breakdown.fatigue_score <= 100.0);
    }

    #[test]
    fn update_persists_the_new_score() {
        let store = Store::new();
        let driver_id = seed_driver(&store, 6);

        let score = update_driver_fatigue_score(&store, &clock(), driver_id).unwrap();

        assert_eq!(score, 20.0); // consecutive term only: 1.0 * 0.20 * 100
        assert_eq!(store.get_driver(driver_id).unwrap().fatigue_score, 20.0);
    }

    #[test]
    fn batch_update_reports_every_active_driver() {
        let store = Store::new();
        let first = seed_driver(&store, 0);
        let second = seed_driver(&store, 3);

        let results = update_all_driver_fatigue_scores(&store, &clock());

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
        assert!(results.iter().any(|r| r.driver_id == first));
        assert!(results.iter().any(|r| r.driver_id == second));
    }

    #[test]
    fn checkin_extends_streak_after_a_worked_yesterday() {
        let store = Store::new();
        let driver_id = seed_driver(&store, 4);
        seed_attendance(&store, driver_id, clock().today() - Duration::days(1), 8.0);

        update_consecutive_days(&store, &clock(), driver_id).unwrap();

        assert_eq!(store.get_driver(driver_id).unwrap().consecutive_days, 5);
    }

    #[test]
    fn checkin_resets_streak_after_a_day_off() {
        let store = Store::new();
        let driver_id = seed_driver(&store, 4);

        update_consecutive_days(&store, &clock(), driver_id).unwrap();

        assert_eq!(store.get_driver(driver_id).unwrap().consecutive_days, 1);
    }

    #[test]
    fn absent_yesterday_also_resets_streak() {
        let store = Store::new();
        let driver_id = seed_driver(&store, 4);
        let attendance_id = store.allocate_attendance_id();
        store.save_attendance(Attendance {
            attendance_id,
            driver_id,
            date: clock().today() - Duration::days(1),
            check_in_time: None,
            check_out_time: None,
            total_hours: 0.0,
            is_absent: true,
            is_overtime: false,
            created_at: clock().now(),
        });

        update_consecutive_days(&store, &clock(), driver_id).unwrap();

        assert_eq!(store.get_driver(driver_id).unwrap().consecutive_days, 1);
    }

    #[test]
    fn summary_buckets_by_band() {
        let store = Store::new();
        for (id_seed, score) in [(0, 10.0), (1, 55.0), (2, 80.0), (3, 92.0)] {
            let driver_id = seed_driver(&store, id_seed);
            let mut driver = store.get_driver(driver_id).unwrap();
            driver.fatigue_score = score;
            store.save_driver(driver);
        }

        let summary = fatigue_summary(&store);

        assert_eq!(summary.total_active_drivers, 4);
        assert_eq!(summary.low_fatigue_count, 1);
        assert_eq!(summary.medium_fatigue_count, 1);
        assert_eq!(summary.high_fatigue_count, 2);
        assert_eq!(summary.drivers_needing_rest, 1);
        assert_eq!(summary.average_fatigue_score, 59.25);
    }
}
