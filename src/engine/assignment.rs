use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::engine::eligibility::check_driver_eligibility;
use crate::engine::fatigue::update_driver_fatigue_score;
use crate::engine::overload::{calculate_overload_score, OverloadStatus};
use crate::engine::suitability::calculate_suitability_score;
use crate::error::AppError;
use crate::models::driver::VehicleType;
use crate::models::load::{LoadStatus, Priority};
use crate::store::{AssignmentDraft, Store};

#[derive(Debug, Clone, Serialize)]
pub struct DriverRecommendation {
    pub driver_id: i64,
    pub driver_name: String,
    pub region: String,
    pub vehicle_type: VehicleType,
    pub suitability_score: f64,
    pub overload_score: f64,
    /// None when the driver was filtered out before scoring.
    pub overload_status: Option<OverloadStatus>,
    pub fatigue_score: f64,
    pub region_match: bool,
    pub consecutive_days: i64,
    pub is_eligible: bool,
    pub eligibility_reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentRecommendation {
    pub load_id: i64,
    pub load_ref: String,
    pub load_region: String,
    pub load_stops: i64,
    pub load_estimated_hours: f64,
    pub load_priority: Priority,
    pub eligible_driver_count: usize,
    pub total_driver_count: usize,
    pub recommendations: Vec<DriverRecommendation>,
    pub top_recommendation: Option<DriverRecommendation>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentResult {
    pub success: bool,
    pub assignment_id: Option<i64>,
    pub load_id: i64,
    pub load_ref: String,
    pub driver_id: Option<i64>,
    pub driver_name: Option<String>,
    pub suitability_score: Option<f64>,
    pub overload_score: Option<f64>,
    pub overload_status: Option<OverloadStatus>,
    pub is_override: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BulkAssignSummary {
    pub total_processed: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub results: Vec<AssignmentResult>,
}

/// Ranks every ACTIVE driver for a PENDING load. Ineligible drivers are kept
/// in the list with zero scores and their disqualification reason, so the
/// ranking doubles as an audit view.
pub fn get_recommendations(
    store: &Store,
    clock: &dyn Clock,
    load_id: i64,
) -> Result<AssignmentRecommendation, AppError> {
    let load = store
        .get_load(load_id)
        .ok_or_else(|| AppError::NotFound("Load not found".to_string()))?;
    if load.status != LoadStatus::Pending {
        return Err(AppError::InvalidState(format!(
            "Load is not pending (current status: {})",
            load.status
        )));
    }

    let mut recommendations = Vec::new();
    for driver in store.active_drivers() {
        let eligibility = check_driver_eligibility(store, clock, driver.driver_id, Some(load_id))?;

        if eligibility.is_eligible {
            let suitability = calculate_suitability_score(store, clock, driver.driver_id, load_id)?;
            let overload = calculate_overload_score(store, clock, driver.driver_id, load_id)?;

            recommendations.push(DriverRecommendation {
                driver_id: driver.driver_id,
                driver_name: driver.name.clone(),
                region: driver.region.clone(),
                vehicle_type: driver.vehicle_type,
                suitability_score: suitability.suitability_score,
                overload_score: overload.overload_score,
                overload_status: Some(overload.status),
                fatigue_score: driver.fatigue_score,
                region_match: suitability.region_match,
                consecutive_days: driver.consecutive_days,
                is_eligible: true,
                eligibility_reason: "Eligible".to_string(),
            });
        } else {
            recommendations.push(DriverRecommendation {
                driver_id: driver.driver_id,
                driver_name: driver.name.clone(),
                region: driver.region.clone(),
                vehicle_type: driver.vehicle_type,
                suitability_score: 0.0,
                overload_score: 0.0,
                overload_status: None,
                fatigue_score: driver.fatigue_score,
                region_match: driver.region.eq_ignore_ascii_case(&load.region),
                consecutive_days: driver.consecutive_days,
                is_eligible: false,
                eligibility_reason: eligibility.reason,
            });
        }
    }

    recommendations.sort_by(|a, b| {
        b.is_eligible
            .cmp(&a.is_eligible)
            .then_with(|| b.suitability_score.total_cmp(&a.suitability_score))
    });

    let top_recommendation = recommendations.iter().find(|r| r.is_eligible).cloned();
    let eligible_driver_count = recommendations.iter().filter(|r| r.is_eligible).count();

    Ok(AssignmentRecommendation {
        load_id,
        load_ref: load.load_ref.clone(),
        load_region: load.region.clone(),
        load_stops: load.stops,
        load_estimated_hours: load.estimated_hours,
        load_priority: load.priority,
        eligible_driver_count,
        total_driver_count: recommendations.len(),
        recommendations,
        top_recommendation,
        generated_at: clock.now(),
    })
}

/// Binds a load to a driver. With `is_override` the eligibility and overload
/// gates are skipped, but the scores are still computed fresh and snapshotted
/// onto the assignment row. The whole check-and-commit runs under the store's
/// assignment lock so a concurrent request cannot take the load, or push the
/// driver over a ceiling, in between.
pub fn assign_load(
    store: &Store,
    clock: &dyn Clock,
    load_id: i64,
    driver_id: i64,
    is_override: bool,
) -> Result<AssignmentResult, AppError> {
    let _guard = store.lock_assignments();

    let load = store
        .get_load(load_id)
        .ok_or_else(|| AppError::NotFound("Load not found".to_string()))?;
    let driver = store
        .get_driver(driver_id)
        .ok_or_else(|| AppError::NotFound("Driver not found".to_string()))?;
    if load.status != LoadStatus::Pending {
        return Err(AppError::InvalidState(format!(
            "Load is not pending (current status: {})",
            load.status
        )));
    }

    if !is_override {
        let eligibility = check_driver_eligibility(store, clock, driver_id, Some(load_id))?;
        if !eligibility.is_eligible {
            return Err(AppError::PolicyViolation(format!(
                "Driver not eligible: {}",
                eligibility.reason
            )));
        }
    }

    let suitability = calculate_suitability_score(store, clock, driver_id, load_id)?;
    let overload = calculate_overload_score(store, clock, driver_id, load_id)?;

    if !is_override && overload.status == OverloadStatus::Unsafe {
        return Err(AppError::PolicyViolation(
            "Assignment would cause unsafe overload. Use override if necessary.".to_string(),
        ));
    }

    let now = clock.now();
    let assignment = store.commit_assignment(
        AssignmentDraft {
            driver_id,
            load_id,
            load_ref: load.load_ref.clone(),
            assigned_date: now,
            suitability_score: suitability.suitability_score,
            overload_score: overload.overload_score,
            is_override,
        },
        now,
    )?;

    info!(
        load_id,
        driver_id,
        suitability = suitability.suitability_score,
        overload = overload.overload_score,
        is_override,
        "load assigned"
    );

    Ok(AssignmentResult {
        success: true,
        assignment_id: Some(assignment.assignment_id),
        load_id,
        load_ref: load.load_ref,
        driver_id: Some(driver_id),
        driver_name: Some(driver.name),
        suitability_score: Some(suitability.suitability_score),
        overload_score: Some(overload.overload_score),
        overload_status: Some(overload.status),
        is_override,
        message: if is_override {
            "Load assigned with admin override".to_string()
        } else {
            "Load assigned successfully".to_string()
        },
    })
}

/// Assigns a load to the highest-ranked eligible driver. Finding nobody is a
/// normal outcome, reported as `success: false` rather than an error.
pub fn auto_assign(store: &Store, clock: &dyn Clock, load_id: i64) -> Result<AssignmentResult, AppError> {
    let recommendation = get_recommendations(store, clock, load_id)?;

    let Some(top) = recommendation.top_recommendation else {
        return Ok(AssignmentResult {
            success: false,
            assignment_id: None,
            load_id,
            load_ref: recommendation.load_ref,
            driver_id: None,
            driver_name: None,
            suitability_score: None,
            overload_score: None,
            overload_status: None,
            is_override: false,
            message: "No eligible drivers available for this load".to_string(),
        });
    };

    assign_load(store, clock, load_id, top.driver_id, false)
}

/// Auto-assigns every PENDING load, highest priority first and oldest first
/// within a priority. Each load commits (or fails) on its own; a failure is
/// recorded in that load's entry and the batch moves on. A winning driver's
/// fatigue is refreshed immediately so the next load in the batch scores
/// against current state.
pub fn auto_assign_all(store: &Store, clock: &dyn Clock) -> BulkAssignSummary {
    let mut pending = store.pending_loads();
    pending.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    let mut results = Vec::new();
    for load in pending {
        match auto_assign(store, clock, load.load_id) {
            Ok(result) => {
                if result.success {
                    if let Some(driver_id) = result.driver_id {
                        if let Err(err) = update_driver_fatigue_score(store, clock, driver_id) {
                            warn!(driver_id, error = %err, "fatigue refresh after assignment failed");
                        }
                    }
                }
                results.push(result);
            }
            Err(err) => {
                warn!(load_id = load.load_id, error = %err, "bulk auto-assign failed for load");
                results.push(AssignmentResult {
                    success: false,
                    assignment_id: None,
                    load_id: load.load_id,
                    load_ref: load.load_ref.clone(),
                    driver_id: None,
                    driver_name: None,
                    suitability_score: None,
                    overload_score: None,
                    overload_status: None,
                    is_override: false,
                    message: err.to_string(),
                });
            }
        }
    }

    let success_count = results.iter().filter(|r| r.success).count();
    BulkAssignSummary {
        total_processed: results.len(),
        success_count,
        failed_count: results.len() - success_count,
        results,
    }
}
