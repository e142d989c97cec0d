use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::assignment::{
    assign_load, auto_assign, auto_assign_all, get_recommendations, AssignmentRecommendation,
    AssignmentResult, BulkAssignSummary,
};
use crate::engine::eligibility::{check_driver_eligibility, EligibilityResult};
use crate::engine::fatigue::update_driver_fatigue_score;
use crate::engine::overload::{calculate_overload_score, OverloadResult};
use crate::engine::round2;
use crate::engine::suitability::{calculate_suitability_score, SuitabilityResult};
use crate::error::AppError;
use crate::models::assignment::{AssignmentStatus, ShiftAssignment};
use crate::models::load::{LoadStatus, Priority};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/assignment/recommend", post(recommend))
        .route("/assignment/assign", post(assign))
        .route("/assignment/auto-assign", post(auto))
        .route("/assignment/auto-assign-all", post(auto_all))
        .route("/assignment/overload/:driver_id/:load_id", get(overload_probe))
        .route("/assignment/suitability/:driver_id/:load_id", get(suitability_probe))
        .route("/assignment/eligibility/:driver_id/:load_id", get(eligibility_probe))
        .route("/assignment/list", get(list_assignments))
        .route("/assignment/stats", get(assignment_stats))
        .route("/assignment/:id/status", patch(update_status))
}

#[derive(Deserialize)]
pub struct RecommendRequest {
    pub load_id: i64,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub load_id: i64,
    pub driver_id: i64,
    #[serde(default)]
    pub is_override: bool,
}

#[derive(Deserialize)]
pub struct AutoAssignRequest {
    pub load_id: i64,
}

#[derive(Deserialize)]
pub struct AssignmentFilter {
    pub date: Option<NaiveDate>,
    pub status: Option<AssignmentStatus>,
    pub driver_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AssignmentStatus,
}

#[derive(Serialize)]
pub struct AssignmentRow {
    #[serde(flatten)]
    pub assignment: ShiftAssignment,
    pub driver_name: String,
    pub driver_region: String,
    pub load_region: Option<String>,
    pub load_stops: Option<i64>,
    pub load_priority: Option<Priority>,
}

#[derive(Serialize)]
pub struct AssignmentStats {
    pub total_assignments_today: usize,
    pub assigned_today: usize,
    pub in_progress_today: usize,
    pub completed_today: usize,
    pub override_assignments_today: usize,
    pub avg_suitability_score_today: f64,
    pub pending_loads: usize,
}

#[derive(Serialize)]
pub struct UpdateStatusResponse {
    pub message: &'static str,
    pub assignment_id: i64,
    pub new_status: AssignmentStatus,
}

async fn recommend(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RecommendRequest>,
) -> Result<Json<AssignmentRecommendation>, AppError> {
    let recommendation =
        get_recommendations(&state.store, state.clock.as_ref(), payload.load_id)?;
    Ok(Json(recommendation))
}

/// Records the outcome of a decided assignment: metrics, the driver's fatigue
/// refresh, and the live event feed.
fn after_commit(state: &AppState, result: &AssignmentResult, started: Instant) {
    state
        .metrics
        .assignment_latency_seconds
        .with_label_values(&["success"])
        .observe(started.elapsed().as_secs_f64());
    state
        .metrics
        .assignments_total
        .with_label_values(&["success"])
        .inc();
    state.metrics.pending_loads.set(state.store.pending_load_count() as i64);

    if let Some(driver_id) = result.driver_id {
        match update_driver_fatigue_score(&state.store, state.clock.as_ref(), driver_id) {
            Ok(score) => {
                state
                    .metrics
                    .driver_fatigue
                    .with_label_values(&[&driver_id.to_string()])
                    .set(score);
            }
            Err(err) => warn!(driver_id, error = %err, "fatigue refresh after assignment failed"),
        }
    }

    if let Some(assignment_id) = result.assignment_id {
        if let Some(assignment) = state.store.get_assignment(assignment_id) {
            let _ = state.assignment_events_tx.send(assignment);
        }
    }
}

fn record_failure(state: &AppState, started: Instant) {
    state
        .metrics
        .assignment_latency_seconds
        .with_label_values(&["error"])
        .observe(started.elapsed().as_secs_f64());
    state
        .metrics
        .assignments_total
        .with_label_values(&["error"])
        .inc();
}

async fn assign(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<AssignmentResult>, AppError> {
    let started = Instant::now();
    match assign_load(
        &state.store,
        state.clock.as_ref(),
        payload.load_id,
        payload.driver_id,
        payload.is_override,
    ) {
        Ok(result) => {
            after_commit(&state, &result, started);
            Ok(Json(result))
        }
        Err(err) => {
            record_failure(&state, started);
            Err(err)
        }
    }
}

async fn auto(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AutoAssignRequest>,
) -> Result<Json<AssignmentResult>, AppError> {
    let started = Instant::now();
    match auto_assign(&state.store, state.clock.as_ref(), payload.load_id) {
        Ok(result) => {
            if result.success {
                after_commit(&state, &result, started);
            } else {
                record_failure(&state, started);
            }
            Ok(Json(result))
        }
        Err(err) => {
            record_failure(&state, started);
            Err(err)
        }
    }
}

async fn auto_all(State(state): State<Arc<AppState>>) -> Json<BulkAssignSummary> {
    let summary = auto_assign_all(&state.store, state.clock.as_ref());

    state.metrics.pending_loads.set(state.store.pending_load_count() as i64);
    for result in &summary.results {
        let outcome = if result.success { "success" } else { "error" };
        state.metrics.assignments_total.with_label_values(&[outcome]).inc();
        if result.success {
            if let Some(assignment_id) = result.assignment_id {
                if let Some(assignment) = state.store.get_assignment(assignment_id) {
                    let _ = state.assignment_events_tx.send(assignment);
                }
            }
        }
    }

    Json(summary)
}

async fn overload_probe(
    State(state): State<Arc<AppState>>,
    Path((driver_id, load_id)): Path<(i64, i64)>,
) -> Result<Json<OverloadResult>, AppError> {
    let result = calculate_overload_score(&state.store, state.clock.as_ref(), driver_id, load_id)?;
    Ok(Json(result))
}

async fn suitability_probe(
    State(state): State<Arc<AppState>>,
    Path((driver_id, load_id)): Path<(i64, i64)>,
) -> Result<Json<SuitabilityResult>, AppError> {
    let result =
        calculate_suitability_score(&state.store, state.clock.as_ref(), driver_id, load_id)?;
    Ok(Json(result))
}

/// `load_id` 0 probes the driver-only rules without a candidate load.
async fn eligibility_probe(
    State(state): State<Arc<AppState>>,
    Path((driver_id, load_id)): Path<(i64, i64)>,
) -> Result<Json<EligibilityResult>, AppError> {
    let candidate = (load_id > 0).then_some(load_id);
    let result =
        check_driver_eligibility(&state.store, state.clock.as_ref(), driver_id, candidate)?;
    Ok(Json(result))
}

async fn list_assignments(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<AssignmentFilter>,
) -> Json<Vec<AssignmentRow>> {
    let mut assignments: Vec<ShiftAssignment> = state
        .store
        .assignments()
        .into_iter()
        .filter(|a| filter.date.is_none_or(|date| a.assigned_date.date_naive() == date))
        .filter(|a| filter.status.is_none_or(|status| a.status == status))
        .filter(|a| filter.driver_id.is_none_or(|driver_id| a.driver_id == driver_id))
        .collect();

    assignments.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let rows = assignments
        .into_iter()
        .map(|assignment| {
            let driver = state.store.get_driver(assignment.driver_id);
            let load = assignment.load_id.and_then(|id| state.store.get_load(id));
            AssignmentRow {
                driver_name: driver.as_ref().map(|d| d.name.clone()).unwrap_or_default(),
                driver_region: driver.map(|d| d.region).unwrap_or_default(),
                load_region: load.as_ref().map(|l| l.region.clone()),
                load_stops: load.as_ref().map(|l| l.stops),
                load_priority: load.as_ref().map(|l| l.priority),
                assignment,
            }
        })
        .collect();

    Json(rows)
}

async fn assignment_stats(State(state): State<Arc<AppState>>) -> Json<AssignmentStats> {
    let today = state.clock.today();
    let todays: Vec<ShiftAssignment> = state
        .store
        .assignments()
        .into_iter()
        .filter(|a| a.assigned_date.date_naive() == today)
        .collect();

    let avg_suitability = if todays.is_empty() {
        0.0
    } else {
        round2(todays.iter().map(|a| a.suitability_score).sum::<f64>() / todays.len() as f64)
    };

    Json(AssignmentStats {
        total_assignments_today: todays.len(),
        assigned_today: todays.iter().filter(|a| a.status == AssignmentStatus::Assigned).count(),
        in_progress_today: todays
            .iter()
            .filter(|a| a.status == AssignmentStatus::InProgress)
            .count(),
        completed_today: todays
            .iter()
            .filter(|a| a.status == AssignmentStatus::Completed)
            .count(),
        override_assignments_today: todays.iter().filter(|a| a.is_override).count(),
        avg_suitability_score_today: avg_suitability,
        pending_loads: state.store.pending_load_count(),
    })
}

/// Advances an assignment and mirrors the new status onto its load, if the
/// load still exists.
async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<UpdateStatusResponse>, AppError> {
    let mut assignment = state
        .store
        .get_assignment(id)
        .ok_or_else(|| AppError::NotFound(format!("assignment {id} not found")))?;

    assignment.status = payload.status;

    if let Some(load_id) = assignment.load_id {
        if let Some(mut load) = state.store.get_load(load_id) {
            load.status = match payload.status {
                AssignmentStatus::Assigned => LoadStatus::Assigned,
                AssignmentStatus::InProgress => LoadStatus::InProgress,
                AssignmentStatus::Completed => LoadStatus::Completed,
            };
            state.store.save_load(load);
        }
    }

    state.store.save_assignment(assignment);

    Ok(Json(UpdateStatusResponse {
        message: "Assignment status updated",
        assignment_id: id,
        new_status: payload.status,
    }))
}
