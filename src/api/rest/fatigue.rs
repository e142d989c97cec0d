use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Serialize;

use crate::engine::fatigue::{
    calculate_fatigue_score, fatigue_summary, update_all_driver_fatigue_scores,
    update_driver_fatigue_score, FatigueBreakdown, FatigueSummary, FatigueUpdateResult,
};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/fatigue/driver/:id", get(driver_breakdown))
        .route("/fatigue/calculate/:id", post(recalculate_driver))
        .route("/fatigue/calculate-all", post(recalculate_all))
        .route("/fatigue/summary", get(summary))
}

#[derive(Serialize)]
pub struct RecalculateResponse {
    pub message: &'static str,
    pub driver_id: i64,
    pub new_fatigue_score: f64,
    pub breakdown: FatigueBreakdown,
}

#[derive(Serialize)]
pub struct RecalculateAllResponse {
    pub message: &'static str,
    pub total_processed: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub results: Vec<FatigueUpdateResult>,
}

async fn driver_breakdown(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<FatigueBreakdown>, AppError> {
    let breakdown = calculate_fatigue_score(&state.store, state.clock.as_ref(), id)?;
    Ok(Json(breakdown))
}

async fn recalculate_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<RecalculateResponse>, AppError> {
    let breakdown = calculate_fatigue_score(&state.store, state.clock.as_ref(), id)?;
    let new_fatigue_score = update_driver_fatigue_score(&state.store, state.clock.as_ref(), id)?;

    state
        .metrics
        .driver_fatigue
        .with_label_values(&[&id.to_string()])
        .set(new_fatigue_score);

    Ok(Json(RecalculateResponse {
        message: "Fatigue score updated successfully",
        driver_id: id,
        new_fatigue_score,
        breakdown,
    }))
}

async fn recalculate_all(State(state): State<Arc<AppState>>) -> Json<RecalculateAllResponse> {
    let results = update_all_driver_fatigue_scores(&state.store, state.clock.as_ref());

    for result in &results {
        if let Some(score) = result.new_fatigue_score {
            state
                .metrics
                .driver_fatigue
                .with_label_values(&[&result.driver_id.to_string()])
                .set(score);
        }
    }

    let success_count = results.iter().filter(|r| r.success).count();
    Json(RecalculateAllResponse {
        message: "All fatigue scores updated",
        total_processed: results.len(),
        success_count,
        failed_count: results.len() - success_count,
        results,
    })
}

async fn summary(State(state): State<Arc<AppState>>) -> Json<FatigueSummary> {
    Json(fatigue_summary(&state.store))
}
