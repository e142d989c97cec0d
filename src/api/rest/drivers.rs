use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::driver::{DayOfWeek, Driver, DriverStatus, VehicleType};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/status", patch(update_driver_status))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub region: String,
    pub vehicle_type: VehicleType,
    pub weekly_off: DayOfWeek,
}

#[derive(Deserialize)]
pub struct DriverFilter {
    pub region: Option<String>,
    pub status: Option<DriverStatus>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    if payload.region.trim().is_empty() {
        return Err(AppError::Validation("region is required".to_string()));
    }

    let now = state.clock.now();
    let driver = Driver {
        driver_id: state.store.allocate_driver_id(),
        name: payload.name.trim().to_string(),
        phone: payload.phone,
        email: payload.email,
        region: payload.region.trim().to_string(),
        vehicle_type: payload.vehicle_type,
        weekly_off: payload.weekly_off,
        status: DriverStatus::Active,
        fatigue_score: 0.0,
        consecutive_days: 0,
        last_assignment_date: None,
        created_at: now,
        updated_at: now,
    };

    state.store.save_driver(driver.clone());
    Ok(Json(driver))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DriverFilter>,
) -> Json<Vec<Driver>> {
    let mut drivers: Vec<Driver> = state
        .store
        .drivers()
        .into_iter()
        .filter(|d| {
            filter
                .region
                .as_ref()
                .is_none_or(|region| d.region.eq_ignore_ascii_case(region))
        })
        .filter(|d| filter.status.is_none_or(|status| d.status == status))
        .collect();

    drivers.sort_by_key(|d| d.driver_id);
    Json(drivers)
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Driver>, AppError> {
    let driver = state
        .store
        .get_driver(id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    Ok(Json(driver))
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    let mut driver = state
        .store
        .get_driver(id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    driver.status = payload.status;
    driver.updated_at = state.clock.now();
    state.store.save_driver(driver.clone());

    Ok(Json(driver))
}
