use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::engine::round1;
use crate::error::AppError;
use crate::models::load::{Load, LoadStatus, Priority};
use crate::state::AppState;
use crate::store::Store;

/// Fleet average speed used to derive hours from distance when the request
/// leaves hours out.
const AVERAGE_SPEED_KMH: f64 = 20.0;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/loads", post(create_load).get(list_loads))
        .route("/loads/stats", get(load_stats))
        .route("/loads/bulk", post(bulk_create_loads))
        .route("/loads/:id", put(update_load).delete(delete_load))
}

#[derive(Deserialize)]
pub struct LoadRequest {
    pub region: String,
    pub stops: i64,
    #[serde(default)]
    pub estimated_hours: f64,
    pub estimated_distance: f64,
    pub priority: Option<Priority>,
}

#[derive(Deserialize)]
pub struct LoadFilter {
    pub region: Option<String>,
    pub status: Option<LoadStatus>,
    pub date: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct LoadResponse {
    #[serde(flatten)]
    pub load: Load,
    pub assigned_driver_name: Option<String>,
}

#[derive(Serialize)]
pub struct LoadStats {
    pub total_loads: usize,
    pub pending_loads: usize,
    pub assigned_loads: usize,
    pub completed_loads: usize,
    pub high_priority_pending: usize,
}

#[derive(Serialize)]
pub struct CreateLoadResponse {
    pub message: &'static str,
    pub load_id: i64,
    pub load_ref: String,
}

#[derive(Serialize)]
pub struct BulkCreateResponse {
    pub message: &'static str,
    pub created: usize,
    pub skipped: usize,
}

fn validate(payload: &LoadRequest) -> Result<(), AppError> {
    if payload.region.trim().is_empty() {
        return Err(AppError::Validation("region is required".to_string()));
    }
    if payload.stops <= 0 {
        return Err(AppError::Validation("stops must be > 0".to_string()));
    }
    if payload.estimated_distance <= 0.0 {
        return Err(AppError::Validation("estimated_distance must be > 0".to_string()));
    }
    Ok(())
}

fn effective_hours(payload: &LoadRequest) -> f64 {
    if payload.estimated_hours > 0.0 {
        payload.estimated_hours
    } else {
        round1(payload.estimated_distance / AVERAGE_SPEED_KMH)
    }
}

/// Continues today's `LD-YYYYMMDD-NNN` sequence.
fn next_load_ref(store: &Store, today: NaiveDate) -> String {
    let prefix = format!("LD-{}-", today.format("%Y%m%d"));
    let next_seq = store
        .last_load_ref_with_prefix(&prefix)
        .and_then(|last| last.rsplit('-').next().and_then(|n| n.parse::<u32>().ok()))
        .map_or(1, |n| n + 1);
    format!("{prefix}{next_seq:03}")
}

fn build_load(state: &AppState, payload: &LoadRequest, load_ref: String) -> Load {
    Load {
        load_id: state.store.allocate_load_id(),
        load_ref,
        region: payload.region.trim().to_string(),
        stops: payload.stops,
        estimated_hours: effective_hours(payload),
        estimated_distance: payload.estimated_distance,
        priority: payload.priority.unwrap_or(Priority::Medium),
        status: LoadStatus::Pending,
        assigned_driver_id: None,
        assigned_at: None,
        created_at: state.clock.now(),
    }
}

async fn create_load(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoadRequest>,
) -> Result<Json<CreateLoadResponse>, AppError> {
    validate(&payload)?;

    let load_ref = next_load_ref(&state.store, state.clock.today());
    let load = build_load(&state, &payload, load_ref);
    let response = CreateLoadResponse {
        message: "Load created",
        load_id: load.load_id,
        load_ref: load.load_ref.clone(),
    };

    state.store.save_load(load);
    state.metrics.pending_loads.set(state.store.pending_load_count() as i64);

    Ok(Json(response))
}

async fn bulk_create_loads(
    State(state): State<Arc<AppState>>,
    Json(payloads): Json<Vec<LoadRequest>>,
) -> Result<Json<BulkCreateResponse>, AppError> {
    if payloads.is_empty() {
        return Err(AppError::Validation("no loads provided".to_string()));
    }

    let mut created = 0;
    let mut skipped = 0;
    for payload in &payloads {
        // Invalid rows are skipped, not fatal: the rest of the batch lands.
        if validate(payload).is_err() {
            skipped += 1;
            continue;
        }

        let load_ref = next_load_ref(&state.store, state.clock.today());
        state.store.save_load(build_load(&state, payload, load_ref));
        created += 1;
    }

    state.metrics.pending_loads.set(state.store.pending_load_count() as i64);

    Ok(Json(BulkCreateResponse {
        message: "Bulk upload completed",
        created,
        skipped,
    }))
}

async fn list_loads(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<LoadFilter>,
) -> Json<Vec<LoadResponse>> {
    let mut loads: Vec<Load> = state
        .store
        .loads()
        .into_iter()
        .filter(|l| {
            filter
                .region
                .as_ref()
                .is_none_or(|region| l.region.eq_ignore_ascii_case(region))
        })
        .filter(|l| filter.status.is_none_or(|status| l.status == status))
        .filter(|l| filter.date.is_none_or(|date| l.created_at.date_naive() == date))
        .collect();

    loads.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let rows = loads
        .into_iter()
        .map(|load| {
            let assigned_driver_name = load
                .assigned_driver_id
                .and_then(|id| state.store.get_driver(id))
                .map(|d| d.name);
            LoadResponse {
                load,
                assigned_driver_name,
            }
        })
        .collect();

    Json(rows)
}

async fn load_stats(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<LoadFilter>,
) -> Json<LoadStats> {
    let loads: Vec<Load> = state
        .store
        .loads()
        .into_iter()
        .filter(|l| {
            filter
                .region
                .as_ref()
                .is_none_or(|region| l.region.eq_ignore_ascii_case(region))
        })
        .filter(|l| filter.status.is_none_or(|status| l.status == status))
        .filter(|l| filter.date.is_none_or(|date| l.created_at.date_naive() == date))
        .collect();

    Json(LoadStats {
        total_loads: loads.len(),
        pending_loads: loads.iter().filter(|l| l.status == LoadStatus::Pending).count(),
        assigned_loads: loads.iter().filter(|l| l.status == LoadStatus::Assigned).count(),
        completed_loads: loads.iter().filter(|l| l.status == LoadStatus::Completed).count(),
        high_priority_pending: loads
            .iter()
            .filter(|l| l.status == LoadStatus::Pending && l.priority == Priority::High)
            .count(),
    })
}

async fn update_load(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<LoadRequest>,
) -> Result<Json<CreateLoadResponse>, AppError> {
    let mut load = state
        .store
        .get_load(id)
        .ok_or_else(|| AppError::NotFound(format!("load {id} not found")))?;

    if load.status != LoadStatus::Pending {
        return Err(AppError::InvalidState("Only PENDING loads can be edited.".to_string()));
    }

    validate(&payload)?;

    load.region = payload.region.trim().to_string();
    load.stops = payload.stops;
    load.estimated_distance = payload.estimated_distance;
    load.estimated_hours = effective_hours(&payload);
    load.priority = payload.priority.unwrap_or(Priority::Medium);

    let response = CreateLoadResponse {
        message: "Load updated",
        load_id: load.load_id,
        load_ref: load.load_ref.clone(),
    };
    state.store.save_load(load);

    Ok(Json(response))
}

async fn delete_load(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let load = state
        .store
        .get_load(id)
        .ok_or_else(|| AppError::NotFound(format!("load {id} not found")))?;

    if load.status != LoadStatus::Pending {
        return Err(AppError::InvalidState("Only PENDING loads can be deleted.".to_string()));
    }

    state.store.remove_load(id);
    state.metrics.pending_loads.set(state.store.pending_load_count() as i64);

    Ok(Json(serde_json::json!({ "message": "Load deleted" })))
}
