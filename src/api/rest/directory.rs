use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::directory::{NewDepot, NewDriver, NewFuelType};
use crate::error::AppError;
use crate::models::directory::{Depot, Driver, FuelType};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/fuel-types", post(create_fuel_type).get(list_fuel_types))
        .route("/depots", post(create_depot).get(list_depots))
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id/status", patch(update_driver_status))
}

#[derive(Deserialize)]
pub struct UpdateDriverStatusRequest {
    pub active: bool,
}

async fn create_fuel_type(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewFuelType>,
) -> Result<Json<FuelType>, AppError> {
    Ok(Json(state.directory.add_fuel_type(payload)?))
}

async fn list_fuel_types(State(state): State<Arc<AppState>>) -> Json<Vec<FuelType>> {
    Json(state.directory.fuel_types())
}

async fn create_depot(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewDepot>,
) -> Result<Json<Depot>, AppError> {
    Ok(Json(state.directory.add_depot(payload)?))
}

async fn list_depots(State(state): State<Arc<AppState>>) -> Json<Vec<Depot>> {
    Json(state.directory.depots())
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewDriver>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(state.register_driver(payload)?))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    Json(state.directory.drivers())
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDriverStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(state.directory.set_driver_active(id, payload.active)?))
}
