use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::api::rest::actor::ActorHeader;
use crate::error::AppError;
use crate::models::location::{DriverLocationSample, LocationReport, ResolvedLocation};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers/:id/location", put(record_location))
        .route("/orders/:id/location", get(resolve_location))
        .route("/orders/:id/location/history", get(location_history))
}

async fn record_location(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Path(driver_id): Path<Uuid>,
    Json(report): Json<LocationReport>,
) -> Result<Json<DriverLocationSample>, AppError> {
    if actor.driver_id()? != driver_id {
        return Err(AppError::Forbidden(
            "drivers may only report their own location".to_string(),
        ));
    }
    state.directory.driver(driver_id)?;
    Ok(Json(state.location.record(driver_id, report)?))
}

async fn resolve_location(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ResolvedLocation>, AppError> {
    let viewer_id = actor.customer_id()?;
    state.lifecycle.get(order_id)?;
    Ok(Json(state.location.resolve(order_id, viewer_id)?))
}

async fn location_history(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<DriverLocationSample>>, AppError> {
    let viewer_id = actor.customer_id()?;
    state.lifecycle.get(order_id)?;
    Ok(Json(state.location.history(order_id, viewer_id)?))
}
