use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::actor::ActorHeader;
use crate::error::AppError;
use crate::models::order::{NewOrder, Order, OrderEdit, OrderState};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/open", get(list_open_orders))
        .route("/orders/:id", get(get_order).patch(edit_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/advance", post(advance_order))
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub customer_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct AdvanceRequest {
    pub to: OrderState,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Json(payload): Json<NewOrder>,
) -> Result<Json<Order>, AppError> {
    let customer_id = actor.customer_id()?;
    Ok(Json(state.lifecycle.create(customer_id, payload)?))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let caller = actor.customer_id()?;
    let customer_id = query.customer_id.unwrap_or(caller);
    if customer_id != caller {
        return Err(AppError::Forbidden(
            "customers may only list their own orders".to_string(),
        ));
    }
    Ok(Json(state.lifecycle.list_for_customer(customer_id)))
}

async fn list_open_orders(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
) -> Result<Json<Vec<Order>>, AppError> {
    actor.driver_id()?;
    Ok(Json(state.lifecycle.list_open()))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.lifecycle.view(id, actor.0)?))
}

async fn edit_order(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Path(id): Path<Uuid>,
    Json(edit): Json<OrderEdit>,
) -> Result<Json<Order>, AppError> {
    let customer_id = actor.customer_id()?;
    Ok(Json(state.lifecycle.edit(id, customer_id, edit)?))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.lifecycle.cancel(id, actor.0)?))
}

async fn advance_order(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.lifecycle.advance(id, payload.to, actor.0)?))
}
