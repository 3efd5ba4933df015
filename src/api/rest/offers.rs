use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::api::rest::actor::ActorHeader;
use crate::engine::negotiation::Acceptance;
use crate::error::AppError;
use crate::models::offer::{DispatchOffer, OfferSubmission};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/:id/offers", get(list_offers).post(submit_offer))
        .route("/orders/:id/offers/:offer_id/accept", post(accept_offer))
        .route("/orders/:id/offers/:offer_id/decline", post(decline_offer))
}

async fn list_offers(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<DispatchOffer>>, AppError> {
    Ok(Json(state.negotiation.list_offers(order_id, actor.0)?))
}

async fn submit_offer(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<OfferSubmission>,
) -> Result<Json<DispatchOffer>, AppError> {
    let driver_id = actor.driver_id()?;
    Ok(Json(state.negotiation.submit_offer(order_id, driver_id, payload)?))
}

async fn accept_offer(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Path((order_id, offer_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Acceptance>, AppError> {
    let customer_id = actor.customer_id()?;
    Ok(Json(state.negotiation.accept(order_id, offer_id, customer_id)?))
}

async fn decline_offer(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Path((order_id, offer_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DispatchOffer>, AppError> {
    let customer_id = actor.customer_id()?;
    Ok(Json(state.negotiation.decline(order_id, offer_id, customer_id)?))
}
