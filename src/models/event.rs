use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::chat::ChatMessage;
use crate::models::location::DriverLocationSample;
use crate::models::offer::OfferState;
use crate::models::order::OrderState;

/// Notification pushed to a user through the event fanout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    OrderStateChanged {
        order_id: Uuid,
        from: OrderState,
        to: OrderState,
        at: DateTime<Utc>,
    },
    OrderAvailable {
        order_id: Uuid,
        litres: f64,
        fuel_type_id: Uuid,
    },
    OfferSubmitted {
        order_id: Uuid,
        offer_id: Uuid,
        driver_id: Uuid,
        price_per_km: f64,
        proposed_delivery_time: DateTime<Utc>,
    },
    OfferUpdated {
        order_id: Uuid,
        offer_id: Uuid,
        state: OfferState,
    },
    ChatReady {
        order_id: Uuid,
        thread_id: Uuid,
    },
    ChatClosed {
        order_id: Uuid,
        thread_id: Uuid,
    },
    ChatMessage {
        message: ChatMessage,
    },
    LocationUpdate {
        order_id: Uuid,
        sample: DriverLocationSample,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::OrderStateChanged { .. } => "order_state_changed",
            Event::OrderAvailable { .. } => "order_available",
            Event::OfferSubmitted { .. } => "offer_submitted",
            Event::OfferUpdated { .. } => "offer_updated",
            Event::ChatReady { .. } => "chat_ready",
            Event::ChatClosed { .. } => "chat_closed",
            Event::ChatMessage { .. } => "chat_message",
            Event::LocationUpdate { .. } => "location_update",
        }
    }
}
