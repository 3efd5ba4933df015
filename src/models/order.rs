use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::actor::ActorRole;
use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Created,
    AwaitingPayment,
    PendingDispatch,
    Assigned,
    EnRoute,
    PickedUp,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Created => "created",
            OrderState::AwaitingPayment => "awaiting_payment",
            OrderState::PendingDispatch => "pending_dispatch",
            OrderState::Assigned => "assigned",
            OrderState::EnRoute => "en_route",
            OrderState::PickedUp => "picked_up",
            OrderState::Delivered => "delivered",
            OrderState::Cancelled => "cancelled",
            OrderState::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Delivered | OrderState::Cancelled | OrderState::Refunded
        )
    }

    /// Fields and pricing may only change while the order is still unpaid.
    pub fn is_editable(&self) -> bool {
        matches!(self, OrderState::Created | OrderState::AwaitingPayment)
    }

    /// Assignment window: chat and location tracking are live.
    pub fn in_assignment_window(&self) -> bool {
        matches!(
            self,
            OrderState::Assigned | OrderState::EnRoute | OrderState::PickedUp
        )
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            OrderState::Created
                | OrderState::AwaitingPayment
                | OrderState::PendingDispatch
                | OrderState::Assigned
        )
    }

    /// The single forward successor on the fulfillment path, if any.
    pub fn next(&self) -> Option<OrderState> {
        match self {
            OrderState::Created => Some(OrderState::AwaitingPayment),
            OrderState::AwaitingPayment => Some(OrderState::PendingDispatch),
            OrderState::PendingDispatch => Some(OrderState::Assigned),
            OrderState::Assigned => Some(OrderState::EnRoute),
            OrderState::EnRoute => Some(OrderState::PickedUp),
            OrderState::PickedUp => Some(OrderState::Delivered),
            OrderState::Delivered | OrderState::Cancelled | OrderState::Refunded => None,
        }
    }

    pub fn can_transition_to(&self, target: OrderState) -> bool {
        match target {
            OrderState::Cancelled => self.is_cancellable(),
            OrderState::Refunded => !self.is_terminal(),
            _ => self.next() == Some(target),
        }
    }

    /// Roles allowed to drive the order into `target`.
    pub fn permitted_roles(target: OrderState) -> &'static [ActorRole] {
        match target {
            OrderState::Created => &[],
            OrderState::AwaitingPayment => &[ActorRole::Customer],
            OrderState::PendingDispatch => &[ActorRole::Payment],
            OrderState::Assigned => &[ActorRole::System],
            OrderState::EnRoute | OrderState::PickedUp | OrderState::Delivered => {
                &[ActorRole::Driver]
            }
            OrderState::Cancelled => &[ActorRole::Customer, ActorRole::Payment, ActorRole::System],
            OrderState::Refunded => &[ActorRole::Payment],
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceBreakdown {
    pub fuel_cost: f64,
    pub delivery_fee: f64,
    pub service_fee: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    pub from: OrderState,
    pub to: OrderState,
    pub actor: ActorRole,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub fuel_type_id: Uuid,
    pub depot_id: Uuid,
    pub litres: f64,
    pub drop: GeoPoint,
    pub delivery_address: String,
    pub state: OrderState,
    pub assigned_driver_id: Option<Uuid>,
    pub accepted_offer_id: Option<Uuid>,
    pub confirmed_delivery_time: Option<DateTime<Utc>>,
    pub pricing: PriceBreakdown,
    pub history: Vec<StateChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub fuel_type_id: Uuid,
    pub depot_id: Uuid,
    pub litres: f64,
    pub drop: GeoPoint,
    pub delivery_address: String,
    #[serde(default)]
    pub accepted_terms: bool,
}

/// Partial update applied by `edit`; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderEdit {
    pub fuel_type_id: Option<Uuid>,
    pub depot_id: Option<Uuid>,
    pub litres: Option<f64>,
    pub drop: Option<GeoPoint>,
    pub delivery_address: Option<String>,
}
