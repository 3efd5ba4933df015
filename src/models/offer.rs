use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferState {
    PendingCustomer,
    CustomerAccepted,
    CustomerDeclined,
    Expired,
}

impl OfferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferState::PendingCustomer => "pending_customer",
            OfferState::CustomerAccepted => "customer_accepted",
            OfferState::CustomerDeclined => "customer_declined",
            OfferState::Expired => "expired",
        }
    }
}

/// A driver's quote against one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOffer {
    pub id: Uuid,
    pub order_id: Uuid,
    pub driver_id: Uuid,
    pub state: OfferState,
    pub price_per_km: f64,
    pub proposed_delivery_time: DateTime<Utc>,
    pub note: Option<String>,
    pub customer_response_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DispatchOffer {
    pub fn is_pending(&self) -> bool {
        self.state == OfferState::PendingCustomer
    }

    pub fn is_past_ttl(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfferSubmission {
    pub price_per_km: f64,
    pub proposed_delivery_time: DateTime<Utc>,
    pub note: Option<String>,
}
