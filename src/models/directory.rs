use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuelType {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceTier {
    pub fuel_type_id: Uuid,
    /// Smallest order volume this tier applies to.
    pub min_litres: f64,
    pub price_per_litre: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Depot {
    pub id: Uuid,
    pub name: String,
    pub location: GeoPoint,
    pub tiers: Vec<PriceTier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    /// Fallback position shown before the driver ever reports a location.
    pub base_location: GeoPoint,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}
