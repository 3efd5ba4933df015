use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(AppError::Validation(format!(
                "latitude {} is outside [-90, 90]",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(AppError::Validation(format!(
                "longitude {} is outside [-180, 180]",
                self.lng
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverLocationSample {
    pub driver_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    /// Reported accuracy radius in metres.
    pub accuracy: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationReport {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: Option<f64>,
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Realtime,
    LastKnown,
    Default,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub order_id: Uuid,
    pub driver_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub accuracy: Option<f64>,
    pub recorded_at: Option<DateTime<Utc>>,
    pub source: LocationSource,
}
