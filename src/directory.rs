//! Reference data owned by external collaborators: fuel types, depots with
//! tiered prices and registered drivers.

use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::directory::{Depot, Driver, FuelType, PriceTier};
use crate::models::location::GeoPoint;

#[derive(Debug, Deserialize)]
pub struct NewFuelType {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct NewDepot {
    pub name: String,
    pub location: GeoPoint,
    pub tiers: Vec<PriceTier>,
}

#[derive(Debug, Deserialize)]
pub struct NewDriver {
    pub name: String,
    pub base_location: GeoPoint,
}

#[derive(Default)]
pub struct Directory {
    fuel_types: DashMap<Uuid, FuelType>,
    depots: DashMap<Uuid, Depot>,
    drivers: DashMap<Uuid, Driver>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fuel_type(&self, payload: NewFuelType) -> Result<FuelType, AppError> {
        let name = payload.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("name cannot be empty".to_string()));
        }

        let fuel_type = FuelType {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.fuel_types.insert(fuel_type.id, fuel_type.clone());
        Ok(fuel_type)
    }

    pub fn add_depot(&self, payload: NewDepot) -> Result<Depot, AppError> {
        if payload.name.trim().is_empty() {
            return Err(AppError::Validation("name cannot be empty".to_string()));
        }
        payload.location.validate()?;

        for tier in &payload.tiers {
            if !self.fuel_types.contains_key(&tier.fuel_type_id) {
                return Err(AppError::Validation(format!(
                    "unknown fuel type {} in price tier",
                    tier.fuel_type_id
                )));
            }
            if !tier.min_litres.is_finite() || tier.min_litres < 0.0 {
                return Err(AppError::Validation(
                    "tier min_litres must be >= 0".to_string(),
                ));
            }
            if !tier.price_per_litre.is_finite() || tier.price_per_litre <= 0.0 {
                return Err(AppError::Validation(
                    "tier price_per_litre must be > 0".to_string(),
                ));
            }
        }

        let depot = Depot {
            id: Uuid::new_v4(),
            name: payload.name.trim().to_string(),
            location: payload.location,
            tiers: payload.tiers,
        };
        self.depots.insert(depot.id, depot.clone());
        Ok(depot)
    }

    pub fn add_driver(&self, payload: NewDriver) -> Result<Driver, AppError> {
        if payload.name.trim().is_empty() {
            return Err(AppError::Validation("name cannot be empty".to_string()));
        }
        payload.base_location.validate()?;

        let driver = Driver {
            id: Uuid::new_v4(),
            name: payload.name.trim().to_string(),
            base_location: payload.base_location,
            active: true,
            created_at: Utc::now(),
        };
        self.drivers.insert(driver.id, driver.clone());
        Ok(driver)
    }

    pub fn fuel_type_exists(&self, id: Uuid) -> bool {
        self.fuel_types.contains_key(&id)
    }

    pub fn depot(&self, id: Uuid) -> Result<Depot, AppError> {
        self.depots
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("depot {id} not found")))
    }

    pub fn driver(&self, id: Uuid) -> Result<Driver, AppError> {
        self.drivers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))
    }

    /// Inactive drivers keep their assignments but cannot bid and are not
    /// told about new open orders.
    pub fn set_driver_active(&self, id: Uuid, active: bool) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;
        driver.active = active;
        Ok(driver.clone())
    }

    pub fn active_driver_ids(&self) -> Vec<Uuid> {
        self.drivers
            .iter()
            .filter(|entry| entry.value().active)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn fuel_types(&self) -> Vec<FuelType> {
        self.fuel_types.iter().map(|e| e.value().clone()).collect()
    }

    pub fn depots(&self) -> Vec<Depot> {
        self.depots.iter().map(|e| e.value().clone()).collect()
    }

    pub fn drivers(&self) -> Vec<Driver> {
        self.drivers.iter().map(|e| e.value().clone()).collect()
    }
}
