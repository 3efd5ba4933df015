use crate::config::Config;
use crate::error::AppError;
use crate::geo::distance_km;
use crate::models::directory::Depot;
use crate::models::location::GeoPoint;
use crate::models::order::PriceBreakdown;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct PricingConfig {
    pub delivery_base_fee: f64,
    pub delivery_fee_per_km: f64,
    pub service_fee_rate: f64,
}

impl From<&Config> for PricingConfig {
    fn from(config: &Config) -> Self {
        Self {
            delivery_base_fee: config.delivery_base_fee,
            delivery_fee_per_km: config.delivery_fee_per_km,
            service_fee_rate: config.service_fee_rate,
        }
    }
}

/// Prices an order against the depot's current tiers.
pub fn quote(
    pricing: &PricingConfig,
    depot: &Depot,
    fuel_type_id: Uuid,
    litres: f64,
    drop: &GeoPoint,
) -> Result<PriceBreakdown, AppError> {
    let price_per_litre = tier_price(depot, fuel_type_id, litres).ok_or_else(|| {
        AppError::Validation(format!(
            "depot {} has no price for fuel type {fuel_type_id} at {litres} litres",
            depot.id
        ))
    })?;

    let km = distance_km(&depot.location, drop);
    let fuel_cost = litres * price_per_litre;
    let delivery_fee = pricing.delivery_base_fee + km * pricing.delivery_fee_per_km;

    Ok(breakdown(fuel_cost, delivery_fee, pricing.service_fee_rate))
}

/// Replaces the delivery fee with a driver's accepted per-km rate.
pub fn reprice_delivery(
    pricing: &PricingConfig,
    current: &PriceBreakdown,
    depot_location: &GeoPoint,
    drop: &GeoPoint,
    price_per_km: f64,
) -> PriceBreakdown {
    let km = distance_km(depot_location, drop);
    breakdown(
        current.fuel_cost,
        km * price_per_km,
        pricing.service_fee_rate,
    )
}

/// Picks the tier with the highest `min_litres` not above the ordered volume.
pub fn tier_price(depot: &Depot, fuel_type_id: Uuid, litres: f64) -> Option<f64> {
    depot
        .tiers
        .iter()
        .filter(|tier| tier.fuel_type_id == fuel_type_id && tier.min_litres <= litres)
        .max_by(|a, b| a.min_litres.total_cmp(&b.min_litres))
        .map(|tier| tier.price_per_litre)
}

fn breakdown(fuel_cost: f64, delivery_fee: f64, service_fee_rate: f64) -> PriceBreakdown {
    let fuel_cost = round_cents(fuel_cost);
    let delivery_fee = round_cents(delivery_fee);
    let service_fee = round_cents(fuel_cost * service_fee_rate);

    PriceBreakdown {
        fuel_cost,
        delivery_fee,
        service_fee,
        total: round_cents(fuel_cost + delivery_fee + service_fee),
    }
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{quote, reprice_delivery, tier_price, PricingConfig};
    use crate::models::directory::{Depot, PriceTier};
    use crate::models::location::GeoPoint;

    const PRICING: PricingConfig = PricingConfig {
        delivery_base_fee: 5.0,
        delivery_fee_per_km: 1.0,
        service_fee_rate: 0.05,
    };

    fn depot(fuel: Uuid) -> Depot {
        Depot {
            id: Uuid::new_v4(),
            name: "test-depot".to_string(),
            location: GeoPoint {
                lat: 53.5511,
                lng: 9.9937,
            },
            tiers: vec![
                PriceTier {
                    fuel_type_id: fuel,
                    min_litres: 0.0,
                    price_per_litre: 2.0,
                },
                PriceTier {
                    fuel_type_id: fuel,
                    min_litres: 500.0,
                    price_per_litre: 1.5,
                },
            ],
        }
    }

    #[test]
    fn larger_orders_fall_into_cheaper_tier() {
        let fuel = Uuid::from_u128(1);
        let depot = depot(fuel);

        assert_eq!(tier_price(&depot, fuel, 100.0), Some(2.0));
        assert_eq!(tier_price(&depot, fuel, 500.0), Some(1.5));
        assert_eq!(tier_price(&depot, Uuid::from_u128(2), 100.0), None);
    }

    #[test]
    fn quote_at_depot_location_charges_base_fee_only() {
        let fuel = Uuid::from_u128(1);
        let depot = depot(fuel);

        let price = quote(&PRICING, &depot, fuel, 100.0, &depot.location).unwrap();

        assert_eq!(price.fuel_cost, 200.0);
        assert_eq!(price.delivery_fee, 5.0);
        assert_eq!(price.service_fee, 10.0);
        assert_eq!(price.total, 215.0);
    }

    #[test]
    fn farther_drop_costs_more() {
        let fuel = Uuid::from_u128(1);
        let depot = depot(fuel);
        let near = GeoPoint {
            lat: 53.5512,
            lng: 9.9938,
        };
        let far = GeoPoint {
            lat: 53.7,
            lng: 10.2,
        };

        let near_price = quote(&PRICING, &depot, fuel, 100.0, &near).unwrap();
        let far_price = quote(&PRICING, &depot, fuel, 100.0, &far).unwrap();

        assert!(far_price.delivery_fee > near_price.delivery_fee);
        assert_eq!(far_price.fuel_cost, near_price.fuel_cost);
    }

    #[test]
    fn unpriced_fuel_type_is_a_validation_error() {
        let depot = depot(Uuid::from_u128(1));
        let result = quote(&PRICING, &depot, Uuid::from_u128(9), 10.0, &depot.location);
        assert!(result.is_err());
    }

    #[test]
    fn accepted_rate_replaces_delivery_fee_and_keeps_fuel_cost() {
        let fuel = Uuid::from_u128(1);
        let depot = depot(fuel);
        let original = quote(&PRICING, &depot, fuel, 100.0, &depot.location).unwrap();

        let repriced = reprice_delivery(&PRICING, &original, &depot.location, &depot.location, 3.0);

        assert_eq!(repriced.fuel_cost, original.fuel_cost);
        assert_eq!(repriced.delivery_fee, 0.0);
        assert_eq!(repriced.total, 210.0);
    }
}
