//! Test scaffolding shared by the engine unit tests.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::Config;
use crate::directory::{NewDepot, NewDriver, NewFuelType};
use crate::models::actor::Actor;
use crate::models::directory::PriceTier;
use crate::models::location::GeoPoint;
use crate::models::offer::{DispatchOffer, OfferSubmission};
use crate::models::order::{NewOrder, Order, OrderState};
use crate::state::AppState;

pub struct World {
    pub state: AppState,
    pub fuel_type_id: Uuid,
    pub depot_id: Uuid,
    pub customer_id: Uuid,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let state = AppState::new(config);
        let fuel = state
            .directory
            .add_fuel_type(NewFuelType {
                name: "Diesel".to_string(),
            })
            .unwrap();
        let depot = state
            .directory
            .add_depot(NewDepot {
                name: "Apapa".to_string(),
                location: GeoPoint {
                    lat: 6.4474,
                    lng: 3.3903,
                },
                tiers: vec![PriceTier {
                    fuel_type_id: fuel.id,
                    min_litres: 0.0,
                    price_per_litre: 1.2,
                }],
            })
            .unwrap();

        Self {
            state,
            fuel_type_id: fuel.id,
            depot_id: depot.id,
            customer_id: Uuid::new_v4(),
        }
    }

    pub fn new_order(&self) -> NewOrder {
        NewOrder {
            fuel_type_id: self.fuel_type_id,
            depot_id: self.depot_id,
            litres: 200.0,
            drop: GeoPoint {
                lat: 6.5244,
                lng: 3.3792,
            },
            delivery_address: "12 Marina Road".to_string(),
            accepted_terms: true,
        }
    }

    pub fn driver(&self) -> Uuid {
        self.state
            .register_driver(NewDriver {
                name: "Ada".to_string(),
                base_location: GeoPoint { lat: 6.5, lng: 3.35 },
            })
            .unwrap()
            .id
    }

    pub fn created_order(&self) -> Order {
        self.state
            .lifecycle
            .create(self.customer_id, self.new_order())
            .unwrap()
    }

    /// Order paid for and open to driver quotes.
    pub fn open_order(&self) -> Order {
        let order = self.created_order();
        let lifecycle = &self.state.lifecycle;
        lifecycle
            .advance(order.id, OrderState::AwaitingPayment, Actor::Customer(self.customer_id))
            .unwrap();
        lifecycle
            .advance(order.id, OrderState::PendingDispatch, Actor::Payment)
            .unwrap()
    }

    pub fn offer(&self, order_id: Uuid, driver_id: Uuid, price_per_km: f64) -> DispatchOffer {
        self.state
            .negotiation
            .submit_offer(
                order_id,
                driver_id,
                OfferSubmission {
                    price_per_km,
                    proposed_delivery_time: Utc::now() + Duration::hours(2),
                    note: None,
                },
            )
            .unwrap()
    }

    /// Open order with one accepted offer from a fresh driver.
    pub fn assigned_order(&self) -> (Order, Uuid) {
        let order = self.open_order();
        let driver = self.driver();
        let offer = self.offer(order.id, driver, 1.0);
        let acceptance = self
            .state
            .negotiation
            .accept(order.id, offer.id, self.customer_id)
            .unwrap();
        (acceptance.order, driver)
    }
}
