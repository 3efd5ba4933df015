//! Competing driver quotes against one order.
//!
//! Offers live in one vector per order. Submission and decline hold the order
//! shared; accept runs inside [`OrderLifecycleManager::assign`], which holds
//! it exclusively, so "no driver assigned yet" is checked and flipped in one
//! step. The expiry sweep never holds an order while holding offers.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::directory::Directory;
use crate::engine::lifecycle::{Assignment, OrderLifecycleManager};
use crate::error::AppError;
use crate::fanout::EventFanout;
use crate::models::actor::Actor;
use crate::models::event::Event;
use crate::models::offer::{DispatchOffer, OfferState, OfferSubmission};
use crate::models::order::{Order, OrderState};
use crate::observability::metrics::Metrics;

pub const MAX_NOTE_LEN: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct Acceptance {
    pub order: Order,
    pub offer: DispatchOffer,
    pub declined_offer_ids: Vec<Uuid>,
}

struct Staged {
    winner: DispatchOffer,
    declined: Vec<DispatchOffer>,
    snapshot: Vec<DispatchOffer>,
}

pub struct DispatchNegotiationEngine {
    offers: DashMap<Uuid, Vec<DispatchOffer>>,
    lifecycle: Arc<OrderLifecycleManager>,
    directory: Arc<Directory>,
    fanout: Arc<EventFanout>,
    metrics: Metrics,
    offer_ttl: Duration,
}

impl DispatchNegotiationEngine {
    pub fn new(
        lifecycle: Arc<OrderLifecycleManager>,
        directory: Arc<Directory>,
        fanout: Arc<EventFanout>,
        metrics: Metrics,
        offer_ttl_secs: i64,
    ) -> Self {
        Self {
            offers: DashMap::new(),
            lifecycle,
            directory,
            fanout,
            metrics,
            offer_ttl: Duration::seconds(offer_ttl_secs),
        }
    }

    pub fn submit_offer(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
        submission: OfferSubmission,
    ) -> Result<DispatchOffer, AppError> {
        let now = Utc::now();

        if !submission.price_per_km.is_finite() || submission.price_per_km <= 0.0 {
            return Err(AppError::Validation("price_per_km must be > 0".to_string()));
        }
        if submission.proposed_delivery_time <= now {
            return Err(AppError::Validation(
                "proposed delivery time must be in the future".to_string(),
            ));
        }
        let note = match submission.note.as_deref().map(str::trim) {
            Some(note) if note.chars().count() > MAX_NOTE_LEN => {
                return Err(AppError::Validation(format!(
                    "note exceeds {MAX_NOTE_LEN} characters"
                )));
            }
            Some("") | None => None,
            Some(note) => Some(note.to_string()),
        };

        let driver = self.directory.driver(driver_id)?;
        if !driver.active {
            return Err(AppError::Forbidden(format!("driver {driver_id} is not active")));
        }

        let (offer, customer_id) = self.lifecycle.with_order(order_id, |order| {
            if order.customer_id == driver_id {
                return Err(AppError::Forbidden(format!(
                    "driver {driver_id} cannot bid on their own order"
                )));
            }
            if order.state != OrderState::PendingDispatch {
                return Err(AppError::InvalidState(format!(
                    "order {order_id} is not accepting offers (state {})",
                    order.state
                )));
            }

            let mut offers = self.offers.entry(order_id).or_default();
            for existing in offers
                .iter_mut()
                .filter(|o| o.driver_id == driver_id && o.is_pending())
            {
                if !existing.is_past_ttl(now) {
                    return Err(AppError::Conflict(format!(
                        "driver {driver_id} already has a pending offer on order {order_id}"
                    )));
                }
                existing.state = OfferState::Expired;
            }

            let offer = DispatchOffer {
                id: Uuid::new_v4(),
                order_id,
                driver_id,
                state: OfferState::PendingCustomer,
                price_per_km: submission.price_per_km,
                proposed_delivery_time: submission.proposed_delivery_time,
                note,
                customer_response_at: None,
                created_at: now,
                expires_at: now + self.offer_ttl,
            };
            offers.push(offer.clone());
            Ok((offer, order.customer_id))
        })?;

        self.metrics
            .offers_total
            .with_label_values(&["submitted"])
            .inc();
        info!(
            order_id = %order_id,
            offer_id = %offer.id,
            driver_id = %driver_id,
            price_per_km = offer.price_per_km,
            "offer submitted"
        );

        self.fanout.notify(
            customer_id,
            Event::OfferSubmitted {
                order_id,
                offer_id: offer.id,
                driver_id,
                price_per_km: offer.price_per_km,
                proposed_delivery_time: offer.proposed_delivery_time,
            },
        );

        Ok(offer)
    }

    pub fn accept(
        &self,
        order_id: Uuid,
        offer_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Acceptance, AppError> {
        let start = Instant::now();
        let result = self.try_accept(order_id, offer_id, customer_id);

        let outcome = match &result {
            Ok(_) => "success",
            Err(AppError::Conflict(_)) => "conflict",
            Err(_) => "rejected",
        };
        self.metrics
            .accept_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(acceptance) => {
                self.metrics
                    .offers_total
                    .with_label_values(&["accepted"])
                    .inc();
                self.metrics
                    .offers_total
                    .with_label_values(&["declined"])
                    .inc_by(acceptance.declined_offer_ids.len() as u64);
                info!(
                    order_id = %order_id,
                    offer_id = %offer_id,
                    driver_id = %acceptance.offer.driver_id,
                    declined = acceptance.declined_offer_ids.len(),
                    "offer accepted"
                );
            }
            Err(AppError::Conflict(reason)) => {
                self.metrics.accept_conflicts_total.inc();
                warn!(order_id = %order_id, offer_id = %offer_id, reason = %reason, "accept lost to an earlier commit");
            }
            Err(err) => {
                warn!(order_id = %order_id, offer_id = %offer_id, error = %err, "accept rejected");
            }
        }

        result
    }

    fn try_accept(
        &self,
        order_id: Uuid,
        offer_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Acceptance, AppError> {
        let now = Utc::now();

        let (order, staged) = self.lifecycle.assign(
            order_id,
            |order| {
                if order.customer_id != customer_id {
                    return Err(AppError::Forbidden(format!(
                        "order {order_id} belongs to another customer"
                    )));
                }
                if order.assigned_driver_id.is_some() {
                    return Err(AppError::Conflict(format!(
                        "order {order_id} already assigned"
                    )));
                }

                let mut offers = self
                    .offers
                    .get_mut(&order_id)
                    .ok_or_else(|| offer_not_found(offer_id))?;
                let target = offers
                    .iter()
                    .find(|o| o.id == offer_id)
                    .ok_or_else(|| offer_not_found(offer_id))?;

                match target.state {
                    OfferState::PendingCustomer if target.is_past_ttl(now) => {
                        return Err(AppError::InvalidState(format!(
                            "offer {offer_id} has expired"
                        )));
                    }
                    OfferState::PendingCustomer => {}
                    OfferState::CustomerAccepted => {
                        return Err(AppError::Conflict(format!(
                            "offer {offer_id} was already accepted"
                        )));
                    }
                    other => {
                        return Err(AppError::InvalidState(format!(
                            "offer {offer_id} is {}",
                            other.as_str()
                        )));
                    }
                }

                let snapshot = offers.clone();
                let mut winner = None;
                let mut declined = Vec::new();
                for offer in offers.iter_mut() {
                    if offer.id == offer_id {
                        offer.state = OfferState::CustomerAccepted;
                        offer.customer_response_at = Some(now);
                        winner = Some(offer.clone());
                    } else if offer.is_pending() {
                        offer.state = OfferState::CustomerDeclined;
                        offer.customer_response_at = Some(now);
                        declined.push(offer.clone());
                    }
                }
                let winner = winner.ok_or_else(|| offer_not_found(offer_id))?;

                let assignment = Assignment {
                    driver_id: winner.driver_id,
                    offer_id,
                    price_per_km: winner.price_per_km,
                    delivery_time: winner.proposed_delivery_time,
                };
                Ok((
                    assignment,
                    Staged {
                        winner,
                        declined,
                        snapshot,
                    },
                ))
            },
            |staged: Staged| self.restore(order_id, staged.snapshot),
        )?;

        self.fanout.notify(
            staged.winner.driver_id,
            Event::OfferUpdated {
                order_id,
                offer_id,
                state: OfferState::CustomerAccepted,
            },
        );
        for offer in &staged.declined {
            self.fanout.notify(
                offer.driver_id,
                Event::OfferUpdated {
                    order_id,
                    offer_id: offer.id,
                    state: OfferState::CustomerDeclined,
                },
            );
        }

        Ok(Acceptance {
            order,
            offer: staged.winner,
            declined_offer_ids: staged.declined.iter().map(|o| o.id).collect(),
        })
    }

    fn restore(&self, order_id: Uuid, snapshot: Vec<DispatchOffer>) {
        if let Some(mut offers) = self.offers.get_mut(&order_id) {
            *offers = snapshot;
        }
    }

    pub fn decline(
        &self,
        order_id: Uuid,
        offer_id: Uuid,
        customer_id: Uuid,
    ) -> Result<DispatchOffer, AppError> {
        let offer = self.lifecycle.with_order(order_id, |order| {
            if order.customer_id != customer_id {
                return Err(AppError::Forbidden(format!(
                    "order {order_id} belongs to another customer"
                )));
            }

            let mut offers = self
                .offers
                .get_mut(&order_id)
                .ok_or_else(|| offer_not_found(offer_id))?;
            let offer = offers
                .iter_mut()
                .find(|o| o.id == offer_id)
                .ok_or_else(|| offer_not_found(offer_id))?;

            if !offer.is_pending() {
                return Err(AppError::InvalidState(format!(
                    "offer {offer_id} is {}",
                    offer.state.as_str()
                )));
            }
            offer.state = OfferState::CustomerDeclined;
            offer.customer_response_at = Some(Utc::now());
            Ok(offer.clone())
        })?;

        self.metrics
            .offers_total
            .with_label_values(&["declined"])
            .inc();
        info!(order_id = %order_id, offer_id = %offer_id, "offer declined");
        self.fanout.notify(
            offer.driver_id,
            Event::OfferUpdated {
                order_id,
                offer_id,
                state: OfferState::CustomerDeclined,
            },
        );

        Ok(offer)
    }

    /// Customers see every offer on their order, drivers only their own.
    pub fn list_offers(&self, order_id: Uuid, actor: Actor) -> Result<Vec<DispatchOffer>, AppError> {
        self.lifecycle.with_order(order_id, |order| {
            let all = self
                .offers
                .get(&order_id)
                .map(|offers| offers.clone())
                .unwrap_or_default();

            match actor {
                Actor::Customer(id) if id == order.customer_id => Ok(all),
                Actor::Driver(id) => Ok(all.into_iter().filter(|o| o.driver_id == id).collect()),
                Actor::System => Ok(all),
                _ => Err(AppError::Forbidden(format!(
                    "offers on order {order_id} are not visible to caller"
                ))),
            }
        })
    }

    pub fn expire_stale(&self) -> usize {
        self.expire_stale_at(Utc::now())
    }

    /// Expires pending offers past their TTL, and pending offers on orders
    /// that left `pending_dispatch` without them. Offers in any other state are
    /// left alone.
    pub fn expire_stale_at(&self, now: DateTime<Utc>) -> usize {
        let candidates: Vec<Uuid> = self
            .offers
            .iter()
            .filter(|entry| entry.value().iter().any(DispatchOffer::is_pending))
            .map(|entry| *entry.key())
            .collect();

        let mut expired = Vec::new();
        for order_id in candidates {
            let order_open = self.lifecycle.state_of(order_id) == Some(OrderState::PendingDispatch);

            let Some(mut offers) = self.offers.get_mut(&order_id) else {
                continue;
            };
            for offer in offers.iter_mut().filter(|o| o.is_pending()) {
                if !order_open || offer.is_past_ttl(now) {
                    offer.state = OfferState::Expired;
                    expired.push((order_id, offer.id, offer.driver_id));
                }
            }
        }

        for (order_id, offer_id, driver_id) in &expired {
            self.fanout.notify(
                *driver_id,
                Event::OfferUpdated {
                    order_id: *order_id,
                    offer_id: *offer_id,
                    state: OfferState::Expired,
                },
            );
        }

        if !expired.is_empty() {
            self.metrics
                .offers_total
                .with_label_values(&["expired"])
                .inc_by(expired.len() as u64);
            info!(expired = expired.len(), "stale offers expired");
        }
        expired.len()
    }

    pub fn offer(&self, order_id: Uuid, offer_id: Uuid) -> Option<DispatchOffer> {
        self.offers
            .get(&order_id)?
            .iter()
            .find(|o| o.id == offer_id)
            .cloned()
    }
}

fn offer_not_found(offer_id: Uuid) -> AppError {
    AppError::NotFound(format!("offer {offer_id} not found"))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::MAX_NOTE_LEN;
    use crate::config::Config;
    use crate::engine::fixtures::World;
    use crate::error::AppError;
    use crate::geo::distance_km;
    use crate::models::actor::Actor;
    use crate::models::event::Event;
    use crate::models::offer::{OfferState, OfferSubmission};
    use crate::models::order::OrderState;

    fn submission(price_per_km: f64) -> OfferSubmission {
        OfferSubmission {
            price_per_km,
            proposed_delivery_time: Utc::now() + Duration::hours(1),
            note: Some("  can be there within the hour ".to_string()),
        }
    }

    #[test]
    fn accept_assigns_driver_and_declines_the_rest() {
        let world = World::new();
        let negotiation = &world.state.negotiation;
        let order = world.open_order();
        let (d1, d2) = (world.driver(), world.driver());
        let o1 = world.offer(order.id, d1, 1.5);
        let o2 = world.offer(order.id, d2, 1.1);

        let acceptance = negotiation.accept(order.id, o2.id, world.customer_id).unwrap();

        assert_eq!(acceptance.order.state, OrderState::Assigned);
        assert_eq!(acceptance.order.assigned_driver_id, Some(d2));
        assert_eq!(acceptance.order.accepted_offer_id, Some(o2.id));
        assert_eq!(
            acceptance.order.confirmed_delivery_time,
            Some(o2.proposed_delivery_time)
        );
        assert_eq!(acceptance.declined_offer_ids, vec![o1.id]);
        assert_eq!(
            negotiation.offer(order.id, o1.id).unwrap().state,
            OfferState::CustomerDeclined
        );
        assert_eq!(
            negotiation.offer(order.id, o2.id).unwrap().state,
            OfferState::CustomerAccepted
        );

        let thread = world.state.chat.thread_for_order(order.id).unwrap();
        assert_eq!(thread.customer_id, world.customer_id);
        assert_eq!(thread.driver_id, d2);
    }

    #[test]
    fn accept_reprices_delivery_at_the_drivers_rate() {
        let world = World::new();
        let order = world.open_order();
        let driver = world.driver();
        let offer = world.offer(order.id, driver, 2.0);

        let acceptance = world
            .state
            .negotiation
            .accept(order.id, offer.id, world.customer_id)
            .unwrap();

        let depot = world.state.directory.depot(world.depot_id).unwrap();
        let km = distance_km(&depot.location, &order.drop);
        let expected = ((km * 2.0) * 100.0).round() / 100.0;
        assert_eq!(acceptance.order.pricing.delivery_fee, expected);
        assert_eq!(acceptance.order.pricing.fuel_cost, order.pricing.fuel_cost);
    }

    #[test]
    fn concurrent_accepts_have_exactly_one_winner() {
        let world = World::new();
        let negotiation = &world.state.negotiation;
        let order = world.open_order();
        let offers: Vec<_> = (0..8)
            .map(|i| {
                let driver = world.driver();
                world.offer(order.id, driver, 1.0 + i as f64 / 10.0)
            })
            .collect();

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = offers
                .iter()
                .map(|offer| {
                    scope.spawn(|| negotiation.accept(order.id, offer.id, world.customer_id))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        for result in results.iter().filter(|r| r.is_err()) {
            assert!(matches!(result, Err(AppError::Conflict(_))));
        }

        let winner = winners[0];
        let order = world.state.lifecycle.get(order.id).unwrap();
        assert_eq!(order.assigned_driver_id, Some(winner.offer.driver_id));

        let listed = negotiation.list_offers(order.id, Actor::System).unwrap();
        let accepted = listed
            .iter()
            .filter(|o| o.state == OfferState::CustomerAccepted)
            .count();
        let declined = listed
            .iter()
            .filter(|o| o.state == OfferState::CustomerDeclined)
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(declined, offers.len() - 1);
        assert_eq!(world.state.metrics.accept_conflicts_total.get(), 7);
    }

    #[test]
    fn accept_on_assigned_order_conflicts_without_touching_offers() {
        let world = World::new();
        let negotiation = &world.state.negotiation;
        let (order, _driver) = world.assigned_order();
        let before = negotiation.list_offers(order.id, Actor::System).unwrap();

        let result = negotiation.accept(order.id, before[0].id, world.customer_id);

        assert!(matches!(result, Err(AppError::Conflict(_))));
        let after = negotiation.list_offers(order.id, Actor::System).unwrap();
        let before: Vec<_> = before.iter().map(|o| (o.id, o.state)).collect();
        let after: Vec<_> = after.iter().map(|o| (o.id, o.state)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn rejected_transition_restores_offers() {
        let world = World::new();
        let negotiation = &world.state.negotiation;
        let order = world.open_order();
        let (d1, d2) = (world.driver(), world.driver());
        let o1 = world.offer(order.id, d1, 1.0);
        let o2 = world.offer(order.id, d2, 1.2);

        world
            .state
            .lifecycle
            .cancel(order.id, Actor::Customer(world.customer_id))
            .unwrap();

        let result = negotiation.accept(order.id, o1.id, world.customer_id);
        assert_eq!(
            result.unwrap_err(),
            AppError::InvalidTransition {
                from: OrderState::Cancelled,
                to: OrderState::Assigned,
            }
        );
        for id in [o1.id, o2.id] {
            assert_eq!(
                negotiation.offer(order.id, id).unwrap().state,
                OfferState::PendingCustomer
            );
        }
        assert!(world.state.chat.thread_for_order(order.id).is_none());
    }

    #[test]
    fn accept_by_another_customer_is_forbidden() {
        let world = World::new();
        let order = world.open_order();
        let offer = world.offer(order.id, world.driver(), 1.0);

        let result = world
            .state
            .negotiation
            .accept(order.id, offer.id, Uuid::new_v4());

        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert_eq!(
            world.state.lifecycle.get(order.id).unwrap().state,
            OrderState::PendingDispatch
        );
    }

    #[test]
    fn accept_unknown_offer_is_not_found() {
        let world = World::new();
        let order = world.open_order();
        world.offer(order.id, world.driver(), 1.0);

        let result = world
            .state
            .negotiation
            .accept(order.id, Uuid::new_v4(), world.customer_id);
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn expired_offer_cannot_be_accepted() {
        let world = World::with_config(Config {
            offer_ttl_secs: 0,
            ..Config::default()
        });
        let order = world.open_order();
        let offer = world.offer(order.id, world.driver(), 1.0);

        let result = world
            .state
            .negotiation
            .accept(order.id, offer.id, world.customer_id);

        assert!(matches!(result, Err(AppError::InvalidState(_))));
        assert_eq!(
            world.state.lifecycle.get(order.id).unwrap().state,
            OrderState::PendingDispatch
        );
    }

    #[test]
    fn submit_requires_pending_dispatch() {
        let world = World::new();
        let negotiation = &world.state.negotiation;
        let driver = world.driver();

        let created = world.created_order();
        assert!(matches!(
            negotiation.submit_offer(created.id, driver, submission(1.0)),
            Err(AppError::InvalidState(_))
        ));

        let (assigned, _) = world.assigned_order();
        assert!(matches!(
            negotiation.submit_offer(assigned.id, driver, submission(1.0)),
            Err(AppError::InvalidState(_))
        ));

        assert!(matches!(
            negotiation.submit_offer(Uuid::new_v4(), driver, submission(1.0)),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn submit_validates_quote() {
        let world = World::new();
        let negotiation = &world.state.negotiation;
        let order = world.open_order();
        let driver = world.driver();

        assert!(matches!(
            negotiation.submit_offer(order.id, driver, submission(0.0)),
            Err(AppError::Validation(_))
        ));

        let mut late = submission(1.0);
        late.proposed_delivery_time = Utc::now() - Duration::minutes(5);
        assert!(matches!(
            negotiation.submit_offer(order.id, driver, late),
            Err(AppError::Validation(_))
        ));

        let mut wordy = submission(1.0);
        wordy.note = Some("x".repeat(MAX_NOTE_LEN + 1));
        assert!(matches!(
            negotiation.submit_offer(order.id, driver, wordy),
            Err(AppError::Validation(_))
        ));

        assert!(matches!(
            negotiation.submit_offer(order.id, Uuid::new_v4(), submission(1.0)),
            Err(AppError::NotFound(_))
        ));

        let offer = negotiation
            .submit_offer(order.id, driver, submission(1.0))
            .unwrap();
        assert_eq!(offer.note.as_deref(), Some("can be there within the hour"));
    }

    #[test]
    fn customer_cannot_bid_on_their_own_order() {
        let mut world = World::new();
        let driver = world.driver();
        world.customer_id = driver;
        let order = world.open_order();

        let result = world
            .state
            .negotiation
            .submit_offer(order.id, driver, submission(1.0));

        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert!(world
            .state
            .negotiation
            .list_offers(order.id, Actor::System)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn inactive_driver_cannot_bid() {
        let world = World::new();
        let order = world.open_order();
        let driver = world.driver();
        world.state.directory.set_driver_active(driver, false).unwrap();

        let result = world
            .state
            .negotiation
            .submit_offer(order.id, driver, submission(1.0));
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        world.state.directory.set_driver_active(driver, true).unwrap();
        world.offer(order.id, driver, 1.0);
    }

    #[test]
    fn duplicate_pending_offer_conflicts() {
        let world = World::new();
        let negotiation = &world.state.negotiation;
        let order = world.open_order();
        let driver = world.driver();

        world.offer(order.id, driver, 1.0);
        let result = negotiation.submit_offer(order.id, driver, submission(0.9));
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[test]
    fn driver_may_requote_after_decline() {
        let world = World::new();
        let negotiation = &world.state.negotiation;
        let order = world.open_order();
        let driver = world.driver();

        let first = world.offer(order.id, driver, 1.4);
        negotiation
            .decline(order.id, first.id, world.customer_id)
            .unwrap();
        let second = negotiation
            .submit_offer(order.id, driver, submission(1.1))
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(
            negotiation.list_offers(order.id, Actor::Driver(driver)).unwrap().len(),
            2
        );
    }

    #[test]
    fn decline_notifies_driver_and_is_not_repeatable() {
        let world = World::new();
        let negotiation = &world.state.negotiation;
        let order = world.open_order();
        let driver = world.driver();
        let offer = world.offer(order.id, driver, 1.0);
        let (_id, mut rx) = world.state.fanout.register(driver);

        assert!(matches!(
            negotiation.decline(order.id, offer.id, Uuid::new_v4()),
            Err(AppError::Forbidden(_))
        ));

        let declined = negotiation
            .decline(order.id, offer.id, world.customer_id)
            .unwrap();
        assert_eq!(declined.state, OfferState::CustomerDeclined);
        assert!(declined.customer_response_at.is_some());

        match rx.try_recv() {
            Ok(Event::OfferUpdated { offer_id, state, .. }) => {
                assert_eq!(offer_id, offer.id);
                assert_eq!(state, OfferState::CustomerDeclined);
            }
            other => panic!("expected offer_updated, got {other:?}"),
        }

        assert!(matches!(
            negotiation.decline(order.id, offer.id, world.customer_id),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn drivers_only_see_their_own_offers() {
        let world = World::new();
        let negotiation = &world.state.negotiation;
        let order = world.open_order();
        let (d1, d2) = (world.driver(), world.driver());
        world.offer(order.id, d1, 1.0);
        world.offer(order.id, d2, 1.3);

        let mine = negotiation.list_offers(order.id, Actor::Driver(d1)).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].driver_id, d1);

        let all = negotiation
            .list_offers(order.id, Actor::Customer(world.customer_id))
            .unwrap();
        assert_eq!(all.len(), 2);

        assert!(matches!(
            negotiation.list_offers(order.id, Actor::Customer(Uuid::new_v4())),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn sweep_expires_only_offers_past_ttl() {
        let world = World::new();
        let negotiation = &world.state.negotiation;
        let order = world.open_order();
        let offer = world.offer(order.id, world.driver(), 1.0);

        assert_eq!(negotiation.expire_stale_at(Utc::now()), 0);

        let later = offer.expires_at + Duration::seconds(1);
        assert_eq!(negotiation.expire_stale_at(later), 1);
        assert_eq!(
            negotiation.offer(order.id, offer.id).unwrap().state,
            OfferState::Expired
        );
        assert_eq!(negotiation.expire_stale_at(later), 0);
    }

    #[test]
    fn sweep_leaves_decided_offers_alone() {
        let world = World::new();
        let negotiation = &world.state.negotiation;
        let (order, _driver) = world.assigned_order();

        let far_future = Utc::now() + Duration::days(30);
        assert_eq!(negotiation.expire_stale_at(far_future), 0);
        let offers = negotiation.list_offers(order.id, Actor::System).unwrap();
        assert_eq!(offers[0].state, OfferState::CustomerAccepted);
    }

    #[test]
    fn sweep_expires_pending_offers_of_closed_orders() {
        let world = World::new();
        let negotiation = &world.state.negotiation;
        let order = world.open_order();
        let offer = world.offer(order.id, world.driver(), 1.0);

        world
            .state
            .lifecycle
            .cancel(order.id, Actor::Customer(world.customer_id))
            .unwrap();

        assert_eq!(negotiation.expire_stale(), 1);
        assert_eq!(
            negotiation.offer(order.id, offer.id).unwrap().state,
            OfferState::Expired
        );
    }

    #[test]
    fn past_ttl_duplicate_is_replaced() {
        let world = World::with_config(Config {
            offer_ttl_secs: 0,
            ..Config::default()
        });
        let negotiation = &world.state.negotiation;
        let order = world.open_order();
        let driver = world.driver();

        let first = world.offer(order.id, driver, 1.0);
        let second = negotiation
            .submit_offer(order.id, driver, submission(1.0))
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(
            negotiation.offer(order.id, first.id).unwrap().state,
            OfferState::Expired
        );
    }
}
