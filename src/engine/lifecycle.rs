//! Order state machine.
//!
//! ```text
//! created -> awaiting_payment -> pending_dispatch -> assigned -> en_route -> picked_up -> delivered
//!    \              \                   \               \
//!     +--------------+-------------------+---------------+--> cancelled
//!  (any non-terminal state) ----------------------------------> refunded
//! ```
//!
//! Every transition is a conditional update on the order's map entry, held
//! exclusively for the duration of the check, the commit and the chat/location
//! side effects. Whichever of two racing transitions takes the entry first
//! wins; the other observes the new state and fails with
//! [`AppError::InvalidTransition`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::directory::Directory;
use crate::engine::chat::ChatThreadCoordinator;
use crate::engine::location::LocationFeed;
use crate::engine::pricing::{self, PricingConfig};
use crate::error::AppError;
use crate::fanout::EventFanout;
use crate::models::actor::Actor;
use crate::models::chat::ChatThread;
use crate::models::event::Event;
use crate::models::order::{NewOrder, Order, OrderEdit, OrderState, StateChange};
use crate::observability::metrics::Metrics;

/// Winning quote handed over by the negotiation engine.
#[derive(Debug, Clone, Copy)]
pub struct Assignment {
    pub driver_id: Uuid,
    pub offer_id: Uuid,
    pub price_per_km: f64,
    pub delivery_time: DateTime<Utc>,
}

/// Side effect that failed during a transition and awaits `reconcile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    OpenChannel,
    CloseChannel,
}

pub struct OrderLifecycleManager {
    orders: DashMap<Uuid, Order>,
    follow_ups: DashMap<Uuid, FollowUp>,
    directory: Arc<Directory>,
    chat: Arc<ChatThreadCoordinator>,
    location: Arc<LocationFeed>,
    fanout: Arc<EventFanout>,
    metrics: Metrics,
    pricing: PricingConfig,
}

impl OrderLifecycleManager {
    pub fn new(
        directory: Arc<Directory>,
        chat: Arc<ChatThreadCoordinator>,
        location: Arc<LocationFeed>,
        fanout: Arc<EventFanout>,
        metrics: Metrics,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            orders: DashMap::new(),
            follow_ups: DashMap::new(),
            directory,
            chat,
            location,
            fanout,
            metrics,
            pricing,
        }
    }

    pub fn create(&self, customer_id: Uuid, payload: NewOrder) -> Result<Order, AppError> {
        if !payload.accepted_terms {
            return Err(AppError::Validation(
                "terms must be accepted before ordering".to_string(),
            ));
        }
        validate_litres(payload.litres)?;
        payload.drop.validate()?;
        let delivery_address = validate_address(&payload.delivery_address)?;
        if !self.directory.fuel_type_exists(payload.fuel_type_id) {
            return Err(AppError::Validation(format!(
                "unknown fuel type {}",
                payload.fuel_type_id
            )));
        }
        let depot = self
            .directory
            .depot(payload.depot_id)
            .map_err(|_| AppError::Validation(format!("unknown depot {}", payload.depot_id)))?;

        let price = pricing::quote(
            &self.pricing,
            &depot,
            payload.fuel_type_id,
            payload.litres,
            &payload.drop,
        )?;

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            customer_id,
            fuel_type_id: payload.fuel_type_id,
            depot_id: depot.id,
            litres: payload.litres,
            drop: payload.drop,
            delivery_address,
            state: OrderState::Created,
            assigned_driver_id: None,
            accepted_offer_id: None,
            confirmed_delivery_time: None,
            pricing: price,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        self.orders.insert(order.id, order.clone());
        self.metrics
            .order_transitions_total
            .with_label_values(&[OrderState::Created.as_str()])
            .inc();
        info!(order_id = %order.id, customer_id = %customer_id, total = order.pricing.total, "order created");

        Ok(order)
    }

    pub fn edit(&self, order_id: Uuid, customer_id: Uuid, edit: OrderEdit) -> Result<Order, AppError> {
        let mut order = self.orders.get_mut(&order_id).ok_or_else(|| not_found(order_id))?;

        if order.customer_id != customer_id {
            return Err(AppError::Forbidden(format!(
                "order {order_id} belongs to another customer"
            )));
        }
        if !order.state.is_editable() {
            return Err(AppError::InvalidState(format!(
                "order {order_id} can no longer be edited (state {})",
                order.state
            )));
        }

        let fuel_type_id = edit.fuel_type_id.unwrap_or(order.fuel_type_id);
        let depot_id = edit.depot_id.unwrap_or(order.depot_id);
        let litres = edit.litres.unwrap_or(order.litres);
        let drop = edit.drop.unwrap_or(order.drop);
        let delivery_address = match edit.delivery_address.as_deref() {
            Some(address) => validate_address(address)?,
            None => order.delivery_address.clone(),
        };

        validate_litres(litres)?;
        drop.validate()?;
        if !self.directory.fuel_type_exists(fuel_type_id) {
            return Err(AppError::Validation(format!("unknown fuel type {fuel_type_id}")));
        }
        let depot = self
            .directory
            .depot(depot_id)
            .map_err(|_| AppError::Validation(format!("unknown depot {depot_id}")))?;
        let price = pricing::quote(&self.pricing, &depot, fuel_type_id, litres, &drop)?;

        order.fuel_type_id = fuel_type_id;
        order.depot_id = depot_id;
        order.litres = litres;
        order.drop = drop;
        order.delivery_address = delivery_address;
        order.pricing = price;
        order.updated_at = Utc::now();

        info!(order_id = %order_id, total = order.pricing.total, "order edited");
        Ok(order.clone())
    }

    /// Idempotent: an already cancelled order is returned unchanged.
    pub fn cancel(&self, order_id: Uuid, actor: Actor) -> Result<Order, AppError> {
        let mut order = self.orders.get_mut(&order_id).ok_or_else(|| not_found(order_id))?;

        if order.state == OrderState::Cancelled {
            self.authorize(&order, OrderState::Cancelled, actor)?;
            return Ok(order.clone());
        }

        self.apply(&mut order, OrderState::Cancelled, actor, |_| {})?;
        Ok(order.clone())
    }

    pub fn advance(&self, order_id: Uuid, target: OrderState, actor: Actor) -> Result<Order, AppError> {
        if target == OrderState::Assigned {
            return Err(AppError::InvalidState(
                "orders are assigned by accepting a driver's offer".to_string(),
            ));
        }

        let mut order = self.orders.get_mut(&order_id).ok_or_else(|| not_found(order_id))?;
        self.apply(&mut order, target, actor, |_| {})?;
        Ok(order.clone())
    }

    /// Moves the order to `assigned` for the quote chosen by `select`.
    ///
    /// `select` runs while the order is held exclusively and may stage changes
    /// elsewhere; if the transition is then rejected, `undo` receives the
    /// staged value so those changes can be reverted.
    pub fn assign<T>(
        &self,
        order_id: Uuid,
        select: impl FnOnce(&Order) -> Result<(Assignment, T), AppError>,
        undo: impl FnOnce(T),
    ) -> Result<(Order, T), AppError> {
        let mut order = self.orders.get_mut(&order_id).ok_or_else(|| not_found(order_id))?;

        let (assignment, staged) = select(&*order)?;

        let depot_location = match self.directory.depot(order.depot_id) {
            Ok(depot) => depot.location,
            Err(err) => {
                undo(staged);
                return Err(err);
            }
        };

        let rates = self.pricing;
        let applied = self.apply(&mut order, OrderState::Assigned, Actor::System, |order| {
            order.assigned_driver_id = Some(assignment.driver_id);
            order.accepted_offer_id = Some(assignment.offer_id);
            order.confirmed_delivery_time = Some(assignment.delivery_time);
            order.pricing = pricing::reprice_delivery(
                &rates,
                &order.pricing,
                &depot_location,
                &order.drop,
                assignment.price_per_km,
            );
        });

        match applied {
            Ok(()) => Ok((order.clone(), staged)),
            Err(err) => {
                warn!(order_id = %order_id, error = %err, "assignment rejected; rolling back");
                undo(staged);
                Err(err)
            }
        }
    }

    /// Get-or-create the order's chat thread for one of its participants.
    pub fn open_chat(&self, order_id: Uuid, viewer_id: Uuid) -> Result<ChatThread, AppError> {
        let order = self.orders.get(&order_id).ok_or_else(|| not_found(order_id))?;

        let is_customer = order.customer_id == viewer_id;
        let is_driver = order.assigned_driver_id == Some(viewer_id);
        if !is_customer && !is_driver {
            return Err(AppError::Forbidden(format!(
                "user {viewer_id} is not a participant of order {order_id}"
            )));
        }
        if !order.state.in_assignment_window() {
            return Err(AppError::InvalidState(format!(
                "chat is only available during an active delivery (order is {})",
                order.state
            )));
        }

        let driver_id = order.assigned_driver_id.ok_or_else(|| {
            AppError::Internal(format!("order {order_id} is {} without a driver", order.state))
        })?;
        self.chat.ensure_thread(order_id, order.customer_id, driver_id)
    }

    /// Runs `f` with the order held shared, blocking concurrent transitions.
    pub fn with_order<T>(
        &self,
        order_id: Uuid,
        f: impl FnOnce(&Order) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let order = self.orders.get(&order_id).ok_or_else(|| not_found(order_id))?;
        f(&*order)
    }

    pub fn get(&self, order_id: Uuid) -> Result<Order, AppError> {
        self.orders
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found(order_id))
    }

    /// Order as seen by `actor`. Drivers may look at open orders before bidding.
    pub fn view(&self, order_id: Uuid, actor: Actor) -> Result<Order, AppError> {
        self.with_order(order_id, |order| {
            let visible = match actor {
                Actor::Customer(id) => order.customer_id == id,
                Actor::Driver(id) => {
                    order.assigned_driver_id == Some(id)
                        || order.state == OrderState::PendingDispatch
                }
                Actor::Payment | Actor::System => true,
            };
            if visible {
                Ok(order.clone())
            } else {
                Err(AppError::Forbidden(format!("order {order_id} is not visible to caller")))
            }
        })
    }

    pub fn state_of(&self, order_id: Uuid) -> Option<OrderState> {
        self.orders.get(&order_id).map(|entry| entry.state)
    }

    pub fn list_for_customer(&self, customer_id: Uuid) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.customer_id == customer_id)
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    pub fn list_open(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.state == OrderState::PendingDispatch)
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|order| order.created_at);
        orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn pending_follow_ups(&self) -> Vec<(Uuid, FollowUp)> {
        self.follow_ups
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    /// Retries side effects that failed during earlier transitions. Returns
    /// how many follow-ups were resolved.
    pub fn reconcile(&self) -> usize {
        let pending: Vec<Uuid> = self.follow_ups.iter().map(|entry| *entry.key()).collect();
        let mut resolved = 0;

        for order_id in pending {
            let Some(order) = self.orders.get(&order_id) else {
                self.follow_ups.remove(&order_id);
                continue;
            };

            if order.state.in_assignment_window() {
                self.open_channel(&order);
            } else if order.state.is_terminal() {
                self.close_channel(&order);
            } else {
                self.follow_ups.remove(&order_id);
            }

            if !self.follow_ups.contains_key(&order_id) {
                resolved += 1;
            }
        }

        if resolved > 0 {
            info!(resolved, "lifecycle follow-ups reconciled");
        }
        resolved
    }

    fn authorize(&self, order: &Order, target: OrderState, actor: Actor) -> Result<(), AppError> {
        if !OrderState::permitted_roles(target).contains(&actor.role()) {
            return Err(AppError::Forbidden(format!(
                "{:?} may not move an order to {target}",
                actor.role()
            )));
        }

        match actor {
            Actor::Customer(id) if id != order.customer_id => Err(AppError::Forbidden(format!(
                "order {} belongs to another customer",
                order.id
            ))),
            Actor::Driver(id) if order.assigned_driver_id != Some(id) => Err(AppError::Forbidden(
                format!("driver {id} is not assigned to order {}", order.id),
            )),
            _ => Ok(()),
        }
    }

    fn apply(
        &self,
        order: &mut Order,
        target: OrderState,
        actor: Actor,
        mutate: impl FnOnce(&mut Order),
    ) -> Result<(), AppError> {
        self.authorize(order, target, actor)?;

        let from = order.state;
        if !from.can_transition_to(target) {
            return Err(AppError::InvalidTransition { from, to: target });
        }

        mutate(order);
        let now = Utc::now();
        order.state = target;
        order.updated_at = now;
        order.history.push(StateChange {
            from,
            to: target,
            actor: actor.role(),
            at: now,
        });

        self.on_enter(order, from);
        Ok(())
    }

    fn on_enter(&self, order: &Order, from: OrderState) {
        self.metrics
            .order_transitions_total
            .with_label_values(&[order.state.as_str()])
            .inc();
        info!(order_id = %order.id, from = %from, to = %order.state, "order transitioned");

        let changed = Event::OrderStateChanged {
            order_id: order.id,
            from,
            to: order.state,
            at: order.updated_at,
        };
        self.fanout.notify(order.customer_id, changed.clone());
        if let Some(driver_id) = order.assigned_driver_id {
            self.fanout.notify(driver_id, changed);
        }

        match order.state {
            OrderState::PendingDispatch => {
                for driver_id in self.directory.active_driver_ids() {
                    self.fanout.notify(
                        driver_id,
                        Event::OrderAvailable {
                            order_id: order.id,
                            litres: order.litres,
                            fuel_type_id: order.fuel_type_id,
                        },
                    );
                }
            }
            OrderState::Assigned => self.open_channel(order),
            state if state.is_terminal() => self.close_channel(order),
            _ => {}
        }
    }

    fn open_channel(&self, order: &Order) {
        let Some(driver_id) = order.assigned_driver_id else {
            error!(order_id = %order.id, state = %order.state, "assignment window without driver");
            return;
        };

        self.location.arm(order.id, driver_id, order.customer_id);

        match self.chat.ensure_thread(order.id, order.customer_id, driver_id) {
            Ok(_) => {
                self.follow_ups.remove(&order.id);
            }
            Err(err) => {
                error!(order_id = %order.id, error = %err, "failed to open chat thread; will retry");
                self.metrics
                    .side_effect_failures_total
                    .with_label_values(&["ensure_thread"])
                    .inc();
                self.follow_ups.insert(order.id, FollowUp::OpenChannel);
            }
        }
    }

    fn close_channel(&self, order: &Order) {
        self.location.disarm(order.id);

        match self.chat.teardown(order.id) {
            Ok(_) => {
                self.follow_ups.remove(&order.id);
            }
            Err(err) => {
                error!(order_id = %order.id, error = %err, "failed to tear down chat thread; will retry");
                self.metrics
                    .side_effect_failures_total
                    .with_label_values(&["teardown"])
                    .inc();
                self.follow_ups.insert(order.id, FollowUp::CloseChannel);
            }
        }
    }
}

fn not_found(order_id: Uuid) -> AppError {
    AppError::NotFound(format!("order {order_id} not found"))
}

fn validate_litres(litres: f64) -> Result<(), AppError> {
    if !litres.is_finite() || litres <= 0.0 {
        return Err(AppError::Validation("litres must be > 0".to_string()));
    }
    Ok(())
}

fn validate_address(address: &str) -> Result<String, AppError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(AppError::Validation(
            "delivery address cannot be empty".to_string(),
        ));
    }
    Ok(address.to_string())
}
