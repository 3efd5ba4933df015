//! Driver GPS ingestion and "best known position" resolution.
//!
//! Samples are stored per driver and never touch order state. An order is
//! *armed* from assignment until it reaches a terminal state; only the armed
//! order's customer may read the driver's position, and only armed orders
//! receive pushed updates.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::fanout::EventFanout;
use crate::models::event::Event;
use crate::models::location::{
    DriverLocationSample, GeoPoint, LocationReport, LocationSource, ResolvedLocation,
};
use crate::observability::metrics::Metrics;

const MAX_CLOCK_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy)]
struct Watch {
    driver_id: Uuid,
    customer_id: Uuid,
    armed_at: DateTime<Utc>,
}

pub struct LocationFeed {
    history: DashMap<Uuid, VecDeque<DriverLocationSample>>,
    current: DashMap<Uuid, DriverLocationSample>,
    bases: DashMap<Uuid, GeoPoint>,
    watches: DashMap<Uuid, Watch>,
    /// driver id -> (order id -> customer id)
    watchers: DashMap<Uuid, HashMap<Uuid, Uuid>>,
    fanout: Arc<EventFanout>,
    metrics: Metrics,
    freshness: Duration,
    history_limit: usize,
}

impl LocationFeed {
    pub fn new(
        fanout: Arc<EventFanout>,
        metrics: Metrics,
        freshness_secs: i64,
        history_limit: usize,
    ) -> Self {
        Self {
            history: DashMap::new(),
            current: DashMap::new(),
            bases: DashMap::new(),
            watches: DashMap::new(),
            watchers: DashMap::new(),
            fanout,
            metrics,
            freshness: Duration::seconds(freshness_secs),
            history_limit: history_limit.max(1),
        }
    }

    pub fn set_base(&self, driver_id: Uuid, base: GeoPoint) {
        self.bases.insert(driver_id, base);
    }

    pub fn record(
        &self,
        driver_id: Uuid,
        report: LocationReport,
    ) -> Result<DriverLocationSample, AppError> {
        self.record_at(driver_id, report, Utc::now())
    }

    pub fn record_at(
        &self,
        driver_id: Uuid,
        report: LocationReport,
        now: DateTime<Utc>,
    ) -> Result<DriverLocationSample, AppError> {
        GeoPoint {
            lat: report.lat,
            lng: report.lng,
        }
        .validate()?;

        if report
            .accuracy
            .is_some_and(|accuracy| !accuracy.is_finite() || accuracy < 0.0)
        {
            return Err(AppError::Validation("accuracy must be >= 0".to_string()));
        }

        let recorded_at = report.recorded_at.unwrap_or(now);
        if recorded_at > now + Duration::seconds(MAX_CLOCK_SKEW_SECS) {
            return Err(AppError::Validation(
                "recorded_at is too far in the future".to_string(),
            ));
        }

        let sample = DriverLocationSample {
            driver_id,
            lat: report.lat,
            lng: report.lng,
            accuracy: report.accuracy,
            recorded_at,
        };

        {
            let mut history = self.history.entry(driver_id).or_default();
            history.push_back(sample.clone());
            while history.len() > self.history_limit {
                history.pop_front();
            }
        }

        self.current
            .entry(driver_id)
            .and_modify(|cached| {
                if sample.recorded_at >= cached.recorded_at {
                    *cached = sample.clone();
                }
            })
            .or_insert_with(|| sample.clone());
        self.metrics.location_samples_total.inc();

        let audience: Vec<(Uuid, Uuid)> = self
            .watchers
            .get(&driver_id)
            .map(|orders| orders.iter().map(|(o, c)| (*o, *c)).collect())
            .unwrap_or_default();

        for (order_id, customer_id) in audience {
            self.fanout.notify(
                customer_id,
                Event::LocationUpdate {
                    order_id,
                    sample: sample.clone(),
                },
            );
        }

        Ok(sample)
    }

    /// Starts exposing `driver_id`'s position to the order's customer.
    pub fn arm(&self, order_id: Uuid, driver_id: Uuid, customer_id: Uuid) {
        // re-arming keeps the original start of the tracked window
        self.watches
            .entry(order_id)
            .and_modify(|watch| {
                watch.driver_id = driver_id;
                watch.customer_id = customer_id;
            })
            .or_insert_with(|| Watch {
                driver_id,
                customer_id,
                armed_at: Utc::now(),
            });
        self.watchers
            .entry(driver_id)
            .or_default()
            .insert(order_id, customer_id);
        debug!(order_id = %order_id, driver_id = %driver_id, "location tracking armed");
    }

    /// Idempotent.
    pub fn disarm(&self, order_id: Uuid) {
        let Some((_, watch)) = self.watches.remove(&order_id) else {
            return;
        };
        if let Some(mut orders) = self.watchers.get_mut(&watch.driver_id) {
            orders.remove(&order_id);
        }
        self.watchers
            .remove_if(&watch.driver_id, |_, orders| orders.is_empty());
        debug!(order_id = %order_id, driver_id = %watch.driver_id, "location tracking disarmed");
    }

    pub fn is_armed(&self, order_id: Uuid) -> bool {
        self.watches.contains_key(&order_id)
    }

    pub fn resolve(&self, order_id: Uuid, viewer_id: Uuid) -> Result<ResolvedLocation, AppError> {
        self.resolve_at(order_id, viewer_id, Utc::now())
    }

    pub fn resolve_at(
        &self,
        order_id: Uuid,
        viewer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ResolvedLocation, AppError> {
        let watch = self.authorize(order_id, viewer_id)?;

        if let Some(sample) = self.current.get(&watch.driver_id) {
            let source = if now - sample.recorded_at <= self.freshness {
                LocationSource::Realtime
            } else {
                LocationSource::LastKnown
            };
            return Ok(ResolvedLocation {
                order_id,
                driver_id: watch.driver_id,
                lat: sample.lat,
                lng: sample.lng,
                accuracy: sample.accuracy,
                recorded_at: Some(sample.recorded_at),
                source,
            });
        }

        let base = self.bases.get(&watch.driver_id).ok_or_else(|| {
            AppError::NotFound(format!("no location known for driver {}", watch.driver_id))
        })?;
        Ok(ResolvedLocation {
            order_id,
            driver_id: watch.driver_id,
            lat: base.lat,
            lng: base.lng,
            accuracy: None,
            recorded_at: None,
            source: LocationSource::Default,
        })
    }

    /// Samples of the assigned driver recorded since the order was armed.
    pub fn history(
        &self,
        order_id: Uuid,
        viewer_id: Uuid,
    ) -> Result<Vec<DriverLocationSample>, AppError> {
        let watch = self.authorize(order_id, viewer_id)?;

        let mut samples: Vec<DriverLocationSample> = self
            .history
            .get(&watch.driver_id)
            .map(|history| {
                history
                    .iter()
                    .filter(|s| s.recorded_at >= watch.armed_at)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        samples.sort_by_key(|s| s.recorded_at);
        Ok(samples)
    }

    fn authorize(&self, order_id: Uuid, viewer_id: Uuid) -> Result<Watch, AppError> {
        let watch = self
            .watches
            .get(&order_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| {
                AppError::Forbidden(format!("order {order_id} has no active delivery to track"))
            })?;
        if watch.customer_id != viewer_id {
            return Err(AppError::Forbidden(format!(
                "user {viewer_id} may not track order {order_id}"
            )));
        }
        Ok(watch)
    }
}
