//! Per-user push registry.
//!
//! Each connected client owns a bounded channel registered under its user id.
//! `notify` is best-effort: offline users are skipped and a full or closed
//! channel drops the event for that connection only.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::event::Event;
use crate::observability::metrics::Metrics;

pub type ConnectionId = u64;

struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<Event>,
}

pub struct EventFanout {
    connections: DashMap<Uuid, Vec<Connection>>,
    next_id: AtomicU64,
    buffer_size: usize,
    metrics: Metrics,
}

impl EventFanout {
    pub fn new(buffer_size: usize, metrics: Metrics) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer_size: buffer_size.max(1),
            metrics,
        }
    }

    pub fn register(&self, user_id: Uuid) -> (ConnectionId, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.connections
            .entry(user_id)
            .or_default()
            .push(Connection { id, tx });
        self.metrics.connected_clients.inc();

        debug!(user_id = %user_id, connection_id = id, "push connection registered");
        (id, rx)
    }

    /// Idempotent: unknown connections are ignored.
    pub fn unregister(&self, user_id: Uuid, connection_id: ConnectionId) {
        let removed = match self.connections.get_mut(&user_id) {
            Some(mut conns) => {
                let before = conns.len();
                conns.retain(|conn| conn.id != connection_id);
                before - conns.len()
            }
            None => 0,
        };

        self.connections
            .remove_if(&user_id, |_, conns| conns.is_empty());

        if removed > 0 {
            self.metrics.connected_clients.sub(removed as i64);
            debug!(user_id = %user_id, connection_id, "push connection unregistered");
        }
    }

    /// Returns how many connections accepted the event.
    pub fn notify(&self, user_id: Uuid, event: Event) -> usize {
        let Some(mut conns) = self.connections.get_mut(&user_id) else {
            return 0;
        };

        let mut delivered = 0;
        let before = conns.len();
        conns.retain(|conn| match conn.tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(
                    user_id = %user_id,
                    connection_id = conn.id,
                    event = event.kind(),
                    "push buffer full; dropping event"
                );
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });

        let pruned = before - conns.len();
        drop(conns);
        if pruned > 0 {
            self.metrics.connected_clients.sub(pruned as i64);
            self.connections
                .remove_if(&user_id, |_, conns| conns.is_empty());
        }

        delivered
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.connections
            .get(&user_id)
            .is_some_and(|conns| !conns.is_empty())
    }
}
