//! Chat channel bound 1:1 to an order's driver assignment.
//!
//! Threads are indexed by order and by thread id. `ensure_thread` holds the
//! order index entry while inserting, so concurrent callers converge on one
//! thread. Sends only ever mutate an existing thread record; once `teardown`
//! removed it, a racing send fails with [`AppError::ThreadClosed`].

use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::fanout::EventFanout;
use crate::models::chat::{ChatMessage, ChatThread};
use crate::models::event::Event;
use crate::observability::metrics::Metrics;

pub const MAX_MESSAGE_LEN: usize = 2000;

struct ThreadRecord {
    thread: ChatThread,
    messages: Vec<ChatMessage>,
}

pub struct ChatThreadCoordinator {
    threads: DashMap<Uuid, ThreadRecord>,
    by_order: DashMap<Uuid, Uuid>,
    fanout: Arc<EventFanout>,
    metrics: Metrics,
}

impl ChatThreadCoordinator {
    pub fn new(fanout: Arc<EventFanout>, metrics: Metrics) -> Self {
        Self {
            threads: DashMap::new(),
            by_order: DashMap::new(),
            fanout,
            metrics,
        }
    }

    pub fn ensure_thread(
        &self,
        order_id: Uuid,
        customer_id: Uuid,
        driver_id: Uuid,
    ) -> Result<ChatThread, AppError> {
        if customer_id == driver_id {
            return Err(AppError::Validation(
                "chat participants must be distinct".to_string(),
            ));
        }

        let thread = match self.by_order.entry(order_id) {
            Entry::Occupied(entry) => {
                let thread_id = *entry.get();
                let record = self.threads.get(&thread_id).ok_or_else(|| {
                    AppError::Internal(format!(
                        "order {order_id} indexes missing chat thread {thread_id}"
                    ))
                })?;
                if record.thread.driver_id != driver_id || record.thread.customer_id != customer_id
                {
                    return Err(AppError::Conflict(format!(
                        "order {order_id} already has a chat thread with other participants"
                    )));
                }
                record.thread.clone()
            }
            Entry::Vacant(entry) => {
                let thread = ChatThread {
                    id: Uuid::new_v4(),
                    order_id,
                    customer_id,
                    driver_id,
                    created_at: Utc::now(),
                    last_message_at: None,
                };
                self.threads.insert(
                    thread.id,
                    ThreadRecord {
                        thread: thread.clone(),
                        messages: Vec::new(),
                    },
                );
                entry.insert(thread.id);
                self.metrics.active_chat_threads.inc();
                info!(order_id = %order_id, thread_id = %thread.id, "chat thread opened");
                thread
            }
        };

        let ready = Event::ChatReady {
            order_id,
            thread_id: thread.id,
        };
        self.fanout.notify(customer_id, ready.clone());
        self.fanout.notify(driver_id, ready);

        Ok(thread)
    }

    /// Deletes the order's thread with all its messages. Returns whether a
    /// thread existed.
    pub fn teardown(&self, order_id: Uuid) -> Result<bool, AppError> {
        let Some((_, thread_id)) = self.by_order.remove(&order_id) else {
            return Ok(false);
        };

        let (_, record) = self.threads.remove(&thread_id).ok_or_else(|| {
            AppError::Internal(format!(
                "order {order_id} indexed chat thread {thread_id} that no longer exists"
            ))
        })?;
        self.metrics.active_chat_threads.dec();

        info!(
            order_id = %order_id,
            thread_id = %thread_id,
            messages = record.messages.len(),
            "chat thread torn down"
        );

        let closed = Event::ChatClosed {
            order_id,
            thread_id,
        };
        self.fanout.notify(record.thread.customer_id, closed.clone());
        self.fanout.notify(record.thread.driver_id, closed);

        Ok(true)
    }

    pub fn thread_for_order(&self, order_id: Uuid) -> Option<ChatThread> {
        let thread_id = *self.by_order.get(&order_id)?;
        self.threads
            .get(&thread_id)
            .map(|record| record.thread.clone())
    }

    pub fn thread(&self, thread_id: Uuid, viewer_id: Uuid) -> Result<ChatThread, AppError> {
        let record = self
            .threads
            .get(&thread_id)
            .ok_or_else(|| closed(thread_id))?;
        ensure_participant(&record.thread, viewer_id)?;
        Ok(record.thread.clone())
    }

    pub fn send_message(
        &self,
        thread_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> Result<ChatMessage, AppError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::Validation("message body cannot be empty".to_string()));
        }
        if body.chars().count() > MAX_MESSAGE_LEN {
            return Err(AppError::Validation(format!(
                "message body exceeds {MAX_MESSAGE_LEN} characters"
            )));
        }

        let (message, recipient) = {
            let mut record = self
                .threads
                .get_mut(&thread_id)
                .ok_or_else(|| closed(thread_id))?;

            let sender_role = record.thread.role_of(sender_id).ok_or_else(|| {
                AppError::Forbidden(format!("user {sender_id} is not part of this chat"))
            })?;

            let now = Utc::now();
            let message = ChatMessage {
                id: Uuid::new_v4(),
                thread_id,
                sender_id,
                sender_role,
                body: body.to_string(),
                read: false,
                read_at: None,
                created_at: now,
            };
            record.messages.push(message.clone());
            record.thread.last_message_at = Some(now);

            (message, record.thread.counterpart_of(sender_id))
        };

        self.fanout.notify(
            recipient,
            Event::ChatMessage {
                message: message.clone(),
            },
        );

        Ok(message)
    }

    /// Sends through the order's current thread.
    pub fn send_for_order(
        &self,
        order_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> Result<ChatMessage, AppError> {
        let thread_id = self
            .by_order
            .get(&order_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| {
                AppError::ThreadClosed(format!("order {order_id} has no open chat thread"))
            })?;
        self.send_message(thread_id, sender_id, body)
    }

    pub fn list_messages(
        &self,
        thread_id: Uuid,
        viewer_id: Uuid,
    ) -> Result<Vec<ChatMessage>, AppError> {
        let record = self
            .threads
            .get(&thread_id)
            .ok_or_else(|| closed(thread_id))?;
        ensure_participant(&record.thread, viewer_id)?;
        Ok(record.messages.clone())
    }

    /// Marks the counterpart's unread messages as read; returns how many changed.
    pub fn mark_read(&self, thread_id: Uuid, reader_id: Uuid) -> Result<usize, AppError> {
        let mut record = self
            .threads
            .get_mut(&thread_id)
            .ok_or_else(|| closed(thread_id))?;
        ensure_participant(&record.thread, reader_id)?;

        let now = Utc::now();
        let mut marked = 0;
        for message in record
            .messages
            .iter_mut()
            .filter(|m| m.sender_id != reader_id && !m.read)
        {
            message.read = true;
            message.read_at = Some(now);
            marked += 1;
        }
        Ok(marked)
    }

    pub fn open_threads(&self) -> usize {
        self.threads.len()
    }
}

fn closed(thread_id: Uuid) -> AppError {
    AppError::ThreadClosed(format!("chat thread {thread_id} is closed"))
}

fn ensure_participant(thread: &ChatThread, user_id: Uuid) -> Result<(), AppError> {
    thread
        .role_of(user_id)
        .map(|_| ())
        .ok_or_else(|| AppError::Forbidden(format!("user {user_id} is not part of this chat")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::ChatThreadCoordinator;
    use crate::error::AppError;
    use crate::fanout::EventFanout;
    use crate::models::chat::SenderRole;
    use crate::models::event::Event;
    use crate::observability::metrics::Metrics;

    fn coordinator() -> (ChatThreadCoordinator, Arc<EventFanout>) {
        let metrics = Metrics::new();
        let fanout = Arc::new(EventFanout::new(16, metrics.clone()));
        (ChatThreadCoordinator::new(fanout.clone(), metrics), fanout)
    }

    #[test]
    fn ensure_thread_is_idempotent_and_renotifies() {
        let (chat, fanout) = coordinator();
        let (order, customer, driver) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (_id, mut customer_rx) = fanout.register(customer);

        let first = chat.ensure_thread(order, customer, driver).unwrap();
        let second = chat.ensure_thread(order, customer, driver).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(chat.open_threads(), 1);
        for _ in 0..2 {
            match customer_rx.try_recv() {
                Ok(Event::ChatReady { thread_id, .. }) => assert_eq!(thread_id, first.id),
                other => panic!("expected chat_ready, got {other:?}"),
            }
        }
    }

    #[test]
    fn teardown_deletes_thread_and_blocks_later_sends() {
        let (chat, fanout) = coordinator();
        let (order, customer, driver) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let thread = chat.ensure_thread(order, customer, driver).unwrap();
        chat.send_message(thread.id, customer, "where are you?").unwrap();

        let (_id, mut driver_rx) = fanout.register(driver);
        assert!(chat.teardown(order).unwrap());

        assert!(matches!(
            driver_rx.try_recv(),
            Ok(Event::ChatClosed { thread_id, .. }) if thread_id == thread.id
        ));
        assert!(matches!(
            chat.send_message(thread.id, driver, "here"),
            Err(AppError::ThreadClosed(_))
        ));
        assert!(chat.list_messages(thread.id, customer).is_err());
        assert!(chat.thread_for_order(order).is_none());
    }

    #[test]
    fn teardown_without_thread_is_a_no_op() {
        let (chat, _fanout) = coordinator();
        assert!(!chat.teardown(Uuid::new_v4()).unwrap());
    }

    #[test]
    fn sending_before_a_thread_exists_is_rejected() {
        let (chat, _fanout) = coordinator();
        let result = chat.send_for_order(Uuid::new_v4(), Uuid::new_v4(), "hello");
        assert!(matches!(result, Err(AppError::ThreadClosed(_))));
    }

    #[test]
    fn outsiders_cannot_read_or_write() {
        let (chat, _fanout) = coordinator();
        let thread = chat
            .ensure_thread(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
            .unwrap();
        let outsider = Uuid::new_v4();

        assert!(matches!(
            chat.send_message(thread.id, outsider, "hi"),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            chat.list_messages(thread.id, outsider),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn blank_and_oversized_bodies_are_rejected() {
        let (chat, _fanout) = coordinator();
        let customer = Uuid::new_v4();
        let thread = chat
            .ensure_thread(Uuid::new_v4(), customer, Uuid::new_v4())
            .unwrap();

        assert!(matches!(
            chat.send_message(thread.id, customer, "   "),
            Err(AppError::Validation(_))
        ));
        let long = "x".repeat(super::MAX_MESSAGE_LEN + 1);
        assert!(matches!(
            chat.send_message(thread.id, customer, &long),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn mark_read_only_touches_counterpart_messages() {
        let (chat, _fanout) = coordinator();
        let (customer, driver) = (Uuid::new_v4(), Uuid::new_v4());
        let thread = chat.ensure_thread(Uuid::new_v4(), customer, driver).unwrap();

        chat.send_message(thread.id, driver, "on my way").unwrap();
        chat.send_message(thread.id, driver, "5 minutes").unwrap();
        chat.send_message(thread.id, customer, "thanks").unwrap();

        assert_eq!(chat.mark_read(thread.id, customer).unwrap(), 2);
        assert_eq!(chat.mark_read(thread.id, customer).unwrap(), 0);

        let messages = chat.list_messages(thread.id, driver).unwrap();
        assert!(messages
            .iter()
            .filter(|m| m.sender_role == SenderRole::Driver)
            .all(|m| m.read && m.read_at.is_some()));
        assert!(messages
            .iter()
            .filter(|m| m.sender_role == SenderRole::Customer)
            .all(|m| !m.read));
    }

    #[test]
    fn concurrent_ensure_converges_on_one_thread() {
        let (chat, _fanout) = coordinator();
        let (order, customer, driver) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let ids: Vec<Uuid> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| chat.ensure_thread(order, customer, driver).unwrap().id))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(chat.open_threads(), 1);
    }
}
