//! Message sources
//!
//! `MessageSource` is the subscription side of an at-least-once queue: every
//! received message must eventually be acked (done) or nacked (redeliver).
//! `MemoryQueue` is an in-process implementation with a bounded delivery
//! count and a dead-letter list.

use crate::common::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use uuid::Uuid;

/// One delivery of a queued message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub data: Bytes,
    /// 1 on first delivery, incremented on each redelivery
    pub delivery_attempt: u32,
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Next message, or `None` once the source is closed and drained.
    async fn receive(&self) -> Result<Option<Message>>;

    async fn ack(&self, id: &str) -> Result<()>;

    /// Hand the message back for redelivery.
    async fn nack(&self, id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Message>,
    in_flight: HashMap<String, Message>,
    dead_letters: Vec<Message>,
    acked: u64,
    closed: bool,
}

/// In-process at-least-once queue
#[derive(Debug)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    max_deliveries: u32,
}

impl MemoryQueue {
    pub fn new(max_deliveries: u32) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            max_deliveries: max_deliveries.max(1),
        }
    }

    /// Enqueue a message and return its id.
    pub fn publish(&self, data: impl Into<Bytes>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        {
            let mut state = self.lock();
            if state.closed {
                return Err(Error::Internal("queue is closed".into()));
            }
            state.ready.push_back(Message {
                id: id.clone(),
                data: data.into(),
                delivery_attempt: 0,
            });
        }
        self.notify.notify_waiters();
        Ok(id)
    }

    /// Stop accepting publishes. Receivers see `None` once nothing is ready
    /// or in flight.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn acked(&self) -> u64 {
        self.lock().acked
    }

    /// Messages nacked `max_deliveries` times
    pub fn dead_letters(&self) -> Vec<Message> {
        self.lock().dead_letters.clone()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MessageSource for MemoryQueue {
    async fn receive(&self) -> Result<Option<Message>> {
        loop {
            // Register before checking so a publish in between is not missed
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if let Some(mut message) = state.ready.pop_front() {
                    message.delivery_attempt += 1;
                    state.in_flight.insert(message.id.clone(), message.clone());
                    return Ok(Some(message));
                }
                if state.closed && state.in_flight.is_empty() {
                    return Ok(None);
                }
            }
            notified.await;
        }
    }

    async fn ack(&self, id: &str) -> Result<()> {
        {
            let mut state = self.lock();
            state
                .in_flight
                .remove(id)
                .ok_or_else(|| Error::UnknownMessage(id.to_string()))?;
            state.acked += 1;
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn nack(&self, id: &str) -> Result<()> {
        {
            // Requeue under the same lock so a closed queue never looks drained mid-nack
            let mut state = self.lock();
            let message = state
                .in_flight
                .remove(id)
                .ok_or_else(|| Error::UnknownMessage(id.to_string()))?;
            if message.delivery_attempt >= self.max_deliveries {
                tracing::warn!(
                    message_id = %message.id,
                    deliveries = message.delivery_attempt,
                    "Delivery limit reached, dead-lettering"
                );
                state.dead_letters.push(message);
            } else {
                state.ready.push_back(message);
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }
}
