//! Receive loop: decode, coordinate, settle
//!
//! Each message is handled on its own task, up to `max_in_flight` at once.
//! Nothing orders handlers, not even for the same key; the write protocol
//! makes any interleaving converge.
//!
//! | outcome                   | settle |
//! |---------------------------|--------|
//! | decode error              | ack    |
//! | `Stored` / `Skipped`      | ack    |
//! | write error               | nack   |

use crate::common::{DispatchStats, Error, Result};
use crate::coordinator::{PutOutcome, WriteCoordinator};
use crate::ingest::decoder::PayloadDecoder;
use crate::ingest::queue::{Message, MessageSource};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// How a message is settled with the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Nack,
}

/// Decode-and-write for one message. Cheap to clone into handler tasks.
#[derive(Clone)]
pub struct MessageHandler {
    decoder: PayloadDecoder,
    coordinator: Arc<WriteCoordinator>,
    stats: Arc<DispatchStats>,
}

impl MessageHandler {
    pub fn new(coordinator: Arc<WriteCoordinator>, stats: Arc<DispatchStats>) -> Self {
        Self {
            decoder: PayloadDecoder::new(),
            coordinator,
            stats,
        }
    }

    pub async fn handle(&self, message: &Message) -> Disposition {
        let record = match self.decoder.decode(&message.data) {
            Ok(record) => record,
            Err(e) if e.is_decode_error() => {
                tracing::warn!(
                    message_id = %message.id,
                    error = %e,
                    "Rejecting undecodable message"
                );
                self.stats.dropped.inc();
                return Disposition::Ack;
            }
            Err(e) => {
                tracing::error!(message_id = %message.id, error = %e, "Decoder failed");
                self.stats.nacked.inc();
                return Disposition::Nack;
            }
        };

        let key = record.key();
        match self.coordinator.put(&key, &record).await {
            Ok(PutOutcome::Stored) => {
                self.stats.stored.inc();
                Disposition::Ack
            }
            Ok(PutOutcome::Skipped) => {
                self.stats.skipped.inc();
                Disposition::Ack
            }
            Err(e) => {
                if e.is_condition_race() {
                    // Contention on a hot key; the redelivery usually turns into a skip
                    tracing::debug!(
                        message_id = %message.id,
                        key = %key,
                        delivery_attempt = message.delivery_attempt,
                        error = %e,
                        "Lost write race, returning message for redelivery"
                    );
                } else {
                    tracing::warn!(
                        message_id = %message.id,
                        key = %key,
                        delivery_attempt = message.delivery_attempt,
                        error = %e,
                        "Write failed, returning message for redelivery"
                    );
                }
                self.stats.nacked.inc();
                Disposition::Nack
            }
        }
    }
}

pub struct MessageDispatcher {
    source: Arc<dyn MessageSource>,
    handler: MessageHandler,
    stats: Arc<DispatchStats>,
    max_in_flight: usize,
}

impl MessageDispatcher {
    pub fn new(
        source: Arc<dyn MessageSource>,
        coordinator: Arc<WriteCoordinator>,
        max_in_flight: usize,
    ) -> Self {
        let stats = Arc::new(DispatchStats::new());
        Self {
            source,
            handler: MessageHandler::new(coordinator, stats.clone()),
            stats,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }

    /// Run until `shutdown` fires or the source is drained.
    ///
    /// Handlers already running when the loop stops are awaited, never
    /// aborted, so no write is cut off between read and conditional mutation.
    /// A receive error stops the loop and is returned after the drain.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();
        let mut outcome = Ok(());

        tracing::info!(max_in_flight = self.max_in_flight, "Dispatcher started");

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        outcome = Err(Error::Internal(format!("handler permits closed: {}", e)));
                        break;
                    }
                },
            };

            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.source.receive() => received,
            };

            let message = match received {
                Ok(Some(message)) => message,
                Ok(None) => {
                    tracing::info!("Message source drained");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Receive failed, stopping dispatcher");
                    outcome = Err(e);
                    break;
                }
            };
            self.stats.received.inc();

            let source = self.source.clone();
            let handler = self.handler.clone();
            let stats = self.stats.clone();
            tasks.spawn(async move {
                let disposition = handler.handle(&message).await;
                let settled = match disposition {
                    Disposition::Ack => source.ack(&message.id).await,
                    Disposition::Nack => source.nack(&message.id).await,
                };
                if let Err(e) = settled {
                    // The queue redelivers unsettled messages; replay is a no-op.
                    tracing::warn!(
                        message_id = %message.id,
                        ?disposition,
                        error = %e,
                        "Failed to settle message"
                    );
                    stats.ack_failures.inc();
                }
                drop(permit);
            });

            while let Some(joined) = tasks.try_join_next() {
                log_join_error(joined);
            }
        }

        let pending = tasks.len();
        if pending > 0 {
            tracing::info!(pending, "Waiting for in-flight handlers");
        }
        while let Some(joined) = tasks.join_next().await {
            log_join_error(joined);
        }

        let snapshot = self.stats.snapshot();
        tracing::info!(
            received = snapshot.received,
            stored = snapshot.stored,
            skipped = snapshot.skipped,
            dropped = snapshot.dropped,
            nacked = snapshot.nacked,
            "Dispatcher stopped"
        );
        outcome
    }
}

fn log_join_error(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Message handler task failed");
    }
}
