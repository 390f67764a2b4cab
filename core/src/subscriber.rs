use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::event::Event;
use crate::event::EventMask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("consumer is closed")]
    Closed,
    #[error("consumer is full")]
    Full,
}

/// Sink for process events.
///
/// `accept` must not block: a consumer that cannot take the event right away
/// reports failure and is unsubscribed by the fan-out.
pub trait EventConsumer: Send + Sync {
    fn accept(&self, event: Event) -> Result<(), DeliveryError>;
}

impl EventConsumer for mpsc::UnboundedSender<Event> {
    fn accept(&self, event: Event) -> Result<(), DeliveryError> {
        self.send(event).map_err(|_| DeliveryError::Closed)
    }
}

impl EventConsumer for mpsc::Sender<Event> {
    fn accept(&self, event: Event) -> Result<(), DeliveryError> {
        self.try_send(event).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

#[derive(Clone)]
pub struct Subscriber {
    pub id: String,
    pub mask: EventMask,
    pub consumer: Arc<dyn EventConsumer>,
}

impl Subscriber {
    pub fn new(id: impl Into<String>, mask: EventMask, consumer: Arc<dyn EventConsumer>) -> Self {
        Self {
            id: id.into(),
            mask,
            consumer,
        }
    }

    /// Subscriber backed by an unbounded channel; returns the receiving half.
    pub fn channel(
        id: impl Into<String>,
        mask: EventMask,
    ) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(id, mask, Arc::new(tx)), rx)
    }

    pub(crate) fn wants(&self, event: &Event) -> bool {
        self.mask.contains(event.mask_bit())
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("mask", &self.mask)
            .finish_non_exhaustive()
    }
}
