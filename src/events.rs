//! Typed publish/subscribe for engine events
//!
//! Engines push events into an unbounded channel as they happen. The owning
//! manager drains the channel from the UI loop and hands each event to every
//! subscriber, synchronously and in registration order. Dropping the channel
//! on teardown guarantees no handler runs against a destroyed instance.

use tokio::sync::mpsc;

/// Sending half given to an engine instance
pub type EventSender<E> = mpsc::UnboundedSender<E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Box<dyn FnMut(&E)>;

pub struct EventBus<E> {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler<E>)>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            next_id: 0,
            handlers: Vec::new(),
        }
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&E) + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Remove a handler; returns false if it was not registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(sid, _)| *sid != id);
        self.handlers.len() != before
    }

    pub fn emit(&mut self, event: &E) {
        for (_, handler) in self.handlers.iter_mut() {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

/// Receiving side of an engine's event channel plus its subscribers
pub struct EventChannel<E> {
    bus: EventBus<E>,
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E> EventChannel<E> {
    pub fn new() -> (EventSender<E>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                bus: EventBus::new(),
                rx,
            },
        )
    }

    pub fn bus_mut(&mut self) -> &mut EventBus<E> {
        &mut self.bus
    }

    /// Dispatch every queued event; returns how many were delivered
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.bus.emit(&event);
            delivered += 1;
        }
        delivered
    }

    /// Stop accepting events and drop every subscriber
    pub fn close(&mut self) {
        self.rx.close();
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 || !self.bus.is_empty() {
            log::debug!(
                "Closing event channel: {} queued event(s), {} handler(s) dropped",
                dropped,
                self.bus.len()
            );
        }
        self.bus.clear();
    }
}
