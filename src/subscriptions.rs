//! In-process broadcast channels for state notifications.
//!
//! A [`Dispatcher`] delivers values to every subscriber synchronously on
//! the publishing thread, in registration order. Closing a dispatcher
//! emits a definitive end-of-stream event to current subscribers and to
//! anyone who subscribes afterwards.

use crossbeam_channel::{unbounded, Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Events delivered to subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum Event<T> {
    /// A new value was published.
    Next(T),
    /// The channel was closed; no further values will arrive.
    Completed,
}

impl<T> Event<T> {
    /// The published value, if this is a `Next` event.
    pub fn into_value(self) -> Option<T> {
        match self {
            Event::Next(value) => Some(value),
            Event::Completed => None,
        }
    }
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle for receiving events from a [`Dispatcher`].
pub struct SubscriptionHandle<T> {
    pub id: SubscriptionId,
    receiver: Receiver<Event<T>>,
}

impl<T> SubscriptionHandle<T> {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<Event<T>, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<Event<T>, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Event<T>, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<Event<T>> {
        let mut events = Vec::new();
        while let Ok(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Broadcast dispatcher with registration-ordered delivery.
pub struct Dispatcher<T> {
    subscribers: Mutex<Vec<(SubscriptionId, Sender<Event<T>>)>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl<T: Clone> Dispatcher<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a subscriber. Subscribing to a closed dispatcher yields an
    /// immediate `Completed` event.
    pub fn subscribe(&self) -> SubscriptionHandle<T> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = unbounded();

        if self.closed.load(Ordering::SeqCst) {
            let _ = sender.send(Event::Completed);
        } else {
            self.subscribers.lock().push((id, sender));
        }

        SubscriptionHandle { id, receiver }
    }

    /// Remove one subscriber. Unknown ids are a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().retain(|(sub_id, _)| *sub_id != id);
    }

    /// Deliver a value to every live subscriber in registration order,
    /// pruning subscribers whose receiving side is gone.
    pub fn publish(&self, value: T) {
        let mut gone = Vec::new();
        {
            let subscribers = self.subscribers.lock();
            for (id, sender) in subscribers.iter() {
                if sender.send(Event::Next(value.clone())).is_err() {
                    gone.push(*id);
                }
            }
        }
        if !gone.is_empty() {
            self.subscribers
                .lock()
                .retain(|(id, _)| !gone.contains(id));
        }
    }

    /// Close the dispatcher: every subscriber receives `Completed`, and so
    /// does every future subscriber. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut subscribers = self.subscribers.lock();
        for (_, sender) in subscribers.iter() {
            let _ = sender.send(Event::Completed);
        }
        subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<T: Clone> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}
