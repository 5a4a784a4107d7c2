use std::sync::{Arc, Mutex, MutexGuard};

/// Broadcast-style bus built on flume channels.
///
/// Each [`subscribe`](EventBus::subscribe) creates a receiver that sees every
/// message published afterwards. Cloning the bus is cheap and clones share
/// the same subscriber list.
pub struct EventBus<T> {
    inner: Arc<Mutex<Vec<flume::Sender<T>>>>,
}

impl<T: Clone> EventBus<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn senders(&self) -> MutexGuard<'_, Vec<flume::Sender<T>>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self) -> flume::Receiver<T> {
        let (tx, rx) = flume::unbounded();
        self.senders().push(tx);
        rx
    }

    /// Deliver `msg` to every live subscriber; dropped receivers are pruned.
    pub fn publish(&self, msg: T) {
        self.senders().retain(|tx| tx.send(msg.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders().len()
    }
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}
