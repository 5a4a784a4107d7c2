use std::collections::VecDeque;

use hf_api_types::DeliveryEvent;

/// Newest-first, bounded list of delivery events for one subscription.
///
/// Events only ever enter at the head. Once `capacity` is reached the
/// oldest entry at the tail is evicted.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    events: VecDeque<DeliveryEvent>,
    capacity: usize,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Insert at the head; returns the evicted tail entry, if any.
    pub fn push(&mut self, event: DeliveryEvent) -> Option<DeliveryEvent> {
        self.events.push_front(event);
        if self.events.len() > self.capacity {
            self.events.pop_back()
        } else {
            None
        }
    }

    pub fn get(&self, id: &str) -> Option<&DeliveryEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn newest(&self) -> Option<&DeliveryEvent> {
        self.events.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeliveryEvent> {
        self.events.iter()
    }

    pub fn snapshot(&self) -> Vec<DeliveryEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
