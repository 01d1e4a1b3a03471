use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use log::warn;

use crate::models::TelemetryEvent;

struct QueueState {
    events: VecDeque<TelemetryEvent>,
    evicted: u64,
}

/// Ordered in-memory buffer of pending telemetry.
///
/// Producers only ever append. The flush engine detaches the whole buffer
/// before sending, so events enqueued while a send is in flight land in the
/// fresh buffer and never in the batch on the wire. A failed batch is put
/// back in front of anything newer.
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<Mutex<QueueState>>,
    capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueState {
                events: VecDeque::new(),
                evicted: 0,
            })),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn enqueue(&self, event: TelemetryEvent) {
        let mut state = self.lock();
        state.events.push_back(event);
        Self::enforce_capacity(&mut state, self.capacity);
    }

    pub fn extend(&self, events: impl IntoIterator<Item = TelemetryEvent>) {
        let mut state = self.lock();
        state.events.extend(events);
        Self::enforce_capacity(&mut state, self.capacity);
    }

    /// Take everything currently buffered, oldest first.
    pub fn detach(&self) -> Vec<TelemetryEvent> {
        let mut state = self.lock();
        std::mem::take(&mut state.events).into()
    }

    /// Put a failed batch back ahead of the events that arrived meanwhile.
    pub fn restore(&self, batch: Vec<TelemetryEvent>) {
        if batch.is_empty() {
            return;
        }
        let mut state = self.lock();
        let newer = std::mem::take(&mut state.events);
        let mut restored: VecDeque<TelemetryEvent> = batch.into();
        restored.extend(newer);
        state.events = restored;
        Self::enforce_capacity(&mut state, self.capacity);
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// Events dropped by the capacity cap since creation.
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }

    fn enforce_capacity(state: &mut QueueState, capacity: usize) {
        let overflow = state.events.len().saturating_sub(capacity);
        if overflow == 0 {
            return;
        }
        state.events.drain(..overflow);
        state.evicted += overflow as u64;
        warn!(
            "telemetry buffer over capacity ({capacity}); evicted {overflow} oldest events ({} total)",
            state.evicted
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn scores(events: &[TelemetryEvent]) -> Vec<f64> {
        events
            .iter()
            .map(|event| match &event.body {
                crate::models::EventBody::Attention { score } => *score,
                _ => f64::NAN,
            })
            .collect()
    }

    fn attention(score: f64) -> TelemetryEvent {
        TelemetryEvent::attention(score, Utc::now())
    }

    #[test]
    fn detach_leaves_fresh_buffer() {
        let queue = EventQueue::new(100);
        queue.enqueue(attention(0.1));
        queue.enqueue(attention(0.2));

        let batch = queue.detach();
        queue.enqueue(attention(0.3));

        assert_eq!(scores(&batch), vec![0.1, 0.2]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn restore_prepends_in_original_order() {
        let queue = EventQueue::new(100);
        queue.extend([attention(0.1), attention(0.2)]);
        let batch = queue.detach();
        queue.enqueue(attention(0.3));

        queue.restore(batch);

        assert_eq!(scores(&queue.detach()), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn cap_evicts_oldest_first() {
        let queue = EventQueue::new(3);
        for score in [0.1, 0.2, 0.3, 0.4] {
            queue.enqueue(attention(score));
        }

        assert_eq!(queue.evicted(), 1);
        assert_eq!(scores(&queue.detach()), vec![0.2, 0.3, 0.4]);
    }

    #[test]
    fn restore_respects_cap() {
        let queue = EventQueue::new(3);
        queue.extend([attention(0.1), attention(0.2)]);
        let batch = queue.detach();
        queue.extend([attention(0.3), attention(0.4)]);

        queue.restore(batch);

        assert_eq!(queue.evicted(), 1);
        assert_eq!(scores(&queue.detach()), vec![0.2, 0.3, 0.4]);
    }
}
