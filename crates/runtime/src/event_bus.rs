/// A recorded event with its emission sequence number.
///
/// Sequence numbers start at 1 and never repeat for the lifetime of a bus,
/// even across `drain`, so a consumer can remember the last one it saw.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<E> {
    pub seq: u64,
    pub payload: E,
}

/// Change log consumed by UI layers to decide when to re-render.
///
/// With a `max_len`, the oldest events are dropped once the log is full, so
/// a consumer that never drains still holds bounded memory. Sequence numbers
/// are unaffected by trimming.
#[derive(Debug)]
pub struct EventBus<E> {
    last_seq: u64,
    events: Vec<Event<E>>,
    max_len: Option<usize>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            last_seq: 0,
            events: Vec::new(),
            max_len: None,
        }
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len.max(1)),
            ..Self::default()
        }
    }

    pub fn max_len(&self) -> Option<usize> {
        self.max_len
    }

    pub fn emit(&mut self, payload: E) -> u64 {
        self.last_seq += 1;
        self.events.push(Event {
            seq: self.last_seq,
            payload,
        });
        if let Some(max_len) = self.max_len {
            let excess = self.events.len().saturating_sub(max_len);
            if excess > 0 {
                self.events.drain(..excess);
            }
        }
        self.last_seq
    }

    pub fn events(&self) -> &[Event<E>] {
        &self.events
    }

    /// Events emitted after `seq`, oldest first.
    pub fn since(&self, seq: u64) -> &[Event<E>] {
        let start = self.events.partition_point(|e| e.seq <= seq);
        &self.events[start..]
    }

    /// Sequence number of the most recent event, 0 if nothing was emitted.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn drain(&mut self) -> Vec<Event<E>> {
        std::mem::take(&mut self.events)
    }
}
