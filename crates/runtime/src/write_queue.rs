/// Single-slot write serializer for full-snapshot persistence.
///
/// Key properties:
/// - Every pushed payload gets a strictly increasing `WriteSeq`.
/// - Only the newest pending payload is ever handed out; older pending
///   payloads are superseded and dropped.
/// - A failed write is requeued only if nothing newer has been pushed or
///   committed, so a stale snapshot can never land after a newer one.
/// - `last_committed` never moves backwards.
///
/// The net effect is last-issued-wins rather than last-completed-wins.

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WriteSeq(pub u64);

#[derive(Debug)]
pub struct WriteQueue<T> {
    next_seq: u64,
    pending: Option<(WriteSeq, T)>,
    in_flight: Option<WriteSeq>,
    committed: Option<WriteSeq>,
    superseded: u64,
}

impl<T> Default for WriteQueue<T> {
    fn default() -> Self {
        Self {
            next_seq: 1,
            pending: None,
            in_flight: None,
            committed: None,
            superseded: 0,
        }
    }
}

impl<T> WriteQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `payload`, replacing whatever was pending.
    pub fn push(&mut self, payload: T) -> WriteSeq {
        let seq = WriteSeq(self.next_seq);
        self.next_seq += 1;
        if self.pending.replace((seq, payload)).is_some() {
            self.superseded += 1;
        }
        seq
    }

    /// Hands the newest pending payload to a writer.
    pub fn take(&mut self) -> Option<(WriteSeq, T)> {
        let (seq, payload) = self.pending.take()?;
        self.in_flight = Some(seq);
        Some((seq, payload))
    }

    pub fn complete(&mut self, seq: WriteSeq) {
        if self.in_flight == Some(seq) {
            self.in_flight = None;
        }
        if self.committed.is_none_or(|c| seq > c) {
            self.committed = Some(seq);
        }
    }

    /// Returns the payload to the queue after a failed write.
    ///
    /// Returns `false` (and drops the payload) when a newer write is already
    /// pending or committed.
    pub fn fail(&mut self, seq: WriteSeq, payload: T) -> bool {
        if self.in_flight == Some(seq) {
            self.in_flight = None;
        }
        let newer_pending = self.pending.as_ref().is_some_and(|(p, _)| *p > seq);
        let newer_committed = self.committed.is_some_and(|c| c >= seq);
        if newer_pending || newer_committed {
            self.superseded += 1;
            return false;
        }
        self.pending = Some((seq, payload));
        true
    }

    pub fn pending_seq(&self) -> Option<WriteSeq> {
        self.pending.as_ref().map(|(seq, _)| *seq)
    }

    pub fn last_committed(&self) -> Option<WriteSeq> {
        self.committed
    }

    /// Nothing pending and nothing in flight.
    pub fn is_idle(&self) -> bool {
        self.pending.is_none() && self.in_flight.is_none()
    }

    /// Number of payloads dropped because a newer one replaced them.
    pub fn superseded(&self) -> u64 {
        self.superseded
    }
}
