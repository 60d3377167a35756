//! Per-key bounded call queue with overflow policy

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use contracts::OverflowStrategy;

/// Error type returned by a throttled call
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of running a throttled call
pub type CallOutcome = Result<(), BoxError>;

/// Type-erased throttled call (callable with its arguments captured)
pub type BoxedCall = Box<dyn FnOnce() -> CallOutcome + Send + 'static>;

/// A call waiting in a lane. Immutable once created.
pub struct PendingCall {
    seq: u64,
    call: BoxedCall,
    enqueued_at: Instant,
}

impl PendingCall {
    /// Wrap a call with its dispatcher-wide sequence number
    pub fn new(seq: u64, call: BoxedCall, enqueued_at: Instant) -> Self {
        Self {
            seq,
            call,
            enqueued_at,
        }
    }

    /// Submission sequence number (unique per dispatcher, increasing)
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// When the call was accepted
    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    /// Consume the call and run it
    pub fn run(self) -> CallOutcome {
        (self.call)()
    }
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("seq", &self.seq)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

/// Result of offering a call to a full or non-full queue
#[derive(Debug)]
pub enum Admission {
    /// The call was appended; `evicted` holds the calls removed to make room
    Enqueued { evicted: Vec<PendingCall> },
    /// The queue was full under `skip_new`; the offered call is handed back
    Rejected(PendingCall),
}

/// Ordered, oldest-first buffer of pending calls for one key.
///
/// Capacity is supplied per call to [`CallQueue::admit`] so a reconfigured
/// dispatcher applies new limits to existing lanes.
#[derive(Debug, Default)]
pub struct CallQueue {
    calls: VecDeque<PendingCall>,
}

impl CallQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending calls
    #[inline]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether the queue holds no calls
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Offer a call, applying `strategy` if the queue holds `max_len` or more.
    ///
    /// Afterwards `len() <= max_len` (for `max_len >= 1`). Eviction repeats
    /// until a slot is free, which only matters after `max_len` shrank.
    pub fn admit(
        &mut self,
        call: PendingCall,
        max_len: usize,
        strategy: OverflowStrategy,
    ) -> Admission {
        let max_len = max_len.max(1);
        let mut evicted = Vec::new();

        while self.calls.len() >= max_len {
            let victim = match strategy {
                OverflowStrategy::SkipNew => return Admission::Rejected(call),
                OverflowStrategy::DropOldest => self.calls.pop_front(),
                OverflowStrategy::DropNewest => self.calls.pop_back(),
            };
            match victim {
                Some(victim) => evicted.push(victim),
                None => break,
            }
        }

        self.calls.push_back(call);
        Admission::Enqueued { evicted }
    }

    /// Remove and return the oldest call
    #[inline]
    pub fn pop_front(&mut self) -> Option<PendingCall> {
        self.calls.pop_front()
    }

    /// Remove every pending call, oldest first
    pub fn take_all(&mut self) -> Vec<PendingCall> {
        self.calls.drain(..).collect()
    }

    /// Sequence numbers of the pending calls, oldest first
    pub fn seqs(&self) -> Vec<u64> {
        self.calls.iter().map(PendingCall::seq).collect()
    }
}
