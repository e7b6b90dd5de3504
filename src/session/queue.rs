//! Audio sequence accounting (property 1: every `send_audio` call's
//! assigned sequence number is acknowledged by exactly one `AudioAdded`,
//! in non-decreasing order, with none skipped).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::RtError;

/// Hands out monotonically increasing sequence numbers for outbound audio
/// frames and verifies the server acknowledges them in order. Sequence
/// numbers start at 1, matching the wire protocol's `AudioAdded.seq_no`
/// numbering (the first frame sent is acked as seq 1).
#[derive(Debug)]
pub struct AudioSeqTracker {
    next_seq: AtomicU64,
    inflight: VecDeque<u64>,
}

impl Default for AudioSeqTracker {
    fn default() -> Self {
        Self {
            next_seq: AtomicU64::new(1),
            inflight: VecDeque::new(),
        }
    }
}

impl AudioSeqTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next sequence number to an outbound audio frame about
    /// to be sent, and record it as in flight.
    pub fn allocate(&mut self) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.inflight.push_back(seq);
        seq
    }

    /// The last sequence number handed out, for `EndOfStream { last_seq }`.
    pub fn last_allocated(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst).saturating_sub(1)
    }

    /// Process an `AudioAdded { seq_no }` acknowledgment. Rejects
    /// out-of-order or duplicate acks — the server is expected to ack
    /// frames in the order they were sent.
    pub fn acknowledge(&mut self, seq_no: u64) -> Result<(), RtError> {
        match self.inflight.front() {
            Some(&front) if front == seq_no => {
                self.inflight.pop_front();
                Ok(())
            }
            Some(&front) => Err(RtError::Protocol(format!(
                "AudioAdded acked seq {seq_no} out of order, expected {front}"
            ))),
            None => Err(RtError::Protocol(format!(
                "AudioAdded acked seq {seq_no} with nothing in flight"
            ))),
        }
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }
}
