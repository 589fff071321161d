//! Persisted queue records.

use chrono::{DateTime, Utc};
use payload_normalizer::{CallPath, Envelope};
use serde::{Deserialize, Serialize};

/// One pending envelope plus its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Position in the queue. Strictly increasing in enqueue order.
    pub sequence: u64,
    pub path: CallPath,
    pub envelope: Envelope,
    /// Failed delivery attempts so far.
    #[serde(default)]
    pub attempts: u32,
    /// Earliest time the next attempt may run.
    pub next_attempt_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueEntry {
    pub fn new(sequence: u64, path: CallPath, envelope: Envelope) -> Self {
        Self {
            sequence,
            path,
            envelope,
            attempts: 0,
            next_attempt_at: Utc::now(),
            last_error: None,
        }
    }

    pub fn message_id(&self) -> Option<&str> {
        self.envelope.message_id.as_deref()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at <= now
    }
}

/// Everything stored under one queue key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedQueue {
    /// Sequence assigned to the next enqueued entry.
    pub next_sequence: u64,
    /// Pending entries ordered by sequence.
    pub entries: Vec<QueueEntry>,
}

impl PersistedQueue {
    pub fn head(&self) -> Option<&QueueEntry> {
        self.entries.first()
    }

    /// Append at the tail and return the assigned sequence.
    pub fn push(&mut self, path: CallPath, envelope: Envelope) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.push(QueueEntry::new(sequence, path, envelope));
        sequence
    }

    pub fn remove(&mut self, sequence: u64) -> Option<QueueEntry> {
        let index = self.entries.iter().position(|e| e.sequence == sequence)?;
        Some(self.entries.remove(index))
    }

    pub fn get_mut(&mut self, sequence: u64) -> Option<&mut QueueEntry> {
        self.entries.iter_mut().find(|e| e.sequence == sequence)
    }

    /// Restore sequence order and make `next_sequence` exceed every entry.
    pub fn repair(&mut self) -> bool {
        let mut changed = false;
        if !self.entries.windows(2).all(|w| w[0].sequence < w[1].sequence) {
            self.entries.sort_by_key(|e| e.sequence);
            self.entries.dedup_by_key(|e| e.sequence);
            changed = true;
        }
        if let Some(last) = self.entries.last() {
            if self.next_sequence <= last.sequence {
                self.next_sequence = last.sequence + 1;
                changed = true;
            }
        }
        changed
    }
}
