//! Priority queue of floor requests.
//!
//! Ordering: highest priority first, FIFO within a priority tier. A
//! participant appears at most once; re-queueing replaces the previous entry
//! (new priority, new enqueue time, back of its tier).

use super::types::QueuedParticipant;

use chrono::{DateTime, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, HashMap};

/// Ordering key; `seq` breaks ties in enqueue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueKey {
    priority: Reverse<u8>,
    seq: u64,
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A queued floor request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub participant_id: String,
    pub priority: u8,
    pub queued_at: DateTime<Utc>,
}

impl QueueEntry {
    fn to_queued(&self) -> QueuedParticipant {
        QueuedParticipant {
            participant_id: self.participant_id.clone(),
            priority: self.priority,
            queued_at: self.queued_at,
        }
    }
}

/// Floor request queue for one room.
#[derive(Debug, Clone, Default)]
pub struct FloorQueue {
    entries: BTreeMap<QueueKey, QueueEntry>,
    keys: HashMap<String, QueueKey>,
    next_seq: u64,
}

impl FloorQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, participant_id: &str) -> bool {
        self.keys.contains_key(participant_id)
    }

    /// Insert a request, replacing any existing entry for the participant.
    ///
    /// Returns the replaced entry, if any.
    pub fn upsert(
        &mut self,
        participant_id: &str,
        priority: u8,
        queued_at: DateTime<Utc>,
    ) -> Option<QueueEntry> {
        let previous = self.remove(participant_id);

        let key = QueueKey {
            priority: Reverse(priority),
            seq: self.next_seq,
        };
        self.next_seq += 1;

        self.entries.insert(
            key,
            QueueEntry {
                participant_id: participant_id.to_string(),
                priority,
                queued_at,
            },
        );
        self.keys.insert(participant_id.to_string(), key);

        previous
    }

    /// Remove a participant's entry.
    pub fn remove(&mut self, participant_id: &str) -> Option<QueueEntry> {
        let key = self.keys.remove(participant_id)?;
        self.entries.remove(&key)
    }

    /// Pop the next participant to be granted.
    pub fn pop(&mut self) -> Option<QueueEntry> {
        let (_, entry) = self.entries.pop_first()?;
        self.keys.remove(&entry.participant_id);
        Some(entry)
    }

    /// 1-based position of a participant.
    #[must_use]
    pub fn position(&self, participant_id: &str) -> Option<usize> {
        let key = self.keys.get(participant_id)?;
        Some(self.entries.range(..*key).count() + 1)
    }

    /// 1-based positions of every queued participant.
    #[must_use]
    pub fn positions(&self) -> HashMap<String, usize> {
        self.entries
            .values()
            .enumerate()
            .map(|(i, e)| (e.participant_id.clone(), i + 1))
            .collect()
    }

    /// Participants whose position differs from `before` and are still queued.
    ///
    /// Participants absent from `before` are not reported.
    #[must_use]
    pub fn changed_positions(&self, before: &HashMap<String, usize>) -> Vec<(String, usize)> {
        self.entries
            .values()
            .enumerate()
            .filter_map(|(i, e)| {
                let now = i + 1;
                match before.get(&e.participant_id) {
                    Some(&was) if was != now => Some((e.participant_id.clone(), now)),
                    _ => None,
                }
            })
            .collect()
    }

    /// Queue contents in grant order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<QueuedParticipant> {
        self.entries.values().map(QueueEntry::to_queued).collect()
    }

    /// Remove every entry, returning them in grant order.
    pub fn drain(&mut self) -> Vec<QueueEntry> {
        self.keys.clear();
        std::mem::take(&mut self.entries).into_values().collect()
    }
}
