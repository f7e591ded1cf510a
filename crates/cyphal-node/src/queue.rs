//! The 8-level strict-priority FIFO (§4.1).
//!
//! This type itself is a plain, single-threaded data structure: push/pop take
//! `&mut self` and never block. The bounded-wait "acquire within 100 ms or
//! return `Timeout`" semantics of §4.1/§5 are layered on top by
//! [`crate::sync::BoundedMutex`] on hosted targets; an embedded port wraps
//! the same struct in whatever RTOS mutex it already uses for the rest of
//! its HAL, the same way the rest of the bare structs in this crate are
//! wrapped for concurrent access rather than made thread-safe themselves.

use alloc::collections::VecDeque;

use crate::error::{cyphal_err, CyphalError, ErrorKind};
use crate::record::{MessageRecord, Priority};
use crate::types::{PRIORITY_LEVELS, QUEUE_CAPACITY};

/// Per-level bookkeeping (§3, §8 overflow accounting).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelStats {
    pub messages_queued: u64,
    pub messages_dequeued: u64,
    pub overflow_count: u64,
    pub current_depth: usize,
    pub max_depth_reached: usize,
}

/// Eight bounded FIFOs indexed by [`Priority`], popped in strict priority
/// order with FIFO tie-break within a level.
pub struct PriorityQueue {
    levels: [VecDeque<MessageRecord>; PRIORITY_LEVELS],
    stats: [LevelStats; PRIORITY_LEVELS],
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self {
            levels: core::array::from_fn(|i| VecDeque::with_capacity(QUEUE_CAPACITY[i])),
            stats: [LevelStats::default(); PRIORITY_LEVELS],
        }
    }

    /// Pushes `record` into its priority's FIFO.
    ///
    /// Fails with [`ErrorKind::QueueFull`] if that level is at capacity; no
    /// other level's state is disturbed, and the caller retains ownership of
    /// the record it tried to push (design note §9).
    pub fn push(&mut self, record: MessageRecord) -> Result<(), (CyphalError, MessageRecord)> {
        let level = record.priority.as_index();
        if self.levels[level].len() >= QUEUE_CAPACITY[level] {
            self.stats[level].overflow_count += 1;
            return Err((cyphal_err!(ErrorKind::QueueFull, "level at capacity", level), record));
        }
        self.levels[level].push_back(record);
        self.stats[level].messages_queued += 1;
        self.stats[level].current_depth = self.levels[level].len();
        self.stats[level].max_depth_reached = self.stats[level].max_depth_reached.max(self.stats[level].current_depth);
        Ok(())
    }

    /// Pops the record with the highest-priority (lowest-numbered) non-empty
    /// level, FIFO within that level. Returns `None` if every level is
    /// empty; callers that need the §4.1 `Timeout` semantics for "empty and
    /// none arrives in time" implement that at the bounded-wait layer.
    pub fn pop(&mut self) -> Option<MessageRecord> {
        let level = self.peek_next_priority()?.as_index();
        let record = self.levels[level].pop_front();
        if record.is_some() {
            self.stats[level].messages_dequeued += 1;
            self.stats[level].current_depth = self.levels[level].len();
        }
        record
    }

    /// Returns the level that [`Self::pop`] would serve, or `None` if the
    /// queue is entirely empty.
    pub fn peek_next_priority(&self) -> Option<Priority> {
        Priority::ALL.into_iter().find(|p| !self.levels[p.as_index()].is_empty())
    }

    /// Discards every queued record at every level. Statistics are retained.
    pub fn flush_all(&mut self) {
        for level in &mut self.levels {
            level.clear();
        }
        for (stat, level) in self.stats.iter_mut().zip(self.levels.iter()) {
            stat.current_depth = level.len();
        }
    }

    /// Discards every queued record at `level`. Statistics are retained.
    pub fn flush(&mut self, level: Priority) {
        self.levels[level.as_index()].clear();
        self.stats[level.as_index()].current_depth = 0;
    }

    /// Zeroes every counter at every level. Queued records are unaffected.
    pub fn reset_stats(&mut self) {
        for (stat, level) in self.stats.iter_mut().zip(self.levels.iter()) {
            *stat = LevelStats {
                current_depth: level.len(),
                ..LevelStats::default()
            };
        }
    }

    pub fn stats(&self, level: Priority) -> LevelStats {
        self.stats[level.as_index()]
    }

    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(VecDeque::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn record(priority: Priority) -> MessageRecord {
        MessageRecord {
            subject_id: 1,
            priority,
            source_node_id: 1,
            destination_node_id: 0,
            transfer_id: 0,
            payload: Vec::new(),
            kind: crate::record::MessageKind::Subject,
            timestamp_usec: 0,
        }
    }

    #[test]
    fn priority_flip_scenario() {
        // §8 scenario 1: push [7,6,5,4,3,2,1,0], expect pop order [0..7].
        let mut queue = PriorityQueue::new();
        for raw in [7u8, 6, 5, 4, 3, 2, 1, 0] {
            queue.push(record(Priority::from_u8(raw).unwrap())).unwrap();
        }
        let mut popped = Vec::new();
        while let Some(record) = queue.pop() {
            popped.push(record.priority as u8);
        }
        assert_eq!(popped, alloc::vec![0, 1, 2, 3, 4, 5, 6, 7]);
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_scenario() {
        // §8 scenario 2: level 0 capacity is 32; the 33rd push overflows.
        let mut queue = PriorityQueue::new();
        for _ in 0..32 {
            queue.push(record(Priority::Exceptional)).unwrap();
        }
        let (err, returned) = queue.push(record(Priority::Exceptional)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::QueueFull);
        assert_eq!(returned.priority, Priority::Exceptional);

        let stats = queue.stats(Priority::Exceptional);
        assert_eq!(stats.overflow_count, 1);
        assert_eq!(stats.messages_queued, 32);
    }

    #[test]
    fn fifo_within_level() {
        let mut queue = PriorityQueue::new();
        for id in 0..5u16 {
            let mut r = record(Priority::Nominal);
            r.subject_id = id;
            queue.push(r).unwrap();
        }
        let order: Vec<u16> = core::iter::from_fn(|| queue.pop()).map(|r| r.subject_id).collect();
        assert_eq!(order, alloc::vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn flush_preserves_stats() {
        let mut queue = PriorityQueue::new();
        queue.push(record(Priority::Fast)).unwrap();
        queue.flush(Priority::Fast);
        assert!(queue.pop().is_none());
        assert_eq!(queue.stats(Priority::Fast).messages_queued, 1);
    }

    #[test]
    fn reset_stats_zeroes_counters_but_not_depth() {
        let mut queue = PriorityQueue::new();
        queue.push(record(Priority::Fast)).unwrap();
        queue.reset_stats();
        let stats = queue.stats(Priority::Fast);
        assert_eq!(stats.messages_queued, 0);
        assert_eq!(stats.current_depth, 1);
    }

    #[test]
    fn peek_next_priority_tracks_highest_nonempty_level() {
        let mut queue = PriorityQueue::new();
        assert_eq!(queue.peek_next_priority(), None);
        queue.push(record(Priority::Slow)).unwrap();
        assert_eq!(queue.peek_next_priority(), Some(Priority::Slow));
        queue.push(record(Priority::Immediate)).unwrap();
        assert_eq!(queue.peek_next_priority(), Some(Priority::Immediate));
    }
}
