//! Dynamic node-identifier allocator sub-state-machine (§4.4).

use crate::types::MAX_NODE_ID;

const REQUEST_TIMEOUT_MS: u64 = 10_000;
const REQUEST_RETRY_INTERVAL_MS: u64 = 1000;
const MAX_RETRIES: u8 = 3;
const FALLBACK_SCAN_COUNT: u8 = 10;

/// States of the dynamic allocator, engaged only while a node's `node_id`
/// is `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorState {
    Idle,
    Requesting,
    Allocated,
    ConflictDetected,
    Failed,
}

/// Tracks which node identifiers are currently claimed, process-wide.
///
/// Plain (non-locking) bitset; on hosted targets the Node Lifecycle wraps
/// one instance in a [`crate::sync::BoundedMutex`] shared by every node
/// context in the process, matching §4.4's "the allocation table is shared
/// process-wide" and §5's "guarded by a dedicated mutex".
#[derive(Debug, Clone, Copy)]
pub struct AllocationTable {
    claimed: [bool; (MAX_NODE_ID as usize) + 1],
}

impl Default for AllocationTable {
    fn default() -> Self {
        Self {
            claimed: [false; (MAX_NODE_ID as usize) + 1],
        }
    }
}

impl AllocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// An ID is available iff it is in `1..=127` and not marked claimed.
    pub fn is_available(&self, node_id: u8) -> bool {
        (1..=MAX_NODE_ID).contains(&node_id) && !self.claimed[node_id as usize]
    }

    pub fn mark_claimed(&mut self, node_id: u8) {
        if node_id as usize <= MAX_NODE_ID as usize {
            self.claimed[node_id as usize] = true;
        }
    }

    pub fn mark_free(&mut self, node_id: u8) {
        if node_id as usize <= MAX_NODE_ID as usize {
            self.claimed[node_id as usize] = false;
        }
    }
}

fn pick_candidate(preferred: Option<u8>, table: &AllocationTable) -> Option<u8> {
    if let Some(preferred) = preferred {
        if table.is_available(preferred) {
            return Some(preferred);
        }
    }
    (1..=100).find(|&id| table.is_available(id)).or_else(|| (101..=MAX_NODE_ID).find(|&id| table.is_available(id)))
}

fn pick_fallback(table: &AllocationTable) -> Option<u8> {
    (MAX_NODE_ID.saturating_sub(FALLBACK_SCAN_COUNT - 1)..=MAX_NODE_ID)
        .rev()
        .find(|&id| table.is_available(id))
}

/// What the caller (the Node task) should do as a result of a
/// [`DynamicAllocator`] transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorAction {
    /// Nothing to do this tick.
    None,
    /// Send an allocation request for `candidate_id` (opaque transmit step
    /// delegated to the Codec/Transport layers).
    SendRequest(u8),
    /// Allocation completed successfully with this node identifier.
    Allocated(u8),
    /// Allocation failed permanently; the node remains unaddressable.
    Failed,
}

/// Drives one node's dynamic identifier acquisition.
#[derive(Debug, Clone, Copy)]
pub struct DynamicAllocator {
    state: AllocatorState,
    preferred_id: Option<u8>,
    start_time_ms: u64,
    last_request_ms: u64,
    retry_count: u8,
    allocated_id: Option<u8>,
}

impl Default for DynamicAllocator {
    fn default() -> Self {
        Self {
            state: AllocatorState::Idle,
            preferred_id: None,
            start_time_ms: 0,
            last_request_ms: 0,
            retry_count: 0,
            allocated_id: None,
        }
    }
}

impl DynamicAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AllocatorState {
        self.state
    }

    pub fn allocated_id(&self) -> Option<u8> {
        self.allocated_id
    }

    /// Moves `Idle -> Requesting`; a no-op if a cycle is already in
    /// progress.
    pub fn start(&mut self, preferred_id: Option<u8>, now_ms: u64) {
        if self.state != AllocatorState::Idle {
            return;
        }
        self.preferred_id = preferred_id;
        self.state = AllocatorState::Requesting;
        self.start_time_ms = now_ms;
        self.last_request_ms = 0;
        self.retry_count = 0;
    }

    /// Advances the state machine by one tick. Call periodically from the
    /// Node task.
    pub fn process(&mut self, now_ms: u64, table: &mut AllocationTable) -> AllocatorAction {
        match self.state {
            AllocatorState::Requesting => {
                if now_ms.saturating_sub(self.start_time_ms) > REQUEST_TIMEOUT_MS {
                    self.state = AllocatorState::Failed;
                    return AllocatorAction::None;
                }
                if now_ms.saturating_sub(self.last_request_ms) > REQUEST_RETRY_INTERVAL_MS {
                    self.last_request_ms = now_ms;
                    if let Some(candidate) = pick_candidate(self.preferred_id, table) {
                        return AllocatorAction::SendRequest(candidate);
                    }
                }
                AllocatorAction::None
            }
            AllocatorState::Failed => self.retry_fallback(table),
            _ => AllocatorAction::None,
        }
    }

    /// Dispatches the outcome of an allocation request (external dispatch
    /// from the RX task).
    pub fn on_response(&mut self, success: bool, id: Option<u8>, table: &mut AllocationTable) -> AllocatorAction {
        if self.state != AllocatorState::Requesting {
            return AllocatorAction::None;
        }
        match (success, id) {
            (true, Some(id)) if (1..=MAX_NODE_ID).contains(&id) => {
                table.mark_claimed(id);
                self.allocated_id = Some(id);
                self.state = AllocatorState::Allocated;
                AllocatorAction::Allocated(id)
            }
            _ => {
                self.retry_count += 1;
                if self.retry_count >= MAX_RETRIES {
                    self.state = AllocatorState::Failed;
                } else {
                    self.state = AllocatorState::Requesting;
                }
                AllocatorAction::None
            }
        }
    }

    /// Signals that a previously allocated ID was found to conflict with
    /// another node.
    pub fn on_conflict(&mut self, table: &mut AllocationTable) -> AllocatorAction {
        if let Some(id) = self.allocated_id.take() {
            table.mark_free(id);
        }
        self.state = AllocatorState::ConflictDetected;
        self.retry_count += 1;
        if self.retry_count < MAX_RETRIES {
            self.state = AllocatorState::Requesting;
        } else {
            self.state = AllocatorState::Failed;
        }
        AllocatorAction::None
    }

    fn retry_fallback(&mut self, table: &mut AllocationTable) -> AllocatorAction {
        match pick_fallback(table) {
            Some(id) => {
                table.mark_claimed(id);
                self.allocated_id = Some(id);
                self.state = AllocatorState::Allocated;
                AllocatorAction::Allocated(id)
            }
            None => AllocatorAction::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_allocates_preferred_id() {
        // §8 scenario 4.
        let mut table = AllocationTable::new();
        let mut allocator = DynamicAllocator::new();
        allocator.start(Some(42), 0);
        let action = allocator.process(0, &mut table);
        assert_eq!(action, AllocatorAction::SendRequest(42));
        let action = allocator.on_response(true, Some(42), &mut table);
        assert_eq!(action, AllocatorAction::Allocated(42));
        assert_eq!(allocator.state(), AllocatorState::Allocated);
        assert_eq!(allocator.allocated_id(), Some(42));
        assert!(!table.is_available(42));
    }

    #[test]
    fn conflict_on_preferred_id_yields_different_id() {
        // §8 scenario 5.
        let mut table = AllocationTable::new();
        table.mark_claimed(42);
        let mut allocator = DynamicAllocator::new();
        allocator.start(Some(42), 0);
        let action = allocator.process(0, &mut table);
        match action {
            AllocatorAction::SendRequest(id) => assert_ne!(id, 42),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn exhausting_retries_transitions_to_failed() {
        let mut table = AllocationTable::new();
        let mut allocator = DynamicAllocator::new();
        allocator.start(Some(1), 0);
        allocator.process(0, &mut table);
        for _ in 0..3 {
            allocator.on_response(false, None, &mut table);
        }
        assert_eq!(allocator.state(), AllocatorState::Failed);
    }

    #[test]
    fn timeout_without_response_fails_the_request() {
        let mut table = AllocationTable::new();
        let mut allocator = DynamicAllocator::new();
        allocator.start(Some(1), 0);
        let action = allocator.process(10_001, &mut table);
        assert_eq!(action, AllocatorAction::None);
        assert_eq!(allocator.state(), AllocatorState::Failed);
    }

    #[test]
    fn failed_state_falls_back_to_a_free_high_id() {
        let mut table = AllocationTable::new();
        for id in 118..=127 {
            table.mark_claimed(id);
        }
        table.mark_free(120);
        let mut allocator = DynamicAllocator::new();
        allocator.start(Some(1), 0);
        allocator.process(10_001, &mut table); // -> Failed
        assert_eq!(allocator.state(), AllocatorState::Failed);
        let action = allocator.process(10_002, &mut table);
        assert_eq!(action, AllocatorAction::Allocated(120));
    }
}
