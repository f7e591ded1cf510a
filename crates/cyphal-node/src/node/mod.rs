//! Node lifecycle state machine and dynamic identifier allocation (§4.4).

mod allocator;

pub use allocator::{AllocationTable, AllocatorAction, AllocatorState, DynamicAllocator};

use crate::error::{cyphal_err, CyphalError, ErrorKind};
use crate::types::MAX_NODE_ID;

/// Node health, least to most severe (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Health {
    Nominal,
    Advisory,
    Caution,
    Warning,
}

/// Node operating mode (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Operational,
    Initialization,
    Maintenance,
    SoftwareUpdate,
    Offline,
}

/// Overall node lifecycle state: `Uninitialized -> Initializing ->
/// {Operational | Error} -> Offline`, with `Error` reachable laterally from
/// `Initializing` or `Operational`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Uninitialized,
    Initializing,
    Operational,
    Error,
    Offline,
}

/// Owns the node's identifier, health, mode, uptime, and dynamic-allocator
/// sub-state-machine (§3, §4.4).
///
/// `set_health`, `set_mode`, and `set_node_id` are the only mutators exposed
/// once the node has left `Uninitialized`; all validate their argument and
/// leave the context unmodified on failure.
pub struct NodeContext {
    state: NodeState,
    node_id: u8,
    health: Health,
    mode: Mode,
    start_tick_ms: u64,
    uptime_sec: u64,
    allocator: DynamicAllocator,
}

impl NodeContext {
    /// Constructs a node in `Uninitialized`, not yet carrying an identifier.
    pub fn new() -> Self {
        Self {
            state: NodeState::Uninitialized,
            node_id: 0,
            health: Health::Nominal,
            mode: Mode::Initialization,
            start_tick_ms: 0,
            uptime_sec: 0,
            allocator: DynamicAllocator::new(),
        }
    }

    /// Moves `Uninitialized -> Initializing`, records `start_tick_ms` and,
    /// if `node_id` is unset (`0`), starts the dynamic allocator with
    /// `preferred_id` as its first candidate (§4.4, §8 scenarios 4/5).
    pub fn initialize(&mut self, node_id: u8, preferred_id: Option<u8>, now_ms: u64) -> Result<(), CyphalError> {
        if self.state != NodeState::Uninitialized {
            return Err(cyphal_err!(ErrorKind::InvalidParameter, "node already initialized"));
        }
        if node_id != 0 && node_id > MAX_NODE_ID {
            return Err(cyphal_err!(ErrorKind::InvalidParameter, "node_id out of range", node_id));
        }
        self.state = NodeState::Initializing;
        self.start_tick_ms = now_ms;
        self.node_id = node_id;
        if node_id == 0 {
            self.allocator.start(preferred_id, now_ms);
        } else {
            self.state = NodeState::Operational;
        }
        Ok(())
    }

    /// Advances the dynamic allocator (a no-op once an identifier is
    /// assigned) and, on successful allocation, adopts the assigned ID and
    /// moves to `Operational`.
    pub fn process_allocation(&mut self, now_ms: u64, table: &mut AllocationTable) -> AllocatorAction {
        if self.node_id != 0 {
            return AllocatorAction::None;
        }
        let action = self.allocator.process(now_ms, table);
        if let AllocatorAction::Allocated(id) = action {
            self.node_id = id;
            self.state = NodeState::Operational;
        } else if action == AllocatorAction::Failed {
            self.state = NodeState::Error;
        }
        action
    }

    /// Dispatches the outcome of an allocation request observed by the RX
    /// task.
    pub fn on_allocation_response(&mut self, success: bool, id: Option<u8>, table: &mut AllocationTable) -> AllocatorAction {
        let action = self.allocator.on_response(success, id, table);
        if let AllocatorAction::Allocated(id) = action {
            self.node_id = id;
            self.state = NodeState::Operational;
        }
        action
    }

    /// Reacts to a detected conflict on the currently allocated identifier.
    pub fn on_allocation_conflict(&mut self, table: &mut AllocationTable) {
        self.allocator.on_conflict(table);
        self.node_id = 0;
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn health(&self) -> Health {
        self.health
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn allocator_state(&self) -> AllocatorState {
        self.allocator.state()
    }

    /// Recomputes `uptime_sec` from `now_ms` and the recorded start tick.
    pub fn tick_uptime(&mut self, now_ms: u64) {
        self.uptime_sec = now_ms.saturating_sub(self.start_tick_ms) / 1000;
    }

    pub fn uptime_sec(&self) -> u64 {
        self.uptime_sec
    }

    pub fn set_health(&mut self, health: Health) -> Result<(), CyphalError> {
        self.health = health;
        Ok(())
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), CyphalError> {
        self.mode = mode;
        Ok(())
    }

    /// Adopts a new node identifier directly (e.g. from the operator
    /// console); `0` and values beyond `1..=127` are rejected.
    pub fn set_node_id(&mut self, node_id: u8) -> Result<(), CyphalError> {
        if node_id == 0 || node_id > MAX_NODE_ID {
            return Err(cyphal_err!(ErrorKind::InvalidParameter, "node_id out of range", node_id));
        }
        self.node_id = node_id;
        Ok(())
    }

    /// Escalates into the `Error` lifecycle state; only legal from
    /// `Initializing` or `Operational`.
    pub fn fault(&mut self) -> Result<(), CyphalError> {
        match self.state {
            NodeState::Initializing | NodeState::Operational => {
                self.state = NodeState::Error;
                Ok(())
            }
            _ => Err(cyphal_err!(ErrorKind::InvalidParameter, "fault() is only valid from Initializing or Operational")),
        }
    }

    /// Moves to `Offline`; legal from any state.
    pub fn shutdown(&mut self) {
        self.state = NodeState::Offline;
        self.mode = Mode::Offline;
    }
}

impl Default for NodeContext {
    fn default() -> Self {
        Self::new()
    }
}
