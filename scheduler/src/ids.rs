//! Command identifier allocation.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use skirmish_core::CommandId;

/// Allocator of command identifiers, shared by the client command surface
/// and every visitor that spawns dependent commands.
///
/// Visits run serially, so allocation order is deterministic.
#[derive(Clone, Debug)]
pub struct CommandIds {
    next: Arc<AtomicU64>,
}

impl Default for CommandIds {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandIds {
    /// Creates an allocator whose first identifier is `c1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Hands out the next unused identifier.
    #[must_use]
    pub fn next_id(&self) -> CommandId {
        CommandId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
