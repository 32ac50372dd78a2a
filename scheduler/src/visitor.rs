//! Visitor contract: the only code allowed to mutate game state.

use skirmish_core::{Tick, TransitionError};
use skirmish_world::{DirtySet, World, WorldError};
use thiserror::Error;

use crate::{metadata::Metadata, schedule::ScheduleError};

/// Errors a visit may report. The failing command is canceled and the tick
/// carries on with the next entry.
#[derive(Debug, Error)]
pub enum VisitError {
    /// The visitor attempted an undeclared state transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),
    /// A write into the world was refused, typically because an entity
    /// disappeared between planning and visiting.
    #[error(transparent)]
    World(#[from] WorldError),
    /// A dependent command could not be appended.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// How a stage walks its source list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VisitMode {
    /// Plans and visits are interleaved entry by entry.
    #[default]
    Serial,
    /// Plans are computed on the rayon pool, visits applied serially.
    Parallel,
}

/// Mutable access granted to a visitor for the duration of one visit.
#[derive(Debug)]
pub struct VisitContext<'a> {
    world: &'a mut World,
    dirty: &'a mut DirtySet,
    now: Tick,
}

impl<'a> VisitContext<'a> {
    /// Creates a context writing into `world` and recording into `dirty`.
    pub fn new(world: &'a mut World, dirty: &'a mut DirtySet, now: Tick) -> Self {
        Self { world, dirty, now }
    }

    /// Tick being simulated.
    #[must_use]
    pub const fn now(&self) -> Tick {
        self.now
    }

    /// Read access to the world.
    #[must_use]
    pub fn world(&self) -> &World {
        self.world
    }

    /// Write access to the world.
    pub fn world_mut(&mut self) -> &mut World {
        self.world
    }

    /// Dirty-state sink for the current tick.
    pub fn dirty(&mut self) -> &mut DirtySet {
        self.dirty
    }
}

/// Executor of one flow type.
///
/// Visiting happens in two steps. `plan` is read-only and may run on worker
/// threads when the stage is configured for it; `visit` is always applied
/// serially in source order and is the only place state changes. Both are
/// only called for entries whose status is `Executing`.
pub trait Visitor: Send + Sync {
    /// Metadata type this visitor executes.
    type Metadata: Metadata;

    /// Read-only work prepared ahead of the visit.
    type Plan: Send;

    /// Declares that visits of distinct entries never touch the same state,
    /// which is what allows planning to fan out across threads.
    const NON_OVERLAPPING: bool = false;

    /// Computes the plan for one executing entry.
    fn plan(&self, metadata: &Self::Metadata, world: &World, now: Tick) -> Self::Plan;

    /// Applies the effect of one executing entry.
    fn visit(
        &self,
        metadata: &mut Self::Metadata,
        plan: Self::Plan,
        ctx: &mut VisitContext<'_>,
    ) -> Result<(), VisitError>;
}
