use skirmish_core::{CommandId, EntityId, FlowKind, State, Tick, TransitionError};
use skirmish_world::{Terrain, World, WorldError};

use crate::{
    metadata::{newest_wins, shared, Fsm, Metadata, Shared},
    visitor::{VisitContext, VisitError, Visitor},
};

pub(crate) fn world() -> World {
    World::new(Terrain::open(4, 4))
}

/// Command that needs a fixed number of visits, one per tick, to finish.
#[derive(Debug)]
pub(crate) struct Countdown {
    fsm: Fsm,
    target: EntityId,
    ready_at: Tick,
    remaining: u32,
}

impl Countdown {
    pub(crate) fn shared(id: u64, target: u32, issued_at: u64, visits: u32) -> Shared<Self> {
        Self::shared_ready_at(id, target, issued_at, visits, Tick::new(issued_at))
    }

    pub(crate) fn shared_ready_at(
        id: u64,
        target: u32,
        issued_at: u64,
        visits: u32,
        ready_at: Tick,
    ) -> Shared<Self> {
        shared(Self {
            fsm: Fsm::new(CommandId::new(id), Tick::new(issued_at)),
            target: EntityId::new(target),
            ready_at,
            remaining: visits,
        })
    }

    pub(crate) fn remaining(&self) -> u32 {
        self.remaining
    }

    pub(crate) fn rewind(&mut self, visits: u32) {
        self.remaining = visits;
    }
}

impl Metadata for Countdown {
    const KIND: FlowKind = FlowKind::Move;

    fn id(&self) -> CommandId {
        self.fsm.id()
    }

    fn target(&self) -> EntityId {
        self.target
    }

    fn fsm(&self) -> &Fsm {
        &self.fsm
    }

    fn fsm_mut(&mut self) -> &mut Fsm {
        &mut self.fsm
    }

    fn status(&self, _world: &World, now: Tick) -> State {
        if let Some(state) = self.fsm.resolution() {
            return state;
        }
        if self.remaining == 0 {
            State::Finished
        } else if now >= self.ready_at {
            State::Executing
        } else {
            State::Pending
        }
    }

    fn to(&mut self, world: &World, now: Tick, target: State) -> Result<(), TransitionError> {
        let current = self.status(world, now);
        self.fsm.transition(current, target)
    }

    fn precedes(&self, other: &Self) -> bool {
        newest_wins(&self.fsm, &other.fsm)
    }
}

#[derive(Debug, Default)]
pub(crate) struct CountdownVisitor<const DISJOINT: bool> {
    failing: Option<CommandId>,
}

impl<const DISJOINT: bool> CountdownVisitor<DISJOINT> {
    pub(crate) fn failing_on(command: CommandId) -> Self {
        Self {
            failing: Some(command),
        }
    }
}

impl<const DISJOINT: bool> Visitor for CountdownVisitor<DISJOINT> {
    type Metadata = Countdown;
    type Plan = u32;

    const NON_OVERLAPPING: bool = DISJOINT;

    fn plan(&self, metadata: &Countdown, _world: &World, _now: Tick) -> u32 {
        metadata.remaining.saturating_sub(1)
    }

    fn visit(
        &self,
        metadata: &mut Countdown,
        plan: u32,
        ctx: &mut VisitContext<'_>,
    ) -> Result<(), VisitError> {
        if self.failing == Some(metadata.id()) {
            return Err(WorldError::UnknownEntity(metadata.target).into());
        }
        metadata.remaining = plan;
        metadata.ready_at = ctx.now().next();
        ctx.dirty().add(metadata.target);
        Ok(())
    }
}
