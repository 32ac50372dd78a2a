#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Production flow: a structure trains a unit, places it next to itself and
//! optionally sends it to a rally point.

use std::sync::Arc;

use skirmish_core::{
    CellCoord, CommandId, CurveKind, EntityId, FlowKind, MoveMode, State, Tick, TransitionError,
};
use skirmish_scheduler::{
    oldest_wins, shared, Appender, CommandIds, Fsm, Metadata, Shared, VisitContext, VisitError,
    Visitor,
};
use skirmish_system_movement::MoveMetadata;
use skirmish_world::{EntityKind, PositionProbe, World, WorldError};
use tracing::warn;

/// Scheduling state of one production order.
#[derive(Debug)]
pub struct ProduceMetadata {
    fsm: Fsm,
    producer: PositionProbe,
    unit: EntityKind,
    ready_at: Tick,
    rally: Option<CellCoord>,
    produced: Option<EntityId>,
    child: Option<Shared<MoveMetadata>>,
}

impl ProduceMetadata {
    /// Creates an order for `producer` to train `unit`, ready `build_ticks`
    /// after `issued_at`.
    pub fn new(
        world: &World,
        id: CommandId,
        issued_at: Tick,
        producer: EntityId,
        unit: EntityKind,
        build_ticks: u64,
        rally: Option<CellCoord>,
    ) -> Result<Self, WorldError> {
        Ok(Self {
            fsm: Fsm::new(id, issued_at),
            producer: PositionProbe::new(world, producer)?,
            unit,
            ready_at: issued_at.after(build_ticks),
            rally,
            produced: None,
            child: None,
        })
    }

    /// Structure training the unit.
    #[must_use]
    pub const fn producer(&self) -> EntityId {
        self.producer.entity()
    }

    /// Kind of unit being trained.
    #[must_use]
    pub const fn unit(&self) -> EntityKind {
        self.unit
    }

    /// Tick from which the unit may be placed.
    #[must_use]
    pub const fn ready_at(&self) -> Tick {
        self.ready_at
    }

    /// Cell the new unit walks to once placed.
    #[must_use]
    pub const fn rally(&self) -> Option<CellCoord> {
        self.rally
    }

    /// Entity created by this order, once placed.
    #[must_use]
    pub const fn produced(&self) -> Option<EntityId> {
        self.produced
    }

    /// Move order sending the new unit to the rally point.
    #[must_use]
    pub fn child(&self) -> Option<&Shared<MoveMetadata>> {
        self.child.as_ref()
    }
}

impl Metadata for ProduceMetadata {
    const KIND: FlowKind = FlowKind::Produce;

    fn id(&self) -> CommandId {
        self.fsm.id()
    }

    fn target(&self) -> EntityId {
        self.producer()
    }

    fn fsm(&self) -> &Fsm {
        &self.fsm
    }

    fn fsm_mut(&mut self) -> &mut Fsm {
        &mut self.fsm
    }

    fn status(&self, world: &World, now: Tick) -> State {
        if let Some(state) = self.fsm.resolution() {
            return state;
        }
        if !world.contains(self.producer()) {
            return State::Canceled;
        }
        if self.produced.is_some() {
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
        oldest_wins(&self.fsm, &other.fsm)
    }
}

/// Executes production orders.
#[derive(Debug)]
pub struct ProduceVisitor {
    moves: Appender<MoveMetadata>,
    ids: CommandIds,
}

impl ProduceVisitor {
    /// Creates a visitor sending rallied units through `moves`.
    #[must_use]
    pub fn new(moves: Appender<MoveMetadata>, ids: CommandIds) -> Self {
        Self { moves, ids }
    }

    fn rally(
        &self,
        unit: EntityId,
        rally: CellCoord,
        ctx: &VisitContext<'_>,
    ) -> Result<Shared<MoveMetadata>, VisitError> {
        let now = ctx.now();
        let order = shared(MoveMetadata::new(
            ctx.world(),
            self.ids.next_id(),
            now,
            unit,
            rally,
            MoveMode::Direct,
        )?);
        self.moves.append(Arc::clone(&order), ctx.world(), now)?;
        Ok(order)
    }
}

impl Visitor for ProduceVisitor {
    type Metadata = ProduceMetadata;
    type Plan = Option<CellCoord>;

    fn plan(&self, metadata: &ProduceMetadata, world: &World, now: Tick) -> Option<CellCoord> {
        let cell = metadata.producer.read(world, now)?;
        world.occupancy(now).free_neighbor(world.terrain(), cell)
    }

    fn visit(
        &self,
        metadata: &mut ProduceMetadata,
        plan: Option<CellCoord>,
        ctx: &mut VisitContext<'_>,
    ) -> Result<(), VisitError> {
        let now = ctx.now();
        let Some(cell) = plan else {
            metadata.ready_at = now.next();
            return Ok(());
        };
        let unit = ctx.world_mut().spawn(metadata.unit, cell, now)?;
        ctx.dirty().add(unit);
        ctx.dirty().add_curve(unit, CurveKind::Position);
        metadata.produced = Some(unit);

        let Some(rally) = metadata.rally else {
            return Ok(());
        };
        // The unit is placed either way; without a move it waits at its spawn cell.
        match self.rally(unit, rally, ctx) {
            Ok(order) => metadata.child = Some(order),
            Err(error) => warn!(
                tick = %now,
                producer = %metadata.producer(),
                %unit,
                %error,
                "rally move not scheduled"
            ),
        }
        Ok(())
    }
}
