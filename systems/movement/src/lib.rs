#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Move flow: walks an entity toward a destination in bounded path prefixes.
//!
//! Each visit asks the pathfinder for at most `path_budget` cells, writes them
//! into the mover's position curve and sleeps until the entity reaches the end
//! of the prefix. Long journeys therefore span many visits.

use skirmish_core::{
    CellCoord, CommandId, CurveKind, EntityId, FlowKind, MoveMode, State, Tick, TransitionError,
};
use skirmish_scheduler::{newest_wins, Fsm, Metadata, SchedulerConfig, VisitContext, VisitError, Visitor};
use skirmish_world::{Pathfinder, PositionProbe, World, WorldError};

/// Scheduling state of one move command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveMetadata {
    fsm: Fsm,
    mover: PositionProbe,
    origin: CellCoord,
    destination: CellCoord,
    mode: MoveMode,
    next_tick: Tick,
}

impl MoveMetadata {
    /// Creates a move for `mover` issued at `issued_at`.
    ///
    /// The mover's cell at `issued_at` becomes the origin a patrol returns
    /// to. Fails for unknown or immobile entities.
    pub fn new(
        world: &World,
        id: CommandId,
        issued_at: Tick,
        mover: EntityId,
        destination: CellCoord,
        mode: MoveMode,
    ) -> Result<Self, WorldError> {
        let probe = PositionProbe::new(world, mover)?;
        if !world.kind(mover).map_or(false, |kind| kind.is_mobile()) {
            return Err(WorldError::Immobile(mover));
        }
        let origin = probe
            .read(world, issued_at)
            .ok_or(WorldError::UnknownEntity(mover))?;
        Ok(Self {
            fsm: Fsm::new(id, issued_at),
            mover: probe,
            origin,
            destination,
            mode,
            next_tick: issued_at,
        })
    }

    /// Entity being moved.
    #[must_use]
    pub const fn mover(&self) -> EntityId {
        self.mover.entity()
    }

    /// Cell the mover is heading to.
    #[must_use]
    pub const fn destination(&self) -> CellCoord {
        self.destination
    }

    /// Cell a patrol returns to.
    #[must_use]
    pub const fn origin(&self) -> CellCoord {
        self.origin
    }

    /// Whether the move finishes on arrival or patrols back and forth.
    #[must_use]
    pub const fn mode(&self) -> MoveMode {
        self.mode
    }

    /// Tick of the next visit.
    #[must_use]
    pub const fn next_tick(&self) -> Tick {
        self.next_tick
    }

    pub(crate) fn reschedule(&mut self, tick: Tick) {
        self.next_tick = tick;
    }

    pub(crate) fn turn_around(&mut self) {
        std::mem::swap(&mut self.origin, &mut self.destination);
    }
}

impl Metadata for MoveMetadata {
    const KIND: FlowKind = FlowKind::Move;

    fn id(&self) -> CommandId {
        self.fsm.id()
    }

    fn target(&self) -> EntityId {
        self.mover()
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
        let Some(cell) = self.mover.read(world, now) else {
            return State::Canceled;
        };
        if self.mode == MoveMode::Direct && cell == self.destination {
            return State::Finished;
        }
        if now >= self.next_tick {
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

/// Path prefix computed ahead of a move visit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovePlan {
    start: CellCoord,
    heading: CellCoord,
    turn_around: bool,
    path: Vec<CellCoord>,
}

impl MovePlan {
    /// Cells to walk, excluding the start cell.
    #[must_use]
    pub fn path(&self) -> &[CellCoord] {
        &self.path
    }
}

/// Executes move commands against a pathfinder.
#[derive(Debug)]
pub struct MoveVisitor<P> {
    pathfinder: P,
    path_budget: usize,
    ticks_per_cell: u64,
}

impl<P: Pathfinder> MoveVisitor<P> {
    /// Creates a visitor requesting at most `path_budget` cells per visit.
    #[must_use]
    pub fn new(pathfinder: P, path_budget: usize, ticks_per_cell: u64) -> Self {
        Self {
            pathfinder,
            path_budget: path_budget.max(1),
            ticks_per_cell: ticks_per_cell.max(1),
        }
    }

    /// Creates a visitor using the configured budget and cadence.
    #[must_use]
    pub fn from_config(pathfinder: P, config: &SchedulerConfig) -> Self {
        Self::new(pathfinder, config.path_budget(), config.ticks_per_cell())
    }
}

impl<P: Pathfinder> Visitor for MoveVisitor<P> {
    type Metadata = MoveMetadata;
    type Plan = MovePlan;

    // A visit only rewrites its own mover's trajectory.
    const NON_OVERLAPPING: bool = true;

    fn plan(&self, metadata: &MoveMetadata, world: &World, now: Tick) -> MovePlan {
        let start = metadata.mover.read(world, now).unwrap_or(metadata.origin);
        let turn_around = metadata.mode == MoveMode::Patrol && start == metadata.destination;
        let heading = if turn_around {
            metadata.origin
        } else {
            metadata.destination
        };
        let path = self
            .pathfinder
            .path(world.terrain(), start, heading, self.path_budget);
        MovePlan {
            start,
            heading,
            turn_around,
            path,
        }
    }

    fn visit(
        &self,
        metadata: &mut MoveMetadata,
        plan: MovePlan,
        ctx: &mut VisitContext<'_>,
    ) -> Result<(), VisitError> {
        let now = ctx.now();
        if plan.turn_around {
            metadata.turn_around();
        }
        if plan.path.is_empty() {
            if plan.start != plan.heading {
                // Nothing left to walk and the goal is still out of reach.
                metadata.to(ctx.world(), now, State::Canceled)?;
            } else {
                metadata.reschedule(now.after(self.ticks_per_cell));
            }
            return Ok(());
        }

        let mover = metadata.mover();
        let arrival = ctx
            .world_mut()
            .write_trajectory(mover, now, &plan.path, self.ticks_per_cell)?;
        ctx.dirty().add_curve(mover, CurveKind::Position);
        metadata.reschedule(arrival);
        Ok(())
    }
}
