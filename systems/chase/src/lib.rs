#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Chase flow: keeps an entity walking toward a moving quarry until it is in
//! range, refreshing its move order at a fixed cadence.

use std::sync::Arc;

use skirmish_core::{CellCoord, CommandId, EntityId, FlowKind, MoveMode, State, Tick, TransitionError};
use skirmish_scheduler::{
    newest_wins, shared, Appender, CommandIds, Fsm, Metadata, SchedulerConfig, Shared, VisitContext,
    VisitError, Visitor,
};
use skirmish_system_movement::MoveMetadata;
use skirmish_world::{PositionProbe, World, WorldError};

/// Scheduling state of one chase command.
#[derive(Debug)]
pub struct ChaseMetadata {
    fsm: Fsm,
    chaser: PositionProbe,
    quarry: PositionProbe,
    range: u32,
    next_tick: Tick,
    child: Option<Shared<MoveMetadata>>,
}

impl ChaseMetadata {
    /// Creates a chase of `quarry` by `chaser` that ends within `range`
    /// cells (Chebyshev distance).
    pub fn new(
        world: &World,
        id: CommandId,
        issued_at: Tick,
        chaser: EntityId,
        quarry: EntityId,
        range: u32,
    ) -> Result<Self, WorldError> {
        let chaser_probe = PositionProbe::new(world, chaser)?;
        if !world.kind(chaser).map_or(false, |kind| kind.is_mobile()) {
            return Err(WorldError::Immobile(chaser));
        }
        Ok(Self {
            fsm: Fsm::new(id, issued_at),
            chaser: chaser_probe,
            quarry: PositionProbe::new(world, quarry)?,
            range,
            next_tick: issued_at,
            child: None,
        })
    }

    /// Entity doing the chasing.
    #[must_use]
    pub const fn chaser(&self) -> EntityId {
        self.chaser.entity()
    }

    /// Entity being chased.
    #[must_use]
    pub const fn quarry(&self) -> EntityId {
        self.quarry.entity()
    }

    /// Distance at which the chase is over.
    #[must_use]
    pub const fn range(&self) -> u32 {
        self.range
    }

    /// Tick of the next path refresh.
    #[must_use]
    pub const fn next_tick(&self) -> Tick {
        self.next_tick
    }

    /// Move order currently walking the chaser, if any.
    #[must_use]
    pub fn child(&self) -> Option<&Shared<MoveMetadata>> {
        self.child.as_ref()
    }

    fn in_range(&self, world: &World, now: Tick) -> Option<bool> {
        let chaser = self.chaser.read(world, now)?;
        let quarry = self.quarry.read(world, now)?;
        Some(chaser.chebyshev_distance(quarry) <= self.range)
    }
}

impl Metadata for ChaseMetadata {
    const KIND: FlowKind = FlowKind::Chase;
    const DEPENDS_ON: &'static [FlowKind] = &[FlowKind::Move];

    fn id(&self) -> CommandId {
        self.fsm.id()
    }

    fn target(&self) -> EntityId {
        self.chaser()
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
        if !world.contains(self.chaser()) {
            return State::Canceled;
        }
        let child_canceled = self
            .child
            .as_ref()
            .map_or(false, |child| child.read().status(world, now) == State::Canceled);
        if child_canceled {
            return State::Canceled;
        }
        match self.in_range(world, now) {
            None | Some(true) => State::Finished,
            Some(false) if now >= self.next_tick => State::Executing,
            Some(false) => State::Pending,
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

/// Executes chase commands by issuing move orders toward the quarry.
#[derive(Debug)]
pub struct ChaseVisitor {
    moves: Appender<MoveMetadata>,
    ids: CommandIds,
    repath_ticks: u64,
}

impl ChaseVisitor {
    /// Creates a visitor appending move orders through `moves` and refreshing
    /// them every `repath_ticks` ticks.
    #[must_use]
    pub fn new(moves: Appender<MoveMetadata>, ids: CommandIds, repath_ticks: u64) -> Self {
        Self {
            moves,
            ids,
            repath_ticks: repath_ticks.max(1),
        }
    }

    /// Creates a visitor using the configured repath cadence.
    #[must_use]
    pub fn from_config(moves: Appender<MoveMetadata>, ids: CommandIds, config: &SchedulerConfig) -> Self {
        Self::new(moves, ids, config.chase_repath_ticks())
    }
}

impl Visitor for ChaseVisitor {
    type Metadata = ChaseMetadata;
    type Plan = Option<CellCoord>;

    // Visits only touch the chaser's own move order.
    const NON_OVERLAPPING: bool = true;

    fn plan(&self, metadata: &ChaseMetadata, world: &World, now: Tick) -> Option<CellCoord> {
        metadata.quarry.read(world, now)
    }

    fn visit(
        &self,
        metadata: &mut ChaseMetadata,
        plan: Option<CellCoord>,
        ctx: &mut VisitContext<'_>,
    ) -> Result<(), VisitError> {
        let now = ctx.now();
        let Some(goal) = plan else {
            return Ok(());
        };

        if let Some(previous) = metadata.child.take() {
            let mut previous = previous.write();
            if previous.status(ctx.world(), now).is_live() {
                previous.to(ctx.world(), now, State::Canceled)?;
            }
        }

        let order = shared(MoveMetadata::new(
            ctx.world(),
            self.ids.next_id(),
            now,
            metadata.chaser(),
            goal,
            MoveMode::Direct,
        )?);
        self.moves.append(Arc::clone(&order), ctx.world(), now)?;
        metadata.child = Some(order);
        metadata.next_tick = now.after(self.repath_ticks);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_scheduler::{Schedule, ScheduleHandle};
    use skirmish_world::{DirtySet, EntityKind, Terrain};

    struct Fixture {
        world: World,
        moves: ScheduleHandle<MoveMetadata>,
        visitor: ChaseVisitor,
        chaser: EntityId,
        quarry: EntityId,
    }

    fn fixture() -> Fixture {
        let mut world = World::new(Terrain::open(10, 1));
        let chaser = world
            .spawn(EntityKind::Soldier, CellCoord::new(0, 0), Tick::ZERO)
            .expect("spawn");
        let quarry = world
            .spawn(EntityKind::Soldier, CellCoord::new(6, 0), Tick::ZERO)
            .expect("spawn");
        let moves = ScheduleHandle::new();
        let visitor = ChaseVisitor::new(moves.appender(), CommandIds::new(), 3);
        Fixture {
            world,
            moves,
            visitor,
            chaser,
            quarry,
        }
    }

    fn visit(fixture: &mut Fixture, metadata: &mut ChaseMetadata, now: Tick) {
        let plan = fixture.visitor.plan(metadata, &fixture.world, now);
        let mut dirty = DirtySet::new();
        let mut ctx = VisitContext::new(&mut fixture.world, &mut dirty, now);
        fixture.visitor.visit(metadata, plan, &mut ctx).expect("visit");
    }

    #[test]
    fn in_range_or_missing_quarry_finishes() {
        let mut fixture = fixture();
        let near = ChaseMetadata::new(
            &fixture.world,
            CommandId::new(1),
            Tick::ZERO,
            fixture.chaser,
            fixture.quarry,
            6,
        )
        .expect("metadata");
        let far = ChaseMetadata::new(
            &fixture.world,
            CommandId::new(2),
            Tick::ZERO,
            fixture.chaser,
            fixture.quarry,
            1,
        )
        .expect("metadata");

        assert_eq!(near.status(&fixture.world, Tick::ZERO), State::Finished);
        assert_eq!(far.status(&fixture.world, Tick::ZERO), State::Executing);

        fixture.world.despawn(fixture.quarry).expect("despawn");
        assert_eq!(far.status(&fixture.world, Tick::ZERO), State::Finished);
    }

    #[test]
    fn sealed_finish_outlasts_quarry_leaving() {
        let mut fixture = fixture();
        let chase = |id| {
            shared(
                ChaseMetadata::new(
                    &fixture.world,
                    CommandId::new(id),
                    Tick::ZERO,
                    fixture.chaser,
                    fixture.quarry,
                    6,
                )
                .expect("metadata"),
            )
        };
        let sealed = chase(1);
        let unsealed = chase(2);
        let mut schedule = Schedule::new();
        schedule.append(Arc::clone(&sealed), &fixture.world, Tick::ZERO).expect("append");
        schedule.seal(&fixture.world, Tick::new(1));

        let _ = fixture
            .world
            .write_trajectory(
                fixture.quarry,
                Tick::new(1),
                &[CellCoord::new(7, 0), CellCoord::new(8, 0)],
                1,
            )
            .expect("walk away");

        assert_eq!(sealed.read().status(&fixture.world, Tick::new(3)), State::Finished);
        assert_eq!(unsealed.read().status(&fixture.world, Tick::new(3)), State::Executing);
    }

    #[test]
    fn visit_issues_move_toward_quarry() {
        let mut fixture = fixture();
        let mut chase = ChaseMetadata::new(
            &fixture.world,
            CommandId::new(1),
            Tick::ZERO,
            fixture.chaser,
            fixture.quarry,
            1,
        )
        .expect("metadata");

        visit(&mut fixture, &mut chase, Tick::new(1));

        let child = chase.child().cloned().expect("child move");
        assert_eq!(child.read().destination(), CellCoord::new(6, 0));
        assert_eq!(child.read().mover(), fixture.chaser);
        assert_eq!(chase.next_tick(), Tick::new(4));
        assert_eq!(chase.status(&fixture.world, Tick::new(2)), State::Pending);
        assert_eq!(fixture.moves.lock().len(), 1);
    }

    #[test]
    fn repath_cancels_previous_move() {
        let mut fixture = fixture();
        let mut chase = ChaseMetadata::new(
            &fixture.world,
            CommandId::new(1),
            Tick::ZERO,
            fixture.chaser,
            fixture.quarry,
            1,
        )
        .expect("metadata");
        visit(&mut fixture, &mut chase, Tick::new(1));
        let first = chase.child().cloned().expect("child move");

        visit(&mut fixture, &mut chase, Tick::new(4));

        assert_eq!(first.read().status(&fixture.world, Tick::new(4)), State::Canceled);
        let second = chase.child().cloned().expect("child move");
        assert!(second.read().status(&fixture.world, Tick::new(4)).is_live());
        assert_eq!(
            chase.status(&fixture.world, Tick::new(4)),
            State::Pending,
            "a replaced child must not cancel the chase"
        );
        let moves = fixture.moves.lock();
        assert_eq!(moves.live_count(&fixture.world, Tick::new(4)), 1);
    }

    #[test]
    fn canceled_child_cancels_chase() {
        let mut fixture = fixture();
        let mut chase = ChaseMetadata::new(
            &fixture.world,
            CommandId::new(1),
            Tick::ZERO,
            fixture.chaser,
            fixture.quarry,
            1,
        )
        .expect("metadata");
        visit(&mut fixture, &mut chase, Tick::new(1));

        let child = chase.child().cloned().expect("child move");
        child
            .write()
            .to(&fixture.world, Tick::new(2), State::Canceled)
            .expect("cancel");

        assert_eq!(chase.status(&fixture.world, Tick::new(2)), State::Canceled);
    }
}
