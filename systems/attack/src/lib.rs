#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Attack flow: strikes a target whenever it is in range and the weapon is
//! ready, and delegates closing the distance to a chase.

use std::sync::Arc;

use skirmish_core::{CommandId, CurveKind, EntityId, FlowKind, Health, State, Tick, TransitionError};
use skirmish_scheduler::{
    newest_wins, shared, Appender, CommandIds, Fsm, Metadata, Shared, VisitContext, VisitError,
    Visitor,
};
use skirmish_system_chase::ChaseMetadata;
use skirmish_world::{HealthProbe, PositionProbe, World, WorldError};

/// Scheduling state of one attack command.
#[derive(Debug)]
pub struct AttackMetadata {
    fsm: Fsm,
    attacker: PositionProbe,
    quarry: PositionProbe,
    quarry_health: HealthProbe,
    range: u32,
    damage: u32,
    cooldown_ticks: u64,
    next_tick: Tick,
    child: Option<Shared<ChaseMetadata>>,
}

impl AttackMetadata {
    /// Creates an attack using the attacker's weapon profile.
    pub fn new(
        world: &World,
        id: CommandId,
        issued_at: Tick,
        attacker: EntityId,
        quarry: EntityId,
    ) -> Result<Self, WorldError> {
        let kind = world.kind(attacker).ok_or(WorldError::UnknownEntity(attacker))?;
        Ok(Self {
            fsm: Fsm::new(id, issued_at),
            attacker: PositionProbe::new(world, attacker)?,
            quarry: PositionProbe::new(world, quarry)?,
            quarry_health: HealthProbe::new(world, quarry)?,
            range: kind.attack_range(),
            damage: kind.attack_damage(),
            cooldown_ticks: kind.attack_cooldown_ticks().max(1),
            next_tick: issued_at,
            child: None,
        })
    }

    /// Entity dealing damage.
    #[must_use]
    pub const fn attacker(&self) -> EntityId {
        self.attacker.entity()
    }

    /// Entity receiving damage.
    #[must_use]
    pub const fn quarry(&self) -> EntityId {
        self.quarry.entity()
    }

    /// Tick from which the next strike may land.
    #[must_use]
    pub const fn next_tick(&self) -> Tick {
        self.next_tick
    }

    /// Chase currently closing the distance, if any.
    #[must_use]
    pub fn child(&self) -> Option<&Shared<ChaseMetadata>> {
        self.child.as_ref()
    }

    /// Reports whether the quarry is within weapon range at `now`.
    #[must_use]
    pub fn in_range(&self, world: &World, now: Tick) -> bool {
        match (self.attacker.read(world, now), self.quarry.read(world, now)) {
            (Some(attacker), Some(quarry)) => attacker.chebyshev_distance(quarry) <= self.range,
            _ => false,
        }
    }

    fn child_state(&self, world: &World, now: Tick) -> Option<State> {
        self.child.as_ref().map(|child| child.read().status(world, now))
    }
}

impl Metadata for AttackMetadata {
    const KIND: FlowKind = FlowKind::Attack;
    const DEPENDS_ON: &'static [FlowKind] = &[FlowKind::Chase];

    fn id(&self) -> CommandId {
        self.fsm.id()
    }

    fn target(&self) -> EntityId {
        self.attacker()
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
        if !world.contains(self.attacker()) {
            return State::Canceled;
        }
        let child = self.child_state(world, now);
        if child == Some(State::Canceled) {
            return State::Canceled;
        }
        let quarry_alive = self
            .quarry_health
            .read(world, now)
            .map_or(false, |health| !health.is_depleted());
        if !quarry_alive {
            return State::Finished;
        }
        if self.in_range(world, now) {
            if now >= self.next_tick {
                State::Executing
            } else {
                State::Pending
            }
        } else if child.map_or(false, State::is_live) {
            State::Pending
        } else {
            State::Executing
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

/// What an executing attack does this tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttackPlan {
    /// Deal damage to the quarry.
    Strike,
    /// Start a chase to bring the quarry into range.
    Pursue,
}

/// Executes attack commands.
#[derive(Debug)]
pub struct AttackVisitor {
    chases: Appender<ChaseMetadata>,
    ids: CommandIds,
}

impl AttackVisitor {
    /// Creates a visitor appending chases through `chases`.
    #[must_use]
    pub fn new(chases: Appender<ChaseMetadata>, ids: CommandIds) -> Self {
        Self { chases, ids }
    }

    fn strike(metadata: &mut AttackMetadata, ctx: &mut VisitContext<'_>) -> Result<(), VisitError> {
        let now = ctx.now();
        let quarry = metadata.quarry();
        let health: Health = ctx.world_mut().apply_damage(quarry, now, metadata.damage)?;
        ctx.dirty().add_curve(quarry, CurveKind::Health);
        if health.is_depleted() {
            ctx.world_mut().despawn(quarry)?;
            ctx.dirty().add(quarry);
        }
        metadata.next_tick = now.after(metadata.cooldown_ticks);
        Ok(())
    }

    fn pursue(&self, metadata: &mut AttackMetadata, ctx: &mut VisitContext<'_>) -> Result<(), VisitError> {
        let now = ctx.now();
        // Only reached once the previous chase is over; it has nothing left to report.
        metadata.child = None;
        let chase = shared(ChaseMetadata::new(
            ctx.world(),
            self.ids.next_id(),
            now,
            metadata.attacker(),
            metadata.quarry(),
            metadata.range,
        )?);
        self.chases.append(Arc::clone(&chase), ctx.world(), now)?;
        metadata.child = Some(chase);
        Ok(())
    }
}

impl Visitor for AttackVisitor {
    type Metadata = AttackMetadata;
    type Plan = AttackPlan;

    fn plan(&self, metadata: &AttackMetadata, world: &World, now: Tick) -> AttackPlan {
        if metadata.in_range(world, now) {
            AttackPlan::Strike
        } else {
            AttackPlan::Pursue
        }
    }

    fn visit(
        &self,
        metadata: &mut AttackMetadata,
        plan: AttackPlan,
        ctx: &mut VisitContext<'_>,
    ) -> Result<(), VisitError> {
        match plan {
            AttackPlan::Strike => Self::strike(metadata, ctx),
            AttackPlan::Pursue => self.pursue(metadata, ctx),
        }
    }
}
