#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Ability flow: casts a single ability once the caster's cooldown allows it.

use std::cmp::Ordering;

use skirmish_core::{AbilityKind, CommandId, CurveKind, EntityId, FlowKind, State, Tick, TransitionError};
use skirmish_scheduler::{newest_wins, Fsm, Metadata, VisitContext, VisitError, Visitor};
use skirmish_world::{CooldownProbe, PositionProbe, World, WorldError};

/// Scheduling state of one ability cast.
#[derive(Debug)]
pub struct AbilityMetadata {
    fsm: Fsm,
    caster: PositionProbe,
    cooldown: CooldownProbe,
    fired: bool,
}

impl AbilityMetadata {
    /// Creates a cast of `ability` by `caster`.
    pub fn new(
        world: &World,
        id: CommandId,
        issued_at: Tick,
        caster: EntityId,
        ability: AbilityKind,
    ) -> Result<Self, WorldError> {
        Ok(Self {
            fsm: Fsm::new(id, issued_at),
            caster: PositionProbe::new(world, caster)?,
            cooldown: CooldownProbe::new(world, caster, ability)?,
            fired: false,
        })
    }

    /// Entity casting the ability.
    #[must_use]
    pub const fn caster(&self) -> EntityId {
        self.caster.entity()
    }

    /// Ability being cast.
    #[must_use]
    pub const fn ability(&self) -> AbilityKind {
        self.cooldown.ability()
    }

    /// Whether the cast has already resolved.
    #[must_use]
    pub const fn fired(&self) -> bool {
        self.fired
    }
}

impl Metadata for AbilityMetadata {
    const KIND: FlowKind = FlowKind::Ability;

    fn id(&self) -> CommandId {
        self.fsm.id()
    }

    fn target(&self) -> EntityId {
        self.caster()
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
        if !world.contains(self.caster()) {
            return State::Canceled;
        }
        if self.fired {
            return State::Finished;
        }
        match self.cooldown.read(world) {
            None => State::Canceled,
            Some(ready_at) if now >= ready_at => State::Executing,
            Some(_) => State::Pending,
        }
    }

    fn to(&mut self, world: &World, now: Tick, target: State) -> Result<(), TransitionError> {
        let current = self.status(world, now);
        self.fsm.transition(current, target)
    }

    fn precedes(&self, other: &Self) -> bool {
        match self.ability().priority().cmp(&other.ability().priority()) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => newest_wins(&self.fsm, &other.fsm),
        }
    }
}

/// Entities an executing cast affects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbilityPlan {
    victims: Vec<EntityId>,
}

impl AbilityPlan {
    /// Entities damaged by the cast, in ascending id order.
    #[must_use]
    pub fn victims(&self) -> &[EntityId] {
        &self.victims
    }
}

/// Executes ability casts.
#[derive(Clone, Copy, Debug, Default)]
pub struct AbilityVisitor;

impl AbilityVisitor {
    /// Creates the visitor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Visitor for AbilityVisitor {
    type Metadata = AbilityMetadata;
    type Plan = AbilityPlan;

    fn plan(&self, metadata: &AbilityMetadata, world: &World, now: Tick) -> AbilityPlan {
        let radius = metadata.ability().radius();
        let victims = match (metadata.ability(), metadata.caster.read(world, now)) {
            (AbilityKind::Shockwave, Some(cell)) => world
                .occupancy(now)
                .overlapping(cell, radius)
                .into_iter()
                .filter(|id| *id != metadata.caster())
                .collect(),
            _ => Vec::new(),
        };
        AbilityPlan { victims }
    }

    fn visit(
        &self,
        metadata: &mut AbilityMetadata,
        plan: AbilityPlan,
        ctx: &mut VisitContext<'_>,
    ) -> Result<(), VisitError> {
        let now = ctx.now();
        let caster = metadata.caster();
        let ability = metadata.ability();
        match ability {
            AbilityKind::Mend => {
                let _ = ctx.world_mut().heal(caster, now, ability.magnitude())?;
                ctx.dirty().add_curve(caster, CurveKind::Health);
            }
            AbilityKind::Shockwave => {
                for victim in plan.victims {
                    if !ctx.world().contains(victim) {
                        continue;
                    }
                    let health = ctx.world_mut().apply_damage(victim, now, ability.magnitude())?;
                    ctx.dirty().add_curve(victim, CurveKind::Health);
                    if health.is_depleted() {
                        ctx.world_mut().despawn(victim)?;
                        ctx.dirty().add(victim);
                    }
                }
            }
        }
        ctx.world_mut()
            .set_ability_ready_at(caster, ability, now.after(ability.cooldown_ticks()))?;
        ctx.dirty().add_curve(caster, CurveKind::Cooldown);
        metadata.fired = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::{CellCoord, Health};
    use skirmish_world::{DirtySet, EntityKind, Terrain};

    fn spawn(world: &mut World, kind: EntityKind, column: u32, row: u32) -> EntityId {
        world
            .spawn(kind, CellCoord::new(column, row), Tick::ZERO)
            .expect("spawn")
    }

    fn cast(world: &mut World, metadata: &mut AbilityMetadata, now: Tick) -> DirtySet {
        let visitor = AbilityVisitor::new();
        let plan = visitor.plan(metadata, world, now);
        let mut dirty = DirtySet::new();
        let mut ctx = VisitContext::new(world, &mut dirty, now);
        visitor.visit(metadata, plan, &mut ctx).expect("visit");
        dirty
    }

    #[test]
    fn mend_heals_caster_up_to_maximum() {
        let mut world = World::new(Terrain::open(4, 4));
        let caster = spawn(&mut world, EntityKind::Soldier, 1, 1);
        let _ = world.apply_damage(caster, Tick::new(1), 6).expect("damage");
        let mut mend = AbilityMetadata::new(&world, CommandId::new(1), Tick::new(1), caster, AbilityKind::Mend)
            .expect("metadata");

        assert_eq!(mend.status(&world, Tick::new(2)), State::Executing);
        let dirty = cast(&mut world, &mut mend, Tick::new(2));

        assert_eq!(world.health(caster, Tick::new(2)), Some(Health::new(8)));
        assert!(dirty.contains_curve(caster, CurveKind::Health));
        assert!(dirty.contains_curve(caster, CurveKind::Cooldown));
        assert_eq!(mend.status(&world, Tick::new(2)), State::Finished);
        assert_eq!(world.ability_ready_at(caster, AbilityKind::Mend), Some(Tick::new(10)));

        let mut again = AbilityMetadata::new(&world, CommandId::new(2), Tick::new(3), caster, AbilityKind::Mend)
            .expect("metadata");
        assert_eq!(again.status(&world, Tick::new(9)), State::Pending);
        let _ = cast(&mut world, &mut again, Tick::new(10));
        assert_eq!(world.health(caster, Tick::new(10)), Some(Health::new(10)));
    }

    #[test]
    fn shockwave_damages_neighbours_but_not_caster() {
        let mut world = World::new(Terrain::open(8, 8));
        let caster = spawn(&mut world, EntityKind::Soldier, 3, 3);
        let near = spawn(&mut world, EntityKind::Soldier, 5, 5);
        let fragile = spawn(&mut world, EntityKind::Archer, 2, 3);
        let far = spawn(&mut world, EntityKind::Soldier, 7, 7);
        let _ = world.apply_damage(fragile, Tick::ZERO, 4).expect("damage");
        let mut wave = AbilityMetadata::new(&world, CommandId::new(1), Tick::ZERO, caster, AbilityKind::Shockwave)
            .expect("metadata");

        let plan = AbilityVisitor::new().plan(&wave, &world, Tick::new(1));
        assert_eq!(plan.victims(), &[near, fragile]);
        let dirty = cast(&mut world, &mut wave, Tick::new(1));

        assert_eq!(world.health(caster, Tick::new(1)), Some(Health::new(10)));
        assert_eq!(world.health(near, Tick::new(1)), Some(Health::new(7)));
        assert_eq!(world.health(far, Tick::new(1)), Some(Health::new(10)));
        assert!(!world.contains(fragile));
        assert!(dirty.contains(fragile));
    }

    #[test]
    fn higher_priority_cast_wins_then_newest() {
        let mut world = World::new(Terrain::open(4, 4));
        let caster = spawn(&mut world, EntityKind::Soldier, 0, 0);
        let wave = AbilityMetadata::new(&world, CommandId::new(1), Tick::new(1), caster, AbilityKind::Shockwave)
            .expect("metadata");
        let mend = AbilityMetadata::new(&world, CommandId::new(2), Tick::new(5), caster, AbilityKind::Mend)
            .expect("metadata");
        let later_mend = AbilityMetadata::new(&world, CommandId::new(3), Tick::new(6), caster, AbilityKind::Mend)
            .expect("metadata");

        assert!(wave.precedes(&mend));
        assert!(!mend.precedes(&wave));
        assert!(later_mend.precedes(&mend));

        world.despawn(caster).expect("despawn");
        assert_eq!(wave.status(&world, Tick::new(6)), State::Canceled);
    }
}
