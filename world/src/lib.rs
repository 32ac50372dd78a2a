#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state for the Skirmish simulation server.
//!
//! The world stores entities as a set of curves over ticks (position, health)
//! plus ability cooldowns. Reads are open to anyone holding a `&World`;
//! writes are reserved for flow visitors, which reach the world through the
//! scheduler's visit context.

mod curve;
mod dirty;
mod navigation;
mod occupancy;
mod probe;
mod terrain;

use std::collections::BTreeMap;

use skirmish_core::{AbilityKind, CellCoord, EntityId, Health, Tick};
use thiserror::Error;

pub use curve::Curve;
pub use dirty::DirtySet;
pub use navigation::{GridPathfinder, Pathfinder};
pub use occupancy::OccupancyIndex;
pub use probe::{CooldownProbe, HealthProbe, PositionProbe};
pub use terrain::Terrain;

/// Types of entities that can exist in the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    /// Mobile melee unit.
    Soldier,
    /// Mobile ranged unit.
    Archer,
    /// Stationary structure that produces soldiers.
    Barracks,
}

impl EntityKind {
    /// Reports whether the entity can walk.
    #[must_use]
    pub const fn is_mobile(self) -> bool {
        !matches!(self, Self::Barracks)
    }

    /// Health the entity spawns with.
    #[must_use]
    pub const fn max_health(self) -> Health {
        match self {
            Self::Soldier => Health::new(10),
            Self::Archer => Health::new(6),
            Self::Barracks => Health::new(30),
        }
    }

    /// Attack reach measured in cells (Chebyshev distance).
    #[must_use]
    pub const fn attack_range(self) -> u32 {
        match self {
            Self::Soldier => 1,
            Self::Archer => 3,
            Self::Barracks => 0,
        }
    }

    /// Damage dealt by a single attack.
    #[must_use]
    pub const fn attack_damage(self) -> u32 {
        match self {
            Self::Soldier => 2,
            Self::Archer => 1,
            Self::Barracks => 0,
        }
    }

    /// Ticks between two consecutive attacks.
    #[must_use]
    pub const fn attack_cooldown_ticks(self) -> u64 {
        match self {
            Self::Soldier => 3,
            Self::Archer => 2,
            Self::Barracks => 0,
        }
    }

    /// Unit this entity produces together with the build time in ticks.
    #[must_use]
    pub const fn production(self) -> Option<(EntityKind, u64)> {
        match self {
            Self::Barracks => Some((Self::Soldier, 6)),
            Self::Soldier | Self::Archer => None,
        }
    }
}

/// Failures raised by world accessors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum WorldError {
    /// No entity with the provided identifier exists.
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    /// The cell lies outside the terrain.
    #[error("cell {0} is out of bounds")]
    OutOfBounds(CellCoord),
    /// The cell cannot be walked on.
    #[error("cell {0} is blocked")]
    Blocked(CellCoord),
    /// The entity cannot move.
    #[error("entity {0} is immobile")]
    Immobile(EntityId),
    /// A trajectory step is not adjacent to the previous cell.
    #[error("trajectory for {entity} breaks at {cell}")]
    InvalidPath {
        /// Entity the trajectory was written for.
        entity: EntityId,
        /// First cell that does not continue the path.
        cell: CellCoord,
    },
}

#[derive(Clone, Debug)]
struct Entity {
    kind: EntityKind,
    position: Curve<CellCoord>,
    health: Curve<Health>,
    cooldowns: BTreeMap<AbilityKind, Tick>,
}

/// Represents the authoritative Skirmish world state.
#[derive(Clone, Debug)]
pub struct World {
    terrain: Terrain,
    entities: BTreeMap<EntityId, Entity>,
    next_entity_id: u32,
}

impl World {
    /// Creates an empty world laid out on the provided terrain.
    #[must_use]
    pub fn new(terrain: Terrain) -> Self {
        Self {
            terrain,
            entities: BTreeMap::new(),
            next_entity_id: 0,
        }
    }

    /// Provides read-only access to the terrain.
    #[must_use]
    pub fn terrain(&self) -> &Terrain {
        &self.terrain
    }

    /// Number of entities alive in the world.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Reports whether the world holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Identifiers of every entity in ascending order.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Reports whether the entity exists.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    /// Fails with [`WorldError::UnknownEntity`] unless the entity exists.
    pub fn require(&self, entity: EntityId) -> Result<(), WorldError> {
        if self.contains(entity) {
            Ok(())
        } else {
            Err(WorldError::UnknownEntity(entity))
        }
    }

    /// Kind of the entity, if it exists.
    #[must_use]
    pub fn kind(&self, entity: EntityId) -> Option<EntityKind> {
        self.entities.get(&entity).map(|state| state.kind)
    }

    /// Cell occupied by the entity at `tick`.
    #[must_use]
    pub fn position(&self, entity: EntityId, tick: Tick) -> Option<CellCoord> {
        self.entities
            .get(&entity)
            .and_then(|state| state.position.value_at(tick))
    }

    /// Final cell of the entity's planned trajectory together with the tick
    /// it gets there.
    #[must_use]
    pub fn trajectory_end(&self, entity: EntityId) -> Option<(Tick, CellCoord)> {
        self.entities
            .get(&entity)
            .and_then(|state| state.position.last())
    }

    /// Health of the entity at `tick`.
    #[must_use]
    pub fn health(&self, entity: EntityId, tick: Tick) -> Option<Health> {
        self.entities
            .get(&entity)
            .and_then(|state| state.health.value_at(tick))
    }

    /// Tick from which the entity may cast `ability`; abilities never cast
    /// are ready from [`Tick::ZERO`].
    #[must_use]
    pub fn ability_ready_at(&self, entity: EntityId, ability: AbilityKind) -> Option<Tick> {
        self.entities.get(&entity).map(|state| {
            state
                .cooldowns
                .get(&ability)
                .copied()
                .unwrap_or(Tick::ZERO)
        })
    }

    /// Builds a spatial index of entity positions at `tick`.
    #[must_use]
    pub fn occupancy(&self, tick: Tick) -> OccupancyIndex {
        let (columns, rows) = self.terrain.dimensions();
        let mut index = OccupancyIndex::new(columns, rows);
        for (id, state) in &self.entities {
            if let Some(cell) = state.position.value_at(tick) {
                index.occupy(*id, cell);
            }
        }
        index
    }

    /// Creates a new entity standing on `cell` from `tick` onwards.
    pub fn spawn(
        &mut self,
        kind: EntityKind,
        cell: CellCoord,
        tick: Tick,
    ) -> Result<EntityId, WorldError> {
        self.require_walkable(cell)?;

        let id = EntityId::new(self.next_entity_id);
        self.next_entity_id = self.next_entity_id.saturating_add(1);
        let _ = self.entities.insert(
            id,
            Entity {
                kind,
                position: Curve::starting_at(tick, cell),
                health: Curve::starting_at(tick, kind.max_health()),
                cooldowns: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    /// Removes the entity from the world.
    pub fn despawn(&mut self, entity: EntityId) -> Result<(), WorldError> {
        self.entities
            .remove(&entity)
            .map(|_| ())
            .ok_or(WorldError::UnknownEntity(entity))
    }

    /// Replaces the entity's future movement with `path`, one cell every
    /// `ticks_per_cell` ticks starting at `from`.
    ///
    /// Returns the tick the entity reaches the final cell.
    pub fn write_trajectory(
        &mut self,
        entity: EntityId,
        from: Tick,
        path: &[CellCoord],
        ticks_per_cell: u64,
    ) -> Result<Tick, WorldError> {
        let state = self
            .entities
            .get(&entity)
            .ok_or(WorldError::UnknownEntity(entity))?;
        if !state.kind.is_mobile() {
            return Err(WorldError::Immobile(entity));
        }

        let mut previous = state
            .position
            .value_at(from)
            .ok_or(WorldError::UnknownEntity(entity))?;
        for cell in path {
            self.require_walkable(*cell)?;
            if previous.manhattan_distance(*cell) != 1 {
                return Err(WorldError::InvalidPath {
                    entity,
                    cell: *cell,
                });
            }
            previous = *cell;
        }

        let state = self
            .entities
            .get_mut(&entity)
            .ok_or(WorldError::UnknownEntity(entity))?;
        Ok(state
            .position
            .rewrite_from(from, ticks_per_cell, path.iter().copied()))
    }

    /// Subtracts `amount` from the entity's health at `tick`.
    pub fn apply_damage(
        &mut self,
        entity: EntityId,
        tick: Tick,
        amount: u32,
    ) -> Result<Health, WorldError> {
        let state = self
            .entities
            .get_mut(&entity)
            .ok_or(WorldError::UnknownEntity(entity))?;
        let current = state.health.value_at(tick).unwrap_or_default();
        let updated = current.damaged(amount);
        state.health.set(tick, updated);
        Ok(updated)
    }

    /// Restores up to `amount` health at `tick`, never exceeding the kind's
    /// maximum.
    pub fn heal(&mut self, entity: EntityId, tick: Tick, amount: u32) -> Result<Health, WorldError> {
        let state = self
            .entities
            .get_mut(&entity)
            .ok_or(WorldError::UnknownEntity(entity))?;
        let current = state.health.value_at(tick).unwrap_or_default();
        let updated = current.healed(amount, state.kind.max_health());
        state.health.set(tick, updated);
        Ok(updated)
    }

    /// Records the tick from which `ability` may be cast again.
    pub fn set_ability_ready_at(
        &mut self,
        entity: EntityId,
        ability: AbilityKind,
        ready_at: Tick,
    ) -> Result<(), WorldError> {
        let state = self
            .entities
            .get_mut(&entity)
            .ok_or(WorldError::UnknownEntity(entity))?;
        let _ = state.cooldowns.insert(ability, ready_at);
        Ok(())
    }

    fn require_walkable(&self, cell: CellCoord) -> Result<(), WorldError> {
        if !self.terrain.contains(cell) {
            return Err(WorldError::OutOfBounds(cell));
        }
        if self.terrain.is_blocked(cell) {
            return Err(WorldError::Blocked(cell));
        }
        Ok(())
    }
}

/// Query functions that provide read-only snapshots of the world state.
pub mod query {
    use skirmish_core::{CellCoord, EntityId, Health, Tick};

    use super::{EntityKind, World};

    /// Immutable representation of a single entity at a tick.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct EntitySnapshot {
        /// Unique identifier assigned to the entity.
        pub id: EntityId,
        /// Kind of the entity.
        pub kind: EntityKind,
        /// Cell occupied at the snapshot tick.
        pub cell: CellCoord,
        /// Health at the snapshot tick.
        pub health: Health,
    }

    /// Read-only snapshot describing every entity at a tick.
    #[derive(Clone, Debug, Default, PartialEq, Eq)]
    pub struct EntityView {
        snapshots: Vec<EntitySnapshot>,
    }

    impl EntityView {
        /// Iterator over the captured snapshots in ascending id order.
        pub fn iter(&self) -> impl Iterator<Item = &EntitySnapshot> {
            self.snapshots.iter()
        }

        /// Snapshot of a single entity, if present.
        #[must_use]
        pub fn get(&self, id: EntityId) -> Option<&EntitySnapshot> {
            self.snapshots
                .binary_search_by_key(&id, |snapshot| snapshot.id)
                .ok()
                .map(|index| &self.snapshots[index])
        }

        /// Consumes the view, yielding the underlying snapshots.
        #[must_use]
        pub fn into_vec(self) -> Vec<EntitySnapshot> {
            self.snapshots
        }
    }

    /// Captures every entity as it stands at `tick`.
    #[must_use]
    pub fn entity_view(world: &World, tick: Tick) -> EntityView {
        let snapshots = world
            .entities
            .iter()
            .filter_map(|(id, state)| {
                Some(EntitySnapshot {
                    id: *id,
                    kind: state.kind,
                    cell: state.position.value_at(tick)?,
                    health: state.health.value_at(tick)?,
                })
            })
            .collect();
        EntityView { snapshots }
    }
}
