//! Capability handles granting command metadata narrow read access.
//!
//! A probe names one entity and one facet of its state. Probes can only be
//! constructed for entities that exist when the command is created, and each
//! exposes a single read accessor, so a metadata type can never wander
//! outside the slice of the world it was built against.

use skirmish_core::{AbilityKind, CellCoord, EntityId, Health, Tick};

use crate::{World, WorldError};

/// Read access to an entity's position curve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PositionProbe {
    entity: EntityId,
}

impl PositionProbe {
    /// Grants position access to an existing entity.
    pub fn new(world: &World, entity: EntityId) -> Result<Self, WorldError> {
        world.require(entity)?;
        Ok(Self { entity })
    }

    /// Entity the probe reads from.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// Cell occupied at `tick`, or `None` once the entity is gone.
    #[must_use]
    pub fn read(&self, world: &World, tick: Tick) -> Option<CellCoord> {
        world.position(self.entity, tick)
    }
}

/// Read access to an entity's health curve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthProbe {
    entity: EntityId,
}

impl HealthProbe {
    /// Grants health access to an existing entity.
    pub fn new(world: &World, entity: EntityId) -> Result<Self, WorldError> {
        world.require(entity)?;
        Ok(Self { entity })
    }

    /// Entity the probe reads from.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// Health at `tick`, or `None` once the entity is gone.
    #[must_use]
    pub fn read(&self, world: &World, tick: Tick) -> Option<Health> {
        world.health(self.entity, tick)
    }
}

/// Read access to the cooldown of one ability of one entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CooldownProbe {
    entity: EntityId,
    ability: AbilityKind,
}

impl CooldownProbe {
    /// Grants cooldown access to an existing entity.
    pub fn new(world: &World, entity: EntityId, ability: AbilityKind) -> Result<Self, WorldError> {
        world.require(entity)?;
        Ok(Self { entity, ability })
    }

    /// Entity the probe reads from.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// Ability the probe reads the cooldown of.
    #[must_use]
    pub const fn ability(&self) -> AbilityKind {
        self.ability
    }

    /// Tick from which the ability may be cast, or `None` once the entity is
    /// gone.
    #[must_use]
    pub fn read(&self, world: &World) -> Option<Tick> {
        world.ability_ready_at(self.entity, self.ability)
    }
}
