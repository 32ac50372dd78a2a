//! Accumulator of state touched during a tick, destined for broadcast.

use std::collections::BTreeSet;

use skirmish_core::{CurveKind, EntityId};

/// Append-only record of entities and curves mutated during the current tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirtySet {
    entities: BTreeSet<EntityId>,
    curves: BTreeSet<(EntityId, CurveKind)>,
}

impl DirtySet {
    /// Creates an empty dirty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the entity changed in a way not tied to a single curve,
    /// such as being spawned or removed.
    pub fn add(&mut self, entity: EntityId) {
        let _ = self.entities.insert(entity);
    }

    /// Records that one of the entity's curves changed.
    pub fn add_curve(&mut self, entity: EntityId, curve: CurveKind) {
        self.add(entity);
        let _ = self.curves.insert((entity, curve));
    }

    /// Reports whether anything was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities touched this tick in ascending id order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().copied()
    }

    /// Curves touched this tick.
    pub fn curves(&self) -> impl Iterator<Item = (EntityId, CurveKind)> + '_ {
        self.curves.iter().copied()
    }

    /// Reports whether the entity was touched this tick.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains(&entity)
    }

    /// Reports whether the given curve of the entity was touched this tick.
    #[must_use]
    pub fn contains_curve(&self, entity: EntityId, curve: CurveKind) -> bool {
        self.curves.contains(&(entity, curve))
    }

    /// Empties the set, returning everything recorded so far.
    pub fn take(&mut self) -> DirtySet {
        std::mem::take(self)
    }
}
