//! Static pairing of one flow type's schedule with its visitor.

use skirmish_core::{FlowKind, Tick};
use skirmish_world::World;

use crate::{
    metadata::Metadata,
    schedule::{AcceptSummary, MergeSummary, ScheduleHandle},
    visitor::{VisitContext, VisitMode, Visitor},
};

/// Type-erased view of a stage as seen by the tick driver.
pub trait FlowStage: Send {
    /// Flow type the stage runs.
    fn kind(&self) -> FlowKind;

    /// Flow types the stage's metadata reads.
    fn depends_on(&self) -> &'static [FlowKind];

    /// Whether the visitor allows parallel planning.
    fn non_overlapping(&self) -> bool;

    /// Current visiting mode.
    fn mode(&self) -> VisitMode;

    /// Switches the visiting mode.
    fn set_mode(&mut self, mode: VisitMode);

    /// Drops entries that were terminal at the end of an earlier tick.
    fn clear(&mut self, now: Tick) -> usize;

    /// Merges the cache into the source list.
    fn merge(&mut self, world: &World, now: Tick) -> MergeSummary;

    /// Visits the source list.
    fn accept(&mut self, ctx: &mut VisitContext<'_>) -> AcceptSummary;

    /// Records which entries ended the tick terminal.
    fn seal(&mut self, world: &World, now: Tick);

    /// Number of entries in the source list.
    fn source_len(&self) -> usize;
}

/// Schedule and visitor of one flow type.
#[derive(Debug)]
pub struct Stage<V: Visitor> {
    schedule: ScheduleHandle<V::Metadata>,
    visitor: V,
    mode: VisitMode,
}

impl<V: Visitor> Stage<V> {
    /// Pairs a schedule with the visitor executing it, visiting serially.
    pub fn new(schedule: ScheduleHandle<V::Metadata>, visitor: V) -> Self {
        Self {
            schedule,
            visitor,
            mode: VisitMode::Serial,
        }
    }
}

impl<V: Visitor> FlowStage for Stage<V> {
    fn kind(&self) -> FlowKind {
        <V::Metadata as Metadata>::KIND
    }

    fn depends_on(&self) -> &'static [FlowKind] {
        <V::Metadata as Metadata>::DEPENDS_ON
    }

    fn non_overlapping(&self) -> bool {
        V::NON_OVERLAPPING
    }

    fn mode(&self) -> VisitMode {
        self.mode
    }

    fn set_mode(&mut self, mode: VisitMode) {
        self.mode = mode;
    }

    fn clear(&mut self, now: Tick) -> usize {
        self.schedule.lock().clear(now)
    }

    fn merge(&mut self, world: &World, now: Tick) -> MergeSummary {
        self.schedule.lock().merge(world, now)
    }

    fn accept(&mut self, ctx: &mut VisitContext<'_>) -> AcceptSummary {
        self.schedule.lock().accept(&self.visitor, self.mode, ctx)
    }

    fn seal(&mut self, world: &World, now: Tick) {
        self.schedule.lock().seal(world, now);
    }

    fn source_len(&self) -> usize {
        self.schedule.lock().len()
    }
}
