//! Per flow type command lists: a client-writable cache and the
//! authoritative source list visited every tick.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rayon::prelude::*;
use skirmish_core::{CommandId, EntityId, FlowKind, State, Tick};
use skirmish_world::World;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    metadata::{Metadata, Shared},
    visitor::{VisitContext, VisitError, VisitMode, Visitor},
};

/// Errors raised while inserting commands into a schedule.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// A command with the same id is already cached or scheduled.
    #[error("command {0} is already scheduled")]
    DuplicateCommand(CommandId),
    /// The schedule is locked by its own stage; a flow may not append into
    /// the list it is currently visiting.
    #[error("{0} schedule is busy visiting")]
    Busy(FlowKind),
}

/// Outcome of merging the cache into the source list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Cache entries appended without a conflict.
    pub appended: usize,
    /// Cache entries that won a conflict and replaced a live source entry.
    pub replaced: usize,
    /// Cache entries that lost a conflict against a live source entry.
    pub rejected: usize,
}

/// Failure of a single visit; the offending command was canceled.
#[derive(Debug)]
pub struct Fault {
    /// Flow type of the failing command.
    pub flow: FlowKind,
    /// Command whose visit failed.
    pub command: CommandId,
    /// Error reported by the visitor.
    pub error: VisitError,
}

/// Outcome of visiting the source list once.
#[derive(Debug, Default)]
pub struct AcceptSummary {
    /// Number of entries that were executing and got visited.
    pub visited: usize,
    /// Visits that failed and canceled their command.
    pub faults: Vec<Fault>,
}

#[derive(Debug)]
struct Entry<M> {
    metadata: Shared<M>,
    terminal_since: Option<Tick>,
}

impl<M> Entry<M> {
    fn new(metadata: Shared<M>) -> Self {
        Self {
            metadata,
            terminal_since: None,
        }
    }
}

/// Cache and source lists of one flow type.
#[derive(Debug)]
pub struct Schedule<M> {
    cache: Vec<Shared<M>>,
    source: Vec<Entry<M>>,
}

impl<M> Default for Schedule<M> {
    fn default() -> Self {
        Self {
            cache: Vec::new(),
            source: Vec::new(),
        }
    }
}

impl<M: Metadata> Schedule<M> {
    /// Creates an empty schedule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Places a client-issued command in the cache, to be merged at the
    /// next tick.
    pub fn schedule(&mut self, metadata: Shared<M>) -> Result<(), ScheduleError> {
        self.ensure_unique(metadata.read().id())?;
        self.cache.push(metadata);
        Ok(())
    }

    /// Inserts a dependent command straight into the source list, skipping
    /// cache arbitration. A live entry already acting on the same target is
    /// superseded and canceled, so the source never holds two live commands
    /// for one entity.
    pub fn append(&mut self, metadata: Shared<M>, world: &World, now: Tick) -> Result<(), ScheduleError> {
        let (id, target) = {
            let metadata = metadata.read();
            (metadata.id(), metadata.target())
        };
        self.ensure_unique(id)?;
        for entry in &self.source {
            let mut resident = entry.metadata.write();
            if resident.target() != target || !resident.status(world, now).is_live() {
                continue;
            }
            debug!(tick = %now, flow = %M::KIND, superseded = %resident.id(), by = %id, "dependent command supersedes live entry");
            if let Err(error) = resident.to(world, now, State::Canceled) {
                debug!(flow = %M::KIND, %error, "superseded entry could not be canceled");
            }
        }
        debug!(tick = %now, flow = %M::KIND, command = %id, "appended dependent command");
        self.source.push(Entry::new(metadata));
        Ok(())
    }

    /// Removes every source entry that was already terminal at the end of an
    /// earlier tick. Returns the number of removed entries.
    pub fn clear(&mut self, now: Tick) -> usize {
        let before = self.source.len();
        self.source
            .retain(|entry| entry.terminal_since.map_or(true, |since| since >= now));
        before - self.source.len()
    }

    /// Moves cached commands into the source list, resolving conflicts on the
    /// same target through [`Metadata::precedes`]. The loser of a conflict is
    /// canceled; a winning cache entry takes the loser's place.
    pub fn merge(&mut self, world: &World, now: Tick) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for incoming in std::mem::take(&mut self.cache) {
            let conflict = self.live_index_for(&incoming, world, now);
            let Some(index) = conflict else {
                summary.appended += 1;
                self.source.push(Entry::new(incoming));
                continue;
            };

            let resident = Arc::clone(&self.source[index].metadata);
            let incoming_wins = incoming.read().precedes(&resident.read());
            let (winner, loser) = if incoming_wins {
                (&incoming, &resident)
            } else {
                (&resident, &incoming)
            };
            debug!(
                tick = %now,
                flow = %M::KIND,
                winner = %winner.read().id(),
                loser = %loser.read().id(),
                "resolved precedence conflict"
            );
            if let Err(error) = loser.write().to(world, now, State::Canceled) {
                debug!(flow = %M::KIND, %error, "conflict loser could not be canceled");
            }

            if incoming_wins {
                summary.replaced += 1;
                self.source[index] = Entry::new(incoming);
            } else {
                summary.rejected += 1;
            }
        }
        summary
    }

    /// Visits every source entry in list order. Only entries reporting
    /// [`State::Executing`] are visited; a failing visit cancels its own
    /// entry and iteration continues.
    ///
    /// In [`VisitMode::Parallel`] the read-only plans are computed on the
    /// rayon pool before the visits are applied serially in list order.
    pub fn accept<V>(&mut self, visitor: &V, mode: VisitMode, ctx: &mut VisitContext<'_>) -> AcceptSummary
    where
        V: Visitor<Metadata = M>,
    {
        let mut summary = AcceptSummary::default();
        match mode {
            VisitMode::Serial => {
                for entry in &self.source {
                    let plan = plan_if_executing(visitor, &entry.metadata, ctx.world(), ctx.now());
                    if let Some(plan) = plan {
                        visit_entry(visitor, &entry.metadata, plan, ctx, &mut summary);
                    }
                }
            }
            VisitMode::Parallel => {
                let plans: Vec<Option<V::Plan>> = {
                    let world = ctx.world();
                    let now = ctx.now();
                    self.source
                        .par_iter()
                        .map(|entry| plan_if_executing(visitor, &entry.metadata, world, now))
                        .collect()
                };
                for (entry, plan) in self.source.iter().zip(plans) {
                    if let Some(plan) = plan {
                        visit_entry(visitor, &entry.metadata, plan, ctx, &mut summary);
                    }
                }
            }
        }
        summary
    }

    /// Records the tick at which entries were first observed terminal, which
    /// is what [`Schedule::clear`] consults on later ticks.
    ///
    /// A terminal state observed here is latched into the entry's
    /// [`Fsm`](crate::Fsm), so parents holding the metadata keep seeing it
    /// after the entry is cleared and the world moves on.
    pub fn seal(&mut self, world: &World, now: Tick) {
        for entry in &mut self.source {
            if entry.terminal_since.is_some() {
                continue;
            }
            let mut metadata = entry.metadata.write();
            let observed = metadata.status(world, now);
            if metadata.fsm_mut().latch(observed).is_some() {
                entry.terminal_since = Some(now);
            }
        }
    }

    /// Source entries in visiting order.
    pub fn entries(&self) -> impl Iterator<Item = &Shared<M>> + '_ {
        self.source.iter().map(|entry| &entry.metadata)
    }

    /// Number of source entries, terminal ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.source.len()
    }

    /// Reports whether the source list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Number of commands waiting in the cache.
    #[must_use]
    pub fn pending_cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Number of source entries that are neither finished nor canceled.
    #[must_use]
    pub fn live_count(&self, world: &World, now: Tick) -> usize {
        self.source
            .iter()
            .filter(|entry| entry.metadata.read().status(world, now).is_live())
            .count()
    }

    /// Live source entry acting on `target`, if any.
    #[must_use]
    pub fn live_for(&self, target: EntityId, world: &World, now: Tick) -> Option<Shared<M>> {
        self.source
            .iter()
            .find(|entry| {
                let metadata = entry.metadata.read();
                metadata.target() == target && metadata.status(world, now).is_live()
            })
            .map(|entry| Arc::clone(&entry.metadata))
    }

    /// Looks a command up by id in the source list or the cache.
    #[must_use]
    pub fn find(&self, id: CommandId) -> Option<Shared<M>> {
        self.source
            .iter()
            .map(|entry| &entry.metadata)
            .chain(self.cache.iter())
            .find(|metadata| metadata.read().id() == id)
            .map(Arc::clone)
    }

    fn ensure_unique(&self, id: CommandId) -> Result<(), ScheduleError> {
        let taken = self
            .source
            .iter()
            .map(|entry| &entry.metadata)
            .chain(self.cache.iter())
            .any(|metadata| metadata.read().id() == id);
        if taken {
            return Err(ScheduleError::DuplicateCommand(id));
        }
        Ok(())
    }

    fn live_index_for(&self, incoming: &Shared<M>, world: &World, now: Tick) -> Option<usize> {
        let incoming = incoming.read();
        if !incoming.status(world, now).is_live() {
            return None;
        }
        let target = incoming.target();
        self.source.iter().position(|entry| {
            let resident = entry.metadata.read();
            resident.target() == target && resident.status(world, now).is_live()
        })
    }
}

fn plan_if_executing<V: Visitor>(
    visitor: &V,
    metadata: &Shared<V::Metadata>,
    world: &World,
    now: Tick,
) -> Option<V::Plan> {
    let metadata = metadata.read();
    if metadata.status(world, now) != State::Executing {
        return None;
    }
    Some(visitor.plan(&metadata, world, now))
}

fn visit_entry<V: Visitor>(
    visitor: &V,
    metadata: &Shared<V::Metadata>,
    plan: V::Plan,
    ctx: &mut VisitContext<'_>,
    summary: &mut AcceptSummary,
) {
    let mut metadata = metadata.write();
    if metadata.status(ctx.world(), ctx.now()) != State::Executing {
        return;
    }
    summary.visited += 1;
    let command = metadata.id();
    debug!(tick = %ctx.now(), flow = %<V::Metadata as Metadata>::KIND, %command, "visiting");

    let Err(error) = visitor.visit(&mut metadata, plan, ctx) else {
        return;
    };
    warn!(tick = %ctx.now(), flow = %<V::Metadata as Metadata>::KIND, %command, %error, "visit failed; canceling command");
    if let Err(cancel) = metadata.to(ctx.world(), ctx.now(), State::Canceled) {
        debug!(%command, error = %cancel, "failed command was already terminal");
    }
    summary.faults.push(Fault {
        flow: <V::Metadata as Metadata>::KIND,
        command,
        error,
    });
}

/// Shared handle to one flow type's schedule.
///
/// The driver's stage and the client command surface hold handles; other
/// flows only receive an [`Appender`].
#[derive(Debug)]
pub struct ScheduleHandle<M> {
    inner: Arc<Mutex<Schedule<M>>>,
}

impl<M> Clone for ScheduleHandle<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Metadata> Default for ScheduleHandle<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Metadata> ScheduleHandle<M> {
    /// Creates a handle to a fresh, empty schedule.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Schedule::new())),
        }
    }

    /// Locks the schedule.
    pub fn lock(&self) -> MutexGuard<'_, Schedule<M>> {
        self.inner.lock()
    }

    /// Places a client-issued command in the cache.
    pub fn schedule(&self, metadata: Shared<M>) -> Result<(), ScheduleError> {
        self.inner.lock().schedule(metadata)
    }

    /// Capability to append dependent commands into this schedule's source.
    #[must_use]
    pub fn appender(&self) -> Appender<M> {
        Appender {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Capability to append dependent commands into another flow type's source
/// list. It cannot read the cache, run merges or visit.
#[derive(Debug)]
pub struct Appender<M> {
    inner: Arc<Mutex<Schedule<M>>>,
}

impl<M> Clone for Appender<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Metadata> Appender<M> {
    /// Appends a dependent command into the target source list.
    ///
    /// Fails with [`ScheduleError::Busy`] instead of blocking when the target
    /// schedule is the one currently being visited.
    pub fn append(&self, metadata: Shared<M>, world: &World, now: Tick) -> Result<(), ScheduleError> {
        let mut schedule = self.inner.try_lock().ok_or(ScheduleError::Busy(M::KIND))?;
        schedule.append(metadata, world, now)
    }
}
