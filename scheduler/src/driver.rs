//! Tick driver: runs clear, merge and accept for every flow type in the
//! configured order, one type at a time.

use std::collections::{BTreeMap, BTreeSet};

use skirmish_core::{FlowKind, Tick, TickId};
use skirmish_world::{DirtySet, World};
use tracing::{debug, info};

use crate::{
    clock::{StaleTick, TickClock},
    config::{ConfigError, SchedulerConfig},
    schedule::{Fault, MergeSummary},
    stage::{FlowStage, Stage},
    visitor::{VisitContext, VisitMode, Visitor},
};

/// What happened to one flow type during a tick.
#[derive(Debug)]
pub struct FlowReport {
    /// Flow type.
    pub kind: FlowKind,
    /// Terminal entries dropped by the clear phase.
    pub cleared: usize,
    /// Outcome of the merge phase.
    pub merge: MergeSummary,
    /// Entries visited by the accept phase.
    pub visited: usize,
    /// Visits that failed and canceled their command.
    pub faults: Vec<Fault>,
}

/// Summary of one simulated tick.
#[derive(Debug)]
pub struct TickReport {
    tick: Tick,
    tick_id: TickId,
    flows: Vec<FlowReport>,
    dirty: DirtySet,
}

impl TickReport {
    /// Simulated tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Identifier clients use to reference the tick.
    #[must_use]
    pub const fn tick_id(&self) -> TickId {
        self.tick_id
    }

    /// Per flow reports in visiting order.
    #[must_use]
    pub fn flows(&self) -> &[FlowReport] {
        &self.flows
    }

    /// Report of a single flow type.
    #[must_use]
    pub fn flow(&self, kind: FlowKind) -> Option<&FlowReport> {
        self.flows.iter().find(|report| report.kind == kind)
    }

    /// Entries visited for `kind`, zero when the flow did not run.
    #[must_use]
    pub fn visited(&self, kind: FlowKind) -> usize {
        self.flow(kind).map_or(0, |report| report.visited)
    }

    /// Every fault raised during the tick.
    pub fn faults(&self) -> impl Iterator<Item = &Fault> + '_ {
        self.flows.iter().flat_map(|report| report.faults.iter())
    }

    /// State touched during the tick.
    #[must_use]
    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    /// Hands the touched state over for broadcasting.
    #[must_use]
    pub fn into_dirty(self) -> DirtySet {
        self.dirty
    }
}

/// Collects stages before the driver validates them.
pub struct TickDriverBuilder {
    config: SchedulerConfig,
    stages: Vec<Box<dyn FlowStage>>,
}

impl std::fmt::Debug for TickDriverBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickDriverBuilder")
            .field("config", &self.config)
            .field("stages", &self.stages.iter().map(|stage| stage.kind()).collect::<Vec<_>>())
            .finish()
    }
}

impl TickDriverBuilder {
    /// Registers the stage of one flow type.
    #[must_use]
    pub fn register<V: Visitor + 'static>(mut self, stage: Stage<V>) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Validates the configuration against the registered stages.
    ///
    /// Rejects unregistered or duplicated flows, cyclic or stale read
    /// dependencies and parallel visiting of overlapping visitors.
    pub fn build(self) -> Result<TickDriver, ConfigError> {
        self.config.validate()?;

        let mut stages: BTreeMap<FlowKind, Box<dyn FlowStage>> = BTreeMap::new();
        for stage in self.stages {
            let kind = stage.kind();
            if stages.insert(kind, stage).is_some() {
                return Err(ConfigError::DuplicateFlow(kind));
            }
        }
        for kind in self.config.order() {
            if !stages.contains_key(kind) {
                return Err(ConfigError::UnregisteredFlow(*kind));
            }
        }
        if let Some(kind) = stages
            .keys()
            .find(|kind| !self.config.order().contains(*kind))
        {
            return Err(ConfigError::UnorderedFlow(*kind));
        }

        let dependencies: BTreeMap<FlowKind, &'static [FlowKind]> = stages
            .iter()
            .map(|(kind, stage)| (*kind, stage.depends_on()))
            .collect();
        check_dependencies(self.config.order(), &dependencies)?;

        for kind in self.config.parallel() {
            let stage = stages
                .get_mut(kind)
                .ok_or(ConfigError::UnregisteredFlow(*kind))?;
            if !stage.non_overlapping() {
                return Err(ConfigError::ParallelNotPermitted(*kind));
            }
            stage.set_mode(VisitMode::Parallel);
        }

        info!(
            order = ?self.config.order(),
            parallel = ?self.config.parallel(),
            "tick driver ready"
        );
        Ok(TickDriver {
            clock: TickClock::new(self.config.lookback_ticks(), self.config.tick_id_seed()),
            order: self.config.order().to_vec(),
            stages,
        })
    }
}

/// Verifies that declared read dependencies form no cycle and that every
/// dependency is visited before its dependent.
pub(crate) fn check_dependencies(
    order: &[FlowKind],
    dependencies: &BTreeMap<FlowKind, &'static [FlowKind]>,
) -> Result<(), ConfigError> {
    let mut indegree: BTreeMap<FlowKind, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<FlowKind, Vec<FlowKind>> = BTreeMap::new();
    for (flow, reads) in dependencies {
        let _ = indegree.entry(*flow).or_insert(0);
        for dependency in reads.iter() {
            let _ = indegree.entry(*dependency).or_insert(0);
            *indegree.entry(*flow).or_insert(0) += 1;
            dependents.entry(*dependency).or_default().push(*flow);
        }
    }

    let mut ready: BTreeSet<FlowKind> = indegree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(kind, _)| *kind)
        .collect();
    while let Some(kind) = ready.pop_first() {
        let _ = indegree.remove(&kind);
        for dependent in dependents.get(&kind).into_iter().flatten() {
            if let Some(count) = indegree.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    let _ = ready.insert(*dependent);
                }
            }
        }
    }
    if !indegree.is_empty() {
        return Err(ConfigError::DependencyCycle(indegree.into_keys().collect()));
    }

    let position = |kind: FlowKind| order.iter().position(|candidate| *candidate == kind);
    for (index, flow) in order.iter().enumerate() {
        let Some(reads) = dependencies.get(flow) else {
            continue;
        };
        for dependency in reads.iter() {
            match position(*dependency) {
                None => {
                    return Err(ConfigError::MissingDependency {
                        flow: *flow,
                        dependency: *dependency,
                    })
                }
                Some(at) if at > index => {
                    return Err(ConfigError::StaleDependency {
                        flow: *flow,
                        dependency: *dependency,
                    })
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}

/// Owns the tick clock and the stages of every flow type.
pub struct TickDriver {
    clock: TickClock,
    order: Vec<FlowKind>,
    stages: BTreeMap<FlowKind, Box<dyn FlowStage>>,
}

impl std::fmt::Debug for TickDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickDriver")
            .field("clock", &self.clock)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

impl TickDriver {
    /// Starts assembling a driver for the given configuration.
    #[must_use]
    pub fn builder(config: SchedulerConfig) -> TickDriverBuilder {
        TickDriverBuilder {
            config,
            stages: Vec::new(),
        }
    }

    /// Simulates one tick.
    ///
    /// Advances the clock, then runs clear, merge and accept for each flow
    /// type in order, so a type only ever observes earlier types' metadata
    /// after they finished for this tick. Entries ending the tick terminal
    /// are sealed once every type ran.
    pub fn tick(&mut self, world: &mut World) -> TickReport {
        let now = self.clock.advance();
        let mut dirty = DirtySet::new();
        let mut flows = Vec::with_capacity(self.order.len());

        for kind in &self.order {
            let Some(stage) = self.stages.get_mut(kind) else {
                continue;
            };
            let cleared = stage.clear(now);
            let merge = stage.merge(world, now);
            let accepted = {
                let mut ctx = VisitContext::new(world, &mut dirty, now);
                stage.accept(&mut ctx)
            };
            debug!(
                tick = %now,
                flow = %kind,
                cleared,
                appended = merge.appended,
                replaced = merge.replaced,
                rejected = merge.rejected,
                visited = accepted.visited,
                faults = accepted.faults.len(),
                "flow stage complete"
            );
            flows.push(FlowReport {
                kind: *kind,
                cleared,
                merge,
                visited: accepted.visited,
                faults: accepted.faults,
            });
        }
        for kind in &self.order {
            if let Some(stage) = self.stages.get_mut(kind) {
                stage.seal(world, now);
            }
        }

        TickReport {
            tick: now,
            tick_id: self.clock.current_id(),
            flows,
            dirty,
        }
    }

    /// Most recently simulated tick.
    #[must_use]
    pub const fn now(&self) -> Tick {
        self.clock.now()
    }

    /// Identifier of the most recently simulated tick.
    #[must_use]
    pub const fn current_tick_id(&self) -> TickId {
        self.clock.current_id()
    }

    /// Resolves a client-supplied tick identifier.
    pub fn resolve(&self, id: TickId) -> Result<Tick, StaleTick> {
        self.clock.resolve(id)
    }

    /// Flow types in visiting order.
    #[must_use]
    pub fn order(&self) -> &[FlowKind] {
        &self.order
    }

    /// Visiting mode of a flow type, if registered.
    #[must_use]
    pub fn mode(&self, kind: FlowKind) -> Option<VisitMode> {
        self.stages.get(&kind).map(|stage| stage.mode())
    }

    /// Number of source entries held for a flow type.
    #[must_use]
    pub fn source_len(&self, kind: FlowKind) -> usize {
        self.stages.get(&kind).map_or(0, |stage| stage.source_len())
    }
}
