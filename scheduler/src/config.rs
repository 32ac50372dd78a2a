//! Scheduler configuration loaded from JSON.

use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use skirmish_core::FlowKind;
use thiserror::Error;

/// Configuration shipped with the scheduler.
pub const BUILTIN_SCHEDULER_CONFIG: &str = include_str!("data/scheduler_config.json");

/// Startup configuration faults. None of them are recoverable at runtime.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The JSON document could not be parsed.
    #[error("failed to parse scheduler config: {0}")]
    Parse(#[from] serde_json::Error),
    /// The configuration file could not be read.
    #[error("failed to read scheduler config from {path:?}: {source}")]
    ReadFailed {
        /// Path that was read.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: io::Error,
    },
    /// Declared read dependencies between flow types form a cycle.
    #[error("flow dependencies form a cycle through {0:?}")]
    DependencyCycle(Vec<FlowKind>),
    /// A flow reads a type that is visited after it in the same tick.
    #[error("{flow} depends on {dependency}, which is visited after it")]
    StaleDependency {
        /// Dependent flow.
        flow: FlowKind,
        /// Flow it reads.
        dependency: FlowKind,
    },
    /// A flow reads a type that is never visited.
    #[error("{flow} depends on {dependency}, which is not in the visiting order")]
    MissingDependency {
        /// Dependent flow.
        flow: FlowKind,
        /// Flow it reads.
        dependency: FlowKind,
    },
    /// The visiting order names a flow without a registered stage.
    #[error("no stage registered for {0}")]
    UnregisteredFlow(FlowKind),
    /// A registered stage is missing from the visiting order.
    #[error("stage for {0} is registered but never visited")]
    UnorderedFlow(FlowKind),
    /// A flow appears twice in the visiting order or was registered twice.
    #[error("{0} is declared more than once")]
    DuplicateFlow(FlowKind),
    /// Parallel visiting was requested for a visitor whose entries overlap.
    #[error("{0} does not permit parallel visiting")]
    ParallelNotPermitted(FlowKind),
    /// A numeric setting is out of range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Tunables of the tick driver and the shipped flows.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    order: Vec<FlowKind>,
    parallel: Vec<FlowKind>,
    lookback_ticks: usize,
    path_budget: usize,
    ticks_per_cell: u64,
    chase_repath_ticks: u64,
    tick_id_seed: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            order: FlowKind::ALL.to_vec(),
            parallel: vec![FlowKind::Move],
            lookback_ticks: 8,
            path_budget: 10,
            ticks_per_cell: 2,
            chase_repath_ticks: 4,
            tick_id_seed: 24301,
        }
    }
}

impl SchedulerConfig {
    /// Parses the configuration bundled with the crate.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_json_str(BUILTIN_SCHEDULER_CONFIG)
    }

    /// Parses a configuration document; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Checks the settings that do not depend on registered stages.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for kind in &self.order {
            if !seen.insert(*kind) {
                return Err(ConfigError::DuplicateFlow(*kind));
            }
        }
        if self.order.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "order",
                reason: "at least one flow must be visited",
            });
        }
        if self.lookback_ticks == 0 {
            return Err(ConfigError::InvalidValue {
                field: "lookback_ticks",
                reason: "must be at least 1",
            });
        }
        if self.path_budget == 0 {
            return Err(ConfigError::InvalidValue {
                field: "path_budget",
                reason: "must be at least 1",
            });
        }
        if self.ticks_per_cell == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ticks_per_cell",
                reason: "must be at least 1",
            });
        }
        if self.chase_repath_ticks == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chase_repath_ticks",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Flow types in visiting order.
    #[must_use]
    pub fn order(&self) -> &[FlowKind] {
        &self.order
    }

    /// Flow types whose plans may be computed in parallel.
    #[must_use]
    pub fn parallel(&self) -> &[FlowKind] {
        &self.parallel
    }

    /// Number of recent ticks whose identifiers clients may still use.
    #[must_use]
    pub const fn lookback_ticks(&self) -> usize {
        self.lookback_ticks
    }

    /// Longest path prefix requested from the pathfinder in one visit.
    #[must_use]
    pub const fn path_budget(&self) -> usize {
        self.path_budget
    }

    /// Ticks a mobile entity spends crossing one cell.
    #[must_use]
    pub const fn ticks_per_cell(&self) -> u64 {
        self.ticks_per_cell
    }

    /// Ticks between two path refreshes of a chase.
    #[must_use]
    pub const fn chase_repath_ticks(&self) -> u64 {
        self.chase_repath_ticks
    }

    /// Seed of the tick identifier generator.
    #[must_use]
    pub const fn tick_id_seed(&self) -> u64 {
        self.tick_id_seed
    }

    /// Replaces the visiting order.
    #[must_use]
    pub fn with_order(mut self, order: Vec<FlowKind>) -> Self {
        self.order = order;
        self
    }

    /// Replaces the set of parallel flow types.
    #[must_use]
    pub fn with_parallel(mut self, parallel: Vec<FlowKind>) -> Self {
        self.parallel = parallel;
        self
    }

    /// Replaces the tick identifier seed.
    #[must_use]
    pub fn with_tick_id_seed(mut self, seed: u64) -> Self {
        self.tick_id_seed = seed;
        self
    }

    /// Replaces the path budget.
    #[must_use]
    pub fn with_path_budget(mut self, budget: usize) -> Self {
        self.path_budget = budget;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_matches_defaults() {
        let builtin = SchedulerConfig::builtin().expect("builtin config parses");
        assert_eq!(builtin, SchedulerConfig::default());
        builtin.validate().expect("builtin config is valid");
    }

    #[test]
    fn absent_fields_keep_defaults() {
        let config = SchedulerConfig::from_json_str(r#"{ "path_budget": 3 }"#).expect("parse");

        assert_eq!(config.path_budget(), 3);
        assert_eq!(config.order(), FlowKind::ALL.as_slice());
        assert_eq!(config.ticks_per_cell(), 2);
    }

    #[test]
    fn unknown_flow_names_fail_to_parse() {
        let result = SchedulerConfig::from_json_str(r#"{ "order": ["teleport"] }"#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn duplicate_order_entries_are_rejected() {
        let config = SchedulerConfig::default()
            .with_order(vec![FlowKind::Move, FlowKind::Chase, FlowKind::Move]);

        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateFlow(FlowKind::Move))
        ));
    }

    #[test]
    fn zero_values_are_rejected() {
        let config = SchedulerConfig::from_json_str(r#"{ "ticks_per_cell": 0 }"#).expect("parse");

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "ticks_per_cell",
                ..
            })
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let path = Path::new("/nonexistent/skirmish/scheduler.json");
        match SchedulerConfig::from_file(path) {
            Err(ConfigError::ReadFailed { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected read failure, got {other:?}"),
        }
    }
}
