#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Tick scheduler for Skirmish.
//!
//! Every flow type owns a [`Schedule`] of [`Metadata`] entries and a
//! [`Visitor`], paired in a [`Stage`]. The [`TickDriver`] runs clear, merge
//! and accept for each stage in the configured order once per tick. Metadata
//! only computes state; visitors are the only code that mutates the world.

mod clock;
mod config;
mod driver;
mod ids;
mod metadata;
mod schedule;
mod stage;
mod visitor;

#[cfg(test)]
mod fixtures;

pub use clock::{StaleTick, TickClock};
pub use config::{ConfigError, SchedulerConfig, BUILTIN_SCHEDULER_CONFIG};
pub use driver::{FlowReport, TickDriver, TickDriverBuilder, TickReport};
pub use ids::CommandIds;
pub use metadata::{newest_wins, oldest_wins, shared, Fsm, Metadata, Shared};
pub use schedule::{
    AcceptSummary, Appender, Fault, MergeSummary, Schedule, ScheduleError, ScheduleHandle,
};
pub use stage::{FlowStage, Stage};
pub use visitor::{VisitContext, VisitError, VisitMode, Visitor};
