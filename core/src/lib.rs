#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Skirmish simulation server.
//!
//! This crate defines the vocabulary that connects the authoritative world,
//! the tick scheduler and the per-flow systems. Clients submit
//! [`ClientRequest`] values, the engine turns each one into command metadata
//! placed in a flow-specific schedule, and every tick the scheduler walks
//! those schedules in a fixed [`FlowKind`] order. Each metadata instance is a
//! small state machine whose [`State`] is recomputed on demand and whose
//! legal moves are described by a [`TransitionGraph`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discrete simulation step counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tick(u64);

impl Tick {
    /// The first tick of every simulation.
    pub const ZERO: Self = Self(0);

    /// Creates a tick from its numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the tick.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Tick that immediately follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Tick reached after waiting the provided number of ticks.
    #[must_use]
    pub const fn after(self, ticks: u64) -> Self {
        Self(self.0.saturating_add(ticks))
    }

    /// Number of ticks elapsed since `earlier`, zero when `earlier` lies ahead.
    #[must_use]
    pub const fn since(self, earlier: Tick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier handed to clients so they can tag requests with the tick
/// they observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TickId(u64);

impl TickId {
    /// Wraps a raw tick identifier.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the raw identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Unique identifier assigned to an entity by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    /// Creates a new entity identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Unique identifier assigned to a single command invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(u64);

impl CommandId {
    /// Creates a new command identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Location of a single grid cell expressed as column and row coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    column: u32,
    row: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Computes the Manhattan distance between two cell coordinates.
    #[must_use]
    pub fn manhattan_distance(self, other: CellCoord) -> u32 {
        self.column().abs_diff(other.column()) + self.row().abs_diff(other.row())
    }

    /// Computes the Chebyshev (king move) distance between two cells.
    ///
    /// Attack and ability ranges are measured with this metric so a unit
    /// standing diagonally next to its target counts as adjacent.
    #[must_use]
    pub fn chebyshev_distance(self, other: CellCoord) -> u32 {
        self.column()
            .abs_diff(other.column())
            .max(self.row().abs_diff(other.row()))
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.column, self.row)
    }
}

/// Hit points carried by an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Health(u32);

impl Health {
    /// Creates a new health value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the health value.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Reports whether the health pool is depleted.
    #[must_use]
    pub const fn is_depleted(&self) -> bool {
        self.0 == 0
    }

    /// Health remaining after taking `amount` damage, clamped at zero.
    #[must_use]
    pub const fn damaged(self, amount: u32) -> Self {
        Self(self.0.saturating_sub(amount))
    }

    /// Health after restoring `amount`, clamped at `max`.
    #[must_use]
    pub fn healed(self, amount: u32, max: Health) -> Self {
        Self(self.0.saturating_add(amount).min(max.0))
    }
}

/// Named category of state mutation scheduled by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// Walks an entity toward a destination cell.
    Move,
    /// Keeps an entity within range of a moving target.
    Chase,
    /// Deals periodic damage to a target entity.
    Attack,
    /// Casts an entity ability once its cooldown elapses.
    Ability,
    /// Builds a new unit at a producing structure.
    Produce,
}

impl FlowKind {
    /// Every flow kind in the default visiting order.
    pub const ALL: [FlowKind; 5] = [
        FlowKind::Move,
        FlowKind::Chase,
        FlowKind::Attack,
        FlowKind::Ability,
        FlowKind::Produce,
    ];

    /// Stable lowercase name used in logs and configuration.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Chase => "chase",
            Self::Attack => "attack",
            Self::Ability => "ability",
            Self::Produce => "produce",
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Externally observable phase of a command invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum State {
    /// The command waits for its next execution window.
    Pending,
    /// The command is due and its visitor should act this tick.
    Executing,
    /// The command completed successfully.
    Finished,
    /// The command was abandoned and will not act again.
    Canceled,
}

impl State {
    /// Reports whether the state has no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Canceled)
    }

    /// Reports whether the state is still able to act.
    #[must_use]
    pub const fn is_live(self) -> bool {
        !self.is_terminal()
    }
}

/// Declared set of legal `(from, to)` state transitions for a flow type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionGraph {
    edges: &'static [(State, State)],
}

impl TransitionGraph {
    /// Graph shared by every built-in flow.
    ///
    /// Pending and Executing alternate while a flow waits for and then
    /// performs work; either may end the flow. Terminal states have no
    /// outgoing edges.
    pub const STANDARD: Self = Self::new(&[
        (State::Pending, State::Executing),
        (State::Pending, State::Finished),
        (State::Pending, State::Canceled),
        (State::Executing, State::Pending),
        (State::Executing, State::Finished),
        (State::Executing, State::Canceled),
    ]);

    /// Builds a graph from a static edge list.
    #[must_use]
    pub const fn new(edges: &'static [(State, State)]) -> Self {
        Self { edges }
    }

    /// Reports whether `from -> to` is a declared edge.
    #[must_use]
    pub fn allows(&self, from: State, to: State) -> bool {
        self.edges.iter().any(|edge| *edge == (from, to))
    }

    /// Validates a transition request against the declared edges.
    pub fn check(&self, from: State, to: State) -> Result<(), TransitionError> {
        if self.allows(from, to) {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }

    /// Iterator over the declared edges.
    pub fn edges(&self) -> impl Iterator<Item = (State, State)> + '_ {
        self.edges.iter().copied()
    }
}

/// Rejection raised when a state transition is not part of the declared graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The requested target is unreachable from the current computed state.
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// State computed at the time of the request.
        from: State,
        /// State the caller asked for.
        to: State,
    },
}

/// Travel behaviour requested for a move command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveMode {
    /// Walk to the destination and stop.
    #[default]
    Direct,
    /// Walk back and forth between the starting cell and the destination.
    Patrol,
}

/// Abilities an entity can cast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityKind {
    /// Restores health to the caster.
    Mend,
    /// Damages every other entity close to the caster.
    Shockwave,
}

impl AbilityKind {
    /// Ticks the caster must wait before casting the same ability again.
    #[must_use]
    pub const fn cooldown_ticks(self) -> u64 {
        match self {
            Self::Mend => 8,
            Self::Shockwave => 12,
        }
    }

    /// Healing or damage applied by the ability.
    #[must_use]
    pub const fn magnitude(self) -> u32 {
        match self {
            Self::Mend => 4,
            Self::Shockwave => 3,
        }
    }

    /// Radius in cells affected by the ability, zero for self-targeted casts.
    #[must_use]
    pub const fn radius(self) -> u32 {
        match self {
            Self::Mend => 0,
            Self::Shockwave => 2,
        }
    }

    /// Rank used to decide which of two queued casts for the same caster wins.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Mend => 1,
            Self::Shockwave => 2,
        }
    }
}

/// Facets of entity state tracked as curves over time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CurveKind {
    /// Cell occupied by the entity at a given tick.
    Position,
    /// Hit points of the entity at a given tick.
    Health,
    /// Tick at which an ability becomes castable again.
    Cooldown,
}

/// Commands a client may issue against the simulation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ClientCommand {
    /// Walks each listed entity toward the destination.
    Move {
        /// Entities that should move.
        entities: Vec<EntityId>,
        /// Cell every entity should reach.
        destination: CellCoord,
        /// Travel behaviour applied to every entity.
        #[serde(default)]
        mode: MoveMode,
    },
    /// Orders an entity to attack another entity until it is destroyed.
    Attack {
        /// Entity performing the attack.
        attacker: EntityId,
        /// Entity being attacked.
        target: EntityId,
    },
    /// Casts an ability as soon as its cooldown allows.
    UseAbility {
        /// Entity casting the ability.
        caster: EntityId,
        /// Ability being cast.
        ability: AbilityKind,
    },
    /// Starts producing a unit at a structure.
    Produce {
        /// Structure producing the unit.
        producer: EntityId,
        /// Optional cell the new unit should walk to.
        #[serde(default)]
        rally: Option<CellCoord>,
    },
}

impl ClientCommand {
    /// Flow kind that schedules the command.
    #[must_use]
    pub const fn flow(&self) -> FlowKind {
        match self {
            Self::Move { .. } => FlowKind::Move,
            Self::Attack { .. } => FlowKind::Attack,
            Self::UseAbility { .. } => FlowKind::Ability,
            Self::Produce { .. } => FlowKind::Produce,
        }
    }
}

/// Client command tagged with the tick the client observed when issuing it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequest {
    /// Identifier of the tick the client last observed.
    pub tick_id: TickId,
    /// Command being requested.
    pub command: ClientCommand,
}

impl ClientRequest {
    /// Wraps a command with the tick identifier it was issued against.
    #[must_use]
    pub const fn new(tick_id: TickId, command: ClientCommand) -> Self {
        Self { tick_id, command }
    }
}
