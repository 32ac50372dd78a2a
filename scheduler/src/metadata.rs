//! Command metadata: recomputable state machines describing one invocation.

use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use skirmish_core::{CommandId, EntityId, FlowKind, State, Tick, TransitionError, TransitionGraph};
use skirmish_world::World;

/// Metadata shared between its schedule and, optionally, one parent flow.
///
/// The owning visitor is the only writer; schedules and parents only read.
pub type Shared<M> = Arc<RwLock<M>>;

/// Wraps metadata for sharing between a schedule and a parent flow.
#[must_use]
pub fn shared<M>(metadata: M) -> Shared<M> {
    Arc::new(RwLock::new(metadata))
}

/// Read-only, recomputable view over the state of one flow invocation.
///
/// Implementors keep their scheduling fields private and expose setters only
/// to the visitor living in the same crate, so nothing else can advance them.
pub trait Metadata: fmt::Debug + Send + Sync + 'static {
    /// Flow type this metadata belongs to.
    const KIND: FlowKind;

    /// Flow types whose metadata this type reads when computing its status.
    ///
    /// The driver refuses to start unless every listed type is visited
    /// earlier in the tick and the declarations form no cycle.
    const DEPENDS_ON: &'static [FlowKind] = &[];

    /// Stable identifier of the invocation.
    fn id(&self) -> CommandId;

    /// Primary entity the command acts on; the schedule keeps at most one
    /// live command per target.
    fn target(&self) -> EntityId;

    /// State-machine bookkeeping shared by every flow.
    fn fsm(&self) -> &Fsm;

    /// Mutable bookkeeping, used by the schedule to latch a terminal state
    /// once it has been observed at the end of a tick.
    fn fsm_mut(&mut self) -> &mut Fsm;

    /// Recomputes the current state from game state and scheduling fields.
    ///
    /// Must be side-effect free: two calls without an intervening visitor
    /// mutation return the same value.
    fn status(&self, world: &World, now: Tick) -> State;

    /// Requests a transition to `target`, failing without any change unless
    /// `(status, target)` is a declared edge.
    fn to(&mut self, world: &World, now: Tick, target: State) -> Result<(), TransitionError>;

    /// Reports whether `self` wins a conflict against `other` for the same
    /// target. Must be antisymmetric and total over distinct commands.
    fn precedes(&self, other: &Self) -> bool;
}

/// Bookkeeping shared by every metadata type: identity, declared graph and
/// the terminal override set through [`Fsm::transition`] or [`Fsm::latch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fsm {
    id: CommandId,
    issued_at: Tick,
    graph: TransitionGraph,
    resolution: Option<State>,
}

impl Fsm {
    /// Creates bookkeeping for a command issued at `issued_at` that follows
    /// the standard transition graph.
    #[must_use]
    pub const fn new(id: CommandId, issued_at: Tick) -> Self {
        Self::with_graph(id, issued_at, TransitionGraph::STANDARD)
    }

    /// Creates bookkeeping that follows a custom transition graph.
    #[must_use]
    pub const fn with_graph(id: CommandId, issued_at: Tick, graph: TransitionGraph) -> Self {
        Self {
            id,
            issued_at,
            graph,
            resolution: None,
        }
    }

    /// Identifier of the command.
    #[must_use]
    pub const fn id(&self) -> CommandId {
        self.id
    }

    /// Tick the command was issued at.
    #[must_use]
    pub const fn issued_at(&self) -> Tick {
        self.issued_at
    }

    /// Declared transition graph.
    #[must_use]
    pub const fn graph(&self) -> TransitionGraph {
        self.graph
    }

    /// Terminal state stored by an earlier transition, if any.
    ///
    /// Status computations must return this before consulting anything else.
    #[must_use]
    pub const fn resolution(&self) -> Option<State> {
        self.resolution
    }

    /// Reports whether the command was canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.resolution == Some(State::Canceled)
    }

    /// Applies a transition from the freshly computed `current` state.
    ///
    /// Transitions into `Pending` or `Executing` are virtual: they are
    /// validated but not stored since those states stay derived. Terminal
    /// targets are stored and override every later status computation.
    pub fn transition(&mut self, current: State, target: State) -> Result<(), TransitionError> {
        self.graph.check(current, target)?;
        if target.is_terminal() {
            self.resolution = Some(target);
        }
        Ok(())
    }

    /// Stores a derived terminal state so later computations return it even
    /// when the inputs it was derived from change.
    ///
    /// Live states and an already stored resolution are left untouched.
    /// Returns the stored resolution afterwards.
    pub fn latch(&mut self, observed: State) -> Option<State> {
        if self.resolution.is_none() && observed.is_terminal() {
            self.resolution = Some(observed);
        }
        self.resolution
    }
}

/// Precedence rule under which the most recently issued command wins.
#[must_use]
pub fn newest_wins(candidate: &Fsm, incumbent: &Fsm) -> bool {
    (candidate.issued_at, candidate.id) > (incumbent.issued_at, incumbent.id)
}

/// Precedence rule under which the earliest issued command wins.
#[must_use]
pub fn oldest_wins(candidate: &Fsm, incumbent: &Fsm) -> bool {
    (candidate.issued_at, candidate.id) < (incumbent.issued_at, incumbent.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_transitions_are_not_stored() {
        let mut fsm = Fsm::new(CommandId::new(1), Tick::ZERO);

        fsm.transition(State::Pending, State::Executing)
            .expect("declared edge");

        assert_eq!(fsm.resolution(), None);
    }

    #[test]
    fn terminal_transitions_are_sticky() {
        let mut fsm = Fsm::new(CommandId::new(1), Tick::ZERO);
        fsm.transition(State::Executing, State::Canceled)
            .expect("declared edge");

        assert!(fsm.is_canceled());
        let before = fsm.clone();
        assert!(fsm.transition(State::Canceled, State::Finished).is_err());
        assert_eq!(fsm, before);
    }

    #[test]
    fn latch_keeps_first_terminal_state_only() {
        let mut fsm = Fsm::new(CommandId::new(1), Tick::ZERO);

        assert_eq!(fsm.latch(State::Executing), None);
        assert_eq!(fsm.latch(State::Finished), Some(State::Finished));
        assert_eq!(fsm.latch(State::Canceled), Some(State::Finished));
        assert!(!fsm.is_canceled());
    }

    #[test]
    fn rejected_transition_leaves_fsm_unchanged() {
        let mut fsm = Fsm::new(CommandId::new(2), Tick::new(3));
        let before = fsm.clone();

        let result = fsm.transition(State::Pending, State::Pending);

        assert_eq!(
            result,
            Err(TransitionError::InvalidTransition {
                from: State::Pending,
                to: State::Pending,
            })
        );
        assert_eq!(fsm, before);
    }

    #[test]
    fn precedence_rules_are_antisymmetric() {
        let early = Fsm::new(CommandId::new(7), Tick::new(1));
        let late = Fsm::new(CommandId::new(3), Tick::new(4));
        let tie = Fsm::new(CommandId::new(8), Tick::new(1));

        for (a, b) in [(&early, &late), (&early, &tie), (&late, &tie)] {
            assert_ne!(newest_wins(a, b), newest_wins(b, a));
            assert_ne!(oldest_wins(a, b), oldest_wins(b, a));
        }
        assert!(newest_wins(&late, &early));
        assert!(oldest_wins(&early, &late));
        assert!(newest_wins(&tie, &early));
    }
}
