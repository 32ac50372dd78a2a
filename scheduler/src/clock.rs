//! Monotonic tick counter with a bounded window of recent tick identifiers.

use std::collections::VecDeque;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use skirmish_core::{Tick, TickId};
use thiserror::Error;

/// Raised for a tick identifier that is unknown or older than the lookback
/// window.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("tick id {0} is outside the accepted lookback window")]
pub struct StaleTick(pub TickId);

/// Tick counter that hands out opaque identifiers for recent ticks.
///
/// Identifiers come from a seeded generator so a run is reproducible, while
/// clients still cannot forge an id for a tick they never observed.
#[derive(Debug, Clone)]
pub struct TickClock {
    now: Tick,
    current: TickId,
    window: VecDeque<(Tick, TickId)>,
    lookback: usize,
    rng: ChaCha8Rng,
}

impl TickClock {
    /// Creates a clock at tick zero that remembers the last `lookback` ticks.
    #[must_use]
    pub fn new(lookback: usize, seed: u64) -> Self {
        let lookback = lookback.max(1);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let current = TickId::new(rng.next_u64());
        let mut window = VecDeque::with_capacity(lookback);
        window.push_back((Tick::ZERO, current));
        Self {
            now: Tick::ZERO,
            current,
            window,
            lookback,
            rng,
        }
    }

    /// Advances to the next tick and returns it.
    pub fn advance(&mut self) -> Tick {
        self.now = self.now.next();
        self.current = TickId::new(self.rng.next_u64());
        self.window.push_back((self.now, self.current));
        while self.window.len() > self.lookback {
            let _ = self.window.pop_front();
        }
        self.now
    }

    /// Most recently started tick.
    #[must_use]
    pub const fn now(&self) -> Tick {
        self.now
    }

    /// Identifier of the most recently started tick.
    #[must_use]
    pub const fn current_id(&self) -> TickId {
        self.current
    }

    /// Number of ticks whose identifiers are still accepted.
    #[must_use]
    pub const fn lookback(&self) -> usize {
        self.lookback
    }

    /// Resolves an identifier to its tick if it is still inside the window.
    pub fn resolve(&self, id: TickId) -> Result<Tick, StaleTick> {
        self.window
            .iter()
            .find(|(_, candidate)| *candidate == id)
            .map(|(tick, _)| *tick)
            .ok_or(StaleTick(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_age_out_of_the_window() {
        let mut clock = TickClock::new(3, 7);
        let first = clock.current_id();

        let _ = clock.advance();
        let _ = clock.advance();
        assert_eq!(clock.resolve(first), Ok(Tick::ZERO));

        let _ = clock.advance();
        assert_eq!(clock.resolve(first), Err(StaleTick(first)));
        assert_eq!(clock.resolve(clock.current_id()), Ok(Tick::new(3)));
    }

    #[test]
    fn unknown_ids_are_stale() {
        let clock = TickClock::new(4, 1);
        let forged = TickId::new(clock.current_id().get().wrapping_add(1));

        assert_eq!(clock.resolve(forged), Err(StaleTick(forged)));
    }

    #[test]
    fn same_seed_yields_same_ids() {
        let mut left = TickClock::new(2, 99);
        let mut right = TickClock::new(2, 99);

        for _ in 0..5 {
            assert_eq!(left.advance(), right.advance());
            assert_eq!(left.current_id(), right.current_id());
        }
    }

    #[test]
    fn zero_lookback_still_accepts_current_tick() {
        let mut clock = TickClock::new(0, 3);
        let _ = clock.advance();

        assert_eq!(clock.lookback(), 1);
        assert_eq!(clock.resolve(clock.current_id()), Ok(Tick::new(1)));
    }
}
