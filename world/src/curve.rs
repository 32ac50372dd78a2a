//! Step curves storing per-tick entity state.

use skirmish_core::Tick;

/// Piecewise-constant value over time.
///
/// Samples are kept sorted by tick. The value at a tick is the value of the
/// latest sample at or before it; ticks preceding the first sample resolve to
/// the first sample so freshly spawned entities read consistently.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Curve<T> {
    samples: Vec<(Tick, T)>,
}

impl<T: Copy> Curve<T> {
    /// Creates a curve holding a single sample.
    #[must_use]
    pub fn starting_at(tick: Tick, value: T) -> Self {
        Self {
            samples: vec![(tick, value)],
        }
    }

    /// Value of the curve at the provided tick.
    #[must_use]
    pub fn value_at(&self, tick: Tick) -> Option<T> {
        let index = self.samples.partition_point(|(at, _)| *at <= tick);
        if index == 0 {
            self.samples.first().map(|(_, value)| *value)
        } else {
            self.samples.get(index - 1).map(|(_, value)| *value)
        }
    }

    /// Latest sample stored in the curve.
    #[must_use]
    pub fn last(&self) -> Option<(Tick, T)> {
        self.samples.last().copied()
    }

    /// Number of stored samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Reports whether the curve holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sets the value from `tick` onwards, discarding any later samples.
    pub fn set(&mut self, tick: Tick, value: T) {
        self.truncate_after(tick);
        if let Some(last) = self.samples.last_mut() {
            if last.0 == tick {
                last.1 = value;
                return;
            }
        }
        self.samples.push((tick, value));
    }

    /// Replaces the future of the curve with `values`, one every `cadence`
    /// ticks starting `cadence` ticks after `from`.
    ///
    /// Returns the tick of the final sample, or `from` when `values` is empty.
    pub fn rewrite_from<I>(&mut self, from: Tick, cadence: u64, values: I) -> Tick
    where
        I: IntoIterator<Item = T>,
    {
        let anchor = self.value_at(from);
        self.truncate_after(from);
        if let Some(anchor) = anchor {
            if self.samples.last().map_or(true, |(at, _)| *at < from) {
                self.samples.push((from, anchor));
            }
        }

        let mut at = from;
        for value in values {
            at = at.after(cadence.max(1));
            self.samples.push((at, value));
        }
        at
    }

    fn truncate_after(&mut self, tick: Tick) {
        let keep = self.samples.partition_point(|(at, _)| *at <= tick);
        self.samples.truncate(keep);
    }
}
