//! Trip accumulators.
//!
//! Each derived trip value follows one accumulation rule. A value is made of
//! the current run (since the last start) and a carried-over part folded in
//! by [`Accumulator::stop`], so a trip can be paused and resumed.

use crate::signals::{seconds_between, Tick};

/// Accumulation rule with its rule-specific state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    /// Running maximum
    Peak { current: f32, carried: f32 },
    /// Running minimum, seeded by the first sample of a run
    Minimum {
        current: Option<f32>,
        carried: Option<f32>,
    },
    /// Distance of the latest sample from the first one of the run
    AbsDifference {
        reference: Option<f32>,
        current: f32,
        carried: f32,
    },
    /// Sum of the positive steps between consecutive samples
    PositiveSum {
        reference: Option<f32>,
        current: f32,
        carried: f32,
    },
    /// Time integral, delivered in hours (W -> Wh)
    Integral {
        last_time: Option<Tick>,
        current: f32,
        carried: f32,
    },
    /// Time weighted average
    Average {
        last_time: Option<Tick>,
        weighted_sum: f32,
        total_time: f32,
    },
    /// Latest sample verbatim
    PassThrough { value: f32 },
}

/// One accumulator with its change flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accumulator {
    strategy: Strategy,
    dirty: bool,
}

impl Accumulator {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            dirty: false,
        }
    }

    pub fn peak() -> Self {
        Self::new(Strategy::Peak {
            current: 0.0,
            carried: 0.0,
        })
    }

    pub fn minimum() -> Self {
        Self::new(Strategy::Minimum {
            current: None,
            carried: None,
        })
    }

    pub fn abs_difference() -> Self {
        Self::new(Strategy::AbsDifference {
            reference: None,
            current: 0.0,
            carried: 0.0,
        })
    }

    pub fn positive_sum() -> Self {
        Self::new(Strategy::PositiveSum {
            reference: None,
            current: 0.0,
            carried: 0.0,
        })
    }

    pub fn integral() -> Self {
        Self::new(Strategy::Integral {
            last_time: None,
            current: 0.0,
            carried: 0.0,
        })
    }

    pub fn average() -> Self {
        Self::new(Strategy::Average {
            last_time: None,
            weighted_sum: 0.0,
            total_time: 0.0,
        })
    }

    pub fn pass_through() -> Self {
        Self::new(Strategy::PassThrough { value: 0.0 })
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Pass-through values are not trip scoped.
    pub fn is_pass_through(&self) -> bool {
        matches!(self.strategy, Strategy::PassThrough { .. })
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Feed a sample.
    pub fn set(&mut self, sample: f32, timestamp: Tick) {
        match &mut self.strategy {
            Strategy::Peak { current, .. } => {
                *current = current.max(sample);
            }
            Strategy::Minimum { current, carried } => {
                if current.is_none() {
                    *current = Some(sample);
                    if carried.is_none() {
                        *carried = Some(sample);
                    }
                }
                *current = current.map(|c| c.min(sample));
            }
            Strategy::AbsDifference {
                reference, current, ..
            } => {
                let start = *reference.get_or_insert(sample);
                *current = (sample - start).abs();
            }
            Strategy::PositiveSum {
                reference, current, ..
            } => {
                let previous = reference.replace(sample).unwrap_or(sample);
                let step = sample - previous;
                if step > 0.0 {
                    *current += step;
                }
            }
            Strategy::Integral {
                last_time, current, ..
            } => {
                let since = last_time.replace(timestamp).unwrap_or(timestamp);
                *current += sample * seconds_between(since, timestamp);
            }
            Strategy::Average {
                last_time,
                weighted_sum,
                total_time,
            } => {
                let since = last_time.replace(timestamp).unwrap_or(timestamp);
                let dt = seconds_between(since, timestamp);
                *weighted_sum += sample * dt;
                *total_time += dt;
            }
            Strategy::PassThrough { value } => {
                *value = sample;
            }
        }
        self.dirty = true;
    }

    /// Fold the current run into the carried-over part.
    pub fn stop(&mut self) {
        match &mut self.strategy {
            Strategy::Peak { current, carried } => {
                *carried = carried.max(*current);
                *current = 0.0;
            }
            Strategy::Minimum { current, carried } => {
                if let Some(c) = current.take() {
                    *carried = Some(carried.map_or(c, |m| m.min(c)));
                }
            }
            Strategy::AbsDifference {
                reference,
                current,
                carried,
            }
            | Strategy::PositiveSum {
                reference,
                current,
                carried,
            } => {
                *carried += *current;
                *current = 0.0;
                *reference = None;
            }
            Strategy::Integral {
                last_time,
                current,
                carried,
            } => {
                *carried += *current;
                *current = 0.0;
                *last_time = None;
            }
            Strategy::Average { last_time, .. } => {
                *last_time = None;
            }
            Strategy::PassThrough { .. } => {}
        }
    }

    /// Zero everything and flag the change.
    pub fn reset(&mut self) {
        self.strategy = match self.strategy {
            Strategy::Peak { .. } => Self::peak().strategy,
            Strategy::Minimum { .. } => Self::minimum().strategy,
            Strategy::AbsDifference { .. } => Self::abs_difference().strategy,
            Strategy::PositiveSum { .. } => Self::positive_sum().strategy,
            Strategy::Integral { .. } => Self::integral().strategy,
            Strategy::Average { .. } => Self::average().strategy,
            Strategy::PassThrough { .. } => Self::pass_through().strategy,
        };
        self.dirty = true;
    }

    /// Current value without touching the change flag.
    pub fn value(&self) -> f32 {
        match self.strategy {
            Strategy::Peak { current, carried } => current.max(carried),
            Strategy::Minimum { current, carried } => match (current, carried) {
                (Some(c), Some(m)) => c.min(m),
                (Some(v), None) | (None, Some(v)) => v,
                (None, None) => 0.0,
            },
            Strategy::AbsDifference {
                current, carried, ..
            }
            | Strategy::PositiveSum {
                current, carried, ..
            } => current + carried,
            Strategy::Integral {
                current, carried, ..
            } => (current + carried) / 3600.0,
            Strategy::Average {
                weighted_sum,
                total_time,
                ..
            } => {
                if total_time > 0.0 {
                    weighted_sum / total_time
                } else {
                    0.0
                }
            }
            Strategy::PassThrough { value } => value,
        }
    }

    /// Deliver the value if it changed (or `force`), clearing the flag.
    pub fn deliver(&mut self, force: bool) -> Option<f32> {
        if self.dirty || force {
            self.dirty = false;
            Some(self.value())
        } else {
            None
        }
    }
}
