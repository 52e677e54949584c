//! Derived trip metrics: accumulators, inclination and the trip engine.

pub mod accumulator;
pub mod engine;
pub mod inclination;

pub use accumulator::{Accumulator, Strategy};
pub use engine::{TripMetrics, TripPhase};
pub use inclination::InclinationWindow;
