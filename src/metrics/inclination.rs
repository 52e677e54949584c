//! Road grade from odometer and barometric altitude.

use std::collections::VecDeque;

/// Number of odometer/altitude pairs in the window.
pub const WINDOW_SIZE: usize = 10;

/// Minimum horizontal distance in meters for a grade estimate.
pub const MIN_DISTANCE_M: f32 = 50.0;

/// Sliding window of odometer (km) / altitude (m) pairs.
#[derive(Debug, Clone)]
pub struct InclinationWindow {
    points: VecDeque<(f32, f32)>,
}

impl Default for InclinationWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl InclinationWindow {
    pub fn new() -> Self {
        Self {
            points: VecDeque::with_capacity(WINDOW_SIZE),
        }
    }

    /// Add a pair and return the grade in percent once the window is full.
    ///
    /// While filling, nothing is returned. Once full, the oldest pair is
    /// replaced and the grade between it and the new pair is computed; a
    /// distance below [`MIN_DISTANCE_M`] yields 0.
    pub fn push(&mut self, odometer_km: f32, altitude_m: f32) -> Option<f32> {
        if self.points.len() < WINDOW_SIZE {
            self.points.push_back((odometer_km, altitude_m));
            return None;
        }

        let (oldest_odo, oldest_alt) = self.points.pop_front()?;
        self.points.push_back((odometer_km, altitude_m));

        let dy = altitude_m - oldest_alt;
        let dx = (odometer_km - oldest_odo) * 1000.0;
        if dx > MIN_DISTANCE_M {
            Some((dy / dx * 100.0).round())
        } else {
            Some(0.0)
        }
    }

    pub fn is_full(&self) -> bool {
        self.points.len() >= WINDOW_SIZE
    }
}
