//! Drive train efficiency estimate.
//!
//! The energy the physical model says was needed, minus what the rider put
//! in, must have come from the battery. Comparing that with the battery
//! energy actually consumed yields the efficiency factor.

use crate::signals::{seconds_between, Tick};

/// Battery energy in Wh that must be consumed before the first estimate.
pub const MIN_CONSUMED_WH: u32 = 100;

/// Consumed battery energy step in Wh at which estimates are reported.
pub const REPORT_STEP_WH: u32 = 50;

/// Integrates calculated and rider energy against battery consumption.
#[derive(Debug, Clone, Default)]
pub struct EfficiencyTracker {
    eta: f32,
    /// Propulsive energy from the model in Wh
    calc_energy: f32,
    /// Rider energy in Wh
    rider_energy: f32,
    start_remain_wh: Option<u32>,
    last_remain_wh: u32,
    last_rider_power: f32,
    last_update: Option<Tick>,
    reported_at: Option<u32>,
    pending: bool,
}

impl EfficiencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rider_power(&mut self, watts: f32) {
        self.last_rider_power = watts;
    }

    /// Remaining battery energy in Wh. The first non-zero reading becomes
    /// the reference.
    pub fn set_remaining_wh(&mut self, wh: f32) {
        let wh = wh.round().max(0.0) as u32;
        if self.start_remain_wh.is_none() && wh > 0 {
            tracing::debug!("Efficiency reference battery energy: {} Wh", wh);
            self.start_remain_wh = Some(wh);
        }
        self.last_remain_wh = wh;
    }

    pub fn calc_energy(&self) -> f32 {
        self.calc_energy
    }

    pub fn rider_energy(&self) -> f32 {
        self.rider_energy
    }

    /// Battery energy consumed since the reference reading, in Wh.
    pub fn consumed_wh(&self) -> u32 {
        self.start_remain_wh
            .map_or(0, |start| start.saturating_sub(self.last_remain_wh))
    }

    /// Integrate one tick of model power (W).
    pub fn update(&mut self, calc_power: f32, timestamp: Tick) {
        if let Some(last) = self.last_update {
            let hours = seconds_between(last, timestamp) / 3600.0;
            self.rider_energy += self.last_rider_power * hours;
            if calc_power >= 0.0 {
                self.calc_energy += calc_power * hours;
            }
        }
        self.last_update = Some(timestamp);

        let consumed = self.consumed_wh();
        if consumed < MIN_CONSUMED_WH || consumed % REPORT_STEP_WH != 0 {
            return;
        }
        if self.reported_at == Some(consumed) {
            return;
        }
        self.reported_at = Some(consumed);

        let eta = (self.calc_energy - self.rider_energy) / consumed as f32;
        tracing::info!(
            "Efficiency after {} Wh: calculated {:.1} Wh, rider {:.1} Wh, eta {:.3}",
            consumed,
            self.calc_energy,
            self.rider_energy,
            eta
        );
        if eta.is_finite() && eta > 0.0 {
            self.eta = eta;
            self.pending = true;
        } else {
            tracing::warn!("Efficiency estimate {:.3} discarded", eta);
        }
    }

    /// Take a new efficiency factor, once per estimate.
    pub fn take_eta(&mut self) -> Option<f32> {
        if self.pending {
            self.pending = false;
            Some(self.eta)
        } else {
            None
        }
    }
}
