//! Trip metrics engine.
//!
//! Physical samples are fed in with [`TripMetrics::feed`] and routed to the
//! accumulators of the derived values. The main loop pulls one changed value
//! per tick with [`TripMetrics::update`].

use crate::metrics::accumulator::Accumulator;
use crate::metrics::inclination::InclinationWindow;
use crate::signals::{
    format_as_time, seconds_between, CategoryFlags, DefaultCatalog, SignalCatalog,
    SignalDescriptor, SignalId, Tick,
};
use serde::{Deserialize, Serialize};

/// Minimum interval between two trip time refreshes.
const TRIP_TIME_REFRESH_MS: u32 = 1000;

/// Speed in km/h below which the bike counts as standing.
const STANDING_SPEED: f32 = 3.0;

/// Trip consumption in Wh/km below which no range is estimated.
const MIN_RANGE_CONSUMPTION: f32 = 2.0;

/// Trip lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripPhase {
    #[default]
    Reset,
    Started,
    Stopped,
}

/// Derived trip values and their accumulators.
pub struct TripMetrics {
    accumulators: [Option<Accumulator>; SignalId::COUNT],
    catalog: Box<dyn SignalCatalog + Send>,
    phase: TripPhase,
    /// Round-robin position of [`TripMetrics::update`]
    cursor: usize,
    start_time: Tick,
    trip_time_refreshed: Option<Tick>,
    inclination: InclinationWindow,
    last_speed: f32,
    last_odometer: f32,
    last_altitude: f32,
    last_batt_energy: f32,
    last_batt_temp: f32,
    last_mot_power: f32,
}

impl Default for TripMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TripMetrics {
    /// Create the engine with the built-in catalog.
    pub fn new() -> Self {
        Self::with_catalog(Box::new(DefaultCatalog))
    }

    pub fn with_catalog(catalog: Box<dyn SignalCatalog + Send>) -> Self {
        let mut accumulators = [None; SignalId::COUNT];

        let table = [
            (SignalId::VirtInclination, Accumulator::pass_through()),
            (SignalId::VirtConsumption, Accumulator::pass_through()),
            (SignalId::TripConsumption, Accumulator::pass_through()),
            (SignalId::TripRange, Accumulator::pass_through()),
            (SignalId::TripTime, Accumulator::abs_difference()),
            (SignalId::TripDistance, Accumulator::abs_difference()),
            (SignalId::TripAvgSpeed, Accumulator::average()),
            (SignalId::TripRiderEnergy, Accumulator::integral()),
            (SignalId::TripMotorEnergy, Accumulator::integral()),
            (SignalId::TripBattEnergy, Accumulator::abs_difference()),
            (SignalId::TripElevationGain, Accumulator::positive_sum()),
            (SignalId::TripPeakMotTemp, Accumulator::peak()),
            (SignalId::TripPeakBattTemp, Accumulator::peak()),
            (SignalId::TripPeakBattCurrent, Accumulator::peak()),
            (SignalId::TripPeakRiderPower, Accumulator::peak()),
            (SignalId::TripPeakMotorPower, Accumulator::peak()),
            (SignalId::TripMinBattVoltage, Accumulator::minimum()),
            (SignalId::TripMaxSpeed, Accumulator::peak()),
        ];
        for (id, acc) in table {
            accumulators[id.index()] = Some(acc);
        }

        Self {
            accumulators,
            catalog,
            phase: TripPhase::Reset,
            cursor: 0,
            start_time: 0,
            trip_time_refreshed: None,
            inclination: InclinationWindow::new(),
            last_speed: 0.0,
            last_odometer: 0.0,
            last_altitude: 0.0,
            last_batt_energy: 0.0,
            last_batt_temp: 0.0,
            last_mot_power: 0.0,
        }
    }

    pub fn phase(&self) -> TripPhase {
        self.phase
    }

    /// Current value of a derived signal, without consuming its change.
    pub fn value(&self, id: SignalId) -> Option<f32> {
        self.accumulators[id.index()].as_ref().map(Accumulator::value)
    }

    /// Check whether a derived signal has an undelivered change.
    pub fn is_dirty(&self, id: SignalId) -> bool {
        self.accumulators[id.index()]
            .as_ref()
            .map_or(false, Accumulator::is_dirty)
    }

    /// Feed a trip-scoped value; ignored unless the trip is running.
    fn set_trip_value(&mut self, id: SignalId, value: f32, timestamp: Tick) {
        if self.phase == TripPhase::Started {
            self.set_value(id, value, timestamp);
        }
    }

    fn set_value(&mut self, id: SignalId, value: f32, timestamp: Tick) {
        if let Some(acc) = self.accumulators[id.index()].as_mut() {
            acc.set(value, timestamp);
        }
    }

    /// Route a physical sample to the derived values depending on it.
    pub fn feed(&mut self, id: SignalId, value: f32, timestamp: Tick) {
        match id {
            SignalId::BaroAltimeter => {
                // barometer noise adds a slow drift to the gain
                self.set_trip_value(SignalId::TripElevationGain, value, timestamp);
                if self.last_speed < STANDING_SPEED {
                    self.update_inclination(self.last_odometer, value, timestamp);
                }
                self.last_altitude = value;
            }
            SignalId::MotOdometer => {
                self.set_trip_value(SignalId::TripDistance, value, timestamp);
                self.update_inclination(value, self.last_altitude, timestamp);
                self.last_odometer = value;
            }
            SignalId::BattRemainWh => {
                self.set_trip_value(SignalId::TripBattEnergy, value, timestamp);
                self.last_batt_energy = value;
            }
            SignalId::BattTemp => {
                self.set_trip_value(SignalId::TripPeakBattTemp, value, timestamp);
                self.last_batt_temp = value;
            }
            SignalId::BattVoltage => {
                self.set_trip_value(SignalId::TripMinBattVoltage, value, timestamp);
            }
            SignalId::BattCurrent => {
                self.set_trip_value(SignalId::TripPeakBattCurrent, value, timestamp);
            }
            SignalId::RiderPower => {
                self.set_trip_value(SignalId::TripPeakRiderPower, value, timestamp);
                self.set_trip_value(SignalId::TripRiderEnergy, value, timestamp);
            }
            SignalId::MotSpeed => {
                self.set_trip_value(SignalId::TripMaxSpeed, value, timestamp);
                self.set_trip_value(SignalId::TripAvgSpeed, value, timestamp);
                self.update_consumption(value, timestamp);
                self.last_speed = value;
            }
            SignalId::MotTemp => {
                self.set_trip_value(SignalId::TripPeakMotTemp, value, timestamp);
            }
            SignalId::MotPower => {
                self.set_trip_value(SignalId::TripPeakMotorPower, value, timestamp);
                self.set_trip_value(SignalId::TripMotorEnergy, value, timestamp);
                self.last_mot_power = value;
            }
            _ => {}
        }
    }

    fn update_inclination(&mut self, odometer: f32, altitude: f32, timestamp: Tick) {
        if let Some(grade) = self.inclination.push(odometer, altitude) {
            tracing::trace!("Inclination {}%", grade);
            self.set_value(SignalId::VirtInclination, grade, timestamp);
        }
    }

    /// Instantaneous and trip consumption, remaining range.
    fn update_consumption(&mut self, speed: f32, timestamp: Tick) {
        let consumption = if speed > STANDING_SPEED {
            self.last_mot_power / speed
        } else {
            0.0
        };
        self.set_value(SignalId::VirtConsumption, consumption, timestamp);

        let energy = self.value(SignalId::TripMotorEnergy).unwrap_or(0.0);
        let distance = self.value(SignalId::TripDistance).unwrap_or(0.0);
        if distance == 0.0 {
            return;
        }

        let trip_consumption = energy / distance;
        self.set_value(SignalId::TripConsumption, trip_consumption, timestamp);

        if trip_consumption >= MIN_RANGE_CONSUMPTION {
            let range = self.last_batt_energy / trip_consumption;
            self.set_value(SignalId::TripRange, range, timestamp);
        }
    }

    fn update_trip_time(&mut self, now: Tick) {
        if self.phase != TripPhase::Started {
            return;
        }
        let due = self
            .trip_time_refreshed
            .map_or(true, |last| now.wrapping_sub(last) > TRIP_TIME_REFRESH_MS);
        if due {
            let elapsed = seconds_between(self.start_time, now);
            self.set_value(SignalId::TripTime, elapsed, now);
            self.trip_time_refreshed = Some(now);
        }
    }

    /// Return the next derived value that changed since it was last
    /// delivered, scanning round-robin from the previous position.
    pub fn update(&mut self, now: Tick) -> Option<(SignalId, f32)> {
        self.update_trip_time(now);

        for _ in 0..SignalId::COUNT {
            let index = self.cursor;
            self.cursor = (self.cursor + 1) % SignalId::COUNT;

            if let Some(acc) = self.accumulators[index].as_mut() {
                if let Some(value) = acc.deliver(false) {
                    return SignalId::from_index(index).map(|id| (id, value));
                }
            }
        }
        None
    }

    fn trip_ids(&self) -> Vec<SignalId> {
        SignalId::ALL
            .into_iter()
            .filter(|id| {
                self.catalog
                    .describe(*id)
                    .map_or(false, |d| d.flags.contains(CategoryFlags::TRIP))
            })
            .collect()
    }

    /// Start or resume the trip.
    pub fn start_trip(&mut self, now: Tick) {
        if self.phase == TripPhase::Started {
            return;
        }
        tracing::info!("Trip started");

        self.phase = TripPhase::Started;
        self.start_time = now;
        self.trip_time_refreshed = None;

        for id in self.trip_ids() {
            if let Some(acc) = self.accumulators[id.index()].as_mut() {
                acc.mark_dirty();
            }
        }

        // battery temperature changes rarely, start from the last reading
        self.set_value(SignalId::TripPeakBattTemp, self.last_batt_temp, now);
        self.set_value(SignalId::TripTime, 0.0, now);
    }

    /// Pause the trip, keeping every value queryable.
    pub fn stop_trip(&mut self, now: Tick) {
        if self.phase != TripPhase::Started {
            return;
        }
        tracing::info!("Trip stopped");

        self.trip_time_refreshed = None;
        self.update_trip_time(now);
        self.phase = TripPhase::Stopped;

        for acc in self.accumulators.iter_mut().flatten() {
            acc.stop();
        }
    }

    /// Zero every derived value.
    pub fn reset_trip(&mut self) {
        tracing::info!("Trip reset");

        self.phase = TripPhase::Reset;
        self.start_time = 0;
        self.trip_time_refreshed = None;

        for acc in self.accumulators.iter_mut().flatten() {
            acc.reset();
        }
    }

    /// Hand every trip value to `sink`, formatted per its precision.
    ///
    /// Values are delivered regardless of their change flag; the flags are
    /// left untouched.
    pub fn write_snapshot<F>(&self, mut sink: F)
    where
        F: FnMut(&SignalDescriptor, &str),
    {
        for id in self.trip_ids() {
            let (desc, value) = match (self.catalog.describe(id), self.value(id)) {
                (Some(desc), Some(value)) => (desc, value),
                _ => continue,
            };

            let text = if desc.flags.contains(CategoryFlags::TIME) {
                format_as_time(value)
            } else {
                format!("{:7.prec$}", value, prec = desc.precision)
            };
            sink(&desc, &text);
        }
    }

    /// Trip snapshot as `label:\tvalue unit` lines.
    pub fn snapshot(&self) -> String {
        let mut out = String::new();
        self.write_snapshot(|desc, text| {
            out.push_str(&format!("{}:\t{} {}\n", desc.label, text, desc.unit));
        });
        out
    }
}
