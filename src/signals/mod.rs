//! Signal identifiers shared by the link, the trip metrics and the calibration.
//!
//! Every physical and derived quantity has a dense [`SignalId`] so that the
//! engines can keep per-signal state in plain arrays.

pub mod catalog;

pub use catalog::{format_as_time, CategoryFlags, DefaultCatalog, SignalCatalog, SignalDescriptor};

use serde::{Deserialize, Serialize};

/// Identifier of a physical or derived signal.
///
/// The discriminants are dense (`0..SignalId::COUNT`) and are used as array
/// indices throughout the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SignalId {
    // Battery
    BattSizeWh = 0,
    BattRemainWh,
    BattHealth,
    BattTemp,
    BattChargeCycles,
    BattVoltage,
    BattCurrent,
    BattChargePercent,
    // Motor
    RiderPower,
    MotCadence,
    MotSpeed,
    MotOdometer,
    MotAssistLevel,
    MotTemp,
    MotPower,
    /// Composite: three per-level peak-assist percentages delivered as raw bytes
    MotPeakAssist,
    MotShuttle,
    // Bike configuration
    BikeWheelCirc,
    BikeAssistLev1,
    BikeAssistLev2,
    BikeAssistLev3,
    BikeFakeChannel,
    BikeAccel,
    // Barometer
    BaroAltimeter,
    // Virtual and trip values
    VirtInclination,
    TripDistance,
    TripTime,
    TripAvgSpeed,
    TripRiderEnergy,
    TripMotorEnergy,
    TripBattEnergy,
    TripElevationGain,
    TripPeakMotTemp,
    TripPeakBattTemp,
    TripPeakBattCurrent,
    TripPeakRiderPower,
    TripPeakMotorPower,
    TripMinBattVoltage,
    TripMaxSpeed,
    TripConsumption,
    VirtConsumption,
    TripRange,
    GyroPitch,
    BaroTemp,
    /// Propulsive power estimated by the physical model
    PwrPower,
}

impl SignalId {
    /// Number of dispatchable signals.
    pub const COUNT: usize = 45;

    /// All signals in index order.
    pub const ALL: [SignalId; SignalId::COUNT] = [
        SignalId::BattSizeWh,
        SignalId::BattRemainWh,
        SignalId::BattHealth,
        SignalId::BattTemp,
        SignalId::BattChargeCycles,
        SignalId::BattVoltage,
        SignalId::BattCurrent,
        SignalId::BattChargePercent,
        SignalId::RiderPower,
        SignalId::MotCadence,
        SignalId::MotSpeed,
        SignalId::MotOdometer,
        SignalId::MotAssistLevel,
        SignalId::MotTemp,
        SignalId::MotPower,
        SignalId::MotPeakAssist,
        SignalId::MotShuttle,
        SignalId::BikeWheelCirc,
        SignalId::BikeAssistLev1,
        SignalId::BikeAssistLev2,
        SignalId::BikeAssistLev3,
        SignalId::BikeFakeChannel,
        SignalId::BikeAccel,
        SignalId::BaroAltimeter,
        SignalId::VirtInclination,
        SignalId::TripDistance,
        SignalId::TripTime,
        SignalId::TripAvgSpeed,
        SignalId::TripRiderEnergy,
        SignalId::TripMotorEnergy,
        SignalId::TripBattEnergy,
        SignalId::TripElevationGain,
        SignalId::TripPeakMotTemp,
        SignalId::TripPeakBattTemp,
        SignalId::TripPeakBattCurrent,
        SignalId::TripPeakRiderPower,
        SignalId::TripPeakMotorPower,
        SignalId::TripMinBattVoltage,
        SignalId::TripMaxSpeed,
        SignalId::TripConsumption,
        SignalId::VirtConsumption,
        SignalId::TripRange,
        SignalId::GyroPitch,
        SignalId::BaroTemp,
        SignalId::PwrPower,
    ];

    /// Array index of this signal.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Look up a signal by its array index.
    pub fn from_index(index: usize) -> Option<SignalId> {
        Self::ALL.get(index).copied()
    }
}

impl std::fmt::Display for SignalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Millisecond tick since an arbitrary epoch (wraps after ~49 days).
pub type Tick = u32;

/// Seconds elapsed between two ticks, tolerant of wrap-around.
pub fn seconds_between(earlier: Tick, later: Tick) -> f32 {
    later.wrapping_sub(earlier) as f32 / 1000.0
}
