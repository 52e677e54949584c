//! Presentation metadata for signals.
//!
//! The core only consults the category flags and the numeric precision; labels
//! and units are carried for the display and logging collaborators.

use super::SignalId;

/// Category flags of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CategoryFlags(u8);

impl CategoryFlags {
    /// Value rarely changes (configuration, battery size, ...)
    pub const STATIC: CategoryFlags = CategoryFlags(1 << 0);
    /// Value changes continuously while riding
    pub const DYNAMIC: CategoryFlags = CategoryFlags(1 << 1);
    /// Trip aggregate, part of the trip snapshot
    pub const TRIP: CategoryFlags = CategoryFlags(1 << 2);
    /// Value in seconds, formatted as `HH:MM:SS`
    pub const TIME: CategoryFlags = CategoryFlags(1 << 3);

    /// No flags set.
    pub const fn empty() -> Self {
        CategoryFlags(0)
    }

    /// Check whether all bits of `other` are set.
    pub const fn contains(self, other: CategoryFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Combine two flag sets.
    pub const fn union(self, other: CategoryFlags) -> Self {
        CategoryFlags(self.0 | other.0)
    }
}

impl std::ops::BitOr for CategoryFlags {
    type Output = CategoryFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

/// Metadata describing how a signal is presented.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalDescriptor {
    /// Signal this entry describes
    pub id: SignalId,
    /// Human readable label
    pub label: &'static str,
    /// Unit string
    pub unit: &'static str,
    /// Number of decimal places
    pub precision: usize,
    /// Category flags
    pub flags: CategoryFlags,
}

/// Read-only signal metadata lookup.
pub trait SignalCatalog {
    /// Describe a signal, `None` if the catalog does not know it.
    fn describe(&self, id: SignalId) -> Option<SignalDescriptor>;
}

const S: CategoryFlags = CategoryFlags::STATIC;
const D: CategoryFlags = CategoryFlags::DYNAMIC;
const T: CategoryFlags = CategoryFlags::TRIP;
const TT: CategoryFlags = CategoryFlags::TRIP.union(CategoryFlags::TIME);

const fn entry(
    id: SignalId,
    label: &'static str,
    unit: &'static str,
    precision: usize,
    flags: CategoryFlags,
) -> SignalDescriptor {
    SignalDescriptor {
        id,
        label,
        unit,
        precision,
        flags,
    }
}

/// Built-in catalog covering every [`SignalId`].
const DEFAULT_ENTRIES: [SignalDescriptor; SignalId::COUNT] = [
    entry(SignalId::BattSizeWh, "Batt size", "Wh", 0, S),
    entry(SignalId::BattRemainWh, "Batt energy", "Wh", 0, D),
    entry(SignalId::BattHealth, "Batt health", "%", 0, S),
    entry(SignalId::BattTemp, "Batt temp", "°C", 0, D),
    entry(SignalId::BattChargeCycles, "Charge cycles", "", 0, S),
    entry(SignalId::BattVoltage, "Batt voltage", "V", 1, D),
    entry(SignalId::BattCurrent, "Batt current", "A", 1, D),
    entry(SignalId::BattChargePercent, "Charge state", "%", 0, D),
    entry(SignalId::RiderPower, "Rider power", "W", 0, D),
    entry(SignalId::MotCadence, "Cadence", "rpm", 1, D),
    entry(SignalId::MotSpeed, "Speed", "km/h", 1, D),
    entry(SignalId::MotOdometer, "Odometer", "km", 2, D),
    entry(SignalId::MotAssistLevel, "Assist level", "", 0, D),
    entry(SignalId::MotTemp, "Mot temp", "°C", 0, D),
    entry(SignalId::MotPower, "Mot power", "W", 0, D),
    entry(SignalId::MotPeakAssist, "Peak assist", "%", 0, S),
    entry(SignalId::MotShuttle, "Shuttle", "%", 0, S),
    entry(SignalId::BikeWheelCirc, "Wheel circ.", "mm", 0, S),
    entry(SignalId::BikeAssistLev1, "Assist eco", "%", 0, S),
    entry(SignalId::BikeAssistLev2, "Assist trail", "%", 0, S),
    entry(SignalId::BikeAssistLev3, "Assist turbo", "%", 0, S),
    entry(SignalId::BikeFakeChannel, "Fake channel", "", 0, S),
    entry(SignalId::BikeAccel, "Accel. sens.", "%", 0, S),
    entry(SignalId::BaroAltimeter, "Altitude", "m", 0, D),
    entry(SignalId::VirtInclination, "Inclination", "%", 0, D),
    entry(SignalId::TripDistance, "Trip distance", "km", 2, T),
    entry(SignalId::TripTime, "Trip time", "", 0, TT),
    entry(SignalId::TripAvgSpeed, "Avg speed", "km/h", 1, T),
    entry(SignalId::TripRiderEnergy, "Rider energy", "Wh", 0, T),
    entry(SignalId::TripMotorEnergy, "Motor energy", "Wh", 0, T),
    entry(SignalId::TripBattEnergy, "Batt energy used", "Wh", 0, T),
    entry(SignalId::TripElevationGain, "Elevation gain", "m", 0, T),
    entry(SignalId::TripPeakMotTemp, "Peak mot temp", "°C", 0, T),
    entry(SignalId::TripPeakBattTemp, "Peak batt temp", "°C", 0, T),
    entry(SignalId::TripPeakBattCurrent, "Peak batt current", "A", 1, T),
    entry(SignalId::TripPeakRiderPower, "Peak rider power", "W", 0, T),
    entry(SignalId::TripPeakMotorPower, "Peak mot power", "W", 0, T),
    entry(SignalId::TripMinBattVoltage, "Min batt voltage", "V", 1, T),
    entry(SignalId::TripMaxSpeed, "Max speed", "km/h", 1, T),
    entry(SignalId::TripConsumption, "Trip consumption", "Wh/km", 1, T),
    entry(SignalId::VirtConsumption, "Consumption", "Wh/km", 1, D),
    entry(SignalId::TripRange, "Range", "km", 0, T),
    entry(SignalId::GyroPitch, "Pitch", "°", 0, D),
    entry(SignalId::BaroTemp, "Air temp", "°C", 1, D),
    entry(SignalId::PwrPower, "Calc power", "W", 0, D),
];

/// Catalog backed by a static table.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCatalog;

impl SignalCatalog for DefaultCatalog {
    fn describe(&self, id: SignalId) -> Option<SignalDescriptor> {
        DEFAULT_ENTRIES.get(id.index()).copied()
    }
}

/// Format a duration in seconds as `HH:MM:SS`.
pub fn format_as_time(seconds: f32) -> String {
    let total = seconds.max(0.0) as u32;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}
