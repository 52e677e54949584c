//! Power calibration.
//!
//! [`PowerCalibration`] estimates the propulsive power every tick, tracks the
//! drive train efficiency and runs the coast-down campaign that fits the
//! rolling resistance and drag area.

pub mod campaign;
pub mod efficiency;
pub mod physics;

pub use campaign::{CalibrationState, CoastDownCampaign};
pub use efficiency::EfficiencyTracker;
pub use physics::{
    BikePowerModel, CoastDownSolver, DragCoefficients, DragSolver, MeasurePoint, PowerModel,
    SolverError,
};

use crate::config::SystemParams;
use crate::signals::{SignalId, Tick};

/// Calculated power, efficiency and coast-down calibration.
pub struct PowerCalibration {
    params: SystemParams,
    campaign: CoastDownCampaign,
    efficiency: EfficiencyTracker,
    model: Box<dyn PowerModel + Send>,
    /// Campaign restarts after every result or solver failure while set
    armed: bool,
    /// Last speed in km/h
    speed: f32,
    grade: f32,
    altitude: f32,
    air_temp: f32,
}

impl PowerCalibration {
    /// Create with [`BikePowerModel`] and [`CoastDownSolver`].
    pub fn new(params: SystemParams) -> Self {
        let model = BikePowerModel::new(params.mass, params.cr, params.cwa);
        Self::with_models(params, Box::new(model), Box::new(CoastDownSolver))
    }

    pub fn with_models(
        params: SystemParams,
        mut model: Box<dyn PowerModel + Send>,
        solver: Box<dyn DragSolver + Send>,
    ) -> Self {
        model.set_system_params(params.mass, params.cr, params.cwa);
        Self {
            campaign: CoastDownCampaign::new(&params, solver),
            efficiency: EfficiencyTracker::new(),
            model,
            armed: false,
            speed: 0.0,
            grade: 0.0,
            altitude: params.default_altitude,
            air_temp: params.default_air_temp,
            params,
        }
    }

    pub fn params(&self) -> &SystemParams {
        &self.params
    }

    pub fn state(&self) -> CalibrationState {
        self.campaign.state()
    }

    pub fn campaign(&self) -> &CoastDownCampaign {
        &self.campaign
    }

    pub fn efficiency(&self) -> &EfficiencyTracker {
        &self.efficiency
    }

    /// Start (or cancel) coast-down calibration. While enabled, a new
    /// campaign starts whenever the previous one ended.
    pub fn enable_calibration(&mut self, enabled: bool) {
        self.armed = enabled;
        self.campaign.enable(enabled);
    }

    /// Route a physical sample to the campaign and the efficiency tracker.
    pub fn feed(&mut self, id: SignalId, value: f32, timestamp: Tick) {
        match id {
            SignalId::MotSpeed => {
                self.speed = value;
                self.campaign.on_speed(value, timestamp);
            }
            SignalId::MotCadence => self.campaign.set_cadence(value),
            SignalId::VirtInclination => {
                self.grade = value;
                self.campaign.set_grade(value);
            }
            SignalId::BaroAltimeter => {
                self.altitude = value;
                self.campaign.set_altitude(value);
            }
            SignalId::BaroTemp => {
                self.air_temp = value;
                self.campaign.set_air_temp(value);
            }
            SignalId::RiderPower => self.efficiency.set_rider_power(value),
            SignalId::BattRemainWh => self.efficiency.set_remaining_wh(value),
            _ => {}
        }
    }

    /// Compute the propulsive power for this tick.
    pub fn update(&mut self, now: Tick) -> (SignalId, f32) {
        let power = self.model.current_power(
            self.speed / 3.6,
            self.grade,
            self.altitude,
            self.air_temp,
            now,
        );
        tracing::trace!("Calculated power {:.1} W at {:.1} km/h", power, self.speed);
        self.efficiency.update(power, now);

        if self.armed && self.campaign.state() == CalibrationState::Inactive {
            tracing::debug!("Restarting coast-down campaign");
            self.campaign.enable(true);
        }
        (SignalId::PwrPower, power)
    }

    /// Fitted coefficients of a finished campaign, once.
    pub fn take_result(&mut self) -> Option<DragCoefficients> {
        self.campaign.take_result()
    }

    /// New efficiency factor, once per estimate.
    pub fn take_eta(&mut self) -> Option<f32> {
        self.efficiency.take_eta()
    }

    /// Use fitted coefficients from now on.
    pub fn apply_calibration(&mut self, fit: DragCoefficients) {
        self.params.apply_calibration(fit.cr, fit.cwa);
        self.model
            .set_system_params(self.params.mass, self.params.cr, self.params.cwa);
    }

    pub fn apply_eta(&mut self, eta: f32) {
        self.params.apply_eta(eta);
    }
}
