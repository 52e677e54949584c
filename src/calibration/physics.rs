//! Physical bike model: propulsive power and drag coefficient fitting.

use crate::signals::{seconds_between, Tick};
use thiserror::Error;

/// Gravitational acceleration in m/s².
pub const GRAVITY: f64 = 9.81;

/// Specific gas constant of dry air in J/(kg·K).
const R_AIR: f64 = 287.058;

/// Sea level standard pressure in Pa.
const SEA_LEVEL_PRESSURE: f64 = 101_325.0;

/// Air density in kg/m³ from altitude (m) and temperature (°C).
pub fn air_density(altitude_m: f64, air_temp_c: f64) -> f64 {
    let pressure = SEA_LEVEL_PRESSURE * (1.0 - 2.255_77e-5 * altitude_m).powf(5.255_88);
    pressure / (R_AIR * (air_temp_c + 273.15))
}

/// One point of a coast-down table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurePoint {
    /// Distance since the start of the coast in meters
    pub distance: f64,
    /// Speed (km/h in run tables, m/s in the averaged table)
    pub speed: f64,
}

impl MeasurePoint {
    pub fn new(distance: f64, speed: f64) -> Self {
        Self { distance, speed }
    }
}

/// Fitted resistance coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragCoefficients {
    /// Rolling resistance coefficient
    pub cr: f32,
    /// Drag coefficient times frontal area in m²
    pub cwa: f32,
}

/// Errors of the coefficient fit.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SolverError {
    /// Not enough usable points
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Fit produced coefficients without physical meaning
    #[error("Non-physical fit: cR {cr}, cwA {cwa}")]
    NonPhysical { cr: f64, cwa: f64 },
}

/// Instantaneous propulsive power of the bike.
pub trait PowerModel {
    /// Update mass (kg), rolling resistance and drag area.
    fn set_system_params(&mut self, mass: f32, cr: f32, cwa: f32);

    /// Power in watts for speed (m/s), grade (%), altitude (m) and air
    /// temperature (°C) at `timestamp`.
    fn current_power(
        &mut self,
        speed: f32,
        grade_percent: f32,
        altitude: f32,
        air_temp: f32,
        timestamp: Tick,
    ) -> f32;
}

/// Fits rolling resistance and drag area from a coast-down table.
pub trait DragSolver {
    /// `table` holds distance (m) / speed (m/s) points in descending speed.
    fn fit(
        &self,
        table: &[MeasurePoint],
        mass: f32,
        air_temp: f32,
        altitude: f32,
    ) -> Result<DragCoefficients, SolverError>;
}

/// Gravity, rolling, aerodynamic and inertial resistance.
#[derive(Debug, Clone)]
pub struct BikePowerModel {
    /// System mass (bike, rider, wheels) in kg
    pub mass: f32,
    /// Rolling resistance coefficient
    pub cr: f32,
    /// Drag area in m²
    pub cwa: f32,
    /// Previous speed sample for the acceleration term
    previous: Option<(f32, Tick)>,
}

impl BikePowerModel {
    pub fn new(mass: f32, cr: f32, cwa: f32) -> Self {
        Self {
            mass,
            cr,
            cwa,
            previous: None,
        }
    }
}

impl PowerModel for BikePowerModel {
    fn set_system_params(&mut self, mass: f32, cr: f32, cwa: f32) {
        self.mass = mass;
        self.cr = cr;
        self.cwa = cwa;
    }

    fn current_power(
        &mut self,
        speed: f32,
        grade_percent: f32,
        altitude: f32,
        air_temp: f32,
        timestamp: Tick,
    ) -> f32 {
        let v = f64::from(speed);
        let mass = f64::from(self.mass);

        let grade_ratio = f64::from(grade_percent) / 100.0;
        let norm = (1.0 + grade_ratio * grade_ratio).sqrt();
        let sin_g = grade_ratio / norm;
        let cos_g = 1.0 / norm;

        let acceleration = match self.previous {
            Some((v0, t0)) => {
                let dt = f64::from(seconds_between(t0, timestamp));
                if dt > 0.0 {
                    (v - f64::from(v0)) / dt
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        self.previous = Some((speed, timestamp));

        let rho = air_density(f64::from(altitude), f64::from(air_temp));
        let f_gravity = mass * GRAVITY * sin_g;
        let f_rolling = f64::from(self.cr) * mass * GRAVITY * cos_g;
        let f_air = 0.5 * rho * f64::from(self.cwa) * v * v;
        let f_inertia = mass * acceleration;

        (v * (f_gravity + f_rolling + f_air + f_inertia)) as f32
    }
}

/// Linear least squares on the deceleration between consecutive points.
///
/// While coasting on flat ground `a = -g·cR - (ρ·cwA / 2m)·v²`, so the
/// deceleration is linear in `v²`; intercept and slope give both
/// coefficients.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoastDownSolver;

/// Minimum number of table points for a fit.
pub const MIN_FIT_POINTS: usize = 3;

impl DragSolver for CoastDownSolver {
    fn fit(
        &self,
        table: &[MeasurePoint],
        mass: f32,
        air_temp: f32,
        altitude: f32,
    ) -> Result<DragCoefficients, SolverError> {
        if table.len() < MIN_FIT_POINTS {
            return Err(SolverError::InsufficientData(format!(
                "{} points, need {}",
                table.len(),
                MIN_FIT_POINTS
            )));
        }

        // (v² at mid interval, deceleration)
        let samples: Vec<(f64, f64)> = table
            .windows(2)
            .filter_map(|pair| {
                let ds = pair[1].distance - pair[0].distance;
                if ds <= 0.0 {
                    return None;
                }
                let v1 = pair[0].speed * pair[0].speed;
                let v2 = pair[1].speed * pair[1].speed;
                Some(((v1 + v2) / 2.0, (v2 - v1) / (2.0 * ds)))
            })
            .collect();

        if samples.len() < 2 {
            return Err(SolverError::InsufficientData(
                "not enough increasing distances".to_string(),
            ));
        }

        let n = samples.len() as f64;
        let mean_x = samples.iter().map(|s| s.0).sum::<f64>() / n;
        let mean_y = samples.iter().map(|s| s.1).sum::<f64>() / n;
        let sxx: f64 = samples.iter().map(|s| (s.0 - mean_x).powi(2)).sum();
        let sxy: f64 = samples
            .iter()
            .map(|s| (s.0 - mean_x) * (s.1 - mean_y))
            .sum();

        if sxx.abs() < 1e-9 {
            return Err(SolverError::InsufficientData(
                "speed range too narrow".to_string(),
            ));
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;

        let rho = air_density(f64::from(altitude), f64::from(air_temp));
        let cr = -intercept / GRAVITY;
        let cwa = -slope * 2.0 * f64::from(mass) / rho;

        if !(cr > 0.0 && cwa > 0.0) || !cr.is_finite() || !cwa.is_finite() {
            return Err(SolverError::NonPhysical { cr, cwa });
        }

        Ok(DragCoefficients {
            cr: cr as f32,
            cwa: cwa as f32,
        })
    }
}
