//! Coast-down campaign.
//!
//! Natural coasting episodes during normal riding are detected from the
//! speed signal. Every admissible coast is sampled onto integer km/h buckets,
//! and once enough runs are complete the buckets present in all of them are
//! averaged and handed to a [`DragSolver`].

use crate::calibration::physics::{DragCoefficients, DragSolver, MeasurePoint};
use crate::config::SystemParams;
use crate::signals::{seconds_between, Tick};
use serde::{Deserialize, Serialize};

/// Speed in km/h the bike must drop through to start a run.
pub const START_SPEED: f32 = 25.0;

/// Speed in km/h below which a run is complete.
pub const STOP_SPEED: f32 = 3.5;

/// Largest grade in percent still considered flat.
pub const MAX_FLAT_GRADE: f32 = 1.0;

/// Cadence above which the rider counts as pedalling.
pub const PEDALLING_CADENCE: f32 = 10.0;

/// Run distance in meters before pedalling aborts a run.
pub const PEDALLING_MIN_DISTANCE: f64 = 30.0;

/// Run distance in meters after which a run is abandoned.
pub const MAX_RUN_DISTANCE: f64 = 300.0;

/// Non-decreasing speed samples in a row tolerated during a run.
const MAX_JITTER: u32 = 1;

/// Campaign phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationState {
    /// Campaign switched off
    #[default]
    Inactive,
    /// Waiting for the speed to drop through the start speed
    Waiting,
    /// Sampling a coast
    Running,
    /// Enough runs collected, result available
    Ready,
    /// Last run discarded, waiting for the speed to rise again
    Aborted,
}

impl std::fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationState::Inactive => write!(f, "Inactive"),
            CalibrationState::Waiting => write!(f, "Waiting"),
            CalibrationState::Running => write!(f, "Running"),
            CalibrationState::Ready => write!(f, "Ready"),
            CalibrationState::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Collects coast-down runs and fits the resistance coefficients.
pub struct CoastDownCampaign {
    state: CalibrationState,
    solver: Box<dyn DragSolver + Send>,
    mass: f32,
    required_runs: usize,
    /// Completed runs (and the one in progress), distance in m / speed in km/h
    runs: Vec<Vec<MeasurePoint>>,
    /// Raw distance/speed points of the run in progress
    exact: Vec<MeasurePoint>,
    distance: f64,
    zero_distance: f64,
    jitter: u32,
    last_speed: f32,
    last_time: Option<Tick>,
    cadence: f32,
    grade: f32,
    air_temp: f32,
    altitude: f32,
    result: Option<DragCoefficients>,
}

impl CoastDownCampaign {
    pub fn new(params: &SystemParams, solver: Box<dyn DragSolver + Send>) -> Self {
        Self {
            state: CalibrationState::Inactive,
            solver,
            mass: params.mass,
            required_runs: params.required_run_count.max(1),
            runs: Vec::new(),
            exact: Vec::new(),
            distance: 0.0,
            zero_distance: 0.0,
            jitter: 0,
            last_speed: 0.0,
            last_time: None,
            cadence: 0.0,
            grade: 0.0,
            air_temp: params.default_air_temp,
            altitude: params.default_altitude,
            result: None,
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Completed runs, plus the run in progress while `Running`.
    pub fn runs(&self) -> &[Vec<MeasurePoint>] {
        &self.runs
    }

    pub fn required_runs(&self) -> usize {
        self.required_runs
    }

    /// Switch the campaign on or off. Either way all collected runs are
    /// discarded.
    pub fn enable(&mut self, enabled: bool) {
        self.clear();
        let next = if enabled {
            CalibrationState::Waiting
        } else {
            CalibrationState::Inactive
        };
        self.transition(next);
    }

    pub fn set_cadence(&mut self, cadence: f32) {
        self.cadence = cadence;
    }

    pub fn set_grade(&mut self, grade_percent: f32) {
        self.grade = grade_percent;
    }

    pub fn set_air_temp(&mut self, air_temp: f32) {
        self.air_temp = air_temp;
    }

    pub fn set_altitude(&mut self, altitude: f32) {
        self.altitude = altitude;
    }

    pub fn set_mass(&mut self, mass: f32) {
        self.mass = mass;
    }

    /// Feed a speed sample in km/h.
    pub fn on_speed(&mut self, speed: f32, timestamp: Tick) {
        if self.state == CalibrationState::Waiting
            && self.last_speed >= START_SPEED
            && speed < START_SPEED
            && self.grade.abs() < MAX_FLAT_GRADE
        {
            self.runs.push(Vec::new());
            self.exact.clear();
            self.distance = 0.0;
            self.zero_distance = 0.0;
            self.jitter = 0;
            self.transition(CalibrationState::Running);
        }

        if self.state == CalibrationState::Running {
            self.advance_run(speed, timestamp);
        }

        if self.state == CalibrationState::Aborted && speed >= START_SPEED {
            self.transition(CalibrationState::Waiting);
        }

        self.last_speed = speed;
        self.last_time = Some(timestamp);
    }

    /// Take the fitted coefficients. The campaign is switched off once the
    /// result has been taken.
    pub fn take_result(&mut self) -> Option<DragCoefficients> {
        if self.state != CalibrationState::Ready {
            return None;
        }
        let result = self.result.take();
        self.clear();
        self.transition(CalibrationState::Inactive);
        result
    }

    fn advance_run(&mut self, speed: f32, timestamp: Tick) {
        let pedalling = self.cadence > PEDALLING_CADENCE && self.distance > PEDALLING_MIN_DISTANCE;

        // An equal reading counts too; one is tolerated, two in a row abort.
        if speed >= self.last_speed {
            self.jitter += 1;
        } else {
            self.jitter = 0;
        }

        if pedalling || self.jitter > MAX_JITTER || self.distance > MAX_RUN_DISTANCE {
            self.runs.pop();
            tracing::warn!(
                "Coast run aborted after {:.1} m (pedalling: {}, jitter: {})",
                self.distance,
                pedalling,
                self.jitter
            );
            self.transition(CalibrationState::Aborted);
            return;
        }

        if speed < STOP_SPEED {
            self.finish_run();
            return;
        }

        let dt = self
            .last_time
            .map_or(0.0, |last| f64::from(seconds_between(last, timestamp)));
        let last = f64::from(self.last_speed);
        let current = f64::from(speed);
        let new_distance = self.distance + last / 3.6 * dt;
        self.exact.push(MeasurePoint::new(new_distance, current));

        // Interpolate the distance at every integer speed crossed
        let span = (last.floor() - current.floor()).max(0.0) as u32;
        if let Some(run) = self.runs.last_mut() {
            for i in 0..span {
                let bucket = (last - f64::from(i)).floor();
                let at = (new_distance - self.distance) * (bucket - last) / (current - last)
                    + self.distance;
                if run.is_empty() {
                    self.zero_distance = at;
                }
                run.push(MeasurePoint::new(at - self.zero_distance, bucket));
            }
        }
        self.distance = new_distance;
    }

    fn finish_run(&mut self) {
        tracing::debug!("Coast run exact points: {:?}", self.exact);
        if let Some(run) = self.runs.last() {
            tracing::debug!("Coast run interpolated points: {:?}", run);
        }

        if self.runs.last().is_some_and(|run| run.is_empty()) {
            self.runs.pop();
            tracing::debug!("Empty coast run dropped");
            self.transition(CalibrationState::Waiting);
            return;
        }

        tracing::info!(
            "Coast run {} of {} complete ({:.1} m)",
            self.runs.len(),
            self.required_runs,
            self.distance
        );

        if self.runs.len() >= self.required_runs {
            self.transition(CalibrationState::Ready);
            self.solve();
        } else {
            self.transition(CalibrationState::Waiting);
        }
    }

    /// Average the buckets present in every run, fastest first, speed in m/s.
    pub fn averaged_table(&self) -> Vec<MeasurePoint> {
        let max_bucket = self
            .runs
            .iter()
            .filter_map(|run| run.first())
            .map(|point| point.speed.round().max(0.0) as usize)
            .max();
        let Some(max_bucket) = max_bucket else {
            return Vec::new();
        };

        let mut sums = vec![0.0_f64; max_bucket + 1];
        let mut counts = vec![0_usize; max_bucket + 1];
        for point in self.runs.iter().flatten() {
            let index = point.speed.round().max(0.0) as usize;
            if index <= max_bucket {
                sums[index] += point.distance;
                counts[index] += 1;
            }
        }

        let mut table: Vec<MeasurePoint> = (0..=max_bucket)
            .rev()
            .filter(|&i| counts[i] == self.runs.len())
            .map(|i| MeasurePoint::new(sums[i] / counts[i] as f64, i as f64 / 3.6))
            .collect();

        while table.len() > 1 && table.last().is_some_and(|p| p.distance == 0.0) {
            table.pop();
        }
        table
    }

    fn solve(&mut self) {
        let table = self.averaged_table();
        tracing::debug!("Averaged coast table: {:?}", table);

        match self
            .solver
            .fit(&table, self.mass, self.air_temp, self.altitude)
        {
            Ok(fit) => {
                tracing::info!("Coast-down fit: cR {:.6}, cwA {:.6}", fit.cr, fit.cwa);
                self.result = Some(fit);
            }
            Err(e) => {
                tracing::warn!("Coast-down fit failed: {}", e);
                self.clear();
                self.transition(CalibrationState::Inactive);
            }
        }
    }

    fn clear(&mut self) {
        self.runs.clear();
        self.exact.clear();
        self.result = None;
        self.distance = 0.0;
        self.zero_distance = 0.0;
        self.jitter = 0;
    }

    fn transition(&mut self, next: CalibrationState) {
        if self.state != next {
            tracing::info!("Calibration: {} -> {}", self.state, next);
            self.state = next;
        }
    }
}
