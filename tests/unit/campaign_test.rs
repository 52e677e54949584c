//! Unit tests for the coast-down campaign.

use levo_link::calibration::{CalibrationState, CoastDownCampaign, CoastDownSolver};
use levo_link::SystemParams;

fn campaign() -> CoastDownCampaign {
    let mut campaign = CoastDownCampaign::new(&SystemParams::default(), Box::new(CoastDownSolver));
    campaign.enable(true);
    campaign
}

#[test]
fn test_admissible_coast_records_one_run() {
    let mut c = campaign();
    c.set_grade(0.0);
    c.set_cadence(0.0);

    let mut t = 0;
    for speed in (3..=25).rev() {
        c.on_speed(speed as f32, t);
        t += 1000;
    }

    assert_eq!(c.state(), CalibrationState::Waiting);
    assert_eq!(c.runs().len(), 1);

    let run = &c.runs()[0];
    assert_eq!(run[0].distance, 0.0);
    assert!(run.windows(2).all(|p| p[1].speed <= p[0].speed));
    assert!(run.windows(2).all(|p| p[1].distance >= p[0].distance));
}

#[test]
fn test_pedalling_aborts_run() {
    let mut c = campaign();
    let mut t = 0;
    for speed in (15..=25).rev() {
        c.on_speed(speed as f32, t);
        t += 1000;
    }
    assert_eq!(c.state(), CalibrationState::Running);

    c.set_cadence(60.0);
    c.on_speed(14.0, t);
    assert_eq!(c.state(), CalibrationState::Aborted);
    assert!(c.runs().is_empty());
}

#[test]
fn test_pedalling_tolerated_at_run_start() {
    let mut c = campaign();
    c.on_speed(26.0, 0);
    c.set_cadence(60.0);
    c.on_speed(24.0, 1000);
    c.on_speed(23.0, 2000);
    assert_eq!(c.state(), CalibrationState::Running);
}

#[test]
fn test_long_run_aborts() {
    let mut c = campaign();
    c.on_speed(25.0, 0);
    // slow decay covers more than 300 m
    let mut speed = 24.9;
    let mut t = 0;
    while speed > 20.0 && c.state() != CalibrationState::Aborted {
        t += 1000;
        c.on_speed(speed, t);
        speed -= 0.05;
    }
    assert_eq!(c.state(), CalibrationState::Aborted);
}

#[test]
fn test_disable_discards_runs() {
    let mut c = campaign();
    let mut t = 0;
    for speed in (3..=25).rev() {
        c.on_speed(speed as f32, t);
        t += 1000;
    }
    assert_eq!(c.runs().len(), 1);

    c.enable(false);
    assert_eq!(c.state(), CalibrationState::Inactive);
    assert!(c.runs().is_empty());
}
