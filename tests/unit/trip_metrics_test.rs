//! Unit tests for the trip metrics engine.

use levo_link::metrics::{TripMetrics, TripPhase};
use levo_link::SignalId;

/// Fill the inclination window while standing.
fn fill_inclination(trip: &mut TripMetrics) {
    for i in 0..10 {
        trip.feed(SignalId::BaroAltimeter, 500.0, i * 100);
    }
}

#[test]
fn test_round_robin_fairness() {
    let mut trip = TripMetrics::new();
    fill_inclination(&mut trip);
    trip.feed(SignalId::BaroAltimeter, 500.0, 1000);
    trip.feed(SignalId::MotSpeed, 10.0, 1000);

    assert_eq!(trip.update(1000), Some((SignalId::VirtInclination, 0.0)));
    assert_eq!(trip.update(1000), Some((SignalId::VirtConsumption, 0.0)));
    assert_eq!(trip.update(1000), None);
}

#[test]
fn test_round_robin_continues_after_cursor() {
    let mut trip = TripMetrics::new();
    fill_inclination(&mut trip);
    trip.feed(SignalId::BaroAltimeter, 500.0, 1000);
    assert_eq!(trip.update(1000).map(|(id, _)| id), Some(SignalId::VirtInclination));

    // both dirty again; the scan resumes behind the last delivered id
    trip.feed(SignalId::BaroAltimeter, 500.0, 1100);
    trip.feed(SignalId::MotSpeed, 10.0, 1100);
    assert_eq!(trip.update(1100).map(|(id, _)| id), Some(SignalId::VirtConsumption));
    assert_eq!(trip.update(1100).map(|(id, _)| id), Some(SignalId::VirtInclination));
}

#[test]
fn test_trip_distance_and_speed() {
    let mut trip = TripMetrics::new();
    trip.start_trip(0);
    trip.feed(SignalId::MotOdometer, 120.0, 0);
    trip.feed(SignalId::MotSpeed, 20.0, 0);
    trip.feed(SignalId::MotOdometer, 125.5, 1000);
    trip.feed(SignalId::MotSpeed, 30.0, 1000);

    assert_eq!(trip.value(SignalId::TripDistance), Some(5.5));
    assert_eq!(trip.value(SignalId::TripMaxSpeed), Some(30.0));
    assert_eq!(trip.phase(), TripPhase::Started);
}

#[test]
fn test_trip_consumption_and_range() {
    let mut trip = TripMetrics::new();
    trip.start_trip(0);
    trip.feed(SignalId::BattRemainWh, 400.0, 0);
    trip.feed(SignalId::MotOdometer, 10.0, 0);
    trip.feed(SignalId::MotPower, 3600.0, 0);
    trip.feed(SignalId::MotPower, 3600.0, 10_000);
    trip.feed(SignalId::MotOdometer, 11.0, 10_000);
    // 10 Wh over 1 km
    trip.feed(SignalId::MotSpeed, 20.0, 10_000);

    let consumption = trip.value(SignalId::TripConsumption).unwrap();
    assert!((consumption - 10.0).abs() < 1e-3);
    let range = trip.value(SignalId::TripRange).unwrap();
    assert!((range - 40.0).abs() < 1e-2);
}

#[test]
fn test_start_marks_trip_values_dirty() {
    let mut trip = TripMetrics::new();
    trip.feed(SignalId::BattTemp, 21.0, 0);
    trip.start_trip(0);

    assert!(trip.is_dirty(SignalId::TripDistance));
    assert!(trip.is_dirty(SignalId::TripMinBattVoltage));
    assert_eq!(trip.value(SignalId::TripPeakBattTemp), Some(21.0));
    assert!(!trip.is_dirty(SignalId::VirtInclination));
}

#[test]
fn test_reset_zeroes_values() {
    let mut trip = TripMetrics::new();
    trip.start_trip(0);
    trip.feed(SignalId::MotTemp, 55.0, 0);
    trip.stop_trip(1000);
    trip.reset_trip();

    assert_eq!(trip.phase(), TripPhase::Reset);
    assert_eq!(trip.value(SignalId::TripPeakMotTemp), Some(0.0));
    assert!(trip.is_dirty(SignalId::TripPeakMotTemp));
}

#[test]
fn test_snapshot_formats_values() {
    let mut trip = TripMetrics::new();
    trip.start_trip(0);
    trip.feed(SignalId::MotTemp, 60.0, 0);
    trip.stop_trip(5000);

    let dirty_before = trip.is_dirty(SignalId::TripPeakMotTemp);
    let snapshot = trip.snapshot();
    assert!(snapshot.contains("Peak mot temp:\t     60 °C\n"), "{}", snapshot);
    assert!(snapshot.contains("Trip time:\t00:00:05"), "{}", snapshot);
    assert!(!snapshot.contains("Inclination"));
    assert_eq!(trip.is_dirty(SignalId::TripPeakMotTemp), dirty_before);

    let mut labels = Vec::new();
    trip.write_snapshot(|desc, _| labels.push(desc.id));
    assert!(labels.contains(&SignalId::TripRange));
}
