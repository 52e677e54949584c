//! Unit tests for the wire codec.

use levo_link::link::protocol::{
    build_accel_sensitivity, build_assist, build_assist_level, build_peak_assist, build_request,
    build_shuttle, decode_frame, parse_read_back, wire_key, AssistSettings, WriteMask,
};
use levo_link::link::{SampleValue, SignalSample};
use levo_link::SignalId;

fn scalar(frame: &[u8]) -> (Option<SignalId>, f32) {
    let sample = decode_frame(frame, 0);
    (sample.id, sample.value.as_f32().unwrap())
}

#[test]
fn test_decode_battery_channels() {
    assert_eq!(scalar(&[0x00, 0x00, 0xc2, 0x01]), (Some(SignalId::BattSizeWh), 500.0));
    assert_eq!(scalar(&[0x00, 0x02, 97]), (Some(SignalId::BattHealth), 97.0));
    assert_eq!(scalar(&[0x00, 0x03, 24]), (Some(SignalId::BattTemp), 24.0));
    assert_eq!(
        scalar(&[0x00, 0x04, 0x2c, 0x01]),
        (Some(SignalId::BattChargeCycles), 300.0)
    );
    assert_eq!(scalar(&[0x00, 0x05, 0x50]), (Some(SignalId::BattVoltage), 36.0));
    assert_eq!(scalar(&[0x00, 0x06, 125]), (Some(SignalId::BattCurrent), 12.5));
    assert_eq!(scalar(&[0x00, 0x0c, 80]), (Some(SignalId::BattChargePercent), 80.0));
}

#[test]
fn test_decode_motor_channels() {
    assert_eq!(scalar(&[0x01, 0x00, 0xc8, 0x00]), (Some(SignalId::RiderPower), 200.0));
    assert_eq!(scalar(&[0x01, 0x01, 0x84, 0x03]), (Some(SignalId::MotCadence), 90.0));
    assert_eq!(scalar(&[0x01, 0x02, 0xfa, 0x00]), (Some(SignalId::MotSpeed), 25.0));
    assert_eq!(
        scalar(&[0x01, 0x04, 0xdc, 0x05, 0x00, 0x00]),
        (Some(SignalId::MotOdometer), 1.5)
    );
    assert_eq!(scalar(&[0x01, 0x05, 0x02, 0x00]), (Some(SignalId::MotAssistLevel), 2.0));
    assert_eq!(scalar(&[0x01, 0x07, 45]), (Some(SignalId::MotTemp), 45.0));
    assert_eq!(scalar(&[0x01, 0x0c, 0xc4, 0x09]), (Some(SignalId::MotPower), 250.0));
    assert_eq!(scalar(&[0x01, 0x15, 40]), (Some(SignalId::MotShuttle), 40.0));
}

#[test]
fn test_decode_bike_settings() {
    assert_eq!(
        scalar(&[0x02, 0x00, 0x0a, 0x09]),
        (Some(SignalId::BikeWheelCirc), 2314.0)
    );
    assert_eq!(scalar(&[0x02, 0x03, 35]), (Some(SignalId::BikeAssistLev1), 35.0));
    assert_eq!(scalar(&[0x02, 0x05, 100]), (Some(SignalId::BikeAssistLev3), 100.0));
    // 6000 -> 50 %
    assert_eq!(scalar(&[0x02, 0x07, 0x70, 0x17]), (Some(SignalId::BikeAccel), 50.0));
}

#[test]
fn test_peak_assist_is_raw() {
    let sample = decode_frame(&[0x01, 0x10, 30, 60, 90, 0x32], 7);
    assert_eq!(sample.id, Some(SignalId::MotPeakAssist));
    assert_eq!(sample.value, SampleValue::Raw(vec![30, 60, 90]));
    assert_eq!(sample.timestamp, 7);
}

#[test]
fn test_unknown_frames_preserved() {
    for frame in [
        vec![0x03, 0x00, 0x01],
        vec![0x00, 0x07, 0x01],
        vec![0x02, 0x27, 0x00, 0x00],
        vec![0x01],
    ] {
        let sample = decode_frame(&frame, 0);
        assert!(sample.is_unknown());
        assert_eq!(sample.value, SampleValue::Raw(frame.clone()));
    }

    let long: Vec<u8> = (0..32).map(|i| 0x80 | i).collect();
    let sample = decode_frame(&long, 0);
    assert_eq!(sample.value.as_bytes().unwrap(), &long[..20]);
}

#[test]
fn test_request_and_read_back() {
    assert_eq!(wire_key(SignalId::MotAssistLevel), Some(0x0105));
    assert_eq!(build_request(SignalId::BattRemainWh), Some([0x00, 0x01]));
    assert_eq!(build_request(SignalId::TripDistance), None);

    let reply = [0x01, 0x05, 0x03, 0x00];
    let sample = parse_read_back(&reply, SignalId::MotAssistLevel, 0).unwrap();
    assert_eq!(sample.value.as_f32(), Some(3.0));

    // answer to a different request
    assert!(parse_read_back(&reply, SignalId::MotSpeed, 0).is_none());
}

#[test]
fn test_write_frames_range_checked() {
    assert_eq!(build_assist_level(3), Some(vec![0x01, 0x05, 0x03]));
    assert_eq!(build_assist_level(4), None);
    assert_eq!(build_peak_assist([10, 20, 30]), Some(vec![0x01, 0x10, 10, 20, 30, 0x32]));
    assert_eq!(build_peak_assist([10, 101, 30]), None);
    assert_eq!(build_assist(2, 80), Some(vec![0x02, 0x05, 80]));
    assert_eq!(build_assist(3, 80), None);
    assert_eq!(build_shuttle(101), None);
    assert_eq!(build_accel_sensitivity(100), Some(vec![0x02, 0x07, 0x28, 0x23]));
}

#[test]
fn test_assist_settings_collects_read_backs() {
    let mut settings = AssistSettings::default();
    let samples = [
        decode_frame(&[0x01, 0x10, 30, 60, 90, 0x32], 0),
        decode_frame(&[0x01, 0x15, 40], 0),
        decode_frame(&[0x02, 0x03, 35], 0),
        decode_frame(&[0x02, 0x04, 60], 0),
        decode_frame(&[0x02, 0x05, 100], 0),
        decode_frame(&[0x02, 0x06, 0], 0),
    ];
    for sample in &samples {
        settings.apply(sample);
    }
    assert!(!settings.is_complete());

    settings.apply(&SignalSample {
        id: Some(SignalId::BikeAccel),
        value: SampleValue::Scalar(50.0),
        timestamp: 0,
    });
    assert!(settings.is_complete());
    assert_eq!(settings.peak_assist, [Some(30), Some(60), Some(90)]);

    let frames = settings.build_frames(WriteMask::SHUTTLE | WriteMask::ACCEL_SENS);
    assert_eq!(frames, vec![vec![0x01, 0x15, 40], vec![0x02, 0x07, 0x70, 0x17]]);
}
