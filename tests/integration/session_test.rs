//! Integration tests for the link session state machine.

use crate::mock_transport::{
    bike_advertisement, connect, connected_session, new_session, test_config, MockTransport,
    BIKE_ADDRESS,
};
use levo_link::link::queue;
use levo_link::link::{
    AssistSettings, Channel, ConnectionParams, LinkEvent, LinkState, PeerAddress, Session,
    SessionConfig, WriteMask,
};
use levo_link::SignalId;
use std::time::{Duration, Instant};

#[test]
fn test_zero_passkey_turns_link_off() {
    let (radio, inbox) = queue::channel(10);
    let transport = MockTransport::new(radio);
    let mut session = Session::new(transport, inbox, SessionConfig::default());

    assert!(!session.init());
    assert_eq!(session.link_state(), LinkState::Off);
    assert_eq!(session.transport().scan_starts, 0);
}

#[test]
fn test_discovery_connects_and_subscribes() {
    let (session, _radio) = connected_session();

    assert_eq!(session.link_state(), LinkState::Connected);
    assert!(session.is_subscribed());
    assert!(!session.transport().scanning);
    assert_eq!(session.transport().params, Some(ConnectionParams::LOW_POWER));
}

#[test]
fn test_foreign_advertisement_ignored() {
    let (mut session, radio) = new_session(10);
    radio.post_event(LinkEvent::Advertisement {
        address: PeerAddress("00:11:22:33:44:55".to_string()),
        manufacturer_data: b"\x4c\x00SOMETHINGELSE".to_vec(),
    });
    session.poll();

    assert_eq!(session.link_state(), LinkState::Disconnected);
    assert_eq!(session.transport().connect_calls, 0);
}

#[test]
fn test_auth_failure_disconnects_and_rescans() {
    let (radio, inbox) = queue::channel(10);
    let mut transport = MockTransport::new(radio.clone());
    transport.encrypt = false;
    let mut session = Session::new(transport, inbox, test_config());
    session.init();

    connect(&mut session, &radio);

    assert_eq!(session.link_state(), LinkState::Disconnected);
    assert!(!session.transport().connected);
    assert_eq!(session.transport().scan_starts, 2);
}

#[test]
fn test_connect_failure_rescans() {
    let (radio, inbox) = queue::channel(10);
    let mut transport = MockTransport::new(radio.clone());
    transport.fail_connect = true;
    let mut session = Session::new(transport, inbox, test_config());
    session.init();

    connect(&mut session, &radio);

    assert_eq!(session.link_state(), LinkState::Disconnected);
    assert_eq!(session.transport().scan_starts, 2);
}

#[test]
fn test_subscription_failure_drops_link() {
    let (radio, inbox) = queue::channel(10);
    let mut transport = MockTransport::new(radio.clone());
    transport.fail_subscribe = true;
    let mut session = Session::new(transport, inbox, test_config());
    session.init();

    connect(&mut session, &radio);

    assert!(!session.is_subscribed());
    assert_eq!(session.link_state(), LinkState::Disconnected);
    assert!(session.transport().scanning);
}

#[test]
fn test_link_loss_rescans() {
    let (mut session, _radio) = connected_session();
    session.transport_mut().drop_link();
    session.poll();

    assert_eq!(session.link_state(), LinkState::Disconnected);
    assert!(!session.is_subscribed());
    assert!(session.transport().scanning);
}

#[test]
fn test_link_loss_drops_queued_frames() {
    let (mut session, radio) = connected_session();
    assert!(radio.push_frame(&[0x01, 0x02, 0xfa, 0x00]));
    assert!(radio.push_frame(&[0x00, 0x03, 20]));

    session.transport_mut().drop_link();
    assert!(session.poll().is_none());
    assert_eq!(session.link_state(), LinkState::Disconnected);
}

#[test]
fn test_disconnect_then_reconnect_reuses_peer() {
    let (mut session, radio) = connected_session();

    session.disconnect();
    session.poll();
    assert_eq!(session.link_state(), LinkState::Off);
    assert!(!session.auto_reconnect());

    // advertisements are ignored while switched off
    radio.post_event(LinkEvent::Advertisement {
        address: PeerAddress(BIKE_ADDRESS.to_string()),
        manufacturer_data: bike_advertisement(),
    });
    session.poll();
    assert_eq!(session.transport().connect_calls, 1);

    session.reconnect();
    assert_eq!(session.link_state(), LinkState::Connecting);
    session.poll();
    assert_eq!(session.link_state(), LinkState::Connected);
    assert_eq!(session.transport().connect_calls, 2);
}

#[test]
fn test_notifications_are_decoded() {
    let (mut session, radio) = connected_session();
    radio.push_frame(&[0x01, 0x02, 0xfa, 0x00]);

    let sample = session.poll().unwrap();
    assert_eq!(sample.id, Some(SignalId::MotSpeed));
    assert_eq!(sample.value.as_f32(), Some(25.0));
    assert!(session.poll().is_none());
}

#[test]
fn test_queue_overrun_counted() {
    let (mut session, radio) = new_session(2);
    connect(&mut session, &radio);

    assert!(radio.push_frame(&[0x00, 0x03, 20]));
    assert!(radio.push_frame(&[0x00, 0x03, 21]));
    assert!(!radio.push_frame(&[0x00, 0x03, 22]));
    assert_eq!(session.overrun_count(), 1);

    // queued frames survive, the link stays up
    assert_eq!(session.poll().unwrap().value.as_f32(), Some(20.0));
    assert_eq!(session.poll().unwrap().value.as_f32(), Some(21.0));
    assert_eq!(session.link_state(), LinkState::Connected);
}

#[test]
fn test_notification_pause_requests_battery_size() {
    let (mut session, radio) = connected_session();
    radio.push_frame(&[0x02, 0x27, 0x00]);

    let sample = session.poll().unwrap();
    assert!(sample.is_unknown());
    assert_eq!(session.pending_request(), Some(SignalId::BattSizeWh));
    assert!(session
        .transport()
        .writes
        .contains(&(Channel::Request, vec![0x00, 0x00])));
}

#[test]
fn test_read_async_respects_pending() {
    let (mut session, _radio) = connected_session();

    assert!(session.read_async(SignalId::BattHealth, false));
    assert!(!session.read_async(SignalId::BattTemp, false));
    assert_eq!(session.pending_request(), Some(SignalId::BattHealth));

    assert!(session.read_async(SignalId::BattTemp, true));
    assert_eq!(session.pending_request(), Some(SignalId::BattTemp));

    session.cancel_request();
    assert_eq!(session.pending_request(), None);
}

#[test]
fn test_read_async_delivers_through_poll() {
    let (mut session, _radio) = connected_session();
    session
        .transport_mut()
        .replies
        .insert([0x00, 0x02], vec![0x00, 0x02, 93]);

    assert!(session.read_async(SignalId::BattHealth, false));
    let sample = session.poll().unwrap();
    assert_eq!(sample.id, Some(SignalId::BattHealth));
    assert_eq!(sample.value.as_f32(), Some(93.0));
    assert_eq!(session.pending_request(), None);
}

#[test]
fn test_read_sync_and_assist_level() {
    let (mut session, _radio) = connected_session();
    session
        .transport_mut()
        .replies
        .insert([0x01, 0x05], vec![0x01, 0x05, 0x02, 0x00]);

    let sample = session
        .read_sync(SignalId::MotAssistLevel, Duration::from_millis(100))
        .unwrap();
    assert_eq!(sample.value.as_f32(), Some(2.0));
    assert_eq!(session.assist_level(), Some(2));
}

#[test]
fn test_read_sync_times_out() {
    let (mut session, _radio) = connected_session();

    let start = Instant::now();
    let result = session.read_sync(SignalId::BattTemp, Duration::from_millis(20));
    assert!(result.is_none());
    assert!(start.elapsed() >= Duration::from_millis(20));
    assert_eq!(session.pending_request(), None);
}

#[test]
fn test_reads_fail_when_disconnected() {
    let (mut session, _radio) = new_session(10);
    assert!(!session.read_async(SignalId::BattHealth, true));
    assert!(session
        .read_sync(SignalId::BattHealth, Duration::from_millis(5))
        .is_none());
}

#[test]
fn test_writes_range_checked() {
    let (mut session, _radio) = connected_session();

    assert!(session.write_assist_level(2));
    assert!(!session.write_assist_level(4));
    assert!(session.write_peak_assist([100, 90, 80]));
    assert!(!session.write_shuttle(120));
    assert!(session.write_accel_sensitivity(0));
    assert!(!session.write_fake_channel(101));

    assert_eq!(
        session.transport().parameter_writes(),
        vec![
            vec![0x01, 0x05, 0x02],
            vec![0x01, 0x10, 100, 90, 80, 0x32],
            vec![0x02, 0x07, 0xb8, 0x0b],
        ]
    );
}

#[test]
fn test_writes_dropped_when_disconnected() {
    let (mut session, _radio) = new_session(10);
    assert!(!session.write_assist_level(1));
    assert!(!session.write_assist(0, 50));
    assert!(session.transport().writes.is_empty());
}

#[test]
fn test_assist_settings_read_pauses_notifications() {
    let (mut session, _radio) = connected_session();
    let replies = [
        ([0x01, 0x10], vec![0x01, 0x10, 30, 60, 90, 0x32]),
        ([0x01, 0x15], vec![0x01, 0x15, 40]),
        ([0x02, 0x03], vec![0x02, 0x03, 35]),
        ([0x02, 0x04], vec![0x02, 0x04, 60]),
        ([0x02, 0x05], vec![0x02, 0x05, 100]),
        ([0x02, 0x06], vec![0x02, 0x06, 0]),
        ([0x02, 0x07], vec![0x02, 0x07, 0x70, 0x17]),
    ];
    session.transport_mut().replies.extend(replies);

    let settings = session
        .read_assist_settings(Duration::from_millis(50))
        .unwrap();
    assert!(settings.is_complete());
    assert_eq!(settings.assist, [Some(35), Some(60), Some(100)]);
    assert_eq!(settings.accel_sensitivity, Some(50));

    assert_eq!(session.transport().unsubscribe_calls, 1);
    assert!(session.is_subscribed());
    assert!(session.transport().subscribed);
}

#[test]
fn test_assist_settings_partial_read() {
    let (mut session, _radio) = connected_session();
    session
        .transport_mut()
        .replies
        .insert([0x01, 0x15], vec![0x01, 0x15, 40]);

    let settings = session
        .read_assist_settings(Duration::from_millis(5))
        .unwrap();
    assert_eq!(settings.shuttle, Some(40));
    assert!(!settings.is_complete());
}

#[test]
fn test_assist_settings_write_skips_invalid_fields() {
    let (mut session, _radio) = connected_session();
    let settings = AssistSettings {
        assist: [Some(50), Some(150), Some(80)],
        peak_assist: [Some(100), None, Some(100)],
        shuttle: Some(20),
        accel_sensitivity: None,
        fake_channel: Some(0),
    };

    assert!(session.write_assist_settings(&settings, WriteMask::ALL));
    assert_eq!(
        session.transport().parameter_writes(),
        vec![
            vec![0x02, 0x03, 50],
            vec![0x02, 0x05, 80],
            vec![0x02, 0x06, 0],
            vec![0x01, 0x15, 20],
        ]
    );
    assert!(session.is_subscribed());
}
