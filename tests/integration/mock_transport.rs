//! Scripted transport standing in for the radio stack.

use levo_link::link::queue::{self, RadioHandle};
use levo_link::link::{
    Channel, ConnectionParams, LinkError, LinkEvent, PeerAddress, Session, SessionConfig,
    Transport,
};
use std::collections::HashMap;

/// Address used for the fake bike.
pub const BIKE_ADDRESS: &str = "C8:FD:19:00:00:01";

/// Manufacturer data carrying the bike signature.
pub fn bike_advertisement() -> Vec<u8> {
    let mut data = vec![0x59, 0x00];
    data.extend_from_slice(b"TURBOHMI2017");
    data
}

/// Records every call and answers read requests from a reply table.
pub struct MockTransport {
    pub radio: RadioHandle,
    /// Read-back frames keyed by the 2-byte request
    pub replies: HashMap<[u8; 2], Vec<u8>>,
    pub writes: Vec<(Channel, Vec<u8>)>,
    pub scan_starts: usize,
    pub scanning: bool,
    pub connect_calls: usize,
    pub connected: bool,
    pub subscribed: bool,
    pub unsubscribe_calls: usize,
    pub params: Option<ConnectionParams>,
    /// Outcome of pairing reported after the first data read
    pub encrypt: bool,
    pub fail_connect: bool,
    pub fail_subscribe: bool,
    last_request: Option<[u8; 2]>,
}

impl MockTransport {
    pub fn new(radio: RadioHandle) -> Self {
        Self {
            radio,
            replies: HashMap::new(),
            writes: Vec::new(),
            scan_starts: 0,
            scanning: false,
            connect_calls: 0,
            connected: false,
            subscribed: false,
            unsubscribe_calls: 0,
            params: None,
            encrypt: true,
            fail_connect: false,
            fail_subscribe: false,
            last_request: None,
        }
    }

    /// Frames written to the parameter channel.
    pub fn parameter_writes(&self) -> Vec<Vec<u8>> {
        self.writes
            .iter()
            .filter(|(channel, _)| *channel == Channel::Write)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    /// Simulate the bike dropping the link.
    pub fn drop_link(&mut self) {
        self.connected = false;
        self.radio.post_event(LinkEvent::Disconnected);
    }
}

impl Transport for MockTransport {
    fn start_scan(&mut self) -> Result<(), LinkError> {
        self.scan_starts += 1;
        self.scanning = true;
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), LinkError> {
        self.scanning = false;
        Ok(())
    }

    fn connect(&mut self, _peer: &PeerAddress, _passkey: u32) -> Result<(), LinkError> {
        self.connect_calls += 1;
        if self.fail_connect {
            return Err(LinkError::ConnectionTimeout);
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        self.drop_link();
        Ok(())
    }

    fn update_connection_params(&mut self, params: ConnectionParams) -> Result<(), LinkError> {
        self.params = Some(params);
        Ok(())
    }

    fn read(&mut self, channel: Channel) -> Result<Vec<u8>, LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        match channel {
            Channel::Data => {
                self.radio.post_event(LinkEvent::AuthenticationComplete {
                    encrypted: self.encrypt,
                });
                Ok(Vec::new())
            }
            Channel::ReadBack => Ok(self
                .last_request
                .and_then(|key| self.replies.get(&key).cloned())
                .unwrap_or_default()),
            other => Err(LinkError::UnsupportedChannel(other.to_string())),
        }
    }

    fn write(&mut self, channel: Channel, frame: &[u8]) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        if channel == Channel::Request && frame.len() >= 2 {
            self.last_request = Some([frame[0], frame[1]]);
        }
        self.writes.push((channel, frame.to_vec()));
        Ok(())
    }

    fn subscribe(&mut self) -> Result<(), LinkError> {
        if self.fail_subscribe {
            return Err(LinkError::SubscriptionFailed("rejected".to_string()));
        }
        self.subscribed = true;
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<(), LinkError> {
        self.unsubscribe_calls += 1;
        self.subscribed = false;
        Ok(())
    }
}

/// Session configuration with a usable passkey.
pub fn test_config() -> SessionConfig {
    SessionConfig {
        passkey: 123456,
        ..Default::default()
    }
}

/// Session over a fresh mock, initialised but not connected.
pub fn new_session(capacity: usize) -> (Session<MockTransport>, RadioHandle) {
    let (radio, inbox) = queue::channel(capacity);
    let transport = MockTransport::new(radio.clone());
    let mut session = Session::new(transport, inbox, test_config());
    session.init();
    (session, radio)
}

/// Drive a session through discovery, connect and pairing.
pub fn connect(session: &mut Session<MockTransport>, radio: &RadioHandle) {
    radio.post_event(LinkEvent::Advertisement {
        address: PeerAddress(BIKE_ADDRESS.to_string()),
        manufacturer_data: bike_advertisement(),
    });
    // discovery and connect, then the pairing result
    while session.poll().is_some() {}
    while session.poll().is_some() {}
}

/// Connected and paired session.
pub fn connected_session() -> (Session<MockTransport>, RadioHandle) {
    let (mut session, radio) = new_session(10);
    connect(&mut session, &radio);
    (session, radio)
}
