//! Link types: states, events, samples and errors.

use crate::signals::{SignalId, Tick};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of bytes kept from a single frame.
pub const MAX_FRAME_LEN: usize = 20;

/// State of the link to the bike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Bluetooth unusable or disabled
    Off,
    /// Idle or scanning
    #[default]
    Disconnected,
    /// Connection attempt in progress
    Connecting,
    /// Transport connected
    Connected,
    /// Pairing completed without encryption
    AuthFailed,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Off => write!(f, "Off"),
            LinkState::Disconnected => write!(f, "Disconnected"),
            LinkState::Connecting => write!(f, "Connecting..."),
            LinkState::Connected => write!(f, "Connected"),
            LinkState::AuthFailed => write!(f, "Authentication failed"),
        }
    }
}

/// Address of the remote peer as reported by the radio stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress(pub String);

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Events posted by the radio context.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// An advertisement was received during a scan
    Advertisement {
        address: PeerAddress,
        /// Vendor specific payload, company id included
        manufacturer_data: Vec<u8>,
    },
    /// Pairing finished
    AuthenticationComplete { encrypted: bool },
    /// The transport dropped the connection
    Disconnected,
}

/// Value carried by a sample.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    /// Decoded scalar
    Scalar(f32),
    /// Opaque payload, at most [`MAX_FRAME_LEN`] bytes
    Raw(Vec<u8>),
}

impl SampleValue {
    /// Scalar content, if any.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            SampleValue::Scalar(v) => Some(*v),
            SampleValue::Raw(_) => None,
        }
    }

    /// Raw content, if any.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SampleValue::Scalar(_) => None,
            SampleValue::Raw(bytes) => Some(bytes),
        }
    }
}

/// One decoded value with its reception time.
///
/// `id` is `None` for frames the decoder does not know; their bytes are kept
/// verbatim in a [`SampleValue::Raw`].
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSample {
    pub id: Option<SignalId>,
    pub value: SampleValue,
    pub timestamp: Tick,
}

impl SignalSample {
    /// Whether this sample carries an undecodable frame.
    pub fn is_unknown(&self) -> bool {
        self.id.is_none()
    }
}

/// Connection timing parameters, in the units of the radio stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionParams {
    pub min_interval: u16,
    pub max_interval: u16,
    pub latency: u16,
    pub supervision_timeout: u16,
}

impl ConnectionParams {
    /// Low-power timings applied once the link is up.
    pub const LOW_POWER: ConnectionParams = ConnectionParams {
        min_interval: 20,
        max_interval: 40,
        latency: 4,
        supervision_timeout: 400,
    };
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Pairing passkey, 0 disables the link
    pub passkey: u32,
    /// Whether the link is enabled at all
    pub enabled: bool,
    /// Capacity of the frame queue
    pub queue_capacity: usize,
    /// Timeout of a transport connect attempt in milliseconds
    pub connect_timeout_ms: u64,
    /// Default timeout of a synchronous read in milliseconds
    pub sync_read_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            passkey: 0,
            enabled: true,
            queue_capacity: 10,
            connect_timeout_ms: 5000,
            sync_read_timeout_ms: 1000,
        }
    }
}

/// Errors raised by the radio transport.
#[derive(Debug, Error)]
pub enum LinkError {
    /// BLE adapter not found or unavailable
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// Failed to start or stop scanning
    #[error("Scan failed: {0}")]
    ScanFailed(String),

    /// Connection to the bike failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection attempt timed out
    #[error("Connection timed out")]
    ConnectionTimeout,

    /// Operation requires a connected peer
    #[error("Not connected")]
    NotConnected,

    /// Failed to read a characteristic
    #[error("Read failed: {0}")]
    ReadFailed(String),

    /// Failed to write a characteristic
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Failed to (un)subscribe notifications
    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    /// Characteristic missing on the peer
    #[error("Unsupported channel: {0}")]
    UnsupportedChannel(String),

    /// Generic BLE error
    #[error("BLE error: {0}")]
    BleError(String),
}
