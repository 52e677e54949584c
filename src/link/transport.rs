//! Seam between the session and the radio stack.
//!
//! Calls are synchronous from the main loop's point of view. Asynchronous
//! happenings (advertisements, notifications, disconnects) are delivered
//! through the [`RadioHandle`](crate::link::queue::RadioHandle) the transport
//! was built with, never by touching session state directly.

use crate::link::types::{ConnectionParams, LinkError, PeerAddress};
use uuid::Uuid;

/// Data service (notifications)
pub const DATA_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_0003_3731_3032_494d_484f_4252_5554);

/// Notification characteristic
pub const DATA_CHAR_UUID: Uuid = Uuid::from_u128(0x0000_0013_3731_3032_494d_484f_4252_5554);

/// Request / read-back service
pub const REQUEST_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_0001_3731_3032_494d_484f_4252_5554);

/// Request characteristic (write)
pub const REQUEST_CHAR_UUID: Uuid = Uuid::from_u128(0x0000_0021_3731_3032_494d_484f_4252_5554);

/// Read-back characteristic (read)
pub const READ_BACK_CHAR_UUID: Uuid =
    Uuid::from_u128(0x0000_0011_3731_3032_494d_484f_4252_5554);

/// Parameter write service
pub const WRITE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_0002_3731_3032_494d_484f_4252_5554);

/// Parameter write characteristic
pub const WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x0000_0012_3731_3032_494d_484f_4252_5554);

/// Signature expected in the manufacturer data at [`SIGNATURE_OFFSET`].
pub const ADVERTISEMENT_SIGNATURE: &[u8] = b"TURBOHMI";

/// Byte offset of the signature (after the 2-byte company id).
pub const SIGNATURE_OFFSET: usize = 2;

/// Check an advertisement's manufacturer data for the bike signature.
pub fn matches_signature(manufacturer_data: &[u8]) -> bool {
    manufacturer_data.len() > 10
        && manufacturer_data
            .get(SIGNATURE_OFFSET..SIGNATURE_OFFSET + ADVERTISEMENT_SIGNATURE.len())
            == Some(ADVERTISEMENT_SIGNATURE)
}

/// Logical GATT channel of the bike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Notification stream, also read once to trigger pairing
    Data,
    /// Read request (2-byte key)
    Request,
    /// Read-back of the last request
    ReadBack,
    /// Parameter writes
    Write,
}

impl Channel {
    /// GATT service owning this channel.
    pub fn service_uuid(self) -> Uuid {
        match self {
            Channel::Data => DATA_SERVICE_UUID,
            Channel::Request | Channel::ReadBack => REQUEST_SERVICE_UUID,
            Channel::Write => WRITE_SERVICE_UUID,
        }
    }

    /// GATT characteristic of this channel.
    pub fn char_uuid(self) -> Uuid {
        match self {
            Channel::Data => DATA_CHAR_UUID,
            Channel::Request => REQUEST_CHAR_UUID,
            Channel::ReadBack => READ_BACK_CHAR_UUID,
            Channel::Write => WRITE_CHAR_UUID,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Data => write!(f, "data"),
            Channel::Request => write!(f, "request"),
            Channel::ReadBack => write!(f, "read-back"),
            Channel::Write => write!(f, "write"),
        }
    }
}

/// Radio stack operations used by the session.
pub trait Transport {
    /// Start discovery. Matching advertisements are posted as events.
    fn start_scan(&mut self) -> Result<(), LinkError>;

    /// Stop discovery.
    fn stop_scan(&mut self) -> Result<(), LinkError>;

    /// Connect to a peer using the pairing passkey.
    fn connect(&mut self, peer: &PeerAddress, passkey: u32) -> Result<(), LinkError>;

    /// Tear down the current connection.
    fn disconnect(&mut self) -> Result<(), LinkError>;

    /// Request new connection timings.
    fn update_connection_params(&mut self, params: ConnectionParams) -> Result<(), LinkError>;

    /// Read a channel. An empty vector means nothing was available.
    fn read(&mut self, channel: Channel) -> Result<Vec<u8>, LinkError>;

    /// Write a frame to a channel.
    fn write(&mut self, channel: Channel, frame: &[u8]) -> Result<(), LinkError>;

    /// Enable notifications on the data channel.
    fn subscribe(&mut self) -> Result<(), LinkError>;

    /// Disable notifications on the data channel.
    fn unsubscribe(&mut self) -> Result<(), LinkError>;
}
