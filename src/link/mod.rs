//! Link to the bike's control unit.
//!
//! This module provides:
//! - Frame decoding and parameter write frames
//! - The bounded frame queue fed by the radio context
//! - The session state machine (scan, connect, pair, subscribe)
//! - Request/read-back reads, async and sync
//! - A btleplug transport

pub mod ble;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod transport;
pub mod types;

pub use ble::BleTransport;
pub use protocol::{AssistSettings, WriteMask};
pub use queue::{Inbox, RadioHandle};
pub use session::Session;
pub use transport::{Channel, Transport};
pub use types::{
    ConnectionParams, LinkError, LinkEvent, LinkState, PeerAddress, SampleValue, SessionConfig,
    SignalSample,
};
