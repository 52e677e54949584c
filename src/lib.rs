//! Levo Link - e-bike telemetry and control core
//!
//! Talks to the bike's control unit over BLE, derives trip statistics from
//! the decoded signals and calibrates the physical power model from natural
//! coast-down episodes.

pub mod calibration;
pub mod config;
pub mod link;
pub mod metrics;
pub mod signals;

// Re-export commonly used types
pub use calibration::PowerCalibration;
pub use config::{AppConfig, SystemParams};
pub use link::Session;
pub use metrics::TripMetrics;
pub use signals::SignalId;
