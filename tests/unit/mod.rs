//! Unit test modules.

mod campaign_test;
mod protocol_test;
mod trip_metrics_test;
