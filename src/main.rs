//! Levo Link - e-bike telemetry and control core
//!
//! Headless main loop: drains the radio link, drives the trip metrics and the
//! power calibration, and persists calibration results.

use anyhow::Context;
use levo_link::config::{self, AppConfig};
use levo_link::link::{queue, BleTransport, SampleValue, Session, SessionConfig};
use levo_link::{PowerCalibration, SignalId, TripMetrics};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Main loop period.
const TICK: Duration = Duration::from_millis(50);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Levo Link v{}", env!("CARGO_PKG_VERSION"));

    let mut app_config = config::load_config().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        AppConfig {
            data_dir: config::get_data_dir(),
            ..Default::default()
        }
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested");
                running.store(false, Ordering::SeqCst);
            }
        });
    }

    let session_config = SessionConfig::from(&app_config.link);
    let (radio, inbox) = queue::channel(session_config.queue_capacity);
    let transport = BleTransport::new(
        runtime.handle().clone(),
        radio,
        Duration::from_millis(session_config.connect_timeout_ms),
    )
    .context("failed to initialize BLE transport")?;

    let mut session = Session::new(transport, inbox, session_config);
    if !session.init() {
        tracing::warn!("Bluetooth is off, check passkey and enabled flag in the config");
    }

    let mut trip = TripMetrics::new();
    let mut calibration = PowerCalibration::new(app_config.system);
    calibration.enable_calibration(true);

    while running.load(Ordering::SeqCst) {
        while let Some(sample) = session.poll() {
            let (Some(id), SampleValue::Scalar(value)) = (sample.id, &sample.value) else {
                continue;
            };
            tracing::trace!("{} = {}", id, value);

            if id == SignalId::MotSpeed && *value > 0.0 {
                trip.start_trip(sample.timestamp);
            }
            trip.feed(id, *value, sample.timestamp);
            calibration.feed(id, *value, sample.timestamp);
        }

        let now = session.now();
        if let Some((id, value)) = trip.update(now) {
            tracing::debug!("{} = {}", id, value);
            // derived grade feeds the coast detection
            calibration.feed(id, value, now);
        }
        let (id, power) = calibration.update(now);
        tracing::debug!("{} = {:.0}", id, power);

        if let Some(fit) = calibration.take_result() {
            calibration.apply_calibration(fit);
            persist(&mut app_config, &calibration);
        }
        if let Some(eta) = calibration.take_eta() {
            calibration.apply_eta(eta);
            persist(&mut app_config, &calibration);
        }

        std::thread::sleep(TICK);
    }

    session.disconnect();
    trip.stop_trip(session.now());
    write_trip_snapshot(&app_config, &trip)?;

    tracing::info!("Levo Link stopped");
    Ok(())
}

fn persist(app_config: &mut AppConfig, calibration: &PowerCalibration) {
    app_config.system = *calibration.params();
    if let Err(e) = config::save_config(app_config) {
        tracing::warn!("Failed to save config: {}", e);
    }
}

fn write_trip_snapshot(app_config: &AppConfig, trip: &TripMetrics) -> anyhow::Result<()> {
    std::fs::create_dir_all(&app_config.data_dir)
        .with_context(|| format!("failed to create {}", app_config.data_dir.display()))?;

    let name = format!("trip-{}.txt", chrono::Local::now().format("%Y%m%d-%H%M%S"));
    let path = app_config.data_dir.join(name);
    std::fs::write(&path, trip.snapshot())
        .with_context(|| format!("failed to write {}", path.display()))?;

    tracing::info!("Trip snapshot written to {}", path.display());
    Ok(())
}
