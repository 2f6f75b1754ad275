//! Vantage Loopback - authority, owning client and observer in one process.
//!
//! Configuration comes from the JSON file named by `VANTAGE_CONFIG`;
//! logging honours `RUST_LOG` and otherwise the configured level.

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vantage_loopback::Loopback;
use vantage_loopback::config::LoopbackConfig;
use vantage_replay::acquire_build_fingerprint;

fn main() -> anyhow::Result<()> {
    let config = LoopbackConfig::from_env()?;
    init_tracing(&config.log_level);

    info!(
        tick_rate_hz = config.server.sim.tick_rate_hz,
        ticks = config.ticks,
        latency_ticks = config.latency_ticks,
        "starting loopback"
    );

    let fingerprint = if config.server.record_replays {
        match acquire_build_fingerprint() {
            Ok(fingerprint) => Some(fingerprint),
            Err(err) => {
                warn!(error = %err, "no build fingerprint, replays will be unstamped");
                None
            }
        }
    } else {
        None
    };

    let report = Loopback::with_fingerprint(config, fingerprint)?.run()?;

    info!(
        batches = report.batches_sent,
        snapshots = report.snapshots_received,
        smoothed = report.smoothed_corrections,
        missing_ticks = report.missing_ticks,
        client = %report.client_position,
        authority = %report.authority_position,
        observed = %report.observed_owner,
        "run complete"
    );
    Ok(())
}

fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
