mod config;
mod socket;

use anyhow::Context;
use config::SocketConfig;
use datatypes::Position2D;
use lockstep::{LockstepError, NodeState, Source};
use socket::PositionSender;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let config = SocketConfig::from_env()?;
    common::setup_logging(&config.environment);
    common::shutdown::install()?;

    let mut sender = PositionSender::from_endpoint(config.endpoint.as_deref())?;

    let Some(mut source) = common::wait_for_resource(
        || Source::<Position2D>::touch_existing(&config.source_address),
        Duration::from_millis(config.poll_interval_ms),
        "Position segment",
    ) else {
        return Ok(());
    };

    match source.connect() {
        Ok(()) => {}
        Err(LockstepError::Interrupted) => return Ok(()),
        Err(e) => return Err(e).context("Failed to connect to position stream"),
    }

    tracing::info!(address = %config.source_address, "Position socket started");

    let mut forwarded = 0u64;
    loop {
        match source.wait() {
            Ok(NodeState::Active) => {
                // Copy out and release the cycle before any network I/O, so
                // a slow peer cannot stall the producer.
                let position = source.clone_payload()?;
                source.post()?;

                sender.send(&position)?;
                forwarded += 1;

                if forwarded.is_multiple_of(100) {
                    tracing::debug!(
                        forwarded,
                        tick = position.sample().count(),
                        "Socket status"
                    );
                }
            }
            Ok(NodeState::End) => {
                tracing::info!("Position stream ended");
                break;
            }
            Err(LockstepError::Interrupted) => break,
            Err(e) => return Err(e).context("Failed while waiting for positions"),
        }
    }

    tracing::info!(forwarded, "Position socket stopped");
    Ok(())
}
