mod config;
mod position_log;

use anyhow::Context;
use config::RecorderConfig;
use datatypes::Position2D;
use lockstep::{LockstepError, NodeState, Source};
use position_log::{LogEntry, PositionLog};
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let config = RecorderConfig::from_env()?;
    common::setup_logging(&config.environment);
    common::shutdown::install()?;

    let log = PositionLog::create(&config.output_path)?;

    let mut sources = Vec::with_capacity(config.source_addresses.len());
    for address in &config.source_addresses {
        let Some(mut source) = common::wait_for_resource(
            || Source::<Position2D>::touch_existing(address),
            Duration::from_millis(config.poll_interval_ms),
            address,
        ) else {
            return Ok(());
        };
        match source.connect() {
            Ok(()) => sources.push(source),
            Err(LockstepError::Interrupted) => return Ok(()),
            Err(e) => return Err(e).with_context(|| format!("Failed to connect to '{address}'")),
        }
    }

    tracing::info!(
        sources = sources.len(),
        output = %config.output_path,
        "Recorder started"
    );

    // Round-robin over the attached streams; a stream that ends or a
    // shutdown request retires it from the rotation.
    'record: while !sources.is_empty() {
        let mut retired = Vec::new();
        for (index, source) in sources.iter_mut().enumerate() {
            match source.wait() {
                Ok(NodeState::Active) => {
                    let position = source.clone_payload()?;
                    let write_number = source.write_number();
                    source.post()?;

                    log.record(LogEntry {
                        source: source.address().to_string(),
                        write_number,
                        position: position.record(config.verbose_json),
                    })?;
                }
                Ok(NodeState::End) => {
                    tracing::info!(address = source.address(), "Stream ended");
                    retired.push(index);
                }
                Err(LockstepError::Interrupted) => break 'record,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed reading '{}'", source.address()));
                }
            }
        }
        for index in retired.into_iter().rev() {
            sources.remove(index);
        }
    }

    drop(sources);
    let written = log.finish()?;
    tracing::info!(written, "Recorder stopped");
    Ok(())
}
