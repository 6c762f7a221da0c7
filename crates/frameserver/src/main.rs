mod config;
mod pattern;

use anyhow::Context;
use config::FrameServerConfig;
use lockstep::{FrameSink, LockstepError};
use pattern::TestPattern;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let config = FrameServerConfig::from_env()?;
    common::setup_logging(&config.environment);
    common::shutdown::install()?;

    let mut sink = FrameSink::bind(
        &config.sink_address,
        config.rows,
        config.cols,
        config.pixel_format,
    )
    .with_context(|| format!("Failed to bind frame sink '{}'", config.sink_address))?;

    tracing::info!(
        address = %config.sink_address,
        rows = config.rows,
        cols = config.cols,
        fps = config.fps,
        "Test frame server started"
    );

    let mut pattern = TestPattern::new(config.rows, config.cols, config.pixel_format);
    let frame_duration = Duration::from_secs_f64(1.0 / config.fps.max(1e-3));
    let mut served = 0u64;

    while !common::shutdown::requested() {
        if config.num_frames.is_some_and(|limit| served >= limit) {
            tracing::info!(served, "Requested frame count reached");
            break;
        }

        match sink.wait() {
            Ok(()) => {}
            Err(LockstepError::Interrupted) => break,
            Err(e) => return Err(e).context("Failed waiting for frame cycle"),
        }

        // Pixels are rendered straight into the segment's bulk area.
        pattern.fill(sink.data_mut());
        sink.post().context("Failed to publish frame")?;
        served += 1;

        if served.is_multiple_of(30) {
            tracing::debug!(
                served,
                consumers = sink.source_ref_count(),
                "Frame server status"
            );
        }

        std::thread::sleep(frame_duration);
    }

    tracing::info!(served, "Frame server stopped");
    Ok(())
}
