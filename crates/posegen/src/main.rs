mod config;
mod generator;

use anyhow::Context;
use config::GeneratorConfig;
use datatypes::{DistanceUnit, Position2D};
use generator::RandomAccel2D;
use lockstep::{LockstepError, Sink};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn main() -> anyhow::Result<()> {
    let config = GeneratorConfig::from_env()?;
    common::setup_logging(&config.environment);
    common::shutdown::install()?;

    let mut generator = RandomAccel2D::new(&config)?;
    let mut sink = Sink::<Position2D>::bind(&config.sink_address, 0)
        .with_context(|| format!("Failed to bind position sink '{}'", config.sink_address))?;

    tracing::info!(
        address = %config.sink_address,
        rate_hz = config.rate_hz,
        sigma = config.sigma_accel,
        "Test position generator started"
    );

    let period = Duration::from_secs_f64(1.0 / config.rate_hz.max(1e-3));
    let mut sample = Position2D::new(DistanceUnit::Pixels, config.rate_hz);
    let mut published = 0u64;

    while !common::shutdown::requested() {
        if config.num_samples.is_some_and(|limit| published >= limit) {
            tracing::info!(published, "Requested sample count reached");
            break;
        }

        let (position, velocity) = generator.tick();
        sample.position_valid = true;
        sample.position = position;
        sample.velocity_valid = true;
        sample.velocity = velocity;
        sample.sample_mut().increment(now_usec()?);

        match sink.push(sample) {
            Ok(()) => published += 1,
            Err(LockstepError::Interrupted) => break,
            Err(e) => return Err(e).context("Failed to publish position"),
        }

        if published.is_multiple_of(100) {
            tracing::debug!(
                published,
                consumers = sink.source_ref_count(),
                "Generator status"
            );
        }

        std::thread::sleep(period);
    }

    tracing::info!(published, "Position generator stopped");
    Ok(())
}

fn now_usec() -> anyhow::Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("Time went backwards")?
        .as_micros() as u64)
}
