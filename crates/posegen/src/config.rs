use anyhow::Context;
use common::{Environment, config};

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub environment: Environment,
    pub sink_address: String,
    pub rate_hz: f64,
    /// Periodic boundary the simulated particle lives in: x, y, width, height.
    pub room: [f64; 4],
    /// Standard deviation of the random accelerations.
    pub sigma_accel: f64,
    /// Stop after this many samples; `None` runs until shutdown.
    pub num_samples: Option<u64>,
    pub seed: Option<u64>,
}

impl GeneratorConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();

        let sink_address = config::var("SINK_ADDRESS")
            .context("SINK_ADDRESS must name the position segment to publish")?;

        let rate_hz = config::var_or("RATE_HZ", 30.0);
        let sigma_accel = config::var_or("SIGMA_ACCEL", 100.0);
        let num_samples = config::var("NUM_SAMPLES").and_then(|s| s.parse().ok());
        let seed = config::var("SEED").and_then(|s| s.parse().ok());

        let room = match config::var("ROOM") {
            Some(raw) => parse_room(&raw).context("ROOM must be four numbers: x,y,width,height")?,
            None => [0.0, 0.0, 100.0, 100.0],
        };

        Ok(Self {
            environment,
            sink_address,
            rate_hz,
            room,
            sigma_accel,
            num_samples,
            seed,
        })
    }
}

fn parse_room(raw: &str) -> Option<[f64; 4]> {
    let mut values = raw.split(',').map(|v| v.trim().parse::<f64>());
    let room = [
        values.next()?.ok()?,
        values.next()?.ok()?,
        values.next()?.ok()?,
        values.next()?.ok()?,
    ];
    if values.next().is_some() || room[2] <= 0.0 || room[3] <= 0.0 {
        return None;
    }
    Some(room)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_parses_four_comma_separated_numbers() {
        assert_eq!(
            parse_room("0, 0, 200, 150").unwrap(),
            [0.0, 0.0, 200.0, 150.0]
        );
        assert!(parse_room("1,2,3").is_none());
        assert!(parse_room("1,2,3,4,5").is_none());
        assert!(parse_room("0,0,-10,10").is_none());
    }
}
