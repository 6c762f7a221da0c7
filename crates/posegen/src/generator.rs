use crate::config::GeneratorConfig;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

/// Random-acceleration point mass: smooth but unpredictable 2-D motion,
/// useful for testing downstream position consumers without a camera.
///
/// Each tick draws Gaussian accelerations, integrates one sample period and
/// wraps the state at the room boundary (periodic, so the particle never
/// oscillates endlessly against a wall).
pub struct RandomAccel2D {
    position: [f64; 2],
    velocity: [f64; 2],
    room: [f64; 4],
    accel: Normal<f64>,
    period_sec: f64,
    rng: StdRng,
}

impl RandomAccel2D {
    pub fn new(config: &GeneratorConfig) -> anyhow::Result<Self> {
        let accel = Normal::new(0.0, config.sigma_accel)
            .map_err(|e| anyhow::anyhow!("invalid acceleration sigma: {e}"))?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let [x, y, w, h] = config.room;
        Ok(Self {
            position: [x + w / 2.0, y + h / 2.0],
            velocity: [0.0, 0.0],
            room: config.room,
            accel,
            period_sec: if config.rate_hz > 0.0 {
                1.0 / config.rate_hz
            } else {
                1.0 / 1e8
            },
            rng,
        })
    }

    /// Advance the simulation one sample period; returns position and
    /// velocity after the step.
    pub fn tick(&mut self) -> ([f64; 2], [f64; 2]) {
        let dt = self.period_sec;
        for axis in 0..2 {
            let accel = self.accel.sample(&mut self.rng);
            self.position[axis] += self.velocity[axis] * dt + accel * dt * dt / 2.0;
            self.velocity[axis] += accel * dt;
        }

        let [x, y, w, h] = self.room;
        if self.position[0] < x {
            self.position[0] = x + w;
        } else if self.position[0] > x + w {
            self.position[0] = x;
        }
        if self.position[1] < y {
            self.position[1] = y + h;
        } else if self.position[1] > y + h {
            self.position[1] = y;
        }

        (self.position, self.velocity)
    }
}
