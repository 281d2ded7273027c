//! Random-acceleration 2D motion model.
//!
//! State `[x, x', y, y']` evolves under a constant-acceleration transition
//! over one step `dt`:
//!
//! ```text
//! x  <- x + x'·dt + a_x·dt²/2
//! x' <- x' + a_x·dt
//! ```
//!
//! (likewise for `y`), with each acceleration component drawn every step from
//! a zero-mean normal distribution with standard deviation `accel`.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use trk_common::config::ConfigError;
use trk_common::datatypes::{Point2D, Position2D};

/// Smooth random motion starting at rest at the origin.
pub struct RandomAccel2D {
    dt: f64,
    state: [f64; 4],
    accel: Normal<f64>,
    rng: StdRng,
    label: String,
}

impl RandomAccel2D {
    /// Model stepping `dt` seconds with accelerations of standard deviation
    /// `accel`. A `seed` makes the trajectory reproducible.
    pub fn new(
        dt: f64,
        accel: f64,
        seed: Option<u64>,
        label: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let accel = Normal::new(0.0, accel).map_err(|e| {
            ConfigError::ValidationError(format!("accel {accel} is not a standard deviation: {e}"))
        })?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            dt,
            state: [0.0; 4],
            accel,
            rng,
            label: label.into(),
        })
    }

    /// Advance one step with a random acceleration.
    pub fn step(&mut self) -> Position2D {
        let ax = self.accel.sample(&mut self.rng);
        let ay = self.accel.sample(&mut self.rng);
        self.step_with(Point2D::new(ax, ay))
    }

    /// Advance one step with the given acceleration.
    pub fn step_with(&mut self, a: Point2D) -> Position2D {
        let dt = self.dt;
        let half_dt2 = dt * dt / 2.0;
        let [x, vx, y, vy] = self.state;
        self.state = [
            x + vx * dt + a.x * half_dt2,
            vx + a.x * dt,
            y + vy * dt + a.y * half_dt2,
            vy + a.y * dt,
        ];
        self.position()
    }

    /// Current state as a sample. Position and velocity are always valid.
    pub fn position(&self) -> Position2D {
        let [x, vx, y, vy] = self.state;
        let mut pos = Position2D::new(&self.label);
        pos.set_position(Point2D::new(x, y));
        pos.set_velocity(Point2D::new(vx, vy));
        pos
    }

    /// Step length in seconds.
    pub fn dt(&self) -> f64 {
        self.dt
    }
}
