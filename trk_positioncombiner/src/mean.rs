//! Mean of several position estimates.

use trk_common::datatypes::{Point2D, Position2D};
use trk_shm::Combine;

/// Averages every valid component across inputs.
///
/// Positions and velocities are arithmetic means over the inputs that carry
/// them. Headings are unit vectors: they are summed and renormalized, so
/// opposing headings cancel to an invalid heading. A component is valid in
/// the output if at least one input carries it.
#[derive(Debug, Clone)]
pub struct MeanPosition {
    label: String,
}

impl MeanPosition {
    /// Combiner stamping its output with `label`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[derive(Default)]
struct Accumulator {
    sum: Point2D,
    count: u32,
}

impl Accumulator {
    fn add(&mut self, p: Point2D) {
        self.sum.x += p.x;
        self.sum.y += p.y;
        self.count += 1;
    }

    fn mean(&self) -> Option<Point2D> {
        (self.count > 0).then(|| {
            let n = f64::from(self.count);
            Point2D::new(self.sum.x / n, self.sum.y / n)
        })
    }
}

impl Combine<Position2D> for MeanPosition {
    type Output = Position2D;

    fn combine(&mut self, inputs: &[Position2D], out: &mut Position2D) {
        let mut position = Accumulator::default();
        let mut velocity = Accumulator::default();
        let mut heading = Accumulator::default();

        for input in inputs {
            if input.position_valid() {
                position.add(input.position);
            }
            if input.velocity_valid() {
                velocity.add(input.velocity);
            }
            if input.heading_valid() {
                heading.add(input.heading);
            }
        }

        let mut result = Position2D::new(&self.label);
        if let Some(p) = position.mean() {
            result.set_position(p);
        }
        if let Some(v) = velocity.mean() {
            result.set_velocity(v);
        }
        if heading.count > 0 {
            result.set_heading(heading.sum);
        }
        *out = result;
    }
}
