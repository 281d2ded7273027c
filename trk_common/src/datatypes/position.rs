//! 2D position sample with velocity and heading.
//!
//! Produced by detectors and testers, consumed by combiners and recorders.
//!
//! Size: 88 bytes (6×f64 + 3×u8 flags + 5 pad + 32-byte label).

use static_assertions::const_assert_eq;

use crate::consts::POSITION_LABEL_LEN;
use crate::shm::payload::Payload;

/// A 2D vector in world (or pixel) units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct Point2D {
    /// Horizontal component.
    pub x: f64,
    /// Vertical component.
    pub y: f64,
}

impl Point2D {
    /// Create a point from components.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean norm.
    #[inline]
    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Unit vector in the same direction, or `None` for a (near) zero vector.
    pub fn normalized(&self) -> Option<Self> {
        let n = self.norm();
        if n > f64::EPSILON {
            Some(Self::new(self.x / n, self.y / n))
        } else {
            None
        }
    }
}

/// Position sample published once per processing cycle.
///
/// Validity flags are stored as `u8` (0 = invalid, 1 = valid) so that any
/// byte pattern written by another process is a valid value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Position2D {
    /// Position of the tracked object.
    pub position: Point2D,
    /// Velocity of the tracked object [units/s].
    pub velocity: Point2D,
    /// Unit heading vector.
    pub heading: Point2D,
    /// Position valid flag (0=no, 1=yes).
    pub position_valid: u8,
    /// Velocity valid flag (0=no, 1=yes).
    pub velocity_valid: u8,
    /// Heading valid flag (0=no, 1=yes).
    pub heading_valid: u8,
    /// Padding.
    pub _pad: [u8; 5],
    /// Label of the producing component (NUL padded UTF-8).
    pub label: [u8; POSITION_LABEL_LEN],
}

const_assert_eq!(core::mem::size_of::<Position2D>(), 88);
const_assert_eq!(core::mem::align_of::<Position2D>(), 8);

// SAFETY: repr(C), only f64/u8 fields, no pointers; every bit pattern is valid.
unsafe impl Payload for Position2D {}

impl Default for Position2D {
    fn default() -> Self {
        Self {
            position: Point2D::default(),
            velocity: Point2D::default(),
            heading: Point2D::default(),
            position_valid: 0,
            velocity_valid: 0,
            heading_valid: 0,
            _pad: [0; 5],
            label: [0; POSITION_LABEL_LEN],
        }
    }
}

impl Position2D {
    /// Create an invalid position carrying `label`.
    pub fn new(label: &str) -> Self {
        let mut pos = Self::default();
        pos.set_label(label);
        pos
    }

    /// Set the label, truncated to [`POSITION_LABEL_LEN`] bytes on a char boundary.
    pub fn set_label(&mut self, label: &str) {
        let mut end = label.len().min(POSITION_LABEL_LEN);
        while !label.is_char_boundary(end) {
            end -= 1;
        }
        self.label = [0; POSITION_LABEL_LEN];
        self.label[..end].copy_from_slice(&label.as_bytes()[..end]);
    }

    /// The label up to its first NUL. Invalid UTF-8 yields an empty string.
    pub fn label(&self) -> &str {
        let end = self
            .label
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(POSITION_LABEL_LEN);
        std::str::from_utf8(&self.label[..end]).unwrap_or("")
    }

    /// Whether `position` holds a measurement.
    #[inline]
    pub fn position_valid(&self) -> bool {
        self.position_valid != 0
    }

    /// Whether `velocity` holds a measurement.
    #[inline]
    pub fn velocity_valid(&self) -> bool {
        self.velocity_valid != 0
    }

    /// Whether `heading` holds a measurement.
    #[inline]
    pub fn heading_valid(&self) -> bool {
        self.heading_valid != 0
    }

    /// Set the position and mark it valid.
    pub fn set_position(&mut self, p: Point2D) {
        self.position = p;
        self.position_valid = 1;
    }

    /// Set the velocity and mark it valid.
    pub fn set_velocity(&mut self, v: Point2D) {
        self.velocity = v;
        self.velocity_valid = 1;
    }

    /// Set the heading from any non-zero direction vector.
    ///
    /// A zero vector leaves the heading invalid.
    pub fn set_heading(&mut self, direction: Point2D) {
        match direction.normalized() {
            Some(h) => {
                self.heading = h;
                self.heading_valid = 1;
            }
            None => {
                self.heading = Point2D::default();
                self.heading_valid = 0;
            }
        }
    }
}
