//! # Planar pose

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Position and heading of the robot on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position in the reference frame.
    ///
    /// Units: meters
    pub position_m: Vector2<f64>,

    /// Heading from the frame's x axis, positive to the left (anticlockwise).
    ///
    /// Units: radians
    pub heading_rad: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Pose {
    fn default() -> Self {
        Self {
            position_m: Vector2::zeros(),
            heading_rad: 0.0,
        }
    }
}

impl Pose {
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64) -> Self {
        Self {
            position_m: Vector2::new(x_m, y_m),
            heading_rad,
        }
    }

    /// Unit vector along the heading.
    pub fn forward_dir(&self) -> Vector2<f64> {
        Vector2::new(self.heading_rad.cos(), self.heading_rad.sin())
    }

    /// Unit vector pointing to the left of the heading.
    pub fn left_dir(&self) -> Vector2<f64> {
        Vector2::new(-self.heading_rad.sin(), self.heading_rad.cos())
    }

    /// The pose reached by driving `dist_m` straight ahead (negative is backwards).
    pub fn advanced(&self, dist_m: f64) -> Self {
        Self {
            position_m: self.position_m + self.forward_dir() * dist_m,
            heading_rad: self.heading_rad,
        }
    }

    /// The pose reached by driving along a circle of `radius_m` while turning by `angle_rad`,
    /// positive to the left.
    pub fn turned(&self, radius_m: f64, angle_rad: f64) -> Self {
        if angle_rad == 0.0 {
            return *self;
        }

        let side = angle_rad.signum();
        let centre = self.position_m + self.left_dir() * side * radius_m;
        let heading_rad = self.heading_rad + angle_rad;

        Self {
            position_m: centre + Vector2::new(heading_rad.sin(), -heading_rad.cos()) * side * radius_m,
            heading_rad,
        }
    }

    /// Returns true if all components are finite.
    pub fn is_finite(&self) -> bool {
        self.position_m.iter().all(|v| v.is_finite()) && self.heading_rad.is_finite()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_advanced() {
        let p = Pose::new(1.0, 1.0, FRAC_PI_2).advanced(0.5);
        assert!((p.position_m - Vector2::new(1.0, 1.5)).norm() < 1e-12);
    }

    #[test]
    fn test_turned() {
        // Quarter circle to the left
        let p = Pose::new(0.0, 0.0, 0.0).turned(0.2, FRAC_PI_2);
        assert!((p.position_m - Vector2::new(0.2, 0.2)).norm() < 1e-12);
        assert!((p.heading_rad - FRAC_PI_2).abs() < 1e-12);

        // Half circle to the right
        let p = Pose::new(0.0, 0.0, 0.0).turned(0.2, -PI);
        assert!((p.position_m - Vector2::new(0.0, -0.4)).norm() < 1e-12);
        assert!((p.heading_rad + PI).abs() < 1e-12);
    }
}
