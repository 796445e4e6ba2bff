// src/analysis/ring.rs
//
// Fight-area geometry. Pixel centroids are mapped once per fight into a
// canonical frame where the ring center is the origin and the circumradius
// is 1, so distances are comparable across venues and camera setups.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RingShape {
    Octagon,
    Square,
    Circle,
}

impl RingShape {
    fn sides(&self) -> Option<u32> {
        match self {
            Self::Octagon => Some(8),
            Self::Square => Some(4),
            Self::Circle => None,
        }
    }
}

/// Ring outline in source pixels (top-down-corrected by the caller).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RingGeometry {
    pub shape: RingShape,
    pub center_x: f64,
    pub center_y: f64,
    /// Center-to-vertex distance in pixels
    pub radius_px: f64,
}

impl Default for RingGeometry {
    fn default() -> Self {
        Self {
            shape: RingShape::Octagon,
            center_x: 960.0,
            center_y: 540.0,
            radius_px: 500.0,
        }
    }
}

impl RingGeometry {
    pub fn is_valid(&self) -> bool {
        self.radius_px > 0.0 && self.center_x.is_finite() && self.center_y.is_finite()
    }

    /// Pixel point → canonical coordinates (ring radius = 1).
    pub fn normalize(&self, px: f64, py: f64) -> (f64, f64) {
        (
            (px - self.center_x) / self.radius_px,
            (py - self.center_y) / self.radius_px,
        )
    }

    pub fn center_distance(&self, p: (f64, f64)) -> f64 {
        (p.0 * p.0 + p.1 * p.1).sqrt()
    }

    /// Distance from a canonical point to the ring boundary. Positive inside,
    /// negative outside.
    ///
    /// Polygons are regular with flat sides facing the axes: edge normals at
    /// `2πk/n`, apothem `cos(π/n)`.
    pub fn boundary_distance(&self, p: (f64, f64)) -> f64 {
        match self.shape.sides() {
            None => 1.0 - self.center_distance(p),
            Some(n) => {
                let apothem = (PI / n as f64).cos();
                (0..n)
                    .map(|k| {
                        let theta = 2.0 * PI * k as f64 / n as f64;
                        apothem - (p.0 * theta.cos() + p.1 * theta.sin())
                    })
                    .fold(f64::INFINITY, f64::min)
            }
        }
    }
}
