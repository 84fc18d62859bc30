// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Room frustum bounded by the image frame rays

use crate::mesh_builder::BaseMesh;
use crate::types::CameraModel;

/// Interior volume between the nearest visible depth and the back wall.
///
/// The floor is the plane through the bottom row rays, the ceiling through
/// the top row, the side walls through the first and last columns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomFrame {
    pub camera: CameraModel,
    /// Last pixel column
    pub u_max: f64,
    /// Last pixel row
    pub v_max: f64,
    pub near_depth: f64,
    pub back_depth: f64,
}

impl RoomFrame {
    pub fn new(base: &BaseMesh, back_depth: f64) -> Self {
        Self {
            camera: base.camera,
            u_max: base.width.saturating_sub(1) as f64,
            v_max: base.height.saturating_sub(1) as f64,
            near_depth: base.min_depth,
            back_depth,
        }
    }

    pub fn depth_extent(&self) -> f64 {
        self.back_depth - self.near_depth
    }

    /// Interiors need a room with measurable depth and a non-degenerate frame
    pub fn is_habitable(&self) -> bool {
        self.depth_extent() > 1e-6 && self.u_max > 0.0 && self.v_max > 0.0
    }

    #[inline]
    pub fn floor_y(&self, depth: f64) -> f64 {
        self.camera.project(0.0, self.v_max, depth).y
    }

    #[inline]
    pub fn ceiling_y(&self, depth: f64) -> f64 {
        self.camera.project(0.0, 0.0, depth).y
    }

    #[inline]
    pub fn left_x(&self, depth: f64) -> f64 {
        self.camera.project(0.0, 0.0, depth).x
    }

    #[inline]
    pub fn right_x(&self, depth: f64) -> f64 {
        self.camera.project(self.u_max, 0.0, depth).x
    }

    pub fn width_at(&self, depth: f64) -> f64 {
        self.right_x(depth) - self.left_x(depth)
    }

    pub fn height_at(&self, depth: f64) -> f64 {
        self.ceiling_y(depth) - self.floor_y(depth)
    }

    pub fn mid_depth(&self) -> f64 {
        (self.near_depth + self.back_depth) / 2.0
    }

    /// Lerp across the room width at `depth`, inset by `margin` on both sides
    pub fn x_at(&self, depth: f64, t: f64, margin: f64) -> f64 {
        let lo = self.left_x(depth) + margin;
        let hi = self.right_x(depth) - margin;
        lo + (hi - lo) * t
    }

    /// Whether a point lies inside the frustum and depth range
    pub fn contains(&self, x: f64, y: f64, z: f64) -> bool {
        let depth = -z;
        let eps = 1e-9;
        depth >= self.near_depth - eps
            && depth <= self.back_depth + eps
            && x >= self.left_x(depth) - eps
            && x <= self.right_x(depth) + eps
            && y >= self.floor_y(depth) - eps
            && y <= self.ceiling_y(depth) + eps
    }
}
