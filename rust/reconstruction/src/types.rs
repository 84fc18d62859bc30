// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core types for depth reconstruction and scene generation

use crate::error::{ReconstructionError, Result};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-pixel output of a depth source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthSample {
    /// Metric depth along the viewing axis
    pub depth: f32,
    /// Confidence (0.0 - 1.0)
    pub confidence: f32,
}

impl DepthSample {
    pub fn new(depth: f32, confidence: f32) -> Self {
        Self { depth, confidence }
    }
}

/// Row-major grid of depth samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthGrid {
    pub width: u32,
    pub height: u32,
    pub samples: Vec<DepthSample>,
}

impl DepthGrid {
    /// Build a grid, checking the sample count against the dimensions
    pub fn new(width: u32, height: u32, samples: Vec<DepthSample>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if samples.len() != expected {
            return Err(ReconstructionError::DimensionMismatch(format!(
                "{}x{} depth grid needs {} samples, got {}",
                width,
                height,
                expected,
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// Grid where every pixel has the same sample
    pub fn uniform(width: u32, height: u32, depth: f32, confidence: f32) -> Self {
        Self {
            width,
            height,
            samples: vec![DepthSample::new(depth, confidence); width as usize * height as usize],
        }
    }

    /// Build a grid from separate depth and confidence planes
    pub fn from_planes(
        width: u32,
        height: u32,
        depth: &[f32],
        confidence: &[f32],
    ) -> Result<Self> {
        if depth.len() != confidence.len() {
            return Err(ReconstructionError::DimensionMismatch(format!(
                "depth plane has {} values but confidence plane has {}",
                depth.len(),
                confidence.len()
            )));
        }
        let samples = depth
            .iter()
            .zip(confidence)
            .map(|(&d, &c)| DepthSample::new(d, c))
            .collect();
        Self::new(width, height, samples)
    }

    #[inline]
    pub fn get(&self, u: u32, v: u32) -> DepthSample {
        self.samples[(v * self.width + u) as usize]
    }
}

/// Pinhole camera with a fixed assumed field of view
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    /// Focal length in pixels
    pub focal: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraModel {
    /// Camera for a `width` x `height` raster. Focal length is `width * focal_length_factor`.
    pub fn for_dimensions(width: u32, height: u32, focal_length_factor: f64) -> Self {
        Self {
            focal: (width.max(1) as f64 * focal_length_factor).max(f64::EPSILON),
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
        }
    }

    /// Camera-space point for pixel `(u, v)` at `depth`.
    /// The camera looks down -Z with +Y up.
    #[inline]
    pub fn project(&self, u: f64, v: f64, depth: f64) -> Point3<f64> {
        Point3::new(
            (u - self.cx) * depth / self.focal,
            -(v - self.cy) * depth / self.focal,
            -depth,
        )
    }
}

/// One back-projected pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub position: Point3<f64>,
    pub color: [u8; 3],
    pub depth: f64,
    pub valid: bool,
}

impl GridPoint {
    /// Pixel with no visible data
    pub fn invalid(color: [u8; 3]) -> Self {
        Self {
            position: Point3::origin(),
            color,
            depth: 0.0,
            valid: false,
        }
    }

    /// Vertex color in 0.0 - 1.0
    #[inline]
    pub fn color_f32(&self) -> [f32; 3] {
        [
            self.color[0] as f32 / 255.0,
            self.color[1] as f32 / 255.0,
            self.color[2] as f32 / 255.0,
        ]
    }
}

/// Camera-space point grid, 1:1 with the depth grid
#[derive(Debug, Clone)]
pub struct PointGrid {
    pub width: u32,
    pub height: u32,
    pub camera: CameraModel,
    pub points: Vec<GridPoint>,
}

impl PointGrid {
    #[inline]
    pub fn index(&self, u: u32, v: u32) -> u32 {
        v * self.width + u
    }

    #[inline]
    pub fn get(&self, u: u32, v: u32) -> &GridPoint {
        &self.points[self.index(u, v) as usize]
    }

    /// Pixel coordinates of a grid index
    #[inline]
    pub fn pixel(&self, index: u32) -> (u32, u32) {
        (index % self.width, index / self.width)
    }

    pub fn valid_count(&self) -> usize {
        self.points.iter().filter(|p| p.valid).count()
    }
}

/// How much synthetic detail the hallucination engine produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomComplexity {
    /// Closing shell only
    Low,
    /// Primary interior elements at base density
    Medium,
    /// Primary plus secondary elements with finer subdivision
    High,
}

impl RoomComplexity {
    /// Segment count for round primitives
    pub fn cylinder_segments(self) -> u32 {
        match self {
            RoomComplexity::Low | RoomComplexity::Medium => 8,
            RoomComplexity::High => 16,
        }
    }

    /// Number of rings bridging a loop to its displaced copy
    pub fn bridge_rings(self) -> u32 {
        match self {
            RoomComplexity::Low | RoomComplexity::Medium => 1,
            RoomComplexity::High => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoomComplexity::Low => "low",
            RoomComplexity::Medium => "medium",
            RoomComplexity::High => "high",
        }
    }
}

impl fmt::Display for RoomComplexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomComplexity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RoomComplexity::Low),
            "medium" => Ok(RoomComplexity::Medium),
            "high" => Ok(RoomComplexity::High),
            other => Err(format!("unrecognized room complexity '{}'", other)),
        }
    }
}

/// Options controlling geometry synthesis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub hallucinate_unseen: bool,
    pub generate_interiors: bool,
    pub room_complexity: RoomComplexity,
    /// Distance between the deepest visible surface and the back wall
    pub wall_thickness: f64,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            hallucinate_unseen: true,
            generate_interiors: true,
            room_complexity: RoomComplexity::Medium,
            wall_thickness: 0.3,
        }
    }
}

/// Coarse scene category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneCategory {
    Interior,
    Factory,
    Building,
    Exterior,
    Generic,
}

impl SceneCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            SceneCategory::Interior => "interior",
            SceneCategory::Factory => "factory",
            SceneCategory::Building => "building",
            SceneCategory::Exterior => "exterior",
            SceneCategory::Generic => "generic",
        }
    }
}

impl fmt::Display for SceneCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneClassification {
    pub category: SceneCategory,
    /// Confidence of the matching rule (0.0 - 1.0)
    pub confidence: f32,
    /// Set when confidence fell below the minimum and the category was forced to generic
    pub low_confidence: bool,
    /// Name of the rule that fired
    pub rule: String,
}

impl SceneClassification {
    /// Classification with an explicit category, used when the caller already knows the scene
    pub fn known(category: SceneCategory) -> Self {
        Self {
            category,
            confidence: 1.0,
            low_confidence: false,
            rule: "provided".to_string(),
        }
    }
}

/// Tunable reconstruction thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    /// Samples below this confidence carry no visible data
    pub confidence_threshold: f32,
    /// Max depth difference between corners of an accepted quad
    pub discontinuity_threshold: f64,
    /// Focal length as a fraction of image width
    pub focal_length_factor: f64,
    /// Classifier results below this confidence fall back to generic
    pub min_classification_confidence: f32,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
            discontinuity_threshold: 0.5,
            focal_length_factor: 0.8,
            min_classification_confidence: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_depth_grid_rejects_wrong_sample_count() {
        let err = DepthGrid::new(4, 4, vec![DepthSample::new(1.0, 1.0); 15]).unwrap_err();
        assert!(matches!(err, ReconstructionError::DimensionMismatch(_)));
    }

    #[test]
    fn test_camera_center_pixel_is_on_axis() {
        let camera = CameraModel::for_dimensions(100, 50, 0.8);
        assert_relative_eq!(camera.focal, 80.0);
        let p = camera.project(50.0, 25.0, 3.0);
        assert_relative_eq!(p.x, 0.0);
        assert_relative_eq!(p.y, 0.0);
        assert_relative_eq!(p.z, -3.0);

        // Top-left pixel is left of and above the axis
        let corner = camera.project(0.0, 0.0, 2.0);
        assert!(corner.x < 0.0 && corner.y > 0.0);
    }

    #[test]
    fn test_room_complexity_parsing() {
        assert_eq!("HIGH".parse::<RoomComplexity>(), Ok(RoomComplexity::High));
        assert_eq!(" low ".parse::<RoomComplexity>(), Ok(RoomComplexity::Low));
        assert!("extreme".parse::<RoomComplexity>().is_err());
        assert!(RoomComplexity::Low < RoomComplexity::High);
    }

    #[test]
    fn test_default_options() {
        let options = GenerationOptions::default();
        assert!(options.hallucinate_unseen);
        assert!(options.generate_interiors);
        assert_eq!(options.room_complexity, RoomComplexity::Medium);
        assert_relative_eq!(options.wall_thickness, 0.3);
    }

    #[test]
    fn test_config_defaults_are_pinned() {
        let config = ReconstructionConfig::default();
        assert_relative_eq!(config.confidence_threshold, 0.3);
        assert_relative_eq!(config.discontinuity_threshold, 0.5);
        assert_relative_eq!(config.focal_length_factor, 0.8);
        assert_relative_eq!(config.min_classification_confidence, 0.5);
    }
}
