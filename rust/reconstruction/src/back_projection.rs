// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Depth back-projection: depth + color raster to a camera-space point grid

use crate::error::{ReconstructionError, Result};
use crate::types::{CameraModel, DepthGrid, GridPoint, PointGrid, ReconstructionConfig};
use image::RgbImage;
use rayon::prelude::*;

/// Back-project every pixel of `image` using the matching `depth` sample.
///
/// Pixels whose confidence is below `config.confidence_threshold`, or whose
/// depth is not a finite positive number, are marked invalid.
pub fn back_project(
    image: &RgbImage,
    depth: &DepthGrid,
    config: &ReconstructionConfig,
) -> Result<PointGrid> {
    let (width, height) = image.dimensions();

    if width == 0 || height == 0 {
        return Err(ReconstructionError::EmptyInput(
            "image has zero width or height".to_string(),
        ));
    }
    if depth.width != width || depth.height != height {
        return Err(ReconstructionError::DimensionMismatch(format!(
            "depth grid is {}x{} but image is {}x{}",
            depth.width, depth.height, width, height
        )));
    }
    if depth.samples.len() != width as usize * height as usize {
        return Err(ReconstructionError::DimensionMismatch(format!(
            "depth grid has {} samples for {}x{} pixels",
            depth.samples.len(),
            width,
            height
        )));
    }

    let camera = CameraModel::for_dimensions(width, height, config.focal_length_factor);
    let threshold = config.confidence_threshold;

    let mut points = vec![GridPoint::invalid([0, 0, 0]); width as usize * height as usize];

    points
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(v, row)| {
            for (u, point) in row.iter_mut().enumerate() {
                let sample = depth.samples[v * width as usize + u];
                let color = image.get_pixel(u as u32, v as u32).0;
                let d = sample.depth as f64;

                *point = if sample.confidence >= threshold && d.is_finite() && d > 0.0 {
                    GridPoint {
                        position: camera.project(u as f64, v as f64, d),
                        color,
                        depth: d,
                        valid: true,
                    }
                } else {
                    GridPoint::invalid(color)
                };
            }
        });

    Ok(PointGrid {
        width,
        height,
        camera,
        points,
    })
}
