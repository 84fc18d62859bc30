// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Image operations and monocular depth cues

use crate::types::{DepthGrid, DepthSample};
use image::imageops::FilterType;
use image::{GrayImage, RgbImage};

/// Nearest and farthest depth produced by the heuristic estimator
pub const HEURISTIC_NEAR: f32 = 1.0;
pub const HEURISTIC_FAR: f32 = 5.0;

const PERSPECTIVE_WEIGHT: f32 = 0.6;
const ATMOSPHERIC_WEIGHT: f32 = 0.4;
const ATMOSPHERIC_SIGMA: f32 = 2.0;

/// Convert RGB to grayscale using luminance formula
pub fn rgb_to_grayscale(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}

/// Apply Gaussian blur for noise reduction
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Downscale so the longer side is at most `max_dim`, preserving aspect.
/// Images already within bounds are returned unchanged.
pub fn downscale_to(image: &RgbImage, max_dim: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let longest = width.max(height);
    if max_dim == 0 || longest <= max_dim {
        return image.clone();
    }
    let scale = max_dim as f64 / longest as f64;
    let new_width = ((width as f64 * scale).round() as u32).max(1);
    let new_height = ((height as f64 * scale).round() as u32).max(1);
    image::imageops::resize(image, new_width, new_height, FilterType::Triangle)
}

/// Estimate relative depth from monocular cues.
///
/// Two cues are blended: a perspective gradient (lower rows are nearer) and
/// an atmospheric cue (blurred brightness reads as distance). Confidence is
/// high where the cues agree and the image is smooth, low along strong edges
/// where depth is most likely discontinuous.
///
/// This is a fallback for running without a depth model, not a substitute
/// for one. Edge, texture and saliency cues are not used, and the output is
/// relative depth on a fixed `HEURISTIC_NEAR..HEURISTIC_FAR` scale.
pub fn estimate_depth(image: &RgbImage) -> DepthGrid {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return DepthGrid::uniform(width, height, HEURISTIC_NEAR, 0.0);
    }

    let gray = rgb_to_grayscale(image);
    let blurred = gaussian_blur(&gray, ATMOSPHERIC_SIGMA);
    let gradients = imageproc::gradients::sobel_gradients(&gray);
    let max_gradient = gradients.pixels().map(|p| p.0[0]).max().unwrap_or(0).max(1) as f32;

    let rows = (height - 1).max(1) as f32;
    let mut samples = Vec::with_capacity(width as usize * height as usize);
    for v in 0..height {
        let perspective = 1.0 - v as f32 / rows;
        for u in 0..width {
            let atmospheric = blurred.get_pixel(u, v).0[0] as f32 / 255.0;
            let cue = PERSPECTIVE_WEIGHT * perspective + ATMOSPHERIC_WEIGHT * atmospheric;
            let depth = HEURISTIC_NEAR + (HEURISTIC_FAR - HEURISTIC_NEAR) * cue;

            let agreement = 1.0 - (perspective - atmospheric).abs();
            let smoothness = 1.0 - gradients.get_pixel(u, v).0[0] as f32 / max_gradient;
            let confidence = (0.6 * agreement + 0.4 * smoothness).clamp(0.0, 1.0);

            samples.push(DepthSample::new(depth, confidence));
        }
    }

    DepthGrid {
        width,
        height,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_downscale_preserves_aspect() {
        let image = RgbImage::new(1024, 512);
        let small = downscale_to(&image, 256);
        assert_eq!(small.dimensions(), (256, 128));

        let tiny = RgbImage::new(100, 40);
        assert_eq!(downscale_to(&tiny, 256).dimensions(), (100, 40));
    }

    #[test]
    fn test_estimate_depth_is_deterministic_and_in_range() {
        let image = RgbImage::from_fn(32, 24, |u, v| Rgb([(u * 8) as u8, (v * 10) as u8, 128]));
        let a = estimate_depth(&image);
        let b = estimate_depth(&image);
        assert_eq!(a, b);
        assert_eq!(a.samples.len(), 32 * 24);
        for s in &a.samples {
            assert!(s.depth >= HEURISTIC_NEAR && s.depth <= HEURISTIC_FAR);
            assert!((0.0..=1.0).contains(&s.confidence));
        }
    }

    #[test]
    fn test_lower_rows_are_nearer() {
        let image = RgbImage::from_pixel(16, 16, Rgb([100, 100, 100]));
        let depth = estimate_depth(&image);
        assert!(depth.get(8, 15).depth < depth.get(8, 0).depth);
        // Flat image: no edges, so smoothness is full everywhere
        assert!(depth.get(8, 8).confidence > 0.5);
    }
}
