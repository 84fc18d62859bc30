// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scene classification from depth and color statistics
//!
//! Statistics are computed once over the point grid and matched against an
//! ordered rule table. The first matching rule decides the category.

use crate::types::{PointGrid, SceneCategory, SceneClassification};
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use serde::{Deserialize, Serialize};

/// Summary statistics of a point grid
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneStatistics {
    /// Fraction of pixels with visible data
    pub valid_fraction: f64,
    pub mean_depth: f64,
    pub depth_std: f64,
    /// Standard deviation over mean
    pub depth_cv: f64,
    /// Deepest over nearest visible depth
    pub depth_range_ratio: f64,
    /// 1.0 for perfectly planar points, 0.0 for isotropic scatter
    pub planarity: f64,
    /// Fraction of visible pixels within the nearest quarter of the depth range
    pub near_plane_fraction: f64,
    /// Height over width of the near pixels' bounding box
    pub near_plane_aspect: f64,
    /// Correlation of image row with depth; negative when depth grows upward
    pub vertical_depth_gradient: f64,
    /// Fraction of bright blue-dominant pixels in the top quarter
    pub sky_fraction: f64,
    /// Mean HSV saturation
    pub mean_saturation: f64,
}

/// One entry of the classification table
#[derive(Clone, Copy)]
pub struct SceneRule {
    pub name: &'static str,
    pub category: SceneCategory,
    pub confidence: f32,
    pub applies: fn(&SceneStatistics) -> bool,
}

impl std::fmt::Debug for SceneRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneRule")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("confidence", &self.confidence)
            .finish()
    }
}

fn uniform_depth(s: &SceneStatistics) -> bool {
    s.depth_cv < 0.05
}

fn open_sky(s: &SceneStatistics) -> bool {
    s.sky_fraction >= 0.3 && s.depth_range_ratio >= 2.0
}

fn deep_hall(s: &SceneStatistics) -> bool {
    s.depth_range_ratio >= 3.0 && s.depth_cv >= 0.3 && s.mean_saturation < 0.25
}

fn tall_facade(s: &SceneStatistics) -> bool {
    s.near_plane_aspect >= 1.3 && s.planarity >= 0.85
}

fn receding_floor(s: &SceneStatistics) -> bool {
    (1.3..4.0).contains(&s.depth_range_ratio) && s.vertical_depth_gradient <= -0.2
}

fn structured_depth(s: &SceneStatistics) -> bool {
    s.depth_cv >= 0.05
}

/// Ordered classification rules; the first match wins
pub const SCENE_RULES: &[SceneRule] = &[
    SceneRule {
        name: "uniform_depth",
        category: SceneCategory::Generic,
        confidence: 0.2,
        applies: uniform_depth,
    },
    SceneRule {
        name: "open_sky",
        category: SceneCategory::Exterior,
        confidence: 0.75,
        applies: open_sky,
    },
    SceneRule {
        name: "deep_hall",
        category: SceneCategory::Factory,
        confidence: 0.65,
        applies: deep_hall,
    },
    SceneRule {
        name: "tall_facade",
        category: SceneCategory::Building,
        confidence: 0.7,
        applies: tall_facade,
    },
    SceneRule {
        name: "receding_floor",
        category: SceneCategory::Interior,
        confidence: 0.65,
        applies: receding_floor,
    },
    SceneRule {
        name: "structured_depth",
        category: SceneCategory::Generic,
        confidence: 0.4,
        applies: structured_depth,
    },
];

const FALLBACK_RULE: &str = "fallback";
const FALLBACK_CONFIDENCE: f32 = 0.3;

/// Classify a point grid. Results below `min_confidence` are forced to
/// generic and flagged as low confidence.
pub fn classify_scene(grid: &PointGrid, min_confidence: f32) -> SceneClassification {
    match scene_statistics(grid) {
        Some(stats) => classify_statistics(&stats, min_confidence),
        None => SceneClassification {
            category: SceneCategory::Generic,
            confidence: 0.0,
            low_confidence: true,
            rule: "no_visible_data".to_string(),
        },
    }
}

/// Run the rule table over precomputed statistics
pub fn classify_statistics(stats: &SceneStatistics, min_confidence: f32) -> SceneClassification {
    let (rule, category, confidence) = SCENE_RULES
        .iter()
        .find(|rule| (rule.applies)(stats))
        .map(|rule| (rule.name, rule.category, rule.confidence))
        .unwrap_or((FALLBACK_RULE, SceneCategory::Generic, FALLBACK_CONFIDENCE));

    let low_confidence = confidence < min_confidence;
    let classification = SceneClassification {
        category: if low_confidence {
            SceneCategory::Generic
        } else {
            category
        },
        confidence,
        low_confidence,
        rule: rule.to_string(),
    };

    tracing::debug!(
        rule,
        category = %classification.category,
        confidence,
        low_confidence,
        "classified scene"
    );
    classification
}

/// Compute statistics, or `None` when no pixel carries visible data
pub fn scene_statistics(grid: &PointGrid) -> Option<SceneStatistics> {
    let total = grid.points.len();
    let valid: Vec<(u32, &crate::types::GridPoint)> = grid
        .points
        .iter()
        .enumerate()
        .filter(|(_, p)| p.valid)
        .map(|(i, p)| (i as u32, p))
        .collect();
    if valid.is_empty() {
        return None;
    }
    let n = valid.len() as f64;

    let mut sum = 0.0;
    let mut min_depth = f64::MAX;
    let mut max_depth = f64::MIN;
    for (_, p) in &valid {
        sum += p.depth;
        min_depth = min_depth.min(p.depth);
        max_depth = max_depth.max(p.depth);
    }
    let mean_depth = sum / n;
    let variance = valid
        .iter()
        .map(|(_, p)| (p.depth - mean_depth).powi(2))
        .sum::<f64>()
        / n;
    let depth_std = variance.sqrt();

    // Near plane: nearest quarter of the depth range
    let near_cutoff = min_depth + 0.25 * (max_depth - min_depth);
    let mut near_count = 0usize;
    let (mut u_lo, mut u_hi, mut v_lo, mut v_hi) = (u32::MAX, 0u32, u32::MAX, 0u32);
    for (index, p) in &valid {
        if p.depth <= near_cutoff {
            let (u, v) = grid.pixel(*index);
            near_count += 1;
            u_lo = u_lo.min(u);
            u_hi = u_hi.max(u);
            v_lo = v_lo.min(v);
            v_hi = v_hi.max(v);
        }
    }
    let near_plane_aspect = if near_count > 0 {
        (v_hi - v_lo + 1) as f64 / (u_hi - u_lo + 1) as f64
    } else {
        0.0
    };

    Some(SceneStatistics {
        valid_fraction: n / total as f64,
        mean_depth,
        depth_std,
        depth_cv: if mean_depth > 0.0 {
            depth_std / mean_depth
        } else {
            0.0
        },
        depth_range_ratio: if min_depth > 0.0 {
            max_depth / min_depth
        } else {
            1.0
        },
        planarity: planarity(valid.iter().map(|(_, p)| p.position.coords)),
        near_plane_fraction: near_count as f64 / n,
        near_plane_aspect,
        vertical_depth_gradient: row_depth_correlation(grid, &valid),
        sky_fraction: sky_fraction(grid),
        mean_saturation: mean_saturation(grid),
    })
}

/// `1 - 3 * lambda_min / trace` of the point covariance
fn planarity(points: impl Iterator<Item = Vector3<f64>> + Clone) -> f64 {
    let count = points.clone().count();
    if count < 3 {
        return 1.0;
    }
    let centroid = points.clone().fold(Vector3::zeros(), |acc, p| acc + p) / count as f64;
    let covariance = points.fold(Matrix3::zeros(), |acc, p| {
        let d = p - centroid;
        acc + d * d.transpose()
    }) / count as f64;

    let trace = covariance.trace();
    if trace <= f64::EPSILON {
        return 1.0;
    }
    let eigen = SymmetricEigen::new(covariance);
    let lambda_min = eigen.eigenvalues.iter().copied().fold(f64::MAX, f64::min).max(0.0);
    (1.0 - 3.0 * lambda_min / trace).clamp(0.0, 1.0)
}

/// Pearson correlation between row index and depth
fn row_depth_correlation(grid: &PointGrid, valid: &[(u32, &crate::types::GridPoint)]) -> f64 {
    let n = valid.len() as f64;
    let mean_v = valid
        .iter()
        .map(|(i, _)| (i / grid.width) as f64)
        .sum::<f64>()
        / n;
    let mean_d = valid.iter().map(|(_, p)| p.depth).sum::<f64>() / n;

    let (mut cov, mut var_v, mut var_d) = (0.0, 0.0, 0.0);
    for (i, p) in valid {
        let dv = (i / grid.width) as f64 - mean_v;
        let dd = p.depth - mean_d;
        cov += dv * dd;
        var_v += dv * dv;
        var_d += dd * dd;
    }
    if var_v <= f64::EPSILON || var_d <= f64::EPSILON {
        return 0.0;
    }
    cov / (var_v.sqrt() * var_d.sqrt())
}

fn sky_fraction(grid: &PointGrid) -> f64 {
    let rows = (grid.height / 4).max(1);
    let pixels = &grid.points[..(rows * grid.width) as usize];
    let sky = pixels
        .iter()
        .filter(|p| {
            let [r, g, b] = p.color.map(|c| c as i32);
            b > r + 10 && b >= g && (r + g + b) / 3 > 120
        })
        .count();
    sky as f64 / pixels.len().max(1) as f64
}

fn mean_saturation(grid: &PointGrid) -> f64 {
    let total: f64 = grid
        .points
        .iter()
        .map(|p| {
            let max = *p.color.iter().max().unwrap_or(&0) as f64;
            let min = *p.color.iter().min().unwrap_or(&0) as f64;
            if max > 0.0 {
                (max - min) / max
            } else {
                0.0
            }
        })
        .sum();
    total / grid.points.len().max(1) as f64
}
