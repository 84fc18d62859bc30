// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Category-specific interior elements placed on the room floor
//!
//! Sizes are relative to the room frustum so layouts scale with the scene.
//! Every element is a closed primitive emitted as its own patch. Secondary
//! passes (high complexity) draw from their own random streams and only add
//! elements, so the primary layout is identical across complexity levels.

use super::room::RoomFrame;
use super::{stream_rng, streams, GenerationRule, HallucinatedPatch, PatchAnchor, PatchBuilder, PatchKind};
use crate::error::Result;
use crate::types::{GenerationOptions, RoomComplexity, SceneCategory};
use depthscape_geometry::{cylinder, solid_box, Axis, Mesh};
use nalgebra::Point3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::ops::Range;

const MACHINERY_COLS: usize = 4;
const MACHINERY_ROWS: usize = 3;
const MACHINERY_PROBABILITY: f64 = 0.6;
const CRATE_PROBABILITY: f64 = 0.5;
const PILLAR_COLS: usize = 4;
const PILLAR_ROWS: usize = 3;
const MAX_PLACEMENT_ATTEMPTS: usize = 40;

/// Furniture footprints as fractions of the room scale: (width, depth, height of room)
const FURNITURE_CATALOG: [(&str, f64, f64, f64); 4] = [
    ("table", 0.25, 0.18, 0.12),
    ("sofa", 0.35, 0.15, 0.10),
    ("cabinet", 0.15, 0.10, 0.30),
    ("bed", 0.30, 0.35, 0.08),
];

pub(super) fn populate(
    room: &RoomFrame,
    category: SceneCategory,
    options: &GenerationOptions,
    seed: u64,
) -> Result<Vec<HallucinatedPatch>> {
    if !room.is_habitable() {
        tracing::warn!(
            near = room.near_depth,
            back = room.back_depth,
            "room frustum too shallow for interior elements"
        );
        return Ok(Vec::new());
    }

    let secondary = options.room_complexity >= RoomComplexity::High;
    let segments = options.room_complexity.cylinder_segments();

    match category {
        SceneCategory::Factory => factory_layout(room, seed, secondary, segments),
        SceneCategory::Interior => furniture_scatter(room, seed, secondary, segments),
        SceneCategory::Building => {
            structural_grid(room, options.wall_thickness, secondary, segments)
        }
        SceneCategory::Exterior | SceneCategory::Generic => Ok(Vec::new()),
    }
}

fn element(kind: PatchKind, rule: GenerationRule, mesh: &Mesh) -> HallucinatedPatch {
    let mut builder = PatchBuilder::new();
    builder.append_mesh(mesh);
    builder.finish(kind, rule, PatchAnchor::FloorRegion)
}

/// Floor-aligned box spanning `[d0, d1]` in depth, resting on the floor at `d0`
fn floor_box(
    room: &RoomFrame,
    x: (f64, f64),
    depth: (f64, f64),
    height: f64,
    color: [f32; 3],
) -> Result<Mesh> {
    let y = room.floor_y(depth.0);
    Ok(solid_box(
        Point3::new(x.0, y, -depth.1),
        Point3::new(x.1, y + height, -depth.0),
        color,
    )?)
}

/// Axis-aligned floor rectangle used for clearance checks
#[derive(Debug, Clone, Copy)]
struct Footprint {
    x0: f64,
    x1: f64,
    d0: f64,
    d1: f64,
}

impl Footprint {
    fn clear_of(&self, other: &Footprint, gap: f64) -> bool {
        self.x1 + gap <= other.x0
            || other.x1 + gap <= self.x0
            || self.d1 + gap <= other.d0
            || other.d1 + gap <= self.d0
    }
}

/// Catwalk strips, wall pipes and machinery blocks
fn factory_layout(
    room: &RoomFrame,
    seed: u64,
    secondary: bool,
    segments: u32,
) -> Result<Vec<HallucinatedPatch>> {
    let rule = GenerationRule::FactoryLayout;
    let extent = room.depth_extent();
    let scale = extent.min(room.width_at(room.mid_depth()));
    let mut patches = Vec::new();

    // Catwalks near the back at regular height intervals
    let mut levels = vec![0.5];
    if secondary {
        levels.extend([0.25, 0.75]);
    }
    let (walk_near, walk_far) = (room.back_depth - 0.3 * extent, room.back_depth - 0.15 * extent);
    let walk_height = room.height_at(walk_near);
    let walk_margin = 0.05 * room.width_at(walk_near);
    for level in levels {
        let y = room.floor_y(walk_near) + level * walk_height;
        let half = 0.01 * walk_height;
        let mesh = solid_box(
            Point3::new(room.left_x(walk_near) + walk_margin, y - half, -walk_far),
            Point3::new(room.right_x(walk_near) - walk_margin, y + half, -walk_near),
            PatchKind::Catwalk.color(),
        )?;
        patches.push(element(PatchKind::Catwalk, rule, &mesh));
    }

    // Vertical pipes along both side walls
    let radius = 0.02 * scale;
    let pipe_count = 3;
    let mut pipe_depths: Vec<f64> = (0..pipe_count)
        .map(|k| room.near_depth + extent * (k as f64 + 0.5) / pipe_count as f64)
        .collect();
    if secondary {
        pipe_depths.extend((1..pipe_count).map(|k| room.near_depth + extent * k as f64 / pipe_count as f64));
    }
    for center in pipe_depths {
        let near = center - radius;
        let length = room.height_at(near) * 0.98;
        for x in [
            room.left_x(near) + 1.5 * radius,
            room.right_x(near) - 1.5 * radius,
        ] {
            let mesh = cylinder(
                Point3::new(x, room.floor_y(near), -center),
                Axis::Y,
                radius,
                length,
                segments,
                PatchKind::Pipe.color(),
            )?;
            patches.push(element(PatchKind::Pipe, rule, &mesh));
        }
    }

    // Machinery on a jittered floor grid, clear of the pipes and catwalks
    let grid_near = room.near_depth + 0.15 * extent;
    let grid_far = room.back_depth - 0.35 * extent;
    let cell_depth = (grid_far - grid_near) / MACHINERY_ROWS as f64;
    let wall_clearance = 4.0 * radius;

    let cell = |row: usize, col: usize| -> (f64, f64, f64, f64) {
        let d0 = grid_near + row as f64 * cell_depth;
        let lo = room.left_x(d0) + wall_clearance;
        let hi = room.right_x(d0) - wall_clearance;
        let width = (hi - lo) / MACHINERY_COLS as f64;
        (lo + col as f64 * width, width, d0, room.height_at(d0))
    };

    let mut occupied = [[false; MACHINERY_COLS]; MACHINERY_ROWS];
    let place = |patches: &mut Vec<HallucinatedPatch>,
                 rng: &mut ChaCha8Rng,
                 row: usize,
                 col: usize,
                 size: Range<f64>,
                 heights: Range<f64>|
     -> Result<()> {
        let (x0, width, d0, height) = cell(row, col);
        let w = width * rng.gen_range(size.clone());
        let d = cell_depth * rng.gen_range(size);
        let h = height * rng.gen_range(heights);
        let (margin_x, margin_d) = (0.1 * width, 0.1 * cell_depth);
        let x = x0 + margin_x + rng.gen::<f64>() * (width - w - 2.0 * margin_x).max(0.0);
        let near = d0 + margin_d + rng.gen::<f64>() * (cell_depth - d - 2.0 * margin_d).max(0.0);
        let mesh = floor_box(room, (x, x + w), (near, near + d), h, PatchKind::Machinery.color())?;
        patches.push(element(PatchKind::Machinery, rule, &mesh));
        Ok(())
    };

    if cell_depth > 0.0 && cell(0, 0).1 > 0.0 {
        let mut rng = stream_rng(seed, streams::MACHINERY);
        for row in 0..MACHINERY_ROWS {
            for col in 0..MACHINERY_COLS {
                if rng.gen_bool(MACHINERY_PROBABILITY) {
                    place(&mut patches, &mut rng, row, col, 0.4..0.7, 0.1..0.3)?;
                    occupied[row][col] = true;
                }
            }
        }

        if !occupied.iter().flatten().any(|&o| o) {
            let (row, col) = (MACHINERY_ROWS / 2, MACHINERY_COLS / 2);
            let (x0, width, d0, height) = cell(row, col);
            let mesh = floor_box(
                room,
                (x0 + 0.25 * width, x0 + 0.75 * width),
                (d0 + 0.25 * cell_depth, d0 + 0.75 * cell_depth),
                0.2 * height,
                PatchKind::Machinery.color(),
            )?;
            patches.push(element(PatchKind::Machinery, rule, &mesh));
            occupied[row][col] = true;
        }

        if secondary {
            let mut rng = stream_rng(seed, streams::MACHINERY_SECONDARY);
            let empty: Vec<(usize, usize)> = (0..MACHINERY_ROWS)
                .flat_map(|row| (0..MACHINERY_COLS).map(move |col| (row, col)))
                .filter(|&(row, col)| !occupied[row][col])
                .collect();
            for (row, col) in empty {
                if rng.gen_bool(CRATE_PROBABILITY) {
                    place(&mut patches, &mut rng, row, col, 0.2..0.35, 0.05..0.12)?;
                }
            }
        }
    }

    Ok(patches)
}

/// Furniture by seeded rejection sampling with wall and mutual clearance
fn furniture_scatter(
    room: &RoomFrame,
    seed: u64,
    secondary: bool,
    segments: u32,
) -> Result<Vec<HallucinatedPatch>> {
    let rule = GenerationRule::FurnitureScatter;
    let color = PatchKind::Furniture.color();
    let extent = room.depth_extent();
    let scale = extent.min(room.width_at(room.mid_depth()));
    let gap = 0.1 * scale;
    let (d_lo, d_hi) = (room.near_depth + gap, room.back_depth - gap);

    let floor_area = room.width_at(room.mid_depth()) * extent;
    let target = ((floor_area / (0.15 * scale * scale)).round() as usize).clamp(2, 6);

    let mut placed: Vec<Footprint> = Vec::new();
    let mut patches = Vec::new();

    // Sample a clear footprint of `width` x `depth`, or None after the attempt budget
    let sample = |rng: &mut ChaCha8Rng, placed: &[Footprint], width: f64, depth: f64| {
        for _ in 0..MAX_PLACEMENT_ATTEMPTS {
            let span = d_hi - depth - d_lo;
            if span <= 0.0 {
                return None;
            }
            let d0 = d_lo + rng.gen::<f64>() * span;
            let x_lo = room.left_x(d0) + gap;
            let x_hi = room.right_x(d0) - gap - width;
            let t: f64 = rng.gen();
            if x_hi < x_lo {
                continue;
            }
            let x0 = x_lo + t * (x_hi - x_lo);
            let candidate = Footprint {
                x0,
                x1: x0 + width,
                d0,
                d1: d0 + depth,
            };
            if placed.iter().all(|other| candidate.clear_of(other, gap)) {
                return Some(candidate);
            }
        }
        None
    };

    let mut rng = stream_rng(seed, streams::FURNITURE);
    for _ in 0..target {
        let (name, w, d, h) = FURNITURE_CATALOG[rng.gen_range(0..FURNITURE_CATALOG.len())];
        match sample(&mut rng, &placed, w * scale, d * scale) {
            Some(fp) => {
                let mesh = floor_box(
                    room,
                    (fp.x0, fp.x1),
                    (fp.d0, fp.d1),
                    h * room.height_at(fp.d0),
                    color,
                )?;
                patches.push(element(PatchKind::Furniture, rule, &mesh));
                placed.push(fp);
            }
            None => tracing::debug!(item = name, "no clear spot for furniture item"),
        }
    }

    if secondary {
        let mut rng = stream_rng(seed, streams::FURNITURE_SECONDARY);
        for _ in 0..target {
            let lamp = rng.gen_bool(0.5);
            let size = if lamp { 0.06 * scale } else { 0.08 * scale };
            let Some(fp) = sample(&mut rng, &placed, size, size) else {
                continue;
            };
            let mesh = if lamp {
                let radius = size / 2.0;
                cylinder(
                    Point3::new(fp.x0 + radius, room.floor_y(fp.d0), -(fp.d0 + radius)),
                    Axis::Y,
                    radius,
                    0.35 * room.height_at(fp.d0),
                    segments,
                    color,
                )?
            } else {
                floor_box(
                    room,
                    (fp.x0, fp.x1),
                    (fp.d0, fp.d1),
                    0.15 * room.height_at(fp.d0),
                    color,
                )?
            };
            patches.push(element(PatchKind::Furniture, rule, &mesh));
            placed.push(fp);
        }
    }

    Ok(patches)
}

/// Regular pillar grid, facade trim across the back wall, and ceiling beams
fn structural_grid(
    room: &RoomFrame,
    wall_thickness: f64,
    secondary: bool,
    segments: u32,
) -> Result<Vec<HallucinatedPatch>> {
    let rule = GenerationRule::StructuralGrid;
    let extent = room.depth_extent();
    let scale = extent.min(room.width_at(room.mid_depth()));
    let radius = 0.02 * scale;
    let mut patches = Vec::new();

    let mut rows: Vec<(f64, f64, f64)> = Vec::with_capacity(PILLAR_ROWS);
    for row in 0..PILLAR_ROWS {
        let center = room.near_depth + extent * (row + 1) as f64 / (PILLAR_ROWS + 1) as f64;
        let near = center - radius;
        let xs: Vec<f64> = (0..PILLAR_COLS)
            .map(|col| room.x_at(near, (col + 1) as f64 / (PILLAR_COLS + 1) as f64, 2.0 * radius))
            .collect();
        for &x in &xs {
            let mesh = cylinder(
                Point3::new(x, room.floor_y(near), -center),
                Axis::Y,
                radius,
                room.height_at(near),
                segments,
                PatchKind::Pillar.color(),
            )?;
            patches.push(element(PatchKind::Pillar, rule, &mesh));
        }
        rows.push((center, xs[0], xs[xs.len() - 1]));
    }

    // Trim strips sit between the deepest visible surface and the back wall
    let mut fractions = vec![1.0 / 3.0, 2.0 / 3.0];
    if secondary {
        fractions.extend([1.0 / 6.0, 0.5, 5.0 / 6.0]);
    }
    let trim_near = room.back_depth - 0.6 * wall_thickness;
    let trim_far = room.back_depth - 0.2 * wall_thickness;
    let trim_height = room.height_at(trim_near);
    for fraction in fractions {
        let y = room.floor_y(trim_near) + fraction * trim_height;
        let half = 0.0075 * trim_height;
        let mesh = solid_box(
            Point3::new(room.left_x(trim_near), y - half, -trim_far),
            Point3::new(room.right_x(trim_near), y + half, -trim_near),
            PatchKind::Trim.color(),
        )?;
        patches.push(element(PatchKind::Trim, rule, &mesh));
    }

    if secondary {
        for (center, x_first, x_last) in rows {
            let near = center - radius;
            let ceiling = room.ceiling_y(near);
            let depth = 0.03 * room.height_at(near);
            let mesh = solid_box(
                Point3::new(x_first - radius, ceiling - depth, -(center + radius)),
                Point3::new(x_last + radius, ceiling, -near),
                PatchKind::Beam.color(),
            )?;
            patches.push(element(PatchKind::Beam, rule, &mesh));
        }
    }

    Ok(patches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CameraModel;

    fn room() -> RoomFrame {
        RoomFrame {
            camera: CameraModel::for_dimensions(64, 48, 0.8),
            u_max: 63.0,
            v_max: 47.0,
            near_depth: 2.0,
            back_depth: 6.0,
        }
    }

    fn options(complexity: RoomComplexity) -> GenerationOptions {
        GenerationOptions {
            room_complexity: complexity,
            ..GenerationOptions::default()
        }
    }

    fn kinds(patches: &[HallucinatedPatch]) -> Vec<PatchKind> {
        patches.iter().map(|p| p.kind).collect()
    }

    fn assert_inside(room: &RoomFrame, patches: &[HallucinatedPatch]) {
        for patch in patches {
            for v in &patch.vertices {
                assert!(
                    room.contains(v.position.x, v.position.y, v.position.z),
                    "{:?} vertex {:?} outside room",
                    patch.kind,
                    v.position
                );
            }
        }
    }

    #[test]
    fn test_factory_has_all_element_types() {
        let room = room();
        let patches = populate(&room, SceneCategory::Factory, &options(RoomComplexity::High), 3).unwrap();
        let kinds = kinds(&patches);
        assert!(kinds.contains(&PatchKind::Catwalk));
        assert!(kinds.contains(&PatchKind::Pipe));
        assert!(kinds.contains(&PatchKind::Machinery));
        assert_eq!(kinds.iter().filter(|&&k| k == PatchKind::Catwalk).count(), 3);
        assert_inside(&room, &patches);
    }

    #[test]
    fn test_machinery_always_placed() {
        let room = room();
        for seed in 0..32 {
            let patches =
                populate(&room, SceneCategory::Factory, &options(RoomComplexity::Medium), seed).unwrap();
            assert!(kinds(&patches).contains(&PatchKind::Machinery), "seed {}", seed);
        }
    }

    #[test]
    fn test_high_keeps_medium_layout() {
        let room = room();
        for category in [SceneCategory::Factory, SceneCategory::Interior] {
            let medium = populate(&room, category, &options(RoomComplexity::Medium), 11).unwrap();
            let high = populate(&room, category, &options(RoomComplexity::High), 11).unwrap();
            // Every medium box reappears in the high layout
            let boxes = |patches: &[HallucinatedPatch]| -> Vec<Vec<[i64; 3]>> {
                patches
                    .iter()
                    .filter(|p| p.vertices.len() == 8)
                    .map(|p| {
                        p.vertices
                            .iter()
                            .map(|v| {
                                [
                                    (v.position.x * 1e6).round() as i64,
                                    (v.position.y * 1e6).round() as i64,
                                    (v.position.z * 1e6).round() as i64,
                                ]
                            })
                            .collect()
                    })
                    .collect()
            };
            let high_boxes = boxes(&high);
            for b in boxes(&medium) {
                assert!(high_boxes.contains(&b), "{:?} lost a medium element", category);
            }
        }
    }

    #[test]
    fn test_furniture_keeps_clearance() {
        let room = room();
        let patches =
            populate(&room, SceneCategory::Interior, &options(RoomComplexity::High), 5).unwrap();
        assert!(patches.len() >= 2);
        assert!(patches.iter().all(|p| p.kind == PatchKind::Furniture));
        assert_inside(&room, &patches);

        let footprints: Vec<(f64, f64, f64, f64)> = patches
            .iter()
            .map(|p| {
                p.vertices.iter().fold(
                    (f64::MAX, f64::MIN, f64::MAX, f64::MIN),
                    |(x0, x1, z0, z1), v| {
                        (
                            x0.min(v.position.x),
                            x1.max(v.position.x),
                            z0.min(v.position.z),
                            z1.max(v.position.z),
                        )
                    },
                )
            })
            .collect();
        for (i, a) in footprints.iter().enumerate() {
            for b in &footprints[i + 1..] {
                let separated = a.1 <= b.0 || b.1 <= a.0 || a.3 <= b.2 || b.3 <= a.2;
                assert!(separated, "overlapping furniture {:?} {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_building_counts() {
        let room = room();
        let medium = populate(&room, SceneCategory::Building, &options(RoomComplexity::Medium), 0).unwrap();
        let high = populate(&room, SceneCategory::Building, &options(RoomComplexity::High), 0).unwrap();
        assert_eq!(medium.len(), PILLAR_ROWS * PILLAR_COLS + 2);
        assert_eq!(high.len(), PILLAR_ROWS * PILLAR_COLS + 5 + PILLAR_ROWS);
        assert_inside(&room, &high);
    }

    #[test]
    fn test_generic_and_exterior_are_empty() {
        let room = room();
        for category in [SceneCategory::Generic, SceneCategory::Exterior] {
            assert!(populate(&room, category, &options(RoomComplexity::High), 0)
                .unwrap()
                .is_empty());
        }
    }

    #[test]
    fn test_shallow_room_is_skipped() {
        let mut room = room();
        room.back_depth = room.near_depth;
        assert!(populate(&room, SceneCategory::Factory, &options(RoomComplexity::High), 0)
            .unwrap()
            .is_empty());
    }
}
