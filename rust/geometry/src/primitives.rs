// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Closed solid primitives
//!
//! Every primitive shares vertices between faces, so the result is a closed
//! 2-manifold with outward-facing counter-clockwise triangles.

use crate::error::{Error, Result};
use crate::mesh::Mesh;
use nalgebra::{Point3, Vector3};
use std::f64::consts::TAU;

/// Principal axis for axis-aligned primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Unit direction plus two perpendicular directions with `e1 x e2 = axis`
    fn frame(self) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
        match self {
            Axis::X => (Vector3::x(), Vector3::y(), Vector3::z()),
            Axis::Y => (Vector3::y(), Vector3::z(), Vector3::x()),
            Axis::Z => (Vector3::z(), Vector3::x(), Vector3::y()),
        }
    }
}

/// Axis-aligned box between two corners
pub fn solid_box(min: Point3<f64>, max: Point3<f64>, color: [f32; 3]) -> Result<Mesh> {
    let extent = max - min;
    if !(extent.x > 0.0 && extent.y > 0.0 && extent.z > 0.0) {
        return Err(Error::InvalidPrimitive(format!(
            "box extent must be positive, got ({:.4}, {:.4}, {:.4})",
            extent.x, extent.y, extent.z
        )));
    }

    let mut mesh = Mesh::with_capacity(8, 36);
    let corners = [
        Point3::new(min.x, min.y, min.z),
        Point3::new(max.x, min.y, min.z),
        Point3::new(max.x, max.y, min.z),
        Point3::new(min.x, max.y, min.z),
        Point3::new(min.x, min.y, max.z),
        Point3::new(max.x, min.y, max.z),
        Point3::new(max.x, max.y, max.z),
        Point3::new(min.x, max.y, max.z),
    ];
    for corner in corners {
        mesh.add_vertex(corner, color);
    }

    const FACES: [[u32; 3]; 12] = [
        [0, 2, 1],
        [0, 3, 2], // -Z
        [4, 5, 6],
        [4, 6, 7], // +Z
        [0, 1, 5],
        [0, 5, 4], // -Y
        [3, 6, 2],
        [3, 7, 6], // +Y
        [0, 4, 7],
        [0, 7, 3], // -X
        [1, 2, 6],
        [1, 6, 5], // +X
    ];
    for [a, b, c] in FACES {
        mesh.add_triangle(a, b, c);
    }

    Ok(mesh)
}

/// Capped cylinder starting at `base` and running `length` along `axis`
pub fn cylinder(
    base: Point3<f64>,
    axis: Axis,
    radius: f64,
    length: f64,
    segments: u32,
    color: [f32; 3],
) -> Result<Mesh> {
    if segments < 3 {
        return Err(Error::InvalidPrimitive(format!(
            "cylinder needs at least 3 segments, got {}",
            segments
        )));
    }
    if radius <= 0.0 || length <= 0.0 {
        return Err(Error::InvalidPrimitive(format!(
            "cylinder radius and length must be positive, got {:.4} x {:.4}",
            radius, length
        )));
    }

    let (dir, e1, e2) = axis.frame();
    let top = base + dir * length;
    let n = segments;

    let mut mesh = Mesh::with_capacity(2 * n as usize + 2, 12 * n as usize);

    // Rings: bottom 0..n, top n..2n
    for center in [base, top] {
        for k in 0..n {
            let theta = TAU * k as f64 / n as f64;
            let offset = (e1 * theta.cos() + e2 * theta.sin()) * radius;
            mesh.add_vertex(center + offset, color);
        }
    }
    let bottom_center = mesh.add_vertex(base, color);
    let top_center = mesh.add_vertex(top, color);

    for k in 0..n {
        let next = (k + 1) % n;
        let (b0, b1) = (k, next);
        let (t0, t1) = (n + k, n + next);

        mesh.add_triangle(b0, b1, t1);
        mesh.add_triangle(b0, t1, t0);
        mesh.add_triangle(bottom_center, b1, b0);
        mesh.add_triangle(top_center, t0, t1);
    }

    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normals::calculate_normals;
    use crate::topology::is_watertight;

    /// Signed volume via the divergence theorem; positive for outward winding
    fn signed_volume(mesh: &Mesh) -> f64 {
        mesh.indices
            .chunks_exact(3)
            .map(|tri| {
                let (a, b, c) = (
                    mesh.position(tri[0] as usize).coords,
                    mesh.position(tri[1] as usize).coords,
                    mesh.position(tri[2] as usize).coords,
                );
                a.dot(&b.cross(&c)) / 6.0
            })
            .sum()
    }

    #[test]
    fn test_box_is_closed_and_outward() {
        let mesh = solid_box(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 1.0, 3.0), [0.5; 3])
            .unwrap();
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.triangle_count(), 12);
        assert!(is_watertight(&mesh));
        assert!((signed_volume(&mesh) - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_box_rejects_flat_extent() {
        let err = solid_box(Point3::origin(), Point3::new(1.0, 0.0, 1.0), [0.0; 3]).unwrap_err();
        assert!(matches!(err, Error::InvalidPrimitive(_)));
    }

    #[test]
    fn test_cylinder_is_closed_and_outward() {
        for axis in [Axis::X, Axis::Y, Axis::Z] {
            let mut mesh = cylinder(Point3::new(1.0, 2.0, 3.0), axis, 0.5, 2.0, 16, [0.5; 3]).unwrap();
            assert!(is_watertight(&mesh));
            assert!(signed_volume(&mesh) > 0.0, "inverted cylinder along {:?}", axis);

            calculate_normals(&mut mesh);
            assert_eq!(mesh.normals.len(), mesh.positions.len());
        }
    }

    #[test]
    fn test_cylinder_segment_count() {
        let mesh = cylinder(Point3::origin(), Axis::Y, 1.0, 1.0, 8, [0.0; 3]).unwrap();
        assert_eq!(mesh.vertex_count(), 18);
        assert_eq!(mesh.triangle_count(), 32);
        assert!(cylinder(Point3::origin(), Axis::Y, 1.0, 1.0, 2, [0.0; 3]).is_err());
    }
}
