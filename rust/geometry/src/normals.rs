// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-vertex normal computation

use crate::mesh::Mesh;
use nalgebra::Vector3;

/// Recompute smooth vertex normals from triangle faces.
///
/// Face normals are accumulated unnormalized, so larger triangles weigh more.
/// Vertices that belong to no triangle, or only to degenerate ones, get a
/// zero normal.
pub fn calculate_normals(mesh: &mut Mesh) {
    if mesh.is_empty() {
        return;
    }
    let vertex_count = mesh.vertex_count();

    let mut normals = vec![Vector3::<f64>::zeros(); vertex_count];

    for tri in mesh.indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);

        let v0 = mesh.position(i0);
        let v1 = mesh.position(i1);
        let v2 = mesh.position(i2);

        let normal = (v1 - v0).cross(&(v2 - v0));

        normals[i0] += normal;
        normals[i1] += normal;
        normals[i2] += normal;
    }

    mesh.normals.clear();
    mesh.normals.reserve(vertex_count * 3);
    for normal in normals {
        let n = normal.try_normalize(1e-12).unwrap_or_else(Vector3::zeros);
        mesh.normals.push(n.x as f32);
        mesh.normals.push(n.y as f32);
        mesh.normals.push(n.z as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn test_single_triangle_normal() {
        let mut mesh = Mesh::new();
        mesh.add_vertex(Point3::new(0.0, 0.0, 0.0), [0.0; 3]);
        mesh.add_vertex(Point3::new(1.0, 0.0, 0.0), [0.0; 3]);
        mesh.add_vertex(Point3::new(0.0, 1.0, 0.0), [0.0; 3]);
        mesh.add_triangle(0, 1, 2);

        calculate_normals(&mut mesh);

        for v in 0..3 {
            assert_relative_eq!(mesh.normals[v * 3 + 2], 1.0);
        }
    }

    #[test]
    fn test_unreferenced_vertex_gets_zero_normal() {
        let mut mesh = Mesh::new();
        mesh.add_vertex(Point3::new(0.0, 0.0, 0.0), [0.0; 3]);
        calculate_normals(&mut mesh);
        assert_eq!(mesh.normals, vec![0.0, 0.0, 0.0]);
    }
}
