use cgmath::{InnerSpace, Vector3};

use crate::data_structures::model;

/**
 * glTF files may omit tangents, so they have to be calculated for normal maps to work
 * correctly. Every triangle contributes the same tangent/bitangent to its three vertices
 * and the sums are averaged afterwards.
 */
pub fn compute_tangents(vertices: &mut [model::ModelVertex], indices: &[u32]) {
    let mut triangles_included = vec![0u32; vertices.len()];
    for v in vertices.iter_mut() {
        v.tangent = [0.0; 3];
        v.bitangent = [0.0; 3];
    }

    for c in indices.chunks_exact(3) {
        let [i0, i1, i2] = [c[0] as usize, c[1] as usize, c[2] as usize];
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            continue;
        }
        let v0 = vertices[i0];
        let v1 = vertices[i1];
        let v2 = vertices[i2];

        let pos0: Vector3<_> = v0.position.into();
        let pos1: Vector3<_> = v1.position.into();
        let pos2: Vector3<_> = v2.position.into();

        let uv0: cgmath::Vector2<_> = v0.tex_coords.into();
        let uv1: cgmath::Vector2<_> = v1.tex_coords.into();
        let uv2: cgmath::Vector2<_> = v2.tex_coords.into();

        // Edges of the triangle in model and texture space
        let delta_pos1 = pos1 - pos0;
        let delta_pos2 = pos2 - pos0;
        let delta_uv1 = uv1 - uv0;
        let delta_uv2 = uv2 - uv0;

        // Solving
        //     delta_pos1 = delta_uv1.x * T + delta_uv1.y * B
        //     delta_pos2 = delta_uv2.x * T + delta_uv2.y * B
        let det = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
        if det.abs() < f32::EPSILON {
            // no usable UV mapping on this triangle
            continue;
        }
        let r = 1.0 / det;
        let tangent = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) * r;
        // We flip the bitangent to enable right-handed normal
        // maps with wgpu texture coordinate system
        let bitangent = (delta_pos2 * delta_uv1.x - delta_pos1 * delta_uv2.x) * -r;

        for i in [i0, i1, i2] {
            vertices[i].tangent = (tangent + Vector3::from(vertices[i].tangent)).into();
            vertices[i].bitangent = (bitangent + Vector3::from(vertices[i].bitangent)).into();
            triangles_included[i] += 1;
        }
    }

    // Average the tangents/bitangents
    for (v, n) in vertices.iter_mut().zip(triangles_included) {
        if n == 0 {
            continue;
        }
        let denom = 1.0 / n as f32;
        v.tangent = (Vector3::from(v.tangent) * denom).into();
        v.bitangent = (Vector3::from(v.bitangent) * denom).into();
    }
}

/// Bitangent of a glTF tangent, whose `w` component carries the handedness.
pub fn bitangent_from_tangent(normal: [f32; 3], tangent: [f32; 4]) -> [f32; 3] {
    let n = Vector3::from(normal);
    let t = Vector3::new(tangent[0], tangent[1], tangent[2]);
    // flipped for the same reason as in `compute_tangents`
    (n.cross(t) * -tangent[3]).into()
}

/// Flat normals for primitives that ship without them.
pub fn compute_normals(vertices: &mut [model::ModelVertex], indices: &[u32]) {
    let mut sums = vec![Vector3::new(0.0f32, 0.0, 0.0); vertices.len()];
    for c in indices.chunks_exact(3) {
        let [i0, i1, i2] = [c[0] as usize, c[1] as usize, c[2] as usize];
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            continue;
        }
        let p0 = Vector3::from(vertices[i0].position);
        let p1 = Vector3::from(vertices[i1].position);
        let p2 = Vector3::from(vertices[i2].position);
        let face = (p1 - p0).cross(p2 - p0);
        for i in [i0, i1, i2] {
            sums[i] += face;
        }
    }
    for (v, sum) in vertices.iter_mut().zip(sums) {
        if sum.magnitude2() > 0.0 {
            v.normal = sum.normalize().into();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::model::ModelVertex;

    fn vertex(position: [f32; 3], tex_coords: [f32; 2]) -> ModelVertex {
        ModelVertex {
            position,
            tex_coords,
            normal: [0.0, 0.0, 1.0],
            ..Default::default()
        }
    }

    #[test]
    fn tangents_follow_the_uv_directions() {
        // u grows along +X, v grows along -Y (texture space is y-down)
        let mut vertices = vec![
            vertex([0.0, 0.0, 0.0], [0.0, 1.0]),
            vertex([1.0, 0.0, 0.0], [1.0, 1.0]),
            vertex([0.0, 1.0, 0.0], [0.0, 0.0]),
        ];
        compute_tangents(&mut vertices, &[0, 1, 2]);
        for v in &vertices {
            assert_eq!(v.tangent, [1.0, 0.0, 0.0]);
            assert_eq!(v.bitangent, [0.0, 1.0, 0.0]);
        }
    }

    #[test]
    fn degenerate_uvs_and_bad_indices_are_skipped() {
        let mut vertices = vec![
            vertex([0.0, 0.0, 0.0], [0.0, 0.0]),
            vertex([1.0, 0.0, 0.0], [0.0, 0.0]),
            vertex([0.0, 1.0, 0.0], [0.0, 0.0]),
        ];
        compute_tangents(&mut vertices, &[0, 1, 2, 0, 1, 9]);
        for v in &vertices {
            assert_eq!(v.tangent, [0.0; 3]);
            assert!(v.tangent.iter().all(|c| c.is_finite()));
        }
    }

    #[test]
    fn normals_face_counter_clockwise_winding() {
        let mut vertices = vec![
            vertex([0.0, 0.0, 0.0], [0.0, 0.0]),
            vertex([1.0, 0.0, 0.0], [0.0, 0.0]),
            vertex([0.0, 0.0, -1.0], [0.0, 0.0]),
        ];
        compute_normals(&mut vertices, &[0, 1, 2]);
        assert_eq!(vertices[0].normal, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn gltf_tangent_handedness() {
        let b = bitangent_from_tangent([0.0, 0.0, 1.0], [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(b, [0.0, -1.0, 0.0]);
        let b = bitangent_from_tangent([0.0, 0.0, 1.0], [1.0, 0.0, 0.0, -1.0]);
        assert_eq!(b, [0.0, 1.0, 0.0]);
    }
}
