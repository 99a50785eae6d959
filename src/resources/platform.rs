//! The flat ground the model stands on.

use std::f32::consts::FRAC_PI_2;

use cgmath::{Quaternion, Rad, Rotation3};

use crate::{
    config::PlatformConfig,
    data_structures::{instance::Instance, model::ModelVertex, model::MaterialUniform},
    resources::{PrimitiveData, mesh},
};

/// A `width` x `height` rectangle centred on the origin in the XY plane,
/// facing +Z. UV (0, 0) is the top left corner.
pub fn plane(width: f32, height: f32) -> PrimitiveData {
    let (hw, hh) = (width / 2.0, height / 2.0);
    let corner = |x: f32, y: f32, u: f32, v: f32| ModelVertex {
        position: [x, y, 0.0],
        tex_coords: [u, v],
        normal: [0.0, 0.0, 1.0],
        ..Default::default()
    };
    let mut vertices = vec![
        corner(-hw, hh, 0.0, 0.0),
        corner(hw, hh, 1.0, 0.0),
        corner(-hw, -hh, 0.0, 1.0),
        corner(hw, -hh, 1.0, 1.0),
    ];
    let indices = vec![0, 2, 1, 2, 3, 1];
    mesh::compute_tangents(&mut vertices, &indices);
    PrimitiveData {
        vertices,
        indices,
        material: None,
    }
}

/// Lays the plane flat: rotated by -90 degrees about X so it faces +Y.
pub fn platform_transform() -> Instance {
    Instance {
        rotation: Quaternion::from_angle_x(Rad(-FRAC_PI_2)),
        ..Default::default()
    }
}

pub fn platform_material(config: &PlatformConfig) -> MaterialUniform {
    let [r, g, b] = config.colour.to_linear_rgb();
    MaterialUniform {
        base_colour: [r, g, b, 1.0],
        roughness: config.roughness,
        metalness: config.metalness,
        _padding: [0.0; 2],
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{InnerSpace, Vector3, Vector4};

    use super::*;

    #[test]
    fn plane_faces_up_after_the_platform_rotation() {
        let plane = plane(500.0, 500.0);
        assert_eq!(plane.vertices.len(), 4);
        assert_eq!(plane.indices.len(), 6);

        let m = platform_transform().to_matrix();
        let normal = (m * Vector4::new(0.0, 0.0, 1.0, 0.0)).truncate();
        assert!((normal - Vector3::unit_y()).magnitude() < 1e-6);

        // the top edge of the plane ends up on the far side (-Z)
        let top = (m * Vector4::new(0.0, 250.0, 0.0, 1.0)).truncate();
        assert!((top - Vector3::new(0.0, 0.0, -250.0)).magnitude() < 1e-3);
    }

    #[test]
    fn triangles_wind_counter_clockwise_towards_the_normal() {
        let plane = plane(2.0, 4.0);
        for tri in plane.indices.chunks(3) {
            let p = |i: u32| Vector3::from(plane.vertices[i as usize].position);
            let face = (p(tri[1]) - p(tri[0])).cross(p(tri[2]) - p(tri[0]));
            assert!(face.z > 0.0);
        }
        for v in &plane.vertices {
            let t = Vector3::from(v.tangent).normalize();
            assert!((t - Vector3::unit_x()).magnitude() < 1e-6);
        }
    }

    #[test]
    fn platform_colour_is_linear_grey() {
        let m = platform_material(&PlatformConfig::default());
        assert!((m.base_colour[0] - 0.2158605).abs() < 1e-4);
        assert_eq!(m.roughness, 1.0);
        assert_eq!(m.metalness, 0.0);
    }
}
