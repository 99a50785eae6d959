//! Node transforms and their GPU representation.
//!
//! Every drawable node owns a one-element instance buffer holding its world
//! matrix, so meshes are drawn through the instanced vertex layout below.

use cgmath::{Matrix, Matrix3, Matrix4, One, SquareMatrix};

use crate::{animation::NodePose, data_structures::model};

/// Local transformation: position, rotation (as quaternion), and scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instance {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Instance {
    /// Create a new instance with identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    /// This transform with the animated properties of `pose` swapped in.
    pub fn posed(&self, pose: &NodePose) -> Self {
        Self {
            position: pose.translation.unwrap_or(self.position),
            rotation: pose.rotation.unwrap_or(self.rotation),
            scale: pose.scale.unwrap_or(self.scale),
        }
    }

    pub fn to_raw(&self) -> InstanceRaw {
        InstanceRaw::from_matrix(self.to_matrix())
    }
}

impl From<cgmath::Vector3<f32>> for Instance {
    fn from(position: cgmath::Vector3<f32>) -> Self {
        Instance {
            position,
            ..Default::default()
        }
    }
}

impl From<gltf::scene::Transform> for Instance {
    fn from(transform: gltf::scene::Transform) -> Self {
        let (position, rotation, scale) = transform.decomposed();
        Instance {
            position: position.into(),
            // glTF stores quaternions as [x, y, z, w]
            rotation: cgmath::Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2]),
            scale: scale.into(),
        }
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

/**
 * The raw instance is the actual data stored on the GPU
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    model: [[f32; 4]; 4],
    normal: [[f32; 3]; 3],
}

impl InstanceRaw {
    /// Packs a world matrix together with its normal matrix (inverse transpose
    /// of the upper 3x3).
    pub fn from_matrix(world: Matrix4<f32>) -> Self {
        let upper = Matrix3::from_cols(world.x.truncate(), world.y.truncate(), world.z.truncate());
        let normal = upper
            .invert()
            .map(|inv| inv.transpose())
            .unwrap_or_else(Matrix3::identity);
        Self {
            model: world.into(),
            normal: normal.into(),
        }
    }

    pub fn model(&self) -> Matrix4<f32> {
        self.model.into()
    }

    pub fn normal(&self) -> Matrix3<f32> {
        self.normal.into()
    }
}

/**
 * As we store vertex data directly in the GPU memory we need to tell what the bytes refer to:
 *
 * offset: zero as we want to use the full space.
 * stride: length of an instance
 *
 * Stride layout here: world matrix (four vec4 slots), normal matrix (three vec3 slots).
 * Locations start after the seven `ModelVertex` attributes.
 */
impl model::Vertex for InstanceRaw {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            // One world matrix per draw, so advance per instance rather than per vertex
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 8,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 9,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 10,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 12]>() as wgpu::BufferAddress,
                    shader_location: 11,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 16]>() as wgpu::BufferAddress,
                    shader_location: 12,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 19]>() as wgpu::BufferAddress,
                    shader_location: 13,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 22]>() as wgpu::BufferAddress,
                    shader_location: 14,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, Quaternion, Rotation3, Vector3, Vector4};

    use super::*;

    #[test]
    fn matrix_applies_scale_then_rotation_then_translation() {
        let instance = Instance {
            position: Vector3::new(0.0, 50.0, 0.0),
            rotation: Quaternion::from_angle_y(Deg(90.0)),
            scale: Vector3::new(50.0, 50.0, 50.0),
        };
        let p = instance.to_matrix() * Vector4::new(1.0, 0.0, 0.0, 1.0);
        assert!((p.x - 0.0).abs() < 1e-4);
        assert!((p.y - 50.0).abs() < 1e-4);
        assert!((p.z + 50.0).abs() < 1e-4);
    }

    #[test]
    fn posed_only_replaces_animated_properties() {
        let rest = Instance::from(Vector3::new(1.0, 2.0, 3.0));
        let pose = NodePose {
            scale: Some(Vector3::new(2.0, 2.0, 2.0)),
            ..Default::default()
        };
        let posed = rest.posed(&pose);
        assert_eq!(posed.position, rest.position);
        assert_eq!(posed.rotation, rest.rotation);
        assert_eq!(posed.scale, Vector3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn normals_stay_perpendicular_under_non_uniform_scale() {
        use cgmath::InnerSpace;

        let squashed = Instance {
            scale: Vector3::new(4.0, 1.0, 1.0),
            ..Default::default()
        };
        let raw = squashed.to_raw();
        // a surface along the (1, 1) diagonal with its normal
        let tangent = (raw.model() * Vector4::new(1.0, -1.0, 0.0, 0.0)).truncate();
        let normal = raw.normal() * Vector3::new(1.0, 1.0, 0.0);
        assert!(tangent.dot(normal).abs() < 1e-5);
        assert_eq!(Instance::new().to_raw().normal(), Matrix3::identity());
    }

    #[test]
    fn gltf_quaternions_are_reordered() {
        let t = gltf::scene::Transform::Decomposed {
            translation: [1.0, 2.0, 3.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0, 1.0, 1.0],
        };
        let instance = Instance::from(t);
        assert_eq!(instance.rotation, Quaternion::one());
        assert_eq!(instance.position, Vector3::new(1.0, 2.0, 3.0));
    }
}
