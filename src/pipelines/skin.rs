//! Joint palettes for skinned meshes.
//!
//! Storage buffers are not available on WebGL2, so the palette is a fixed
//! size uniform array. Meshes that are not skinned share one identity palette
//! with `joint_count == 0`, which the vertex shader treats as "no skinning".

use cgmath::{Matrix4, SquareMatrix};
use wgpu::util::DeviceExt;

pub const MAX_JOINTS: usize = 128;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkinUniform {
    pub joint_count: u32,
    _padding: [u32; 3],
    pub joints: [[[f32; 4]; 4]; MAX_JOINTS],
}

impl SkinUniform {
    pub fn identity() -> Self {
        let identity: [[f32; 4]; 4] = Matrix4::<f32>::identity().into();
        Self {
            joint_count: 0,
            _padding: [0; 3],
            joints: [identity; MAX_JOINTS],
        }
    }

    /// Copies `palette` into the uniform. Joints past [`MAX_JOINTS`] are dropped
    /// with a warning; their vertices fall back to the first joint.
    pub fn from_palette(palette: &[Matrix4<f32>]) -> Self {
        if palette.len() > MAX_JOINTS {
            log::warn!(
                "Skin has {} joints, only the first {MAX_JOINTS} are used.",
                palette.len()
            );
        }
        let mut uniform = Self::identity();
        for (slot, joint) in uniform.joints.iter_mut().zip(palette) {
            *slot = (*joint).into();
        }
        uniform.joint_count = palette.len().min(MAX_JOINTS) as u32;
        uniform
    }
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("skin_bind_group_layout"),
    })
}

/// GPU side of one palette.
#[derive(Debug)]
pub struct SkinResources {
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl SkinResources {
    pub fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, uniform: &SkinUniform) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Skin Buffer"),
            contents: bytemuck::bytes_of(uniform),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("skin_bind_group"),
        });
        Self { buffer, bind_group }
    }

    pub fn write(&self, queue: &wgpu::Queue, uniform: &SkinUniform) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(uniform));
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Vector3;

    use super::*;

    #[test]
    fn palette_is_copied_and_clamped() {
        let t = Matrix4::from_translation(Vector3::new(1.0, 2.0, 3.0));
        let uniform = SkinUniform::from_palette(&[t, t]);
        assert_eq!(uniform.joint_count, 2);
        let expected: [[f32; 4]; 4] = t.into();
        assert_eq!(uniform.joints[1], expected);
        let identity: [[f32; 4]; 4] = Matrix4::<f32>::identity().into();
        assert_eq!(uniform.joints[2], identity);

        let many = vec![t; MAX_JOINTS + 5];
        assert_eq!(SkinUniform::from_palette(&many).joint_count, MAX_JOINTS as u32);
    }

    #[test]
    fn uniform_fits_webgl2_limits() {
        assert!(std::mem::size_of::<SkinUniform>() <= 16 * 1024);
        assert_eq!(std::mem::size_of::<SkinUniform>() % 16, 0);
    }
}
