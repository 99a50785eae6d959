use cgmath::InnerSpace;
use wgpu::util::DeviceExt;

use crate::config::LightConfig;

/// Ambient plus one directional light, both already multiplied by their intensity.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    pub ambient: [f32; 3],
    // Due to uniforms requiring 16 byte (4 float) spacing, we need to use a padding field here
    _padding: u32,
    /// Unit vector pointing from the surface towards the light.
    pub direction: [f32; 3],
    _padding2: u32,
    pub colour: [f32; 3],
    _padding3: u32,
}

impl LightUniform {
    pub fn new(config: &LightConfig) -> Self {
        let ambient = config
            .ambient_colour
            .to_linear_rgb()
            .map(|c| c * config.ambient_intensity);
        let colour = config
            .directional_colour
            .to_linear_rgb()
            .map(|c| c * config.directional_intensity);
        // A directional light shines from its position towards the origin.
        let direction = if config.directional_position.magnitude2() > 0.0 {
            config.directional_position.normalize()
        } else {
            cgmath::Vector3::unit_y()
        };
        Self {
            ambient,
            _padding: 0,
            direction: direction.into(),
            _padding2: 0,
            colour,
            _padding3: 0,
        }
    }
}

#[derive(Debug)]
pub struct LightResources {
    pub uniform: LightUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl LightResources {
    pub fn new(uniform: LightUniform, device: &wgpu::Device) -> Self {
        let buffer = mk_buffer(device, uniform);
        let bind_group_layout = mk_bind_group_layout(device);
        let bind_group = mk_bind_group(device, &bind_group_layout, &buffer);
        Self {
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }
}

pub fn mk_buffer(device: &wgpu::Device, light_uniform: LightUniform) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Light Buffer"),
        contents: bytemuck::cast_slice(&[light_uniform]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("light_bind_group_layout"),
    })
}

pub fn mk_bind_group(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    light_buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout: bind_group_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: light_buffer.as_entire_binding(),
        }],
        label: Some("light_bind_group"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lights() {
        let uniform = LightUniform::new(&LightConfig::default());
        let d = 1.0 / 3f32.sqrt();
        for c in uniform.direction {
            assert!((c - d).abs() < 1e-6);
        }
        assert_eq!(uniform.colour, [1.0; 3]);
        // 0x40 = 64, which is roughly 0.0513 in linear space
        assert!((uniform.ambient[0] - 0.0513).abs() < 1e-3);
        assert_eq!(std::mem::size_of::<LightUniform>() % 16, 0);
    }
}
