//! Render pipelines and the uniforms bound next to them.
//!
//! - `basic` builds the standard pipeline and the shared pipeline helper
//! - `light` ambient + directional light uniform
//! - `skin` joint palette uniform for skinned meshes

pub mod basic;
pub mod light;
pub mod skin;

use crate::{pipelines::skin::SkinResources, resources::texture::material_layout};

/// Everything the standard pipeline needs besides camera and light, which
/// are owned by their own resources.
#[derive(Debug)]
pub struct Pipelines {
    pub standard: wgpu::RenderPipeline,
    pub material_layout: wgpu::BindGroupLayout,
    pub skin_layout: wgpu::BindGroupLayout,
    /// Palette with `joint_count == 0` bound for every mesh that is not skinned.
    pub rigid_skin: SkinResources,
}

impl Pipelines {
    pub fn new(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        camera_layout: &wgpu::BindGroupLayout,
        light_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let material_layout = material_layout(device);
        let skin_layout = skin::mk_bind_group_layout(device);
        let standard = basic::mk_standard_pipeline(
            device,
            config,
            &material_layout,
            camera_layout,
            light_layout,
            &skin_layout,
        );
        let rigid_skin = SkinResources::new(device, &skin_layout, &skin::SkinUniform::identity());
        Self {
            standard,
            material_layout,
            skin_layout,
            rigid_skin,
        }
    }
}
