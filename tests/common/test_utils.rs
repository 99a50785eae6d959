#![allow(dead_code)]

/// A binary glTF holding one triangle `(0,0,0) (1,0,0) (0,1,0)` on node 0,
/// a red material with roughness 0.2 / metalness 0.9 and, when `animated`,
/// one clip "fly" translating node 0 from x = 0 to x = 2 over one second.
pub fn triangle_glb(animated: bool) -> Vec<u8> {
    let mut bin = Vec::new();
    for p in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
        p.iter().for_each(|c| bin.extend_from_slice(&c.to_le_bytes()));
    }
    for i in [0u32, 1, 2] {
        bin.extend_from_slice(&i.to_le_bytes());
    }
    for t in [0.0f32, 1.0] {
        bin.extend_from_slice(&t.to_le_bytes());
    }
    for p in [[0.0f32, 0.0, 0.0], [2.0, 0.0, 0.0]] {
        p.iter().for_each(|c| bin.extend_from_slice(&c.to_le_bytes()));
    }
    assert_eq!(bin.len(), 80);

    let animations = if animated {
        r#""animations": [{
            "name": "fly",
            "channels": [{"sampler": 0, "target": {"node": 0, "path": "translation"}}],
            "samplers": [{"input": 2, "output": 3, "interpolation": "LINEAR"}]
        }],"#
    } else {
        ""
    };
    let json = format!(
        r#"{{
        "asset": {{"version": "2.0"}},
        "scene": 0,
        "scenes": [{{"nodes": [0]}}],
        "nodes": [{{"name": "bee", "mesh": 0}}],
        "meshes": [{{"name": "body", "primitives": [{{"attributes": {{"POSITION": 0}}, "indices": 1, "material": 0}}]}}],
        "materials": [{{
            "name": "wings",
            "pbrMetallicRoughness": {{"baseColorFactor": [1.0, 0.0, 0.0, 1.0], "metallicFactor": 0.9, "roughnessFactor": 0.2}}
        }}],
        {animations}
        "accessors": [
            {{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}},
            {{"bufferView": 1, "componentType": 5125, "count": 3, "type": "SCALAR"}},
            {{"bufferView": 2, "componentType": 5126, "count": 2, "type": "SCALAR", "min": [0.0], "max": [1.0]}},
            {{"bufferView": 3, "componentType": 5126, "count": 2, "type": "VEC3"}}
        ],
        "bufferViews": [
            {{"buffer": 0, "byteOffset": 0, "byteLength": 36}},
            {{"buffer": 0, "byteOffset": 36, "byteLength": 12}},
            {{"buffer": 0, "byteOffset": 48, "byteLength": 8}},
            {{"buffer": 0, "byteOffset": 56, "byteLength": 24}}
        ],
        "buffers": [{{"byteLength": 80}}]
    }}"#
    );

    let mut json = json.into_bytes();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());
    glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"JSON");
    glb.extend_from_slice(&json);
    glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"BIN\0");
    glb.extend_from_slice(&bin);
    glb
}

#[cfg(feature = "integration-tests")]
pub use gpu::*;

#[cfg(feature = "integration-tests")]
mod gpu {
    use std::iter;

    use instant::Duration;
    use orbit_viewer::{
        ViewerConfig,
        camera::{Camera, CameraResources, Projection},
        controls::OrbitControls,
        data_structures::texture::Texture,
        pipelines::{
            Pipelines,
            light::{LightResources, LightUniform},
        },
        viewer::Viewer,
    };

    pub const SIZE: u32 = 256;
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    /// Everything the window context would own, minus the window.
    pub struct Headless {
        pub device: wgpu::Device,
        pub queue: wgpu::Queue,
        pub camera: CameraResources,
        pub projection: Projection,
        pub light: LightResources,
        pub pipelines: Pipelines,
    }

    impl Headless {
        /// `None` when the machine has no usable adapter.
        pub async fn new(config: &ViewerConfig) -> Option<Self> {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .ok()?;
            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor::default())
                .await
                .ok()?;

            let surface_config = wgpu::SurfaceConfiguration {
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                format: FORMAT,
                width: SIZE,
                height: SIZE,
                present_mode: wgpu::PresentMode::Fifo,
                alpha_mode: wgpu::CompositeAlphaMode::Auto,
                view_formats: vec![],
                desired_maximum_frame_latency: 2,
            };
            let projection = Projection::from_config(SIZE, SIZE, &config.camera);
            let camera = CameraResources::new(
                &device,
                Camera::from(&config.camera),
                OrbitControls::new(config.controls.clone()),
                &projection,
            );
            let light = LightResources::new(LightUniform::new(&config.lights), &device);
            let pipelines = Pipelines::new(
                &device,
                &surface_config,
                &camera.bind_group_layout,
                &light.bind_group_layout,
            );
            Some(Self {
                device,
                queue,
                camera,
                projection,
                light,
                pipelines,
            })
        }

        /// Draws `viewer` into an offscreen target and reads the pixels back.
        pub async fn render(&self, viewer: &Viewer, clear: wgpu::Color) -> image::RgbaImage {
            let extent = wgpu::Extent3d {
                width: SIZE,
                height: SIZE,
                depth_or_array_layers: 1,
            };
            let target = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Golden Image Test Output Texture"),
                size: extent,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: FORMAT,
                usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            let view = target.create_view(&wgpu::TextureViewDescriptor::default());
            let depth = Texture::create_depth_texture(&self.device, [SIZE, SIZE], "test depth");

            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
            {
                let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Test Render Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(clear),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &depth.view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    occlusion_query_set: None,
                    timestamp_writes: None,
                });
                viewer.draw(
                    &mut render_pass,
                    &self.pipelines,
                    &self.camera.bind_group,
                    &self.light.bind_group,
                );
            }

            // 256 px * 4 bytes satisfies the 256 byte row alignment
            let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: None,
                size: (4 * SIZE * SIZE) as wgpu::BufferAddress,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    aspect: wgpu::TextureAspect::All,
                    texture: &target,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &output_buffer,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(4 * SIZE),
                        rows_per_image: Some(SIZE),
                    },
                },
                extent,
            );
            self.queue.submit(iter::once(encoder.finish()));

            let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
            let buffer_slice = output_buffer.slice(..);
            buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
                tx.send(result).unwrap();
            });
            self.device
                .poll(wgpu::PollType::Wait {
                    submission_index: None,
                    timeout: Some(Duration::from_secs(3)),
                })
                .unwrap();
            rx.receive().await.unwrap().unwrap();
            let data = buffer_slice.get_mapped_range().to_vec();
            image::RgbaImage::from_raw(SIZE, SIZE, data).unwrap()
        }
    }
}
