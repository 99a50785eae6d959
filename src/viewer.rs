//! The scene: a lit platform, one animated model and the per-frame update.
//!
//! [`Viewer`] owns the scene graph and every GPU resource that belongs to a
//! drawable. It does not own the device, the surface or the camera; those live
//! in [`Context`](crate::context::Context) and are passed in, so the viewer can
//! also render into an offscreen target.

use std::collections::HashMap;

use anyhow::Context as _;
use instant::Duration;
use wgpu::util::DeviceExt;

use crate::{
    animation::{ActionId, AnimationMixer},
    config::{AnimationConfig, MaterialOverride, MixerClock, ModelConfig, ViewerConfig},
    data_structures::{
        instance::{Instance, InstanceRaw},
        model::{DrawModel, Material, MaterialUniform, Mesh},
        scene_graph::{NodeId, SceneGraph, SceneNode},
        texture::{self, Texture},
    },
    pipelines::{
        Pipelines,
        skin::{SkinResources, SkinUniform},
    },
    resources::{
        asset::{MaterialDesc, ModelAsset, NodeDesc, SkinDesc},
        platform,
    },
};

/// A node that is drawn, with the buffer holding its world matrix.
#[derive(Debug)]
struct Drawable {
    node: NodeId,
    instance_buffer: wgpu::Buffer,
    skin: Option<SkinnedDrawable>,
}

#[derive(Debug)]
struct SkinnedDrawable {
    skin: usize,
    resources: SkinResources,
}

/// Bookkeeping for the model once it has been added to the scene.
#[derive(Debug)]
pub struct LoadedModel {
    pub name: String,
    /// Node carrying the placement transform (scale and position).
    pub root: NodeId,
    /// Arena id of the model's first node; node `i` of the file is `node_offset + i`.
    pub node_offset: NodeId,
    pub mixer: AnimationMixer,
    /// The playing action, `None` when the model has no animations.
    pub action: Option<ActionId>,
    skins: Vec<SkinDesc>,
}

#[derive(Debug)]
pub struct Viewer {
    config: ViewerConfig,
    graph: SceneGraph,
    /// Indexed by `SceneNode::mesh`; one entry per glTF mesh, one `Mesh` per primitive.
    meshes: Vec<Vec<Mesh>>,
    materials: Vec<Material>,
    drawables: Vec<Drawable>,
    platform: NodeId,
    model: Option<LoadedModel>,
}

impl Viewer {
    /// Builds the platform. Lights and camera are part of the context.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pipelines: &Pipelines,
        config: ViewerConfig,
    ) -> anyhow::Result<Self> {
        let mut viewer = Self {
            config,
            graph: SceneGraph::new(),
            meshes: Vec::new(),
            materials: Vec::new(),
            drawables: Vec::new(),
            platform: 0,
            model: None,
        };

        let plane = platform::plane(viewer.config.platform.width, viewer.config.platform.height);
        let material = Material::new(
            device,
            "platform",
            Texture::create_solid(device, queue, texture::WHITE, false, "platform colour"),
            Texture::create_solid(device, queue, texture::FLAT_NORMAL, true, "platform normal"),
            platform::platform_material(&viewer.config.platform),
            &pipelines.material_layout,
        )?;
        viewer.materials.push(material);
        viewer.meshes.push(vec![Mesh::new(
            device,
            "platform",
            &plane.vertices,
            &plane.indices,
            0,
        )]);
        viewer.platform = viewer.graph.add_node(
            SceneNode::new("platform", platform::platform_transform()).with_mesh(0),
            None,
        );
        viewer.graph.update_world_transforms();
        viewer.add_drawable(device, viewer.platform, None, pipelines);
        Ok(viewer)
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn platform(&self) -> NodeId {
        self.platform
    }

    pub fn model(&self) -> Option<&LoadedModel> {
        self.model.as_ref()
    }

    pub fn drawable_count(&self) -> usize {
        self.drawables.len()
    }

    fn add_drawable(
        &mut self,
        device: &wgpu::Device,
        node: NodeId,
        skin: Option<usize>,
        pipelines: &Pipelines,
    ) {
        let world = self
            .graph
            .node(node)
            .map(|n| n.world())
            .unwrap_or_else(|| Instance::new().to_matrix());
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Instance Buffer"),
            contents: bytemuck::cast_slice(&[InstanceRaw::from_matrix(world)]),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        let skin = skin.map(|skin| SkinnedDrawable {
            skin,
            resources: SkinResources::new(device, &pipelines.skin_layout, &SkinUniform::identity()),
        });
        self.drawables.push(Drawable {
            node,
            instance_buffer,
            skin,
        });
    }

    /// Adds the model to the scene: placement, patched materials, GPU
    /// upload, and the mixer with its first clip playing.
    pub fn on_model_loaded(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pipelines: &Pipelines,
        asset: ModelAsset,
    ) -> anyhow::Result<()> {
        anyhow::ensure!(self.model.is_none(), "a model is already loaded");
        log_model(&asset);
        check_hierarchy(&asset.nodes, &asset.roots)?;

        let ModelAsset {
            name,
            nodes,
            roots,
            meshes,
            materials,
            images,
            skins,
            clips,
        } = asset;

        // Materials: every file material plus the default one, all patched.
        let material_base = self.materials.len();
        let default_material = materials.len();
        let mut textures: HashMap<(Option<usize>, bool), Texture> = HashMap::new();
        let mut texture_for = |image: Option<usize>, is_normal_map: bool| -> Texture {
            let image = image.filter(|&i| matches!(images.get(i), Some(Some(_))));
            textures
                .entry((image, is_normal_map))
                .or_insert_with(|| match image.and_then(|i| images[i].as_ref()) {
                    Some(rgba) => Texture::from_rgba(device, queue, rgba, &name, is_normal_map),
                    None if is_normal_map => {
                        Texture::create_solid(device, queue, texture::FLAT_NORMAL, true, "flat normal")
                    }
                    None => Texture::create_solid(device, queue, texture::WHITE, false, "white"),
                })
                .clone()
        };
        let override_ = self.config.model.material;
        let mut patched_materials = Vec::with_capacity(materials.len() + 1);
        for desc in materials.iter().chain(std::iter::once(&MaterialDesc::default())) {
            let patched = patch_material(desc, &override_);
            let material = Material::new(
                device,
                &patched.name,
                texture_for(patched.colour_map, false),
                texture_for(patched.normal_map, true),
                material_uniform(&patched),
                &pipelines.material_layout,
            )
            .with_context(|| format!("could not create material {}", patched.name))?;
            patched_materials.push(material);
        }
        self.materials.extend(patched_materials);

        // Meshes
        let mesh_base = self.meshes.len();
        for mesh in &meshes {
            let group = mesh
                .primitives
                .iter()
                .enumerate()
                .map(|(i, primitive)| {
                    let material = material_base
                        + primitive
                            .material
                            .filter(|&m| m < default_material)
                            .unwrap_or(default_material);
                    Mesh::new(
                        device,
                        &format!("{} #{i}", mesh.name),
                        &primitive.vertices,
                        &primitive.indices,
                        material,
                    )
                })
                .collect();
            self.meshes.push(group);
        }

        // Nodes: the placement root, then the file's nodes in file order.
        let root = self.graph.add_node(
            SceneNode::new(name.clone(), model_root_transform(&self.config.model)),
            None,
        );
        let node_offset = self.graph.len();
        for node in &nodes {
            let mut scene_node = SceneNode::new(node.name.clone(), node.transform);
            scene_node.mesh = node
                .mesh
                .filter(|&m| m < meshes.len())
                .map(|m| mesh_base + m);
            scene_node.skin = node.skin.filter(|&s| s < skins.len());
            self.graph.add_node(scene_node, None);
        }
        for (i, node) in nodes.iter().enumerate() {
            for &child in node.children.iter().filter(|&&c| c < nodes.len()) {
                self.graph
                    .attach(node_offset + child, node_offset + i)
                    .context("invalid node hierarchy")?;
            }
        }
        for &r in roots.iter().filter(|&&r| r < nodes.len()) {
            self.graph
                .attach(node_offset + r, root)
                .context("invalid scene roots")?;
        }
        self.graph.update_world_transforms();

        let mut drawn = Vec::new();
        self.graph.traverse(root, &mut |id: NodeId, node: &SceneNode| {
            if node.mesh.is_some() {
                drawn.push((id, node.skin));
            }
        });
        for (id, skin) in drawn {
            self.add_drawable(device, id, skin, pipelines);
        }

        let skins = skins
            .into_iter()
            .map(|skin| SkinDesc {
                joints: skin.joints.iter().map(|&j| node_offset + j).collect(),
                ..skin
            })
            .collect();

        let mut mixer = AnimationMixer::new(clips);
        let action = start_first_clip(&mut mixer, &self.config.animation);

        self.model = Some(LoadedModel {
            name,
            root,
            node_offset,
            mixer,
            action,
            skins,
        });
        self.refresh(queue);
        Ok(())
    }

    pub fn on_model_failed(&self, err: &anyhow::Error) {
        log::error!("Error loading model {}: {err:?}", self.config.model.path);
    }

    /// Advances the animation and uploads the resulting transforms.
    pub fn on_frame(&mut self, queue: &wgpu::Queue, dt: Duration) {
        let step = mixer_step(self.config.animation.clock, dt);
        if let Some(model) = &mut self.model {
            let pose = model.mixer.update(step);
            self.graph.apply_pose(model.root, model.node_offset, &pose);
        }
        self.refresh(queue);
    }

    fn refresh(&mut self, queue: &wgpu::Queue) {
        self.graph.update_world_transforms();
        for drawable in &self.drawables {
            let Some(node) = self.graph.node(drawable.node) else {
                continue;
            };
            queue.write_buffer(
                &drawable.instance_buffer,
                0,
                bytemuck::cast_slice(&[InstanceRaw::from_matrix(node.world())]),
            );
            let (Some(skinned), Some(model)) = (&drawable.skin, &self.model) else {
                continue;
            };
            if let Some(skin) = model.skins.get(skinned.skin) {
                let palette = self.graph.joint_matrices(
                    drawable.node,
                    &skin.joints,
                    &skin.inverse_bind_matrices,
                );
                skinned
                    .resources
                    .write(queue, &SkinUniform::from_palette(&palette));
            }
        }
    }

    pub fn draw<'a>(
        &'a self,
        render_pass: &mut wgpu::RenderPass<'a>,
        pipelines: &'a Pipelines,
        camera_bind_group: &'a wgpu::BindGroup,
        light_bind_group: &'a wgpu::BindGroup,
    ) {
        render_pass.set_pipeline(&pipelines.standard);
        for drawable in &self.drawables {
            let Some(group) = self
                .graph
                .node(drawable.node)
                .and_then(|n| n.mesh)
                .and_then(|m| self.meshes.get(m))
            else {
                continue;
            };
            let skin_bind_group = drawable
                .skin
                .as_ref()
                .map_or(&pipelines.rigid_skin.bind_group, |s| &s.resources.bind_group);
            for mesh in group {
                let Some(material) = self.materials.get(mesh.material) else {
                    log::warn!("Mesh {} refers to a missing material.", mesh.name);
                    continue;
                };
                render_pass.draw_mesh_instanced(
                    mesh,
                    material,
                    &drawable.instance_buffer,
                    0..1,
                    camera_bind_group,
                    light_bind_group,
                    skin_bind_group,
                );
            }
        }
    }
}

/// Rejects node hierarchies the scene graph cannot hold (cycles, nodes
/// listed as their own ancestor) before anything is added to the scene.
pub fn check_hierarchy(nodes: &[NodeDesc], roots: &[usize]) -> anyhow::Result<()> {
    let mut scratch = SceneGraph::new();
    let root = scratch.add_node(SceneNode::new("root", Instance::new()), None);
    for node in nodes {
        scratch.add_node(SceneNode::new(node.name.clone(), Instance::new()), None);
    }
    for (i, node) in nodes.iter().enumerate() {
        for &child in node.children.iter().filter(|&&c| c < nodes.len()) {
            scratch
                .attach(child + 1, i + 1)
                .context("invalid node hierarchy")?;
        }
    }
    for &r in roots.iter().filter(|&&r| r < nodes.len()) {
        scratch.attach(r + 1, root).context("invalid scene roots")?;
    }
    Ok(())
}

fn log_model(asset: &ModelAsset) {
    log::info!("Model loaded: {asset:?}");
    if asset.clips.is_empty() {
        log::info!("No animations found in this model.");
    }
    for clip in &asset.clips {
        log::info!("Animation: {}", clip.name);
    }
}

/// Starts the first clip of `mixer` with the configured loop, if there is one.
pub fn start_first_clip(mixer: &mut AnimationMixer, config: &AnimationConfig) -> Option<ActionId> {
    let id = mixer.clip_action(0)?;
    let action = mixer.action_mut(id)?;
    action.set_loop(config.loop_mode, config.repetitions).play();
    Some(id)
}

/// A fresh standard material that keeps nothing of `desc` but its colour and normal maps.
pub fn patch_material(desc: &MaterialDesc, with: &MaterialOverride) -> MaterialDesc {
    MaterialDesc {
        name: desc.name.clone(),
        base_colour: [1.0; 4],
        colour_map: desc.colour_map,
        normal_map: desc.normal_map,
        roughness: with.roughness,
        metalness: with.metalness,
    }
}

pub fn material_uniform(desc: &MaterialDesc) -> MaterialUniform {
    MaterialUniform {
        base_colour: desc.base_colour,
        roughness: desc.roughness,
        metalness: desc.metalness,
        _padding: [0.0; 2],
    }
}

pub fn model_root_transform(config: &ModelConfig) -> Instance {
    Instance {
        position: config.position,
        scale: config.scale,
        ..Default::default()
    }
}

/// Seconds the mixer advances for a frame that took `dt`.
pub fn mixer_step(clock: MixerClock, dt: Duration) -> f32 {
    match clock {
        MixerClock::Fixed(step) => step,
        MixerClock::RealTime => dt.as_secs_f32(),
    }
}
