//! glTF / GLB import into a CPU-side [`ModelAsset`].
//!
//! Parsing runs off the event loop, so nothing here touches the GPU. Buffers
//! and images may be embedded (GLB binary chunk, buffer views) or external
//! files next to the model; `data:` URIs are rejected.

use std::fmt;

use anyhow::{Context, bail};
use cgmath::{Matrix4, Quaternion, SquareMatrix, Vector3};
use gltf::{Document, Gltf};

use crate::{
    animation::{AnimationClip, Channel, Keyframes},
    data_structures::{instance::Instance, model::ModelVertex},
    resources::{LoadProgress, PrimitiveData, load_binary, mesh, sibling_path, texture::decode_image},
};

#[derive(Clone, Debug, PartialEq)]
pub struct NodeDesc {
    pub name: String,
    pub transform: Instance,
    pub children: Vec<usize>,
    pub mesh: Option<usize>,
    pub skin: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshDesc {
    pub name: String,
    pub primitives: Vec<PrimitiveData>,
}

/// Material as authored in the file. Maps are indices into [`ModelAsset::images`].
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDesc {
    pub name: String,
    pub base_colour: [f32; 4],
    pub colour_map: Option<usize>,
    pub normal_map: Option<usize>,
    pub roughness: f32,
    pub metalness: f32,
}

impl Default for MaterialDesc {
    /// The glTF default material.
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_colour: [1.0; 4],
            colour_map: None,
            normal_map: None,
            roughness: 1.0,
            metalness: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SkinDesc {
    pub name: String,
    /// Node indices, in palette order.
    pub joints: Vec<usize>,
    pub inverse_bind_matrices: Vec<Matrix4<f32>>,
}

#[derive(Clone, Default)]
pub struct ModelAsset {
    pub name: String,
    pub nodes: Vec<NodeDesc>,
    /// Top level nodes of the displayed scene.
    pub roots: Vec<usize>,
    pub meshes: Vec<MeshDesc>,
    pub materials: Vec<MaterialDesc>,
    /// Decoded images; `None` where decoding failed.
    pub images: Vec<Option<image::RgbaImage>>,
    pub skins: Vec<SkinDesc>,
    pub clips: Vec<AnimationClip>,
}

impl fmt::Debug for ModelAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelAsset")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("roots", &self.roots)
            .field("meshes", &self.meshes.len())
            .field("materials", &self.materials.len())
            .field("images", &self.images.len())
            .field("skins", &self.skins.len())
            .field(
                "clips",
                &self.clips.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Fetches `path` (relative to the asset root) and parses it.
pub async fn load_model(
    path: &str,
    on_progress: impl FnMut(LoadProgress),
) -> anyhow::Result<ModelAsset> {
    let bytes = load_binary(path, on_progress)
        .await
        .with_context(|| format!("could not load {path}"))?;
    parse_model(&bytes, path).await
}

/// Parses a GLB or glTF file. External resources are resolved next to `base`.
pub async fn parse_model(bytes: &[u8], base: &str) -> anyhow::Result<ModelAsset> {
    let gltf = Gltf::from_slice(bytes).context("not a valid glTF file")?;
    let buffers = load_buffers(&gltf, base).await?;
    let images = load_images(&gltf.document, &buffers, base).await;

    let name = base.rsplit('/').next().unwrap_or(base).to_string();
    build_asset(&gltf.document, &buffers, images, name)
}

fn external_path(base: &str, uri: &str) -> anyhow::Result<String> {
    if uri.starts_with("data:") {
        bail!("embedded data URIs are not supported");
    }
    Ok(sibling_path(base, uri))
}

async fn load_buffers(gltf: &Gltf, base: &str) -> anyhow::Result<Vec<Vec<u8>>> {
    let loads = gltf.buffers().map(|buffer| async move {
        let data = match buffer.source() {
            gltf::buffer::Source::Bin => gltf
                .blob
                .clone()
                .context("buffer refers to a binary chunk but the file has none")?,
            gltf::buffer::Source::Uri(uri) => {
                let path = external_path(base, uri)?;
                load_binary(&path, |_| {})
                    .await
                    .with_context(|| format!("could not load buffer {path}"))?
            }
        };
        if data.len() < buffer.length() {
            bail!(
                "buffer {} is {} bytes long, expected at least {}",
                buffer.index(),
                data.len(),
                buffer.length()
            );
        }
        Ok::<_, anyhow::Error>(data)
    });
    futures::future::try_join_all(loads).await
}

async fn load_images(
    document: &Document,
    buffers: &[Vec<u8>],
    base: &str,
) -> Vec<Option<image::RgbaImage>> {
    let mut images = Vec::new();
    for image in document.images() {
        let decoded = match image.source() {
            gltf::image::Source::View { view, mime_type } => {
                let start = view.offset();
                let end = start + view.length();
                buffers
                    .get(view.buffer().index())
                    .and_then(|buffer| buffer.get(start..end))
                    .context("image buffer view is out of range")
                    .and_then(|bytes| decode_image(bytes, Some(mime_type)))
            }
            gltf::image::Source::Uri { uri, mime_type } => match external_path(base, uri) {
                Ok(path) => match load_binary(&path, |_| {}).await {
                    Ok(bytes) => decode_image(&bytes, mime_type),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            },
        };
        match decoded {
            Ok(img) => images.push(Some(img)),
            Err(e) => {
                log::warn!(
                    "Image {} could not be loaded, the material falls back to a plain colour: {e:#}",
                    image.index()
                );
                images.push(None);
            }
        }
    }
    images
}

fn build_asset(
    document: &Document,
    buffers: &[Vec<u8>],
    images: Vec<Option<image::RgbaImage>>,
    name: String,
) -> anyhow::Result<ModelAsset> {
    let nodes = document
        .nodes()
        .map(|node| NodeDesc {
            name: node
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("node {}", node.index())),
            transform: Instance::from(node.transform()),
            children: node.children().map(|c| c.index()).collect(),
            mesh: node.mesh().map(|m| m.index()),
            skin: node.skin().map(|s| s.index()),
        })
        .collect::<Vec<_>>();

    let roots = match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => scene.nodes().map(|n| n.index()).collect(),
        // no scene: everything that is not somebody's child
        None => {
            let mut is_child = vec![false; nodes.len()];
            for node in &nodes {
                for &c in &node.children {
                    if let Some(flag) = is_child.get_mut(c) {
                        *flag = true;
                    }
                }
            }
            (0..nodes.len()).filter(|&i| !is_child[i]).collect()
        }
    };

    let meshes = document
        .meshes()
        .map(|m| read_mesh(&m, buffers))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let materials = document.materials().map(read_material).collect();

    let skins = document
        .skins()
        .map(|skin| {
            let joints: Vec<usize> = skin.joints().map(|j| j.index()).collect();
            let reader = skin.reader(|b| buffers.get(b.index()).map(Vec::as_slice));
            let mut inverse_bind_matrices: Vec<Matrix4<f32>> = reader
                .read_inverse_bind_matrices()
                .map(|m| m.map(Matrix4::from).collect())
                .unwrap_or_default();
            inverse_bind_matrices.resize(joints.len(), Matrix4::identity());
            SkinDesc {
                name: skin
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("skin {}", skin.index())),
                joints,
                inverse_bind_matrices,
            }
        })
        .collect();

    let clips = document
        .animations()
        .map(|a| read_clip(&a, buffers))
        .collect();

    Ok(ModelAsset {
        name,
        nodes,
        roots,
        meshes,
        materials,
        images,
        skins,
        clips,
    })
}

fn read_material(material: gltf::Material<'_>) -> MaterialDesc {
    let pbr = material.pbr_metallic_roughness();
    MaterialDesc {
        name: material
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("material {}", material.index().unwrap_or_default())),
        base_colour: pbr.base_color_factor(),
        colour_map: pbr.base_color_texture().map(|info| info.texture().source().index()),
        normal_map: material
            .normal_texture()
            .map(|normal| normal.texture().source().index()),
        roughness: pbr.roughness_factor(),
        metalness: pbr.metallic_factor(),
    }
}

fn read_mesh(mesh: &gltf::Mesh<'_>, buffers: &[Vec<u8>]) -> anyhow::Result<MeshDesc> {
    let name = mesh
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("mesh {}", mesh.index()));
    let mut primitives = Vec::new();
    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::warn!(
                "Primitive {} of {name} uses {:?}, only triangle lists are drawn.",
                primitive.index(),
                primitive.mode()
            );
            continue;
        }
        let reader = primitive.reader(|b| buffers.get(b.index()).map(Vec::as_slice));
        let Some(positions) = reader.read_positions() else {
            log::warn!("Primitive {} of {name} has no positions, skipping it.", primitive.index());
            continue;
        };
        let mut vertices: Vec<ModelVertex> = positions
            .map(|position| ModelVertex {
                position,
                ..Default::default()
            })
            .collect();

        if let Some(tex_coords) = reader.read_tex_coords(0) {
            for (v, uv) in vertices.iter_mut().zip(tex_coords.into_f32()) {
                v.tex_coords = uv;
            }
        }
        if let Some(joints) = reader.read_joints(0) {
            for (v, j) in vertices.iter_mut().zip(joints.into_u16()) {
                v.joints = j.map(u32::from);
            }
        }
        if let Some(weights) = reader.read_weights(0) {
            for (v, w) in vertices.iter_mut().zip(weights.into_f32()) {
                v.weights = w;
            }
        }

        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..vertices.len() as u32).collect(),
        };
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            bail!("primitive {} of {name} indexes vertex {bad} out of {}", primitive.index(), vertices.len());
        }

        match reader.read_normals() {
            Some(normals) => {
                for (v, n) in vertices.iter_mut().zip(normals) {
                    v.normal = n;
                }
            }
            None => mesh::compute_normals(&mut vertices, &indices),
        }
        match reader.read_tangents() {
            Some(tangents) => {
                for (v, t) in vertices.iter_mut().zip(tangents) {
                    v.tangent = [t[0], t[1], t[2]];
                    v.bitangent = mesh::bitangent_from_tangent(v.normal, t);
                }
            }
            None => mesh::compute_tangents(&mut vertices, &indices),
        }

        primitives.push(PrimitiveData {
            vertices,
            indices,
            material: primitive.material().index(),
        });
    }
    Ok(MeshDesc { name, primitives })
}

fn read_clip(animation: &gltf::Animation<'_>, buffers: &[Vec<u8>]) -> AnimationClip {
    let name = animation
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("animation {}", animation.index()));
    let mut channels = Vec::new();
    for (index, channel) in animation.channels().enumerate() {
        let reader = channel.reader(|b| buffers.get(b.index()).map(Vec::as_slice));
        let Some(inputs) = reader.read_inputs() else {
            log::warn!("Channel {index} of {name} has no timestamps.");
            continue;
        };
        let timestamps: Vec<f32> = inputs.collect();
        let keyframes = match reader.read_outputs() {
            Some(gltf::animation::util::ReadOutputs::Translations(t)) => {
                Keyframes::Translation(t.map(Vector3::from).collect())
            }
            Some(gltf::animation::util::ReadOutputs::Rotations(r)) => Keyframes::Rotation(
                r.into_f32()
                    .map(|[x, y, z, w]| Quaternion::new(w, x, y, z))
                    .collect(),
            ),
            Some(gltf::animation::util::ReadOutputs::Scales(s)) => {
                Keyframes::Scale(s.map(Vector3::from).collect())
            }
            Some(gltf::animation::util::ReadOutputs::MorphTargetWeights(_)) => Keyframes::Other,
            None => {
                log::warn!("Channel {index} of {name} has no keyframes.");
                continue;
            }
        };
        channels.push(Channel {
            target: channel.target().node().index(),
            interpolation: channel.sampler().interpolation().into(),
            timestamps,
            keyframes,
        });
    }
    AnimationClip::new(name, channels)
}
