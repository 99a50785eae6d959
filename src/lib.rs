//! orbit-viewer
//!
//! A minimal cross-platform glTF viewer: one animated model standing on a grey
//! platform, lit by an ambient and a directional light, inspected with damped
//! orbit controls. Runs natively and in the browser (WebGL2 via wgpu).
//!
//! High-level modules
//! - `animation`: keyframe clips and the mixer that plays them
//! - `camera`: perspective camera, projection and its uniform
//! - `config`: every tunable of the scene, with defaults matching the stock viewer
//! - `context`: window and GPU context that owns device/queue/pipelines
//! - `controls`: orbit controls (rotate, zoom, pan, damping)
//! - `data_structures`: meshes, instances, textures and the scene graph
//! - `flow`: the event loop
//! - `pipelines`: the standard render pipeline and its light/skin bindings
//! - `resources`: async file loading and glTF import
//! - `viewer`: the scene itself and the per-frame update
//!

pub mod animation;
pub mod camera;
pub mod config;
pub mod context;
pub mod controls;
pub mod data_structures;
pub mod flow;
pub mod pipelines;
pub mod resources;
pub mod viewer;

pub use config::ViewerConfig;
pub use flow::run;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Entry point of the web build.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    run(ViewerConfig::default()).map_err(|e| JsValue::from_str(&format!("{e:?}")))
}
