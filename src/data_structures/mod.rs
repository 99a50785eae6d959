//! Viewer data structures: transforms, meshes, textures and the scene graph.
//!
//! - `instance` holds per-node transformation data and its GPU layout
//! - `model` contains mesh and material definitions and the draw helper
//! - `texture` contains GPU texture wrapper and creation utilities
//! - `scene_graph` enables hierarchical scene organization

pub mod instance;
pub mod model;
pub mod scene_graph;
pub mod texture;
