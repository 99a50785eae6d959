//! Keyframe animation: clips read from glTF files and the mixer that plays them.
//!
//! - `clip` holds [`AnimationClip`]s and samples their channels at a point in time
//! - `mixer` advances [`AnimationAction`]s (one per clip) and produces a [`Pose`]

pub mod clip;
pub mod mixer;

pub use clip::{AnimationClip, Channel, Interpolation, Keyframes, NodePose, Pose};
pub use mixer::{ActionId, AnimationAction, AnimationMixer, LoopMode};
