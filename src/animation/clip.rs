//! Animation clips and keyframe sampling.

use std::collections::HashMap;

use cgmath::{InnerSpace, Quaternion, Vector3, VectorSpace};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
    /// Hermite spline; every keyframe is stored as `(in_tangent, value, out_tangent)`.
    CubicSpline,
}

impl From<gltf::animation::Interpolation> for Interpolation {
    fn from(value: gltf::animation::Interpolation) -> Self {
        match value {
            gltf::animation::Interpolation::Step => Interpolation::Step,
            gltf::animation::Interpolation::Linear => Interpolation::Linear,
            gltf::animation::Interpolation::CubicSpline => Interpolation::CubicSpline,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Keyframes {
    Translation(Vec<Vector3<f32>>),
    Rotation(Vec<Quaternion<f32>>),
    Scale(Vec<Vector3<f32>>),
    // Morph target weights are read but not played back.
    Other,
}

/// One animated property of one node.
#[derive(Clone, Debug)]
pub struct Channel {
    pub target: usize,
    pub interpolation: Interpolation,
    pub timestamps: Vec<f32>,
    pub keyframes: Keyframes,
}

/// Sampled local transform overrides of a single node. Unset properties keep
/// the node's rest value.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodePose {
    pub translation: Option<Vector3<f32>>,
    pub rotation: Option<Quaternion<f32>>,
    pub scale: Option<Vector3<f32>>,
}

/// Node index -> sampled transform.
pub type Pose = HashMap<usize, NodePose>;

#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub channels: Vec<Channel>,
}

impl AnimationClip {
    /// Creates a clip whose duration is the last timestamp of its longest channel.
    pub fn new(name: impl Into<String>, channels: Vec<Channel>) -> Self {
        let duration = channels
            .iter()
            .filter_map(|c| c.timestamps.last().copied())
            .fold(0.0f32, f32::max);
        Self {
            name: name.into(),
            duration,
            channels,
        }
    }

    /// Samples every channel at `time` (seconds) into `pose`.
    pub fn sample(&self, time: f32, pose: &mut Pose) {
        for channel in &self.channels {
            let entry = pose.entry(channel.target).or_default();
            match &channel.keyframes {
                Keyframes::Translation(values) => {
                    if let Some(v) = sample_vector(channel, values, time) {
                        entry.translation = Some(v);
                    }
                }
                Keyframes::Rotation(values) => {
                    if let Some(q) = sample_rotation(channel, values, time) {
                        entry.rotation = Some(q);
                    }
                }
                Keyframes::Scale(values) => {
                    if let Some(v) = sample_vector(channel, values, time) {
                        entry.scale = Some(v);
                    }
                }
                Keyframes::Other => (),
            }
        }
    }
}

/// Where `time` falls on a timeline: the keyframe pair and the normalised
/// position between them.
#[derive(Debug, PartialEq)]
enum Cursor {
    Before,
    After,
    Between { index: usize, t: f32, dt: f32 },
}

fn locate(timestamps: &[f32], time: f32) -> Cursor {
    let first = match timestamps.first() {
        Some(first) => *first,
        None => return Cursor::Before,
    };
    if time <= first {
        return Cursor::Before;
    }
    if time >= timestamps[timestamps.len() - 1] {
        return Cursor::After;
    }
    // first index whose timestamp is greater than `time`, never 0 here
    let next = timestamps.partition_point(|&ts| ts <= time);
    let index = next - 1;
    let dt = timestamps[next] - timestamps[index];
    let t = if dt > 0.0 {
        (time - timestamps[index]) / dt
    } else {
        0.0
    };
    Cursor::Between { index, t, dt }
}

/// Value of keyframe `i`, skipping the tangents of cubic spline tracks.
fn key<T: Copy>(values: &[T], interpolation: Interpolation, i: usize) -> Option<T> {
    match interpolation {
        Interpolation::CubicSpline => values.get(i * 3 + 1).copied(),
        _ => values.get(i).copied(),
    }
}

fn hermite<V>(v0: V, out_tangent: V, v1: V, in_tangent: V, t: f32, dt: f32) -> V
where
    V: VectorSpace<Scalar = f32>,
{
    let t2 = t * t;
    let t3 = t2 * t;
    v0 * (2.0 * t3 - 3.0 * t2 + 1.0)
        + out_tangent * ((t3 - 2.0 * t2 + t) * dt)
        + v1 * (-2.0 * t3 + 3.0 * t2)
        + in_tangent * ((t3 - t2) * dt)
}

fn sample_vector(channel: &Channel, values: &[Vector3<f32>], time: f32) -> Option<Vector3<f32>> {
    let last = channel.timestamps.len().checked_sub(1)?;
    match locate(&channel.timestamps, time) {
        Cursor::Before => key(values, channel.interpolation, 0),
        Cursor::After => key(values, channel.interpolation, last),
        Cursor::Between { index, t, dt } => match channel.interpolation {
            Interpolation::Step => values.get(index).copied(),
            Interpolation::Linear => {
                let a = *values.get(index)?;
                let b = *values.get(index + 1)?;
                Some(a + (b - a) * t)
            }
            Interpolation::CubicSpline => {
                let v0 = *values.get(index * 3 + 1)?;
                let b0 = *values.get(index * 3 + 2)?;
                let a1 = *values.get(index * 3 + 3)?;
                let v1 = *values.get(index * 3 + 4)?;
                Some(hermite(v0, b0, v1, a1, t, dt))
            }
        },
    }
}

fn sample_rotation(
    channel: &Channel,
    values: &[Quaternion<f32>],
    time: f32,
) -> Option<Quaternion<f32>> {
    let last = channel.timestamps.len().checked_sub(1)?;
    let q = match locate(&channel.timestamps, time) {
        Cursor::Before => key(values, channel.interpolation, 0)?,
        Cursor::After => key(values, channel.interpolation, last)?,
        Cursor::Between { index, t, dt } => match channel.interpolation {
            Interpolation::Step => *values.get(index)?,
            Interpolation::Linear => {
                let a = *values.get(index)?;
                let mut b = *values.get(index + 1)?;
                // shortest arc
                if a.dot(b) < 0.0 {
                    b = -b;
                }
                a.slerp(b, t)
            }
            Interpolation::CubicSpline => {
                let v0 = *values.get(index * 3 + 1)?;
                let b0 = *values.get(index * 3 + 2)?;
                let a1 = *values.get(index * 3 + 3)?;
                let v1 = *values.get(index * 3 + 4)?;
                hermite(v0, b0, v1, a1, t, dt)
            }
        },
    };
    Some(q.normalize())
}
