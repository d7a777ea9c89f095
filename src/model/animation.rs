//! Keyframe animation clips and a single-action mixer.
//!
//! Clips are read from glTF animations (node translation / rotation / scale
//! channels). The mixer plays at most one clip at a time and loops it.

use glam::{Quat, Vec3};

use super::pose::Pose;
use super::vrm::VrmModel;

/// Keyframe interpolation mode (glTF sampler semantics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
    /// Values stored as (in-tangent, value, out-tangent) triples
    CubicSpline,
}

/// Keyframe outputs of one channel.
#[derive(Debug, Clone)]
pub enum ChannelValues {
    Translation(Vec<Vec3>),
    Rotation(Vec<Quat>),
    Scale(Vec<Vec3>),
}

/// One animated property of one node.
#[derive(Debug, Clone)]
pub struct AnimationChannel {
    pub node: usize,
    pub interpolation: Interpolation,
    /// Keyframe times in seconds, ascending
    pub times: Vec<f32>,
    pub values: ChannelValues,
}

/// A named set of channels.
#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub name: String,
    /// Last keyframe time across all channels
    pub duration: f32,
    pub channels: Vec<AnimationChannel>,
}

impl AnimationClip {
    /// Write this clip's values at `time` into `pose`. Nodes the clip does not
    /// animate keep whatever `pose` already holds.
    pub fn sample_into(&self, time: f32, pose: &mut Pose) {
        for channel in &self.channels {
            if channel.node >= pose.len() {
                continue;
            }
            match &channel.values {
                ChannelValues::Translation(values) => {
                    if let Some(v) = sample_vec3(channel, values, time) {
                        pose.translations[channel.node] = v;
                    }
                }
                ChannelValues::Scale(values) => {
                    if let Some(v) = sample_vec3(channel, values, time) {
                        pose.scales[channel.node] = v;
                    }
                }
                ChannelValues::Rotation(values) => {
                    if let Some(q) = sample_quat(channel, values, time) {
                        pose.rotations[channel.node] = q;
                    }
                }
            }
        }
    }
}

/// Locate the keyframe segment containing `time`.
enum Segment {
    Key(usize),
    Between { index: usize, t: f32, dt: f32 },
}

fn locate(times: &[f32], time: f32) -> Option<Segment> {
    let last = times.len().checked_sub(1)?;
    if time <= times[0] {
        return Some(Segment::Key(0));
    }
    if time >= times[last] {
        return Some(Segment::Key(last));
    }
    let next = times.partition_point(|&k| k <= time);
    let index = next - 1;
    let dt = times[next] - times[index];
    if dt <= 0.0 {
        return Some(Segment::Key(index));
    }
    Some(Segment::Between {
        index,
        t: (time - times[index]) / dt,
        dt,
    })
}

/// Cubic Hermite basis for glTF CUBICSPLINE.
fn hermite<T>(p0: T, m0: T, p1: T, m1: T, t: f32, dt: f32) -> T
where
    T: std::ops::Mul<f32, Output = T> + std::ops::Add<Output = T>,
{
    let t2 = t * t;
    let t3 = t2 * t;
    p0 * (2.0 * t3 - 3.0 * t2 + 1.0)
        + m0 * ((t3 - 2.0 * t2 + t) * dt)
        + p1 * (-2.0 * t3 + 3.0 * t2)
        + m1 * ((t3 - t2) * dt)
}

fn keyframe<T: Copy>(channel: &AnimationChannel, values: &[T], key: usize) -> Option<T> {
    match channel.interpolation {
        Interpolation::CubicSpline => values.get(key * 3 + 1).copied(),
        _ => values.get(key).copied(),
    }
}

fn sample_vec3(channel: &AnimationChannel, values: &[Vec3], time: f32) -> Option<Vec3> {
    match locate(&channel.times, time)? {
        Segment::Key(k) => keyframe(channel, values, k),
        Segment::Between { index, t, dt } => match channel.interpolation {
            Interpolation::Step => values.get(index).copied(),
            Interpolation::Linear => {
                let a = *values.get(index)?;
                let b = *values.get(index + 1)?;
                Some(a.lerp(b, t))
            }
            Interpolation::CubicSpline => {
                let p0 = *values.get(index * 3 + 1)?;
                let m0 = *values.get(index * 3 + 2)?;
                let m1 = *values.get((index + 1) * 3)?;
                let p1 = *values.get((index + 1) * 3 + 1)?;
                Some(hermite(p0, m0, p1, m1, t, dt))
            }
        },
    }
}

fn sample_quat(channel: &AnimationChannel, values: &[Quat], time: f32) -> Option<Quat> {
    let q = match locate(&channel.times, time)? {
        Segment::Key(k) => keyframe(channel, values, k)?,
        Segment::Between { index, t, dt } => match channel.interpolation {
            Interpolation::Step => *values.get(index)?,
            Interpolation::Linear => {
                let a = *values.get(index)?;
                let b = *values.get(index + 1)?;
                a.slerp(b, t)
            }
            Interpolation::CubicSpline => {
                let p0 = *values.get(index * 3 + 1)?;
                let m0 = *values.get(index * 3 + 2)?;
                let m1 = *values.get((index + 1) * 3)?;
                let p1 = *values.get((index + 1) * 3 + 1)?;
                hermite(p0, m0, p1, m1, t, dt)
            }
        },
    };
    Some(q.normalize())
}

/// Read all node TRS animation clips from a glTF document.
pub(crate) fn read_animation_clips(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
) -> Vec<AnimationClip> {
    use gltf::animation::util::ReadOutputs;
    use gltf::animation::Property;

    let mut clips = Vec::new();

    for anim in document.animations() {
        let mut channels = Vec::new();
        let mut duration = 0.0f32;

        for channel in anim.channels() {
            let target = channel.target();
            if matches!(target.property(), Property::MorphTargetWeights) {
                continue;
            }

            let reader = channel.reader(|buffer| Some(&buffers[buffer.index()]));
            let times: Vec<f32> = match reader.read_inputs() {
                Some(iter) => iter.collect(),
                None => continue,
            };

            let values = match reader.read_outputs() {
                Some(ReadOutputs::Translations(iter)) => {
                    ChannelValues::Translation(iter.map(Vec3::from).collect())
                }
                Some(ReadOutputs::Scales(iter)) => {
                    ChannelValues::Scale(iter.map(Vec3::from).collect())
                }
                Some(ReadOutputs::Rotations(rotations)) => ChannelValues::Rotation(
                    rotations.into_f32().map(Quat::from_array).collect(),
                ),
                _ => continue,
            };

            let interpolation = match channel.sampler().interpolation() {
                gltf::animation::Interpolation::Step => Interpolation::Step,
                gltf::animation::Interpolation::Linear => Interpolation::Linear,
                gltf::animation::Interpolation::CubicSpline => Interpolation::CubicSpline,
            };

            if let Some(&end) = times.last() {
                duration = duration.max(end);
            }

            channels.push(AnimationChannel {
                node: target.node().index(),
                interpolation,
                times,
                values,
            });
        }

        let name = anim
            .name()
            .map(String::from)
            .unwrap_or_else(|| format!("clip_{}", anim.index()));

        clips.push(AnimationClip {
            name,
            duration,
            channels,
        });
    }

    clips
}

/// The clip currently bound to the mixer and its local clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationAction {
    pub clip: usize,
    pub time: f32,
}

/// Plays one clip at a time, looping. No blending.
#[derive(Debug, Clone, Default)]
pub struct AnimationMixer {
    action: Option<AnimationAction>,
}

impl AnimationMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `clip` from time zero, replacing any active action.
    pub fn play(&mut self, clip: usize) {
        self.action = Some(AnimationAction { clip, time: 0.0 });
    }

    pub fn stop(&mut self) {
        self.action = None;
    }

    pub fn action(&self) -> Option<AnimationAction> {
        self.action
    }

    pub fn active_clip(&self) -> Option<usize> {
        self.action.map(|a| a.clip)
    }

    pub fn is_playing(&self) -> bool {
        self.action.is_some()
    }

    /// Advance the clock by `dt` seconds and write the sampled pose.
    ///
    /// Returns false (and leaves `pose` untouched) when nothing is playing or
    /// the active clip index does not exist in `model`.
    pub fn update(&mut self, dt: f32, model: &VrmModel, pose: &mut Pose) -> bool {
        let action = match self.action.as_mut() {
            Some(a) => a,
            None => return false,
        };
        let clip = match model.animations.get(action.clip) {
            Some(c) => c,
            None => return false,
        };

        action.time += dt.max(0.0);
        if clip.duration > 0.0 {
            action.time %= clip.duration;
        } else {
            action.time = 0.0;
        }

        pose.reset_to_rest(model);
        clip.sample_into(action.time, pose);
        true
    }
}
