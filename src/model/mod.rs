//! VRM model data: parsing, posing, animation, and async loading.

pub mod animation;
pub mod loader;
pub mod pose;
pub mod vrm;

#[cfg(test)]
pub(crate) mod test_glb;

pub use animation::{AnimationClip, AnimationMixer};
pub use loader::{LoadEvent, LoadHandle, LoadProgress, LoadedModel, ModelLoader};
pub use pose::{compute_world_transforms, posed_bounds, Pose};
pub use vrm::{VrmMeta, VrmModel, VrmVersion};
